// Copyright 2017 Matthew Plant. This file is part of Impel.
//
// Impel is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Impel is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Impel. If not, see <http://www.gnu.org/licenses/>.

use tracing::debug;

use crate::body::{BodyHandle, BodySet, RigidBody};
use crate::body_force::BodyForceRegistry;
use crate::config::WorldConfig;
use crate::contact::{Contact, ContactGenerator, ContactResolver};
use crate::error::PhysicsError;
use crate::math::*;

/// Keeps track of a set of rigid bodies and moves them forward in time.
///
/// Each step runs forces, integration, contact generation and contact
/// resolution in that order. Call `start_frame` before each step.
pub struct World {
    bodies: BodySet,
    registry: BodyForceRegistry,
    contact_generators: Vec<Box<dyn ContactGenerator>>,
    resolver: ContactResolver,
    contacts: Vec<Contact>,
    config: WorldConfig,
}

impl World {
    /// Creates a world that handles up to `max_contacts` contacts per step.
    /// An `iterations` of zero derives the resolver's budget from the number
    /// of contacts each step.
    pub fn new(max_contacts: usize, iterations: usize) -> Self {
        World::from_config(WorldConfig::new(max_contacts, iterations))
    }

    /// Creates a world from a validated configuration.
    pub fn with_config(config: WorldConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        Ok(World::from_config(config))
    }

    fn from_config(config: WorldConfig) -> Self {
        World {
            bodies: BodySet::new(),
            registry: BodyForceRegistry::new(),
            contact_generators: Vec::new(),
            resolver: ContactResolver::with_epsilon(
                config.iterations,
                config.velocity_epsilon,
                config.position_epsilon,
            ),
            contacts: Vec::with_capacity(config.max_contacts),
            config,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Adds a body. Its sleep threshold is taken from the configuration.
    pub fn add_body(&mut self, mut body: RigidBody) -> BodyHandle {
        body.set_sleep_epsilon(self.config.sleep_epsilon);
        body.calculate_derived_data();
        self.bodies.push(body)
    }

    /// Removes a body along with every force registration acting on it.
    /// Contact generators holding its handle skip it from now on.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<RigidBody, PhysicsError> {
        let body = self.bodies.remove(handle)?;
        self.registry.remove_target(handle);
        Ok(body)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> &BodySet {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut BodySet {
        &mut self.bodies
    }

    pub fn registry(&self) -> &BodyForceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BodyForceRegistry {
        &mut self.registry
    }

    /// Adds a contact generator. Generators run in the order they were
    /// added.
    pub fn add_contact_generator<G>(&mut self, generator: G)
    where
        G: ContactGenerator + 'static
    {
        self.contact_generators.push(Box::new(generator));
    }

    /// Contacts found by the last step, after resolution.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn resolver(&self) -> &ContactResolver {
        &self.resolver
    }

    /// Clears every body's accumulators and brings its derived data up to
    /// date with any changes the host made since the last step.
    pub fn start_frame(&mut self) {
        for body in self.bodies.iter_mut() {
            body.clear_accumulators();
            body.calculate_derived_data();
        }
    }

    /// Calls each contact generator in turn until they are all done or the
    /// contact buffer is full. Returns the number of contacts generated.
    pub fn generate_contacts(&mut self) -> usize {
        self.contacts.clear();
        let mut limit = self.config.max_contacts;
        for generator in self.contact_generators.iter() {
            if limit == 0 {
                debug!(
                    max_contacts = self.config.max_contacts,
                    "body contact buffer full, dropping contacts"
                );
                break;
            }
            let used = generator.add_contact(&self.bodies, &mut self.contacts, limit);
            debug_assert!(used <= limit, "contact generator wrote past its limit");
            limit = limit.saturating_sub(used);
        }
        self.contacts.truncate(self.config.max_contacts);
        self.contacts.len()
    }

    pub fn integrate(&mut self, duration: Real) {
        for body in self.bodies.iter_mut() {
            body.integrate(duration);
        }
    }

    /// Runs one step of the simulation. Does nothing for a non-positive
    /// `duration`.
    pub fn run_physics(&mut self, duration: Real) {
        if !(duration > 0.0) {
            debug!(duration, "skipping body step with non-positive duration");
            return;
        }

        self.registry.update_forces(&mut self.bodies, duration);
        self.integrate(duration);

        let used_contacts = self.generate_contacts();
        if used_contacts > 0 {
            self.resolver.set_iterations(self.config.body_iterations(used_contacts));
            self.resolver.resolve_contacts(&mut self.contacts, &mut self.bodies, duration);
        }
    }
}

#[cfg(test)]
mod tests {
    mod world {
        use approx::assert_relative_eq;
        use cgmath::{InnerSpace, Vector3, Zero};

        use crate::body::*;
        use crate::body_force::*;
        use crate::collision::*;
        use crate::config::WorldConfig;
        use crate::force::Gravity;
        use crate::joint::*;
        use crate::math::*;
        use crate::world::*;

        fn ball(position: Vector3<Real>) -> RigidBody {
            RigidBody::new(position, 1.0, sphere_inertia_tensor(1.0, 1.0))
        }

        fn ground_contacts(body: BodyHandle) -> PrimitiveContacts {
            let mut contacts = PrimitiveContacts::new(0.9, 0.3);
            contacts.add_collider(Sphere::new(body, 1.0));
            contacts.add_half_space(Plane::ground());
            contacts
        }

        #[test]
        fn test_falling_onto_ground() {
            let mut world = World::new(16, 0);
            let b = world.add_body(ball(Vector3::new(0.0, 2.0, 0.0)));
            let gravity = world
                .registry_mut()
                .add_generator(Gravity::new(Vector3::new(0.0, -10.0, 0.0)).into());
            world.registry_mut().add(b, gravity).unwrap();
            world.add_contact_generator(ground_contacts(b));

            for _ in 0..300 {
                world.start_frame();
                world.run_physics(0.01);
                assert!(world.body(b).unwrap().position.y >= 0.9);
            }
            let body = world.body(b).unwrap();
            assert_relative_eq!(body.position.y, 1.0, epsilon = 0.02);
            assert!(body.velocity.magnitude() < 0.2);
            assert_relative_eq!(body.rotation, Vector3::zero(), epsilon = 1.0e-4);
            assert_eq!(world.resolver().velocity_iterations(), 4);
        }

        #[test]
        fn test_settled_body_sleeps() {
            let config = WorldConfig::from_toml_str("max_contacts = 4\nsleep_epsilon = 0.3").unwrap();
            let mut world = World::with_config(config).unwrap();
            let mut body = ball(Vector3::new(0.0, 2.0, 0.0));
            body.acceleration = Vector3::new(0.0, -10.0, 0.0);
            body.set_can_sleep(true);
            let b = world.add_body(body);
            world.add_contact_generator(ground_contacts(b));

            for _ in 0..600 {
                world.start_frame();
                world.run_physics(0.01);
            }
            let body = world.body(b).unwrap();
            assert!(!body.is_awake());
            assert_relative_eq!(body.position.y, 1.0, epsilon = 0.02);

            world.body_mut(b).unwrap().add_force(Vector3::new(1.0, 0.0, 0.0));
            assert!(world.body(b).unwrap().is_awake());
        }

        #[test]
        fn test_zero_duration() {
            let mut world = World::new(4, 0);
            let mut body = ball(Vector3::new(0.0, 0.5, 0.0));
            body.velocity = Vector3::new(1.0, 0.0, 0.0);
            let b = world.add_body(body);
            world.add_contact_generator(ground_contacts(b));
            let before = world.body(b).unwrap().position;
            world.run_physics(0.0);
            world.run_physics(-0.5);
            assert_eq!(world.body(b).unwrap().position, before);
            assert!(world.contacts().is_empty());
        }

        #[test]
        fn test_capacity_drop() {
            let mut world = World::new(2, 0);
            let a = world.add_body(ball(Vector3::new(0.0, 0.5, 0.0)));
            let b = world.add_body(ball(Vector3::new(5.0, 0.5, 0.0)));
            let c = world.add_body(ball(Vector3::new(10.0, 0.5, 0.0)));
            let mut contacts = PrimitiveContacts::new(0.0, 0.0);
            for &h in [a, b, c].iter() {
                contacts.add_collider(Sphere::new(h, 1.0));
            }
            contacts.add_half_space(Plane::ground());
            world.add_contact_generator(contacts);
            world.add_contact_generator(ground_contacts(a));

            assert_eq!(world.generate_contacts(), 2);
            world.start_frame();
            world.run_physics(0.01);
            assert_eq!(world.contacts().len(), 2);
            // The third sphere was dropped this step and is still sunk.
            assert!(world.body(c).unwrap().position.y < 1.0);
            assert!(world.body(a).unwrap().position.y > 0.99);
        }

        #[test]
        fn test_jointed_bodies_with_spring_registry() {
            let mut world = World::new(8, 0);
            let a = world.add_body(ball(Vector3::zero()));
            let b = world.add_body(ball(Vector3::new(3.0, 0.0, 0.0)));
            world.add_contact_generator(Joint::new(
                a,
                Vector3::new(0.5, 0.0, 0.0),
                b,
                Vector3::new(-0.5, 0.0, 0.0),
                0.5,
            ));
            let spring = world.registry_mut().add_generator(
                Spring::new(Vector3::zero(), b, Vector3::zero(), 10.0, 1.0).into(),
            );
            world.registry_mut().add(a, spring).unwrap();

            world.start_frame();
            world.run_physics(0.01);
            assert_eq!(world.contacts().len(), 1);
            assert!(world.body(a).unwrap().position.x > 0.5);

            world.remove_body(a).unwrap();
            assert!(world.registry().is_empty());
            assert!(world.remove_body(a).is_err());
            world.start_frame();
            world.run_physics(0.01);
            assert!(world.contacts().is_empty());
        }
    }
}
