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

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WorldConfig;
use crate::error::PhysicsError;
use crate::math::*;
use crate::particle::{Particle, ParticleHandle, ParticleSet};
use crate::particle_contact::{ParticleContact, ParticleContactGenerator, ParticleContactResolver};
use crate::particle_force::ParticleForceRegistry;

/// Keeps track of a set of particles and moves them forward in time.
///
/// A step runs in a fixed order: forces, integration, contact generation
/// and contact resolution. Call `start_frame` before each step to clear
/// the force accumulators.
pub struct ParticleWorld {
    particles: ParticleSet,
    registry: ParticleForceRegistry,
    contact_generators: Vec<Box<dyn ParticleContactGenerator>>,
    resolver: ParticleContactResolver,
    contacts: Vec<ParticleContact>,
    config: WorldConfig,
}

impl ParticleWorld {
    /// Creates a world that handles up to `max_contacts` contacts per step.
    /// An `iterations` of zero derives the resolver's budget from the number
    /// of contacts each step.
    pub fn new(max_contacts: usize, iterations: usize) -> Self {
        ParticleWorld::from_config(WorldConfig::new(max_contacts, iterations))
    }

    /// Creates a world from a validated configuration.
    pub fn with_config(config: WorldConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        Ok(ParticleWorld::from_config(config))
    }

    fn from_config(config: WorldConfig) -> Self {
        ParticleWorld {
            particles: ParticleSet::new(),
            registry: ParticleForceRegistry::new(),
            contact_generators: Vec::new(),
            resolver: ParticleContactResolver::new(config.iterations),
            contacts: Vec::with_capacity(config.max_contacts),
            config,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn add_particle(&mut self, particle: Particle) -> ParticleHandle {
        self.particles.push(particle)
    }

    /// Removes a particle along with every force registration acting on it.
    pub fn remove_particle(&mut self, handle: ParticleHandle) -> Result<Particle, PhysicsError> {
        let particle = self.particles.remove(handle)?;
        self.registry.remove_target(handle);
        Ok(particle)
    }

    pub fn particle(&self, handle: ParticleHandle) -> Option<&Particle> {
        self.particles.get(handle)
    }

    pub fn particle_mut(&mut self, handle: ParticleHandle) -> Option<&mut Particle> {
        self.particles.get_mut(handle)
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut ParticleSet {
        &mut self.particles
    }

    pub fn registry(&self) -> &ParticleForceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ParticleForceRegistry {
        &mut self.registry
    }

    /// Adds a contact generator. Generators run in the order they were
    /// added.
    pub fn add_contact_generator<G>(&mut self, generator: G)
    where
        G: ParticleContactGenerator + 'static
    {
        self.contact_generators.push(Box::new(generator));
    }

    /// Contacts found by the last step, after resolution.
    pub fn contacts(&self) -> &[ParticleContact] {
        &self.contacts
    }

    pub fn resolver(&self) -> &ParticleContactResolver {
        &self.resolver
    }

    /// Clears every particle's force accumulator.
    pub fn start_frame(&mut self) {
        for particle in self.particles.iter_mut() {
            particle.clear_accumulator();
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
                    "particle contact buffer full, dropping contacts"
                );
                break;
            }
            let used = generator.add_contact(&self.particles, &mut self.contacts, limit);
            debug_assert!(used <= limit, "contact generator wrote past its limit");
            limit = limit.saturating_sub(used);
        }
        self.contacts.truncate(self.config.max_contacts);
        self.contacts.len()
    }

    pub fn integrate(&mut self, duration: Real) {
        for particle in self.particles.iter_mut() {
            particle.integrate(duration);
        }
    }

    /// Runs one step of the simulation. Does nothing for a non-positive
    /// `duration`.
    pub fn run_physics(&mut self, duration: Real) {
        if !(duration > 0.0) {
            debug!(duration, "skipping particle step with non-positive duration");
            return;
        }

        self.registry.update_forces(&mut self.particles, duration);
        self.integrate(duration);

        let used_contacts = self.generate_contacts();
        if used_contacts > 0 {
            self.resolver.set_iterations(self.config.particle_iterations(used_contacts));
            self.resolver.resolve_contacts(&mut self.contacts, &mut self.particles, duration);
        }
    }
}

/// Generates contacts between every particle and the ground plane at y = 0.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundContacts {
    pub restitution: Real,
}

impl Default for GroundContacts {
    fn default() -> Self {
        GroundContacts { restitution: 0.2 }
    }
}

impl GroundContacts {
    pub fn new() -> Self {
        GroundContacts::default()
    }
}

impl ParticleContactGenerator for GroundContacts {
    fn add_contact(&self, particles: &ParticleSet, contacts: &mut Vec<ParticleContact>, limit: usize) -> usize {
        let mut count = 0;
        for (handle, particle) in particles.handles() {
            if count >= limit {
                break;
            }
            let y = particle.position.y;
            if y < 0.0 {
                contacts.push(ParticleContact::new(handle, None, UP, -y, self.restitution));
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    mod particle_world {
        use approx::assert_relative_eq;
        use cgmath::{Vector3, Zero};

        use crate::config::WorldConfig;
        use crate::force::{ForceGenerator, Gravity};
        use crate::math::*;
        use crate::particle::*;
        use crate::particle_force::*;
        use crate::particle_link::*;
        use crate::particle_world::*;

        #[test]
        fn test_ground_contact() {
            let mut world = ParticleWorld::new(16, 0);
            let p = world.add_particle(Particle::new(Vector3::new(0.0, -1.0, 0.0), 1.0));
            world.add_contact_generator(GroundContacts::new());
            world.start_frame();
            world.run_physics(0.01);

            let contacts = world.contacts();
            assert_eq!(contacts.len(), 1);
            assert_eq!(contacts[0].particle, p);
            assert_eq!(contacts[0].other, None);
            assert_relative_eq!(contacts[0].contact_normal, UP);
            assert_relative_eq!(contacts[0].particle_movement[0], Vector3::new(0.0, 1.0, 0.0));
            assert_relative_eq!(world.particle(p).unwrap().position.y, 0.0);
            assert_eq!(world.resolver().iterations(), 2);
        }

        #[test]
        fn test_capacity_drop() {
            let mut world = ParticleWorld::new(1, 0);
            world.add_particle(Particle::new(Vector3::new(0.0, -1.0, 0.0), 1.0));
            world.add_particle(Particle::new(Vector3::new(1.0, -2.0, 0.0), 1.0));
            world.add_contact_generator(GroundContacts::new());
            world.add_contact_generator(GroundContacts::new());
            assert_eq!(world.generate_contacts(), 1);
            assert_eq!(world.contacts().len(), 1);
            assert_relative_eq!(world.contacts()[0].penetration, 1.0);

            // A full step resolves what fits and leaves the rest for later.
            world.run_physics(0.01);
            assert_eq!(world.contacts().len(), 1);
        }

        #[test]
        fn test_zero_duration() {
            let mut world = ParticleWorld::new(4, 0);
            let mut particle = Particle::new(Vector3::new(0.0, -1.0, 0.0), 1.0);
            particle.velocity = Vector3::new(1.0, 0.0, 0.0);
            let p = world.add_particle(particle);
            world.add_contact_generator(GroundContacts::new());
            let before = *world.particle(p).unwrap();
            world.run_physics(0.0);
            world.run_physics(-1.0);
            assert_eq!(*world.particle(p).unwrap(), before);
            assert!(world.contacts().is_empty());
        }

        #[test]
        fn test_accumulator_reset() {
            let mut world = ParticleWorld::new(4, 0);
            let p = world.add_particle(Particle::new(Vector3::new(0.0, 10.0, 0.0), 1.0));
            world.particle_mut(p).unwrap().add_force(Vector3::new(5.0, 0.0, 0.0));
            world.start_frame();
            assert_eq!(world.particle(p).unwrap().accumulated_force(), Vector3::zero());
            world.run_physics(0.1);
            assert_eq!(world.particle(p).unwrap().velocity, Vector3::zero());
        }

        #[test]
        fn test_falling_onto_ground() {
            let config = WorldConfig::from_toml_str("max_contacts = 8").unwrap();
            let mut world = ParticleWorld::with_config(config).unwrap();
            let p = world.add_particle(Particle::new(Vector3::new(0.0, 2.0, 0.0), 1.0));
            let gravity = world
                .registry_mut()
                .add_generator(Gravity::new(Vector3::new(0.0, -10.0, 0.0)).into());
            world.registry_mut().add(p, gravity).unwrap();
            world.add_contact_generator(GroundContacts::new());

            for _ in 0..300 {
                world.start_frame();
                world.run_physics(0.01);
                assert!(world.particle(p).unwrap().position.y >= -0.2);
            }
            let particle = world.particle(p).unwrap();
            assert!(particle.position.y.abs() < 0.01);
            assert!(particle.velocity.y.abs() < 0.2);
        }

        #[test]
        fn test_rod_chain() {
            let mut world = ParticleWorld::new(8, 0);
            let a = world.add_particle(Particle::new(Vector3::new(0.0, 1.0, 0.0), 1.0));
            let b = world.add_particle(Particle::new(Vector3::new(2.0, 1.0, 0.0), 1.0));
            world.add_contact_generator(ParticleRod::new(a, b, 1.0));
            world.particle_mut(a).unwrap().velocity = Vector3::new(-1.0, 0.0, 0.0);
            world.start_frame();
            world.run_physics(0.05);
            let length = current_length(world.particles(), [a, b]).unwrap();
            assert_relative_eq!(length, 1.0, epsilon = 1.0e-4);
        }

        #[test]
        fn test_remove_particle() {
            let mut world = ParticleWorld::new(4, 0);
            let p = world.add_particle(Particle::new(Vector3::new(0.0, 1.0, 0.0), 1.0));
            let drag = world.registry_mut().add_generator(ParticleDrag::new(1.0, 0.0).into());
            world.registry_mut().add(p, drag).unwrap();
            world.remove_particle(p).unwrap();
            assert!(world.registry().is_empty());
            assert!(world.remove_particle(p).is_err());
            assert!(world.particle(p).is_none());

            let bad = WorldConfig {
                body_iteration_factor: 0,
                ..WorldConfig::default()
            };
            assert!(ParticleWorld::with_config(bad).is_err());

            // Registries stay usable with generators applied by hand.
            let g = Gravity::new(Vector3::new(0.0, -1.0, 0.0));
            let q = world.add_particle(Particle::new(Vector3::zero(), 2.0));
            g.update_force(q, world.particles_mut(), 0.1);
            assert_relative_eq!(world.particle(q).unwrap().accumulated_force(), Vector3::new(0.0, -2.0, 0.0));
        }
    }
}
