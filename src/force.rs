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

use cgmath::Vector3;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::body::RigidBody;
use crate::error::PhysicsError;
use crate::math::Real;
use crate::particle::Particle;
use crate::pool::{Handle, Pool};

/// Implements `From<Generator>` for a closed force enum, one impl per
/// `Variant => Generator` pair.
macro_rules! impl_from_generator {
    ($force:ident; $($variant:ident => $ty:ty),* $(,)*) => {
        $(
            impl From<$ty> for $force {
                fn from(generator: $ty) -> Self {
                    $force::$variant(generator)
                }
            }
        )*
    };
}

/// Something that adds force to objects of type `T`.
///
/// Generators only ever add to an object's accumulators. They never change
/// velocity or position directly.
pub trait ForceGenerator<T> {
    /// Adds this generator's force for the current step to `target`.
    /// Other objects in `targets` may be read, e.g. the far end of a spring.
    fn update_force(&self, target: Handle<T>, targets: &mut Pool<T>, duration: Real);

    /// Advances any internal clock by one step. Called once per step after
    /// every registration has been applied.
    fn advance(&mut self, _duration: Real) {}
}

/// Applies a constant acceleration to any object with finite mass.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gravity {
    pub gravity: Vector3<Real>,
}

impl Gravity {
    pub fn new(gravity: Vector3<Real>) -> Self {
        Gravity { gravity }
    }
}

impl ForceGenerator<Particle> for Gravity {
    fn update_force(&self, target: Handle<Particle>, particles: &mut Pool<Particle>, _duration: Real) {
        if let Some(particle) = particles.get_mut(target) {
            if particle.has_finite_mass() {
                let force = self.gravity * particle.mass();
                particle.add_force(force);
            }
        }
    }
}

impl ForceGenerator<RigidBody> for Gravity {
    fn update_force(&self, target: Handle<RigidBody>, bodies: &mut Pool<RigidBody>, _duration: Real) {
        if let Some(body) = bodies.get_mut(target) {
            if body.has_finite_mass() {
                let force = self.gravity * body.mass();
                body.add_force(force);
            }
        }
    }
}

/// Binds force generators to the objects they act on.
///
/// The registry owns its generators and hands out handles to them. A
/// registration is a `(target, generator)` pair; removing one never destroys
/// either side, and one generator may be registered against many targets.
#[derive(Clone)]
pub struct ForceRegistry<T, G> {
    generators: Pool<G>,
    registrations: Vec<(Handle<T>, Handle<G>)>,
}

impl<T, G> Default for ForceRegistry<T, G> {
    fn default() -> Self {
        ForceRegistry {
            generators: Pool::new(),
            registrations: Vec::new(),
        }
    }
}

impl<T, G> ForceRegistry<T, G>
where
    G: ForceGenerator<T>
{
    pub fn new() -> Self {
        ForceRegistry::default()
    }

    /// Takes ownership of a generator and returns a handle to it.
    pub fn add_generator(&mut self, generator: G) -> Handle<G> {
        self.generators.push(generator)
    }

    /// Destroys a generator along with all of its registrations.
    pub fn remove_generator(&mut self, generator: Handle<G>) -> Result<G, PhysicsError> {
        let removed = self.generators.remove(generator)?;
        self.registrations.retain(|&(_, g)| g != generator);
        Ok(removed)
    }

    pub fn generator(&self, generator: Handle<G>) -> Option<&G> {
        self.generators.get(generator)
    }

    /// Typed access for the host, e.g. to move a control surface.
    pub fn generator_mut(&mut self, generator: Handle<G>) -> Option<&mut G> {
        self.generators.get_mut(generator)
    }

    /// Registers `generator` to act on `target`.
    pub fn add(&mut self, target: Handle<T>, generator: Handle<G>) -> Result<(), PhysicsError> {
        if !self.generators.contains(generator) {
            return Err(PhysicsError::StaleHandle {
                index: generator.index(),
                generation: generator.generation(),
            });
        }
        self.registrations.push((target, generator));
        Ok(())
    }

    /// Removes the first registration matching the pair. Does nothing if
    /// the pair isn't registered.
    pub fn remove(&mut self, target: Handle<T>, generator: Handle<G>) {
        if let Some(i) = self
            .registrations
            .iter()
            .position(|&(t, g)| t == target && g == generator)
        {
            self.registrations.remove(i);
        }
    }

    /// Drops every registration that acts on `target`.
    pub fn remove_target(&mut self, target: Handle<T>) {
        self.registrations.retain(|&(t, _)| t != target);
    }

    /// Drops every registration. Generators are kept.
    pub fn clear(&mut self) {
        self.registrations.clear();
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn registrations(&self) -> impl Iterator<Item = &(Handle<T>, Handle<G>)> {
        self.registrations.iter()
    }

    /// Applies every registration in insertion order, then advances every
    /// generator by one step.
    pub fn update_forces(&mut self, targets: &mut Pool<T>, duration: Real) {
        for &(target, generator) in self.registrations.iter() {
            if !targets.contains(target) {
                trace!(?target, "skipping force registration for removed target");
                continue;
            }
            if let Some(generator) = self.generators.get(generator) {
                generator.update_force(target, targets, duration);
            }
        }
        for generator in self.generators.iter_mut() {
            generator.advance(duration);
        }
    }
}
