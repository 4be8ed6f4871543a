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

use cgmath::{InnerSpace, Vector3, Zero};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::math::*;
use crate::particle::{ParticleHandle, ParticleSet};

/// Two particles in contact, or one particle touching immovable scenery.
///
/// The normal points from `other` towards `particle`, so resolving the
/// contact pushes `particle` along it and `other` against it.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleContact {
    pub particle: ParticleHandle,
    /// `None` when the particle touches the scenery.
    pub other: Option<ParticleHandle>,
    pub restitution: Real,
    /// Unit direction of the contact, in world space.
    pub contact_normal: Vector3<Real>,
    /// Depth of overlap along the normal. Positive means interpenetrating.
    pub penetration: Real,
    /// How far each particle was moved by the last interpenetration
    /// resolution.
    pub particle_movement: [Vector3<Real>; 2],
}

/// Velocity, acceleration and inverse mass of a particle. A handle that
/// no longer points at anything behaves like immovable scenery.
fn motion(particles: &ParticleSet, handle: ParticleHandle) -> (Vector3<Real>, Vector3<Real>, Real) {
    match particles.get(handle) {
        Some(p) => (p.velocity, p.acceleration, p.inverse_mass),
        None => (Vector3::zero(), Vector3::zero(), 0.0),
    }
}

impl ParticleContact {
    pub fn new(
        particle: ParticleHandle,
        other: Option<ParticleHandle>,
        contact_normal: Vector3<Real>,
        penetration: Real,
        restitution: Real,
    ) -> Self {
        ParticleContact {
            particle,
            other,
            restitution,
            contact_normal,
            penetration,
            particle_movement: [Vector3::zero(); 2],
        }
    }

    /// Relative velocity along the normal. Negative when closing.
    pub fn separating_velocity(&self, particles: &ParticleSet) -> Real {
        let (mut relative_velocity, _, _) = motion(particles, self.particle);
        if let Some(other) = self.other {
            relative_velocity -= motion(particles, other).0;
        }
        relative_velocity.dot(self.contact_normal)
    }

    fn total_inverse_mass(&self, particles: &ParticleSet) -> Real {
        let mut total = motion(particles, self.particle).2;
        if let Some(other) = self.other {
            total += motion(particles, other).2;
        }
        total
    }

    /// Resolves this contact's velocity, then its interpenetration.
    pub fn resolve(&mut self, particles: &mut ParticleSet, duration: Real) {
        self.resolve_velocity(particles, duration);
        self.resolve_interpenetration(particles);
    }

    fn resolve_velocity(&mut self, particles: &mut ParticleSet, duration: Real) {
        let separating_velocity = self.separating_velocity(particles);
        if separating_velocity > 0.0 {
            return;
        }

        let mut new_sep_velocity = -separating_velocity * self.restitution;

        // Remove any closing velocity that acceleration alone built up this
        // step, so resting contacts don't jitter.
        let (_, mut acc_caused_velocity, _) = motion(particles, self.particle);
        if let Some(other) = self.other {
            acc_caused_velocity -= motion(particles, other).1;
        }
        let acc_caused_sep_velocity = acc_caused_velocity.dot(self.contact_normal) * duration;
        if acc_caused_sep_velocity < 0.0 {
            new_sep_velocity += self.restitution * acc_caused_sep_velocity;
            if new_sep_velocity < 0.0 {
                new_sep_velocity = 0.0;
            }
        }

        let delta_velocity = new_sep_velocity - separating_velocity;
        let total_inverse_mass = self.total_inverse_mass(particles);
        if total_inverse_mass <= 0.0 {
            return;
        }

        let impulse_per_imass = self.contact_normal * (delta_velocity / total_inverse_mass);
        if let Some(p) = particles.get_mut(self.particle) {
            p.velocity += impulse_per_imass * p.inverse_mass;
        }
        if let Some(other) = self.other.and_then(|h| particles.get_mut(h)) {
            other.velocity -= impulse_per_imass * other.inverse_mass;
        }
    }

    fn resolve_interpenetration(&mut self, particles: &mut ParticleSet) {
        self.particle_movement = [Vector3::zero(); 2];
        if self.penetration <= 0.0 {
            return;
        }
        let total_inverse_mass = self.total_inverse_mass(particles);
        if total_inverse_mass <= 0.0 {
            return;
        }

        let move_per_imass = self.contact_normal * (self.penetration / total_inverse_mass);
        if let Some(p) = particles.get_mut(self.particle) {
            self.particle_movement[0] = move_per_imass * p.inverse_mass;
            p.position += self.particle_movement[0];
        }
        if let Some(other) = self.other.and_then(|h| particles.get_mut(h)) {
            self.particle_movement[1] = move_per_imass * -other.inverse_mass;
            other.position += self.particle_movement[1];
        }
    }

    /// Moves the cached penetration to account for `resolved` having moved
    /// its particles.
    fn apply_movement(&mut self, resolved: &ParticleContact) {
        let moved = |handle: ParticleHandle| -> Option<Vector3<Real>> {
            if handle == resolved.particle {
                Some(resolved.particle_movement[0])
            } else if Some(handle) == resolved.other {
                Some(resolved.particle_movement[1])
            } else {
                None
            }
        };
        if let Some(movement) = moved(self.particle) {
            self.penetration -= movement.dot(self.contact_normal);
        }
        if let Some(movement) = self.other.and_then(moved) {
            self.penetration += movement.dot(self.contact_normal);
        }
    }
}

/// Produces contacts between particles.
pub trait ParticleContactGenerator {
    /// Appends at most `limit` contacts to `contacts` and returns the number
    /// written.
    fn add_contact(&self, particles: &ParticleSet, contacts: &mut Vec<ParticleContact>, limit: usize) -> usize;
}

/// Resolves a set of particle contacts, worst first.
///
/// Each iteration picks the contact with the most negative separating
/// velocity among those that are closing or interpenetrating, resolves it,
/// and updates the penetration of every contact that shares a particle with
/// it. Resolution stops when nothing is left to resolve or the iteration
/// budget runs out.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleContactResolver {
    iterations: usize,
    iterations_used: usize,
}

impl ParticleContactResolver {
    pub fn new(iterations: usize) -> Self {
        ParticleContactResolver {
            iterations,
            iterations_used: 0,
        }
    }

    pub fn set_iterations(&mut self, iterations: usize) {
        self.iterations = iterations;
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Iterations spent by the last call to `resolve_contacts`.
    pub fn iterations_used(&self) -> usize {
        self.iterations_used
    }

    pub fn resolve_contacts(&mut self, contacts: &mut [ParticleContact], particles: &mut ParticleSet, duration: Real) {
        self.iterations_used = 0;
        if contacts.is_empty() {
            return;
        }

        while self.iterations_used < self.iterations {
            let mut max = REAL_MAX;
            let mut max_index = None;
            for (i, contact) in contacts.iter().enumerate() {
                let sep_vel = contact.separating_velocity(particles);
                if sep_vel < max
                    && (sep_vel < -COLLISION_EPSILON || contact.penetration > COLLISION_EPSILON)
                    && contact.total_inverse_mass(particles) > 0.0
                {
                    max = sep_vel;
                    max_index = Some(i);
                }
            }
            let max_index = match max_index {
                Some(i) => i,
                None => break,
            };

            contacts[max_index].resolve(particles, duration);
            let resolved = contacts[max_index];
            for contact in contacts.iter_mut() {
                contact.apply_movement(&resolved);
            }
            self.iterations_used += 1;
        }

        trace!(
            contacts = contacts.len(),
            iterations_used = self.iterations_used,
            "resolved particle contacts"
        );
    }
}

#[cfg(test)]
mod tests {
    mod resolver {
        use approx::assert_relative_eq;
        use cgmath::{Vector3, Zero};

        use crate::math::*;
        use crate::particle::*;
        use crate::particle_contact::*;

        /// Two unit-mass particles overlapping by `penetration` along x,
        /// closing at `speed`.
        fn head_on(penetration: Real, speed: Real, restitution: Real) -> (ParticleSet, ParticleContact) {
            let mut particles = ParticleSet::new();
            let mut a = Particle::new(Vector3::new(1.0 - penetration, 0.0, 0.0), 1.0);
            a.velocity = Vector3::new(-0.5 * speed, 0.0, 0.0);
            let mut b = Particle::new(Vector3::zero(), 1.0);
            b.velocity = Vector3::new(0.5 * speed, 0.0, 0.0);
            let a = particles.push(a);
            let b = particles.push(b);
            let contact = ParticleContact::new(a, Some(b), Vector3::new(1.0, 0.0, 0.0), penetration, restitution);
            (particles, contact)
        }

        #[test]
        fn test_penetration_reduction() {
            let (mut particles, contact) = head_on(0.5, 0.0, 0.5);
            let mut contacts = vec![contact];
            let mut resolver = ParticleContactResolver::new(4);
            resolver.resolve_contacts(&mut contacts, &mut particles, 0.01);
            assert_relative_eq!(contacts[0].penetration, 0.0);
            // Equal masses share the correction.
            assert_relative_eq!(contacts[0].particle_movement[0], Vector3::new(0.25, 0.0, 0.0));
            assert_relative_eq!(contacts[0].particle_movement[1], Vector3::new(-0.25, 0.0, 0.0));
            assert_relative_eq!(particles[contact.particle].position.x, 0.75);
            assert_relative_eq!(particles[contact.other.unwrap()].position.x, -0.25);
            assert_eq!(resolver.iterations_used(), 1);
        }

        #[test]
        fn test_restitution_bound() {
            for &restitution in [0.0, 0.3, 1.0].iter() {
                let (mut particles, contact) = head_on(0.0, 2.0, restitution);
                assert_relative_eq!(contact.separating_velocity(&particles), -2.0);
                let mut contacts = vec![contact];
                ParticleContactResolver::new(2).resolve_contacts(&mut contacts, &mut particles, 0.01);
                let after = contacts[0].separating_velocity(&particles);
                assert!(after >= 0.0);
                assert_relative_eq!(after, 2.0 * restitution, epsilon = 1.0e-5);
                // Momentum is conserved.
                let total = particles[contact.particle].velocity + particles[contact.other.unwrap()].velocity;
                assert_relative_eq!(total, Vector3::zero(), epsilon = 1.0e-5);
            }
        }

        #[test]
        fn test_resting_contact() {
            // A particle that only picked up downward speed from gravity this
            // step doesn't bounce.
            let dt = 0.01;
            let mut particles = ParticleSet::new();
            let mut p = Particle::new(Vector3::zero(), 1.0);
            p.acceleration = Vector3::new(0.0, -10.0, 0.0);
            p.velocity = p.acceleration * dt;
            let p = particles.push(p);
            let mut contacts = vec![ParticleContact::new(p, None, Vector3::new(0.0, 1.0, 0.0), 0.0, 0.8)];
            ParticleContactResolver::new(2).resolve_contacts(&mut contacts, &mut particles, dt);
            assert_relative_eq!(particles[p].velocity, Vector3::zero());
        }

        #[test]
        fn test_immovable() {
            let mut particles = ParticleSet::new();
            let mut a = Particle::fixed(Vector3::zero());
            a.velocity = Vector3::new(0.0, -1.0, 0.0);
            let a = particles.push(a);
            let b = particles.push(Particle::fixed(Vector3::new(0.0, -0.5, 0.0)));
            let mut contacts = vec![ParticleContact::new(a, Some(b), Vector3::new(0.0, 1.0, 0.0), 0.5, 0.5)];
            let mut resolver = ParticleContactResolver::new(10);
            resolver.resolve_contacts(&mut contacts, &mut particles, 0.01);
            assert_eq!(particles[a].position, Vector3::zero());
            assert_eq!(particles[a].velocity, Vector3::new(0.0, -1.0, 0.0));
            assert_eq!(contacts[0].penetration, 0.5);
            assert_eq!(resolver.iterations_used(), 0);

            // The contact's own resolution is a no-op as well.
            contacts[0].resolve(&mut particles, 0.01);
            assert_eq!(particles[b].position, Vector3::new(0.0, -0.5, 0.0));
        }

        #[test]
        fn test_shared_particle() {
            let mut particles = ParticleSet::new();
            let p = particles.push(Particle::new(Vector3::zero(), 1.0));
            let up = Vector3::new(0.0, 1.0, 0.0);
            let mut contacts = vec![
                ParticleContact::new(p, None, up, 0.3, 0.0),
                ParticleContact::new(p, None, up, 0.1, 0.0),
            ];
            let mut resolver = ParticleContactResolver::new(10);
            resolver.resolve_contacts(&mut contacts, &mut particles, 0.01);
            // Fixing the deeper contact also fixes the shallower one.
            assert_eq!(resolver.iterations_used(), 1);
            assert_relative_eq!(particles[p].position, Vector3::new(0.0, 0.3, 0.0));
            assert_relative_eq!(contacts[1].penetration, -0.2);
        }

        #[test]
        fn test_iteration_budget() {
            let (mut particles, contact) = head_on(0.5, 1.0, 0.5);
            let mut contacts = vec![contact];
            let mut resolver = ParticleContactResolver::new(0);
            resolver.resolve_contacts(&mut contacts, &mut particles, 0.01);
            assert_eq!(resolver.iterations_used(), 0);
            assert_eq!(contacts[0].penetration, 0.5);

            let mut resolver = ParticleContactResolver::new(3);
            resolver.resolve_contacts(&mut [], &mut particles, 0.01);
            assert_eq!(resolver.iterations_used(), 0);
        }
    }
}
