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

use cgmath::{Vector3, Zero};
use serde::{Deserialize, Serialize};

use crate::math::*;
use crate::pool::{Handle, Pool};

pub type ParticleHandle = Handle<Particle>;
pub type ParticleSet = Pool<Particle>;

/// A point mass: the simplest object that can be simulated.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub position: Vector3<Real>,
    pub velocity: Vector3<Real>,
    /// Constant acceleration, typically gravity. Applied every step in
    /// addition to the accumulated force.
    pub acceleration: Vector3<Real>,
    /// Fraction of velocity kept per second. One means no damping.
    pub damping: Real,
    /// We only ever need inverse mass for calculations, plus it gives a neat
    /// advantage that we can represent immovable objects with an infinite mass,
    /// or an inverse mass of zero.
    pub inverse_mass: Real,
    force_accum: Vector3<Real>,
}

impl Default for Particle {
    fn default() -> Self {
        Particle {
            position: Vector3::zero(),
            velocity: Vector3::zero(),
            acceleration: Vector3::zero(),
            damping: 1.0,
            inverse_mass: 1.0,
            force_accum: Vector3::zero(),
        }
    }
}

impl Particle {
    /// Construct a particle of the given mass at rest at `position`.
    pub fn new(position: Vector3<Real>, mass: Real) -> Self {
        let mut particle = Particle {
            position,
            ..Particle::default()
        };
        particle.set_mass(mass);
        particle
    }

    /// Construct an immovable particle.
    pub fn fixed(position: Vector3<Real>) -> Self {
        Particle {
            position,
            inverse_mass: 0.0,
            ..Particle::default()
        }
    }

    /// Advance the particle by `duration` seconds.
    ///
    /// Particles with infinite mass are left untouched.
    pub fn integrate(&mut self, duration: Real) {
        if self.inverse_mass <= 0.0 {
            return;
        }
        debug_assert!(duration > 0.0, "integration step must be positive, got {}", duration);

        self.position += self.velocity * duration;

        let resulting_acc = self.acceleration + self.force_accum * self.inverse_mass;
        self.velocity += resulting_acc * duration;
        self.velocity *= self.damping.powf(duration);

        self.clear_accumulator();
    }

    /// Sets the mass. A zero mass is a programming error; use
    /// `set_inverse_mass(0.0)` for immovable particles.
    pub fn set_mass(&mut self, mass: Real) {
        debug_assert!(mass != 0.0, "particle mass must be non-zero");
        self.inverse_mass = 1.0 / mass;
    }

    /// Returns the mass, or `REAL_MAX` for an immovable particle.
    pub fn mass(&self) -> Real {
        if self.inverse_mass == 0.0 {
            REAL_MAX
        } else {
            1.0 / self.inverse_mass
        }
    }

    pub fn set_inverse_mass(&mut self, inverse_mass: Real) {
        self.inverse_mass = inverse_mass;
    }

    pub fn has_finite_mass(&self) -> bool {
        self.inverse_mass > 0.0
    }

    pub fn add_force(&mut self, force: Vector3<Real>) {
        self.force_accum += force;
    }

    /// The force accumulated since the last clear.
    pub fn accumulated_force(&self) -> Vector3<Real> {
        self.force_accum
    }

    pub fn clear_accumulator(&mut self) {
        self.force_accum = Vector3::zero();
    }
}

#[cfg(test)]
mod tests {
    mod particle {
        use approx::assert_relative_eq;
        use cgmath::{InnerSpace, Vector3, Zero};

        use crate::math::*;
        use crate::particle::*;

        #[test]
        fn test_infinite_mass_never_moves() {
            let mut p = Particle::fixed(Vector3::new(1.0, 2.0, 3.0));
            p.velocity = Vector3::new(5.0, 0.0, 0.0);
            p.acceleration = Vector3::new(0.0, -10.0, 0.0);
            p.add_force(Vector3::new(100.0, 100.0, 100.0));
            p.integrate(0.1);
            assert_eq!(p.position, Vector3::new(1.0, 2.0, 3.0));
            assert_eq!(p.velocity, Vector3::new(5.0, 0.0, 0.0));
            assert_eq!(p.mass(), REAL_MAX);
            assert!(!p.has_finite_mass());
        }

        #[test]
        fn test_accumulator_cleared_by_integration() {
            let mut p = Particle::new(Vector3::zero(), 2.0);
            p.add_force(Vector3::new(4.0, 0.0, 0.0));
            p.add_force(Vector3::new(0.0, 2.0, 0.0));
            assert_eq!(p.accumulated_force(), Vector3::new(4.0, 2.0, 0.0));
            p.integrate(0.5);
            assert_eq!(p.accumulated_force(), Vector3::zero());
            // a = F / m = (2, 1, 0), v = a * dt
            assert_relative_eq!(p.velocity, Vector3::new(1.0, 0.5, 0.0));
            // Position is advanced with the velocity from before the step.
            assert_eq!(p.position, Vector3::zero());
        }

        #[test]
        fn test_gravity_integration() {
            let g = Vector3::new(0.0, -9.81, 0.0);
            let dt = 0.01;
            let n = 100;
            let mut p = Particle::new(Vector3::zero(), 1.0);
            p.acceleration = g;
            for _ in 0..n {
                p.integrate(dt);
            }
            assert_relative_eq!(p.velocity.magnitude(), n as Real * 9.81 * dt, epsilon = 1.0e-3);
            // Semi-implicit Euler lags the closed form by half a step of
            // velocity per step.
            let t = n as Real * dt;
            let closed_form = 0.5 * -9.81 * t * t;
            let lag = 0.5 * -9.81 * dt * t;
            assert_relative_eq!(p.position.y, closed_form - lag, epsilon = 1.0e-3);
        }

        #[test]
        fn test_damping_decay() {
            let mut p = Particle::new(Vector3::zero(), 1.0);
            p.damping = 0.5;
            p.velocity = Vector3::new(2.0, 0.0, 0.0);
            p.integrate(0.25);
            assert_relative_eq!(p.velocity.x, 2.0 * (0.5 as Real).powf(0.25));
            for _ in 0..1000 {
                p.integrate(0.25);
                assert!(p.velocity.x >= 0.0);
            }
            assert!(p.velocity.x < 1.0e-6);
        }
    }
}
