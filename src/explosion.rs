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

use crate::body::{BodyHandle, BodySet, RigidBody};
use crate::force::ForceGenerator;
use crate::math::*;
use crate::particle::{Particle, ParticleHandle, ParticleSet};

/// A blast that acts on everything registered with it in three phases.
///
/// 1. Implosion: for `implosion_duration` seconds, objects between the min
///    and max implosion radius are pulled towards the detonation point.
/// 2. Concussion: a spherical shock wave leaves the detonation point at
///    `shockwave_speed` and pushes outward on anything within half of
///    `shockwave_thickness` of the wave front. Objects already moving outward
///    feel less of it.
/// 3. Convection: for `convection_duration` seconds from detonation, objects
///    inside a vertical chimney above the detonation point are pushed up.
///
/// The explosion's clock only moves when the registry advances it, once per
/// step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Explosion {
    pub detonation: Vector3<Real>,
    pub implosion_max_radius: Real,
    pub implosion_min_radius: Real,
    pub implosion_duration: Real,
    pub implosion_force: Real,
    pub shockwave_speed: Real,
    pub shockwave_thickness: Real,
    pub peak_concussion_force: Real,
    pub concussion_duration: Real,
    pub peak_convection_force: Real,
    pub chimney_radius: Real,
    pub chimney_height: Real,
    pub convection_duration: Real,
    time_passed: Real,
}

impl Default for Explosion {
    fn default() -> Self {
        Explosion {
            detonation: Vector3::zero(),
            implosion_max_radius: 10.0,
            implosion_min_radius: 1.0,
            implosion_duration: 0.1,
            implosion_force: 100.0,
            shockwave_speed: 50.0,
            shockwave_thickness: 5.0,
            peak_concussion_force: 5000.0,
            concussion_duration: 1.0,
            peak_convection_force: 500.0,
            chimney_radius: 5.0,
            chimney_height: 20.0,
            convection_duration: 5.0,
            time_passed: 0.0,
        }
    }
}

impl Explosion {
    /// An explosion with default parameters detonating at `detonation`.
    pub fn new(detonation: Vector3<Real>) -> Self {
        Explosion {
            detonation,
            ..Explosion::default()
        }
    }

    /// Seconds since detonation.
    pub fn time_passed(&self) -> Real {
        self.time_passed
    }

    /// Restarts the explosion at a new point.
    pub fn detonate(&mut self, detonation: Vector3<Real>) {
        self.detonation = detonation;
        self.time_passed = 0.0;
    }

    /// True once every phase is over.
    pub fn is_finished(&self) -> bool {
        self.time_passed >= self.implosion_duration + self.concussion_duration
            && self.time_passed >= self.convection_duration
    }

    /// The force the explosion exerts right now on an object at `position`
    /// moving with `velocity`.
    pub fn force_at(&self, position: Vector3<Real>, velocity: Vector3<Real>) -> Vector3<Real> {
        let t = self.time_passed;
        let offset = position - self.detonation;
        let distance = offset.magnitude();
        let outward = normalize_or_zero(offset);
        let mut force = Vector3::zero();

        if t < self.implosion_duration {
            if distance > self.implosion_min_radius && distance < self.implosion_max_radius {
                force -= outward * self.implosion_force;
            }
        } else {
            let since = t - self.implosion_duration;
            if since < self.concussion_duration {
                let front = self.shockwave_speed * since;
                let half = 0.5 * self.shockwave_thickness;
                let from_front = (distance - front).abs();
                if half > 0.0 && from_front < half {
                    let falloff = 1.0 - from_front / half;
                    let fading = 1.0 - since / self.concussion_duration;
                    // Outward motion relative to the wave reduces the push,
                    // inward motion increases it.
                    let relative = if self.shockwave_speed > 0.0 {
                        (1.0 - velocity.dot(outward) / self.shockwave_speed).max(0.0)
                    } else {
                        1.0
                    };
                    force += outward * (self.peak_concussion_force * falloff * fading * relative);
                }
            }
        }

        if t < self.convection_duration && self.chimney_radius > 0.0 {
            let across = (offset.x * offset.x + offset.z * offset.z).sqrt();
            if across < self.chimney_radius && offset.y >= 0.0 && offset.y <= self.chimney_height {
                let falloff = 1.0 - across / self.chimney_radius;
                let fading = 1.0 - t / self.convection_duration;
                force += UP * (self.peak_convection_force * falloff * fading);
            }
        }

        force
    }
}

impl ForceGenerator<Particle> for Explosion {
    fn update_force(&self, target: ParticleHandle, particles: &mut ParticleSet, _duration: Real) {
        if let Some(particle) = particles.get_mut(target) {
            if particle.has_finite_mass() {
                let force = self.force_at(particle.position, particle.velocity);
                particle.add_force(force);
            }
        }
    }

    fn advance(&mut self, duration: Real) {
        self.time_passed += duration;
    }
}

impl ForceGenerator<RigidBody> for Explosion {
    fn update_force(&self, target: BodyHandle, bodies: &mut BodySet, _duration: Real) {
        if let Some(body) = bodies.get_mut(target) {
            if body.has_finite_mass() {
                let force = self.force_at(body.position, body.velocity);
                if force != Vector3::zero() {
                    body.add_force(force);
                }
            }
        }
    }

    fn advance(&mut self, duration: Real) {
        self.time_passed += duration;
    }
}
