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

//! Links that hold particles together, or hold a particle to a fixed point,
//! by generating contacts whenever the link is violated.

use cgmath::{InnerSpace, Vector3};
use serde::{Deserialize, Serialize};

use crate::math::*;
use crate::particle::{ParticleHandle, ParticleSet};
use crate::particle_contact::{ParticleContact, ParticleContactGenerator};

/// Positions of both ends, if both are still alive.
fn ends(particles: &ParticleSet, link: [ParticleHandle; 2]) -> Option<(Vector3<Real>, Vector3<Real>)> {
    Some((particles.get(link[0])?.position, particles.get(link[1])?.position))
}

/// Current distance between two linked particles.
pub fn current_length(particles: &ParticleSet, link: [ParticleHandle; 2]) -> Option<Real> {
    ends(particles, link).map(|(a, b)| (a - b).magnitude())
}

/// Links two particles, generating a contact when they move too far apart.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleCable {
    pub particles: [ParticleHandle; 2],
    pub max_length: Real,
    /// Bounciness of the cable when it goes taut.
    pub restitution: Real,
}

impl ParticleCable {
    pub fn new(a: ParticleHandle, b: ParticleHandle, max_length: Real, restitution: Real) -> Self {
        ParticleCable {
            particles: [a, b],
            max_length,
            restitution,
        }
    }
}

impl ParticleContactGenerator for ParticleCable {
    fn add_contact(&self, particles: &ParticleSet, contacts: &mut Vec<ParticleContact>, limit: usize) -> usize {
        let (a, b) = match ends(particles, self.particles) {
            Some(ends) => ends,
            None => return 0,
        };
        let length = (a - b).magnitude();
        if limit == 0 || length < self.max_length {
            return 0;
        }
        contacts.push(ParticleContact::new(
            self.particles[0],
            Some(self.particles[1]),
            normalize_or_zero(b - a),
            length - self.max_length,
            self.restitution,
        ));
        1
    }
}

/// Links two particles at a fixed distance, generating a contact whenever
/// they are too close or too far apart.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleRod {
    pub particles: [ParticleHandle; 2],
    pub length: Real,
}

impl ParticleRod {
    pub fn new(a: ParticleHandle, b: ParticleHandle, length: Real) -> Self {
        ParticleRod {
            particles: [a, b],
            length,
        }
    }
}

/// Contact that restores a rod of `length` whose ends are at `a` and `b`.
/// The normal points from `a` to `b` when stretched and back otherwise.
fn rod_contact(a: Vector3<Real>, b: Vector3<Real>, length: Real) -> Option<(Vector3<Real>, Real)> {
    let current = (a - b).magnitude();
    if current == length {
        return None;
    }
    let normal = normalize_or_zero(b - a);
    if current > length {
        Some((normal, current - length))
    } else {
        Some((-normal, length - current))
    }
}

impl ParticleContactGenerator for ParticleRod {
    fn add_contact(&self, particles: &ParticleSet, contacts: &mut Vec<ParticleContact>, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }
        let (a, b) = match ends(particles, self.particles) {
            Some(ends) => ends,
            None => return 0,
        };
        match rod_contact(a, b, self.length) {
            Some((normal, penetration)) => {
                // Rods never bounce.
                contacts.push(ParticleContact::new(
                    self.particles[0],
                    Some(self.particles[1]),
                    normal,
                    penetration,
                    0.0,
                ));
                1
            }
            None => 0,
        }
    }
}

/// Ties a particle to a fixed point with a cable.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleCableConstraint {
    pub particle: ParticleHandle,
    pub anchor: Vector3<Real>,
    pub max_length: Real,
    pub restitution: Real,
}

impl ParticleCableConstraint {
    pub fn new(particle: ParticleHandle, anchor: Vector3<Real>, max_length: Real, restitution: Real) -> Self {
        ParticleCableConstraint {
            particle,
            anchor,
            max_length,
            restitution,
        }
    }
}

impl ParticleContactGenerator for ParticleCableConstraint {
    fn add_contact(&self, particles: &ParticleSet, contacts: &mut Vec<ParticleContact>, limit: usize) -> usize {
        let position = match particles.get(self.particle) {
            Some(p) => p.position,
            None => return 0,
        };
        let length = (position - self.anchor).magnitude();
        if limit == 0 || length < self.max_length {
            return 0;
        }
        contacts.push(ParticleContact::new(
            self.particle,
            None,
            normalize_or_zero(self.anchor - position),
            length - self.max_length,
            self.restitution,
        ));
        1
    }
}

/// Ties a particle to a fixed point with a rod.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleRodConstraint {
    pub particle: ParticleHandle,
    pub anchor: Vector3<Real>,
    pub length: Real,
}

impl ParticleRodConstraint {
    pub fn new(particle: ParticleHandle, anchor: Vector3<Real>, length: Real) -> Self {
        ParticleRodConstraint {
            particle,
            anchor,
            length,
        }
    }
}

impl ParticleContactGenerator for ParticleRodConstraint {
    fn add_contact(&self, particles: &ParticleSet, contacts: &mut Vec<ParticleContact>, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }
        let position = match particles.get(self.particle) {
            Some(p) => p.position,
            None => return 0,
        };
        match rod_contact(position, self.anchor, self.length) {
            Some((normal, penetration)) => {
                contacts.push(ParticleContact::new(self.particle, None, normal, penetration, 0.0));
                1
            }
            None => 0,
        }
    }
}
