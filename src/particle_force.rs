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

use cgmath::{InnerSpace, Vector3};
use serde::{Deserialize, Serialize};

use crate::explosion::Explosion;
use crate::force::{ForceGenerator, ForceRegistry, Gravity};
use crate::math::*;
use crate::particle::{Particle, ParticleHandle, ParticleSet};

pub type ParticleForceRegistry = ForceRegistry<Particle, ParticleForce>;

/// Force of a spring stretched along `d` from its anchor.
pub(crate) fn spring_force(d: Vector3<Real>, spring_constant: Real, rest_length: Real) -> Vector3<Real> {
    let length = d.magnitude();
    normalize_or_zero(d) * ((rest_length - length) * spring_constant)
}

/// Force of a bungee stretched along `d`. Slack bungees pull nothing.
fn bungee_force(d: Vector3<Real>, spring_constant: Real, rest_length: Real) -> Option<Vector3<Real>> {
    if d.magnitude() <= rest_length {
        None
    } else {
        Some(spring_force(d, spring_constant, rest_length))
    }
}

/// Drag with a linear and a quadratic term in speed.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleDrag {
    pub k1: Real,
    pub k2: Real,
}

impl ParticleDrag {
    pub fn new(k1: Real, k2: Real) -> Self {
        ParticleDrag { k1, k2 }
    }
}

impl ForceGenerator<Particle> for ParticleDrag {
    fn update_force(&self, target: ParticleHandle, particles: &mut ParticleSet, _duration: Real) {
        if let Some(particle) = particles.get_mut(target) {
            let speed = particle.velocity.magnitude();
            let drag = self.k1 * speed + self.k2 * speed * speed;
            let force = normalize_or_zero(particle.velocity) * -drag;
            particle.add_force(force);
        }
    }
}

/// A spring between the target and another particle.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleSpring {
    pub other: ParticleHandle,
    pub spring_constant: Real,
    pub rest_length: Real,
}

impl ParticleSpring {
    pub fn new(other: ParticleHandle, spring_constant: Real, rest_length: Real) -> Self {
        ParticleSpring {
            other,
            spring_constant,
            rest_length,
        }
    }
}

impl ForceGenerator<Particle> for ParticleSpring {
    fn update_force(&self, target: ParticleHandle, particles: &mut ParticleSet, _duration: Real) {
        let other = match particles.get(self.other) {
            Some(other) => other.position,
            None => return,
        };
        if let Some(particle) = particles.get_mut(target) {
            let force = spring_force(particle.position - other, self.spring_constant, self.rest_length);
            particle.add_force(force);
        }
    }
}

/// A spring between the target and a fixed point.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleAnchoredSpring {
    pub anchor: Vector3<Real>,
    pub spring_constant: Real,
    pub rest_length: Real,
}

impl ParticleAnchoredSpring {
    pub fn new(anchor: Vector3<Real>, spring_constant: Real, rest_length: Real) -> Self {
        ParticleAnchoredSpring {
            anchor,
            spring_constant,
            rest_length,
        }
    }
}

impl ForceGenerator<Particle> for ParticleAnchoredSpring {
    fn update_force(&self, target: ParticleHandle, particles: &mut ParticleSet, _duration: Real) {
        if let Some(particle) = particles.get_mut(target) {
            let force = spring_force(particle.position - self.anchor, self.spring_constant, self.rest_length);
            particle.add_force(force);
        }
    }
}

/// A spring that only pulls, between the target and another particle.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleBungee {
    pub other: ParticleHandle,
    pub spring_constant: Real,
    pub rest_length: Real,
}

impl ParticleBungee {
    pub fn new(other: ParticleHandle, spring_constant: Real, rest_length: Real) -> Self {
        ParticleBungee {
            other,
            spring_constant,
            rest_length,
        }
    }
}

impl ForceGenerator<Particle> for ParticleBungee {
    fn update_force(&self, target: ParticleHandle, particles: &mut ParticleSet, _duration: Real) {
        let other = match particles.get(self.other) {
            Some(other) => other.position,
            None => return,
        };
        if let Some(particle) = particles.get_mut(target) {
            if let Some(force) = bungee_force(particle.position - other, self.spring_constant, self.rest_length) {
                particle.add_force(force);
            }
        }
    }
}

/// A spring that only pulls, between the target and a fixed point.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleAnchoredBungee {
    pub anchor: Vector3<Real>,
    pub spring_constant: Real,
    pub rest_length: Real,
}

impl ParticleAnchoredBungee {
    pub fn new(anchor: Vector3<Real>, spring_constant: Real, rest_length: Real) -> Self {
        ParticleAnchoredBungee {
            anchor,
            spring_constant,
            rest_length,
        }
    }
}

impl ForceGenerator<Particle> for ParticleAnchoredBungee {
    fn update_force(&self, target: ParticleHandle, particles: &mut ParticleSet, _duration: Real) {
        if let Some(particle) = particles.get_mut(target) {
            if let Some(force) = bungee_force(particle.position - self.anchor, self.spring_constant, self.rest_length) {
                particle.add_force(force);
            }
        }
    }
}

/// A stiff anchored spring with zero rest length.
///
/// Solves the damped harmonic motion analytically over the step and applies
/// the force that moves the particle to where the spring would have put it.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleFakeSpring {
    pub anchor: Vector3<Real>,
    pub spring_constant: Real,
    pub damping: Real,
}

impl ParticleFakeSpring {
    pub fn new(anchor: Vector3<Real>, spring_constant: Real, damping: Real) -> Self {
        ParticleFakeSpring {
            anchor,
            spring_constant,
            damping,
        }
    }
}

impl ForceGenerator<Particle> for ParticleFakeSpring {
    fn update_force(&self, target: ParticleHandle, particles: &mut ParticleSet, duration: Real) {
        let particle = match particles.get_mut(target) {
            Some(particle) if particle.has_finite_mass() => particle,
            _ => return,
        };
        let discriminant = 4.0 * self.spring_constant - self.damping * self.damping;
        // Over-damped springs have no oscillating solution.
        if discriminant <= 0.0 || duration <= 0.0 {
            return;
        }
        let gamma = 0.5 * discriminant.sqrt();
        let position = particle.position - self.anchor;
        let c = position * (self.damping / (2.0 * gamma)) + particle.velocity * (1.0 / gamma);

        let target_position = (position * (gamma * duration).cos() + c * (gamma * duration).sin())
            * (-0.5 * duration * self.damping).exp();

        let accel = (target_position - position) * (1.0 / (duration * duration))
            - particle.velocity * (1.0 / duration);
        let force = accel * particle.mass();
        particle.add_force(force);
    }
}

/// Buoyancy of a particle in a liquid whose surface lies at `water_height`
/// on the y axis.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleBuoyancy {
    /// Submersion depth at which the particle generates its full force.
    pub max_depth: Real,
    pub volume: Real,
    pub water_height: Real,
    pub liquid_density: Real,
}

impl ParticleBuoyancy {
    pub fn new(max_depth: Real, volume: Real, water_height: Real, liquid_density: Real) -> Self {
        ParticleBuoyancy {
            max_depth,
            volume,
            water_height,
            liquid_density,
        }
    }
}

/// Upward buoyant force of an object at height `depth`.
pub(crate) fn buoyant_force(
    depth: Real,
    max_depth: Real,
    volume: Real,
    water_height: Real,
    liquid_density: Real,
) -> Option<Real> {
    if depth >= water_height + max_depth {
        return None;
    }
    if depth <= water_height - max_depth {
        return Some(liquid_density * volume);
    }
    // Partly submerged: zero at the top of the band, full at the bottom.
    Some(liquid_density * volume * (water_height + max_depth - depth) / (2.0 * max_depth))
}

impl ForceGenerator<Particle> for ParticleBuoyancy {
    fn update_force(&self, target: ParticleHandle, particles: &mut ParticleSet, _duration: Real) {
        if let Some(particle) = particles.get_mut(target) {
            let lift = buoyant_force(
                particle.position.y,
                self.max_depth,
                self.volume,
                self.water_height,
                self.liquid_density,
            );
            if let Some(lift) = lift {
                particle.add_force(Vector3::new(0.0, lift, 0.0));
            }
        }
    }
}

/// Every force generator that can act on a particle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ParticleForce {
    Gravity(Gravity),
    Drag(ParticleDrag),
    Spring(ParticleSpring),
    AnchoredSpring(ParticleAnchoredSpring),
    Bungee(ParticleBungee),
    AnchoredBungee(ParticleAnchoredBungee),
    FakeSpring(ParticleFakeSpring),
    Buoyancy(ParticleBuoyancy),
    Explosion(Explosion),
}

impl ForceGenerator<Particle> for ParticleForce {
    fn update_force(&self, target: ParticleHandle, particles: &mut ParticleSet, duration: Real) {
        match self {
            ParticleForce::Gravity(g) => g.update_force(target, particles, duration),
            ParticleForce::Drag(g) => g.update_force(target, particles, duration),
            ParticleForce::Spring(g) => g.update_force(target, particles, duration),
            ParticleForce::AnchoredSpring(g) => g.update_force(target, particles, duration),
            ParticleForce::Bungee(g) => g.update_force(target, particles, duration),
            ParticleForce::AnchoredBungee(g) => g.update_force(target, particles, duration),
            ParticleForce::FakeSpring(g) => g.update_force(target, particles, duration),
            ParticleForce::Buoyancy(g) => g.update_force(target, particles, duration),
            ParticleForce::Explosion(g) => g.update_force(target, particles, duration),
        }
    }

    fn advance(&mut self, duration: Real) {
        if let ParticleForce::Explosion(explosion) = self {
            ForceGenerator::<Particle>::advance(explosion, duration);
        }
    }
}

impl_from_generator! {
    ParticleForce;
    Gravity => Gravity,
    Drag => ParticleDrag,
    Spring => ParticleSpring,
    AnchoredSpring => ParticleAnchoredSpring,
    Bungee => ParticleBungee,
    AnchoredBungee => ParticleAnchoredBungee,
    FakeSpring => ParticleFakeSpring,
    Buoyancy => ParticleBuoyancy,
    Explosion => Explosion,
}

#[cfg(test)]
mod tests {
    mod springs {
        use approx::assert_relative_eq;
        use cgmath::{InnerSpace, Vector3, Zero};

        use crate::force::*;
        use crate::math::*;
        use crate::particle::*;
        use crate::particle_force::*;

        fn pair(distance: Real) -> (ParticleSet, ParticleHandle, ParticleHandle) {
            let mut particles = ParticleSet::new();
            let a = particles.push(Particle::new(Vector3::zero(), 1.0));
            let b = particles.push(Particle::new(Vector3::new(distance, 0.0, 0.0), 1.0));
            (particles, a, b)
        }

        #[test]
        fn test_spring_symmetry() {
            let separations = [
                Vector3::new(0.5, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(3.0, 0.0, 0.0),
                Vector3::new(1.0, -2.0, 0.5),
                Vector3::zero(),
            ];
            for &separation in separations.iter() {
                let mut particles = ParticleSet::new();
                let a = particles.push(Particle::new(Vector3::new(1.0, 1.0, 1.0), 1.0));
                let b = particles.push(Particle::new(Vector3::new(1.0, 1.0, 1.0) + separation, 1.0));
                let mut registry = ParticleForceRegistry::new();
                let on_a = registry.add_generator(ParticleSpring::new(b, 2.0, 1.0).into());
                let on_b = registry.add_generator(ParticleSpring::new(a, 2.0, 1.0).into());
                registry.add(a, on_a).unwrap();
                registry.add(b, on_b).unwrap();
                registry.update_forces(&mut particles, 0.1);

                let fa = particles[a].accumulated_force();
                let fb = particles[b].accumulated_force();
                assert_relative_eq!(fa, -fb);
                // Pulled together when stretched, pushed apart when compressed.
                let expected = normalize_or_zero(separation) * (2.0 * (separation.magnitude() - 1.0));
                assert_relative_eq!(fa, expected);
            }

            // Stretched by 2 with k = 2: pulled together with magnitude 4.
            let (mut particles, a, b) = pair(3.0);
            ParticleSpring::new(b, 2.0, 1.0).update_force(a, &mut particles, 0.1);
            assert_relative_eq!(particles[a].accumulated_force(), Vector3::new(4.0, 0.0, 0.0));
        }

        #[test]
        fn test_compressed_spring_pushes_apart() {
            let (mut particles, a, b) = pair(0.5);
            ParticleSpring::new(b, 2.0, 1.0).update_force(a, &mut particles, 0.1);
            assert_relative_eq!(particles[a].accumulated_force(), Vector3::new(-1.0, 0.0, 0.0));
        }

        #[test]
        fn test_bungee_vs_spring() {
            let (mut particles, a, b) = pair(0.5);
            ParticleBungee::new(b, 2.0, 1.0).update_force(a, &mut particles, 0.1);
            assert_eq!(particles[a].accumulated_force(), Vector3::zero());

            // Exactly at rest length is still slack.
            let (mut particles, a, b) = pair(1.0);
            ParticleBungee::new(b, 2.0, 1.0).update_force(a, &mut particles, 0.1);
            assert_eq!(particles[a].accumulated_force(), Vector3::zero());

            let (mut particles, a, b) = pair(2.5);
            ParticleBungee::new(b, 2.0, 1.0).update_force(a, &mut particles, 0.1);
            let bungee = particles[a].accumulated_force();
            particles[a].clear_accumulator();
            ParticleSpring::new(b, 2.0, 1.0).update_force(a, &mut particles, 0.1);
            assert_relative_eq!(bungee, particles[a].accumulated_force());
        }

        #[test]
        fn test_anchored() {
            let mut particles = ParticleSet::new();
            let p = particles.push(Particle::new(Vector3::new(0.0, -3.0, 0.0), 1.0));
            let anchor = Vector3::new(0.0, 1.0, 0.0);

            ParticleAnchoredSpring::new(anchor, 1.0, 2.0).update_force(p, &mut particles, 0.1);
            assert_relative_eq!(particles[p].accumulated_force(), Vector3::new(0.0, 2.0, 0.0));
            particles[p].clear_accumulator();

            ParticleAnchoredBungee::new(anchor, 1.0, 5.0).update_force(p, &mut particles, 0.1);
            assert_eq!(particles[p].accumulated_force(), Vector3::zero());
            ParticleAnchoredBungee::new(anchor, 1.0, 3.0).update_force(p, &mut particles, 0.1);
            assert_relative_eq!(particles[p].accumulated_force(), Vector3::new(0.0, 1.0, 0.0));
        }

        #[test]
        fn test_fake_spring() {
            let mut particles = ParticleSet::new();
            let p = particles.push(Particle::new(Vector3::new(2.0, 0.0, 0.0), 1.0));
            let spring = ParticleFakeSpring::new(Vector3::zero(), 50.0, 2.0);
            let start = particles[p].position.magnitude();
            let mut closest = start;
            for _ in 0..200 {
                spring.update_force(p, &mut particles, 0.05);
                particles[p].integrate(0.05);
                let distance = particles[p].position.magnitude();
                assert!(distance < start + 1.0e-3);
                closest = closest.min(distance);
            }
            assert!(closest < 0.1);

            // Over-damped and immovable particles are ignored.
            ParticleFakeSpring::new(Vector3::zero(), 1.0, 10.0).update_force(p, &mut particles, 0.05);
            assert_eq!(particles[p].accumulated_force(), Vector3::zero());
            let fixed = particles.push(Particle::fixed(Vector3::new(1.0, 0.0, 0.0)));
            spring.update_force(fixed, &mut particles, 0.05);
            assert_eq!(particles[fixed].accumulated_force(), Vector3::zero());
        }

        #[test]
        fn test_missing_other_end() {
            let (mut particles, a, b) = pair(3.0);
            particles.remove(b).unwrap();
            ParticleSpring::new(b, 2.0, 1.0).update_force(a, &mut particles, 0.1);
            ParticleBungee::new(b, 2.0, 1.0).update_force(a, &mut particles, 0.1);
            assert_eq!(particles[a].accumulated_force(), Vector3::zero());
        }
    }

    mod drag {
        use approx::assert_relative_eq;
        use cgmath::{Vector3, Zero};

        use crate::force::*;
        use crate::particle::*;
        use crate::particle_force::*;

        #[test]
        fn test_drag() {
            let mut particles = ParticleSet::new();
            let p = particles.push(Particle::new(Vector3::zero(), 1.0));
            let drag = ParticleDrag::new(0.5, 0.25);

            drag.update_force(p, &mut particles, 0.1);
            assert_eq!(particles[p].accumulated_force(), Vector3::zero());

            particles[p].velocity = Vector3::new(0.0, 0.0, -2.0);
            drag.update_force(p, &mut particles, 0.1);
            // k1 * 2 + k2 * 4 = 2, opposing the motion.
            assert_relative_eq!(particles[p].accumulated_force(), Vector3::new(0.0, 0.0, 2.0));
        }
    }

    mod buoyancy {
        use approx::assert_relative_eq;
        use cgmath::Vector3;

        use crate::force::*;
        use crate::math::*;
        use crate::particle::*;
        use crate::particle_force::*;

        fn lift_at(height: Real) -> Real {
            let mut particles = ParticleSet::new();
            let p = particles.push(Particle::new(Vector3::new(0.0, height, 0.0), 1.0));
            ParticleBuoyancy::new(0.5, 2.0, 10.0, 1000.0).update_force(p, &mut particles, 0.1);
            let force = particles[p].accumulated_force();
            assert_eq!((force.x, force.z), (0.0, 0.0));
            force.y
        }

        #[test]
        fn test_buoyancy() {
            assert_eq!(lift_at(11.0), 0.0);
            assert_eq!(lift_at(10.5), 0.0);
            assert_relative_eq!(lift_at(9.5), 2000.0);
            assert_relative_eq!(lift_at(0.0), 2000.0);
            assert_relative_eq!(lift_at(10.0), 1000.0);
            assert_relative_eq!(lift_at(10.25), 500.0);
        }
    }
}
