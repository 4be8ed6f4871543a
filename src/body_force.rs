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

use cgmath::{InnerSpace, Matrix, Matrix3, One, Quaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::body::{BodyHandle, BodySet, RigidBody};
use crate::explosion::Explosion;
use crate::force::{ForceGenerator, ForceRegistry, Gravity};
use crate::math::*;
use crate::particle_force::{buoyant_force, spring_force};

pub type BodyForceRegistry = ForceRegistry<RigidBody, BodyForce>;

/// A spring between a point on the target and a point on another body.
/// Both connection points are in their own body's local space.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spring {
    pub connection_point: Vector3<Real>,
    pub other: BodyHandle,
    pub other_connection_point: Vector3<Real>,
    pub spring_constant: Real,
    pub rest_length: Real,
}

impl Spring {
    pub fn new(
        connection_point: Vector3<Real>,
        other: BodyHandle,
        other_connection_point: Vector3<Real>,
        spring_constant: Real,
        rest_length: Real,
    ) -> Self {
        Spring {
            connection_point,
            other,
            other_connection_point,
            spring_constant,
            rest_length,
        }
    }
}

impl ForceGenerator<RigidBody> for Spring {
    fn update_force(&self, target: BodyHandle, bodies: &mut BodySet, _duration: Real) {
        let ows = match bodies.get(self.other) {
            Some(other) => other.point_in_world_space(self.other_connection_point),
            None => return,
        };
        if let Some(body) = bodies.get_mut(target) {
            let lws = body.point_in_world_space(self.connection_point);
            let force = spring_force(lws - ows, self.spring_constant, self.rest_length);
            body.add_force_at_point(force, lws);
        }
    }
}

/// Aerodynamic force on a body-space point from a body-space tensor.
///
/// The tensor maps the air velocity relative to the body, in body
/// coordinates, to a force in body coordinates.
fn apply_aero(body: &mut RigidBody, rotation: &Matrix3<Real>, tensor: &Matrix3<Real>, position: Vector3<Real>, wind: Vector3<Real>) {
    let velocity = body.velocity + wind;
    let body_velocity = rotation.transpose() * velocity;
    let body_force = *tensor * body_velocity;
    let force = *rotation * body_force;
    body.add_force_at_body_point(force, position);
}

/// A surface that generates force from the air flowing past it.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aero {
    pub tensor: Matrix3<Real>,
    /// Where the force acts, in body space.
    pub position: Vector3<Real>,
    pub wind: Vector3<Real>,
}

impl Aero {
    pub fn new(tensor: Matrix3<Real>, position: Vector3<Real>, wind: Vector3<Real>) -> Self {
        Aero {
            tensor,
            position,
            wind,
        }
    }
}

impl ForceGenerator<RigidBody> for Aero {
    fn update_force(&self, target: BodyHandle, bodies: &mut BodySet, _duration: Real) {
        if let Some(body) = bodies.get_mut(target) {
            let rotation = rotation_part(body.transform());
            apply_aero(body, &rotation, &self.tensor, self.position, self.wind);
        }
    }
}

/// An aerodynamic surface with a control input, e.g. a flap or rudder.
///
/// The control setting blends from `min_tensor` at -1 through `tensor` at 0
/// to `max_tensor` at 1.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AeroControl {
    pub tensor: Matrix3<Real>,
    pub min_tensor: Matrix3<Real>,
    pub max_tensor: Matrix3<Real>,
    pub position: Vector3<Real>,
    pub wind: Vector3<Real>,
    control_setting: Real,
}

impl AeroControl {
    pub fn new(
        base: Matrix3<Real>,
        min: Matrix3<Real>,
        max: Matrix3<Real>,
        position: Vector3<Real>,
        wind: Vector3<Real>,
    ) -> Self {
        AeroControl {
            tensor: base,
            min_tensor: min,
            max_tensor: max,
            position,
            wind,
            control_setting: 0.0,
        }
    }

    /// Sets the control input. Values outside [-1, 1] saturate.
    pub fn set_control(&mut self, value: Real) {
        self.control_setting = value;
    }

    pub fn control(&self) -> Real {
        self.control_setting
    }

    /// The tensor for the current control setting.
    pub fn current_tensor(&self) -> Matrix3<Real> {
        let c = self.control_setting;
        if c <= -1.0 {
            self.min_tensor
        } else if c >= 1.0 {
            self.max_tensor
        } else if c < 0.0 {
            lerp_matrix3(&self.min_tensor, &self.tensor, c + 1.0)
        } else if c > 0.0 {
            lerp_matrix3(&self.tensor, &self.max_tensor, c)
        } else {
            self.tensor
        }
    }
}

impl ForceGenerator<RigidBody> for AeroControl {
    fn update_force(&self, target: BodyHandle, bodies: &mut BodySet, _duration: Real) {
        let tensor = self.current_tensor();
        if let Some(body) = bodies.get_mut(target) {
            let rotation = rotation_part(body.transform());
            apply_aero(body, &rotation, &tensor, self.position, self.wind);
        }
    }
}

/// An aerodynamic surface that can be turned relative to its body.
/// Turning it doesn't move the point the force acts at.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AngledAero {
    pub tensor: Matrix3<Real>,
    pub position: Vector3<Real>,
    pub wind: Vector3<Real>,
    orientation: Quaternion<Real>,
}

impl AngledAero {
    pub fn new(tensor: Matrix3<Real>, position: Vector3<Real>, wind: Vector3<Real>) -> Self {
        AngledAero {
            tensor,
            position,
            wind,
            orientation: Quaternion::one(),
        }
    }

    /// Sets the surface's orientation relative to the body.
    pub fn set_orientation(&mut self, orientation: Quaternion<Real>) {
        self.orientation = orientation.normalize();
    }

    pub fn orientation(&self) -> Quaternion<Real> {
        self.orientation
    }
}

impl ForceGenerator<RigidBody> for AngledAero {
    fn update_force(&self, target: BodyHandle, bodies: &mut BodySet, _duration: Real) {
        if let Some(body) = bodies.get_mut(target) {
            let rotation = Matrix3::from(body.orientation * self.orientation);
            apply_aero(body, &rotation, &self.tensor, self.position, self.wind);
        }
    }
}

/// Buoyancy of a body in a liquid whose surface lies at `water_height` on
/// the y axis. The force acts at the centre of buoyancy, in body space.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Buoyancy {
    pub centre_of_buoyancy: Vector3<Real>,
    pub max_depth: Real,
    pub volume: Real,
    pub water_height: Real,
    pub liquid_density: Real,
}

impl Buoyancy {
    /// Density of pure water, in kg per cubic metre.
    pub const WATER_DENSITY: Real = 1000.0;

    pub fn new(centre_of_buoyancy: Vector3<Real>, max_depth: Real, volume: Real, water_height: Real) -> Self {
        Buoyancy {
            centre_of_buoyancy,
            max_depth,
            volume,
            water_height,
            liquid_density: Buoyancy::WATER_DENSITY,
        }
    }
}

impl ForceGenerator<RigidBody> for Buoyancy {
    fn update_force(&self, target: BodyHandle, bodies: &mut BodySet, _duration: Real) {
        if let Some(body) = bodies.get_mut(target) {
            let depth = body.point_in_world_space(self.centre_of_buoyancy).y;
            let lift = buoyant_force(depth, self.max_depth, self.volume, self.water_height, self.liquid_density);
            if let Some(lift) = lift {
                body.add_force_at_body_point(Vector3::new(0.0, lift, 0.0), self.centre_of_buoyancy);
            }
        }
    }
}

/// Every force generator that can act on a rigid body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BodyForce {
    Gravity(Gravity),
    Spring(Spring),
    Aero(Aero),
    AeroControl(AeroControl),
    AngledAero(AngledAero),
    Buoyancy(Buoyancy),
    Explosion(Explosion),
}

impl ForceGenerator<RigidBody> for BodyForce {
    fn update_force(&self, target: BodyHandle, bodies: &mut BodySet, duration: Real) {
        match self {
            BodyForce::Gravity(g) => g.update_force(target, bodies, duration),
            BodyForce::Spring(g) => g.update_force(target, bodies, duration),
            BodyForce::Aero(g) => g.update_force(target, bodies, duration),
            BodyForce::AeroControl(g) => g.update_force(target, bodies, duration),
            BodyForce::AngledAero(g) => g.update_force(target, bodies, duration),
            BodyForce::Buoyancy(g) => g.update_force(target, bodies, duration),
            BodyForce::Explosion(g) => g.update_force(target, bodies, duration),
        }
    }

    fn advance(&mut self, duration: Real) {
        if let BodyForce::Explosion(explosion) = self {
            ForceGenerator::<RigidBody>::advance(explosion, duration);
        }
    }
}

impl_from_generator! {
    BodyForce;
    Gravity => Gravity,
    Spring => Spring,
    Aero => Aero,
    AeroControl => AeroControl,
    AngledAero => AngledAero,
    Buoyancy => Buoyancy,
    Explosion => Explosion,
}

#[cfg(test)]
mod tests {
    mod body_force {
        use approx::assert_relative_eq;
        use cgmath::{Matrix3, Quaternion, Rad, Rotation3, SquareMatrix, Vector3, Zero};

        use crate::body::*;
        use crate::body_force::*;
        use crate::force::*;
        use crate::math::*;

        fn body_at(position: Vector3<Real>) -> RigidBody {
            RigidBody::new(position, 1.0, cuboid_inertia_tensor(Vector3::new(1.0, 1.0, 1.0), 1.0))
        }

        fn drag_tensor() -> Matrix3<Real> {
            Matrix3::from_diagonal(Vector3::new(-1.0, -2.0, -3.0))
        }

        #[test]
        fn test_spring_between_bodies() {
            let mut bodies = BodySet::new();
            let a = bodies.push(body_at(Vector3::zero()));
            let b = bodies.push(body_at(Vector3::new(4.0, 0.0, 0.0)));
            let on_a = Spring::new(Vector3::new(0.0, 1.0, 0.0), b, Vector3::new(0.0, 1.0, 0.0), 1.0, 2.0);
            let on_b = Spring::new(Vector3::new(0.0, 1.0, 0.0), a, Vector3::new(0.0, 1.0, 0.0), 1.0, 2.0);
            on_a.update_force(a, &mut bodies, 0.1);
            on_b.update_force(b, &mut bodies, 0.1);

            assert_relative_eq!(bodies[a].accumulated_force(), Vector3::new(2.0, 0.0, 0.0));
            assert_relative_eq!(bodies[a].accumulated_force(), -bodies[b].accumulated_force());
            // Pulling on a point above the centre of mass turns the body.
            assert_relative_eq!(bodies[a].accumulated_torque(), Vector3::new(0.0, 0.0, -2.0));
        }

        #[test]
        fn test_aero() {
            let mut bodies = BodySet::new();
            let h = bodies.push(body_at(Vector3::zero()));
            let aero = Aero::new(drag_tensor(), Vector3::zero(), Vector3::zero());
            aero.update_force(h, &mut bodies, 0.1);
            assert_eq!(bodies[h].accumulated_force(), Vector3::zero());

            bodies[h].velocity = Vector3::new(1.0, 1.0, 0.0);
            aero.update_force(h, &mut bodies, 0.1);
            assert_relative_eq!(bodies[h].accumulated_force(), Vector3::new(-1.0, -2.0, 0.0));
            bodies[h].clear_accumulators();

            // Wind is air velocity, so a matching headwind doubles the force.
            let windy = Aero::new(drag_tensor(), Vector3::zero(), Vector3::new(1.0, 1.0, 0.0));
            windy.update_force(h, &mut bodies, 0.1);
            assert_relative_eq!(bodies[h].accumulated_force(), Vector3::new(-2.0, -4.0, 0.0));
        }

        #[test]
        fn test_aero_follows_orientation() {
            let mut bodies = BodySet::new();
            let mut body = body_at(Vector3::zero());
            // Body x now points along world z.
            body.orientation = Quaternion::from_angle_y(Rad(-std::f64::consts::FRAC_PI_2 as Real));
            body.calculate_derived_data();
            body.velocity = Vector3::new(0.0, 0.0, 1.0);
            let h = bodies.push(body);
            Aero::new(drag_tensor(), Vector3::zero(), Vector3::zero()).update_force(h, &mut bodies, 0.1);
            assert_relative_eq!(bodies[h].accumulated_force(), Vector3::new(0.0, 0.0, -1.0), epsilon = 1.0e-5);
        }

        #[test]
        fn test_aero_control() {
            let base = Matrix3::from_value(0.0);
            let min = Matrix3::from_diagonal(Vector3::new(-2.0, -2.0, -2.0));
            let max = Matrix3::from_diagonal(Vector3::new(2.0, 2.0, 2.0));
            let mut control = AeroControl::new(base, min, max, Vector3::zero(), Vector3::zero());
            assert_eq!(control.current_tensor(), base);
            control.set_control(0.5);
            assert_relative_eq!(control.current_tensor(), Matrix3::from_diagonal(Vector3::new(1.0, 1.0, 1.0)));
            control.set_control(-0.25);
            assert_relative_eq!(control.current_tensor(), Matrix3::from_diagonal(Vector3::new(-0.5, -0.5, -0.5)));
            control.set_control(-3.0);
            assert_eq!(control.current_tensor(), min);
            control.set_control(1.0);
            assert_eq!(control.current_tensor(), max);

            let mut bodies = BodySet::new();
            let h = bodies.push(body_at(Vector3::zero()));
            bodies[h].velocity = Vector3::new(0.0, 1.0, 0.0);
            control.update_force(h, &mut bodies, 0.1);
            assert_relative_eq!(bodies[h].accumulated_force(), Vector3::new(0.0, 2.0, 0.0));
        }

        #[test]
        fn test_angled_aero() {
            let mut bodies = BodySet::new();
            let h = bodies.push(body_at(Vector3::zero()));
            bodies[h].velocity = Vector3::new(1.0, 0.0, 0.0);

            let mut angled = AngledAero::new(drag_tensor(), Vector3::zero(), Vector3::zero());
            angled.update_force(h, &mut bodies, 0.1);
            assert_relative_eq!(bodies[h].accumulated_force(), Vector3::new(-1.0, 0.0, 0.0));
            bodies[h].clear_accumulators();

            // Turn the surface so that its z axis faces the airflow.
            angled.set_orientation(Quaternion::from_angle_y(Rad(std::f64::consts::FRAC_PI_2 as Real)));
            angled.update_force(h, &mut bodies, 0.1);
            assert_relative_eq!(bodies[h].accumulated_force(), Vector3::new(-3.0, 0.0, 0.0), epsilon = 1.0e-5);
        }

        #[test]
        fn test_buoyancy() {
            let mut bodies = BodySet::new();
            let h = bodies.push(body_at(Vector3::new(0.0, -5.0, 0.0)));
            let buoyancy = Buoyancy::new(Vector3::new(1.0, 0.0, 0.0), 0.5, 0.1, 0.0);
            buoyancy.update_force(h, &mut bodies, 0.1);
            assert_relative_eq!(bodies[h].accumulated_force(), Vector3::new(0.0, 100.0, 0.0));
            // Off-centre buoyancy rolls the body.
            assert_relative_eq!(bodies[h].accumulated_torque(), Vector3::new(0.0, 0.0, 100.0));

            bodies[h].clear_accumulators();
            bodies[h].position = Vector3::new(0.0, 1.0, 0.0);
            bodies[h].calculate_derived_data();
            buoyancy.update_force(h, &mut bodies, 0.1);
            assert_eq!(bodies[h].accumulated_force(), Vector3::zero());
        }

        #[test]
        fn test_generators_convert_to_matching_variant() {
            let mut bodies = BodySet::new();
            let other = bodies.push(body_at(Vector3::zero()));
            let gravity: BodyForce = Gravity::new(Vector3::new(0.0, -10.0, 0.0)).into();
            assert!(matches!(gravity, BodyForce::Gravity(_)));
            let spring = Spring::new(Vector3::zero(), other, Vector3::zero(), 10.0, 1.0);
            assert!(matches!(BodyForce::from(spring), BodyForce::Spring(s) if s == spring));
            let aero = Aero::new(drag_tensor(), Vector3::zero(), Vector3::zero());
            assert!(matches!(BodyForce::from(aero), BodyForce::Aero(a) if a == aero));
            let buoyancy = Buoyancy::new(Vector3::zero(), 1.0, 0.1, 0.0);
            assert!(matches!(BodyForce::from(buoyancy), BodyForce::Buoyancy(_)));
        }

        #[test]
        fn test_registry() {
            let mut bodies = BodySet::new();
            let h = bodies.push(body_at(Vector3::zero()));
            let mut registry = BodyForceRegistry::new();
            let gravity = registry.add_generator(Gravity::new(Vector3::new(0.0, -10.0, 0.0)).into());
            let flap = registry.add_generator(
                AeroControl::new(Matrix3::zero(), Matrix3::zero(), Matrix3::identity(), Vector3::zero(), Vector3::zero()).into(),
            );
            registry.add(h, gravity).unwrap();
            registry.add(h, flap).unwrap();
            if let Some(BodyForce::AeroControl(flap)) = registry.generator_mut(flap) {
                flap.set_control(1.0);
            }
            bodies[h].velocity = Vector3::new(3.0, 0.0, 0.0);
            registry.update_forces(&mut bodies, 0.1);
            assert_relative_eq!(bodies[h].accumulated_force(), Vector3::new(3.0, -10.0, 0.0));
        }
    }
}
