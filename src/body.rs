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

use cgmath::{InnerSpace, Matrix3, Matrix4, One, Quaternion, SquareMatrix, Vector3, Zero};
use serde::{Deserialize, Serialize};

use crate::math::*;
use crate::pool::{Handle, Pool};

pub type BodyHandle = Handle<RigidBody>;
pub type BodySet = Pool<RigidBody>;

/// Motion below which a sleep-capable body falls asleep, unless the world
/// configures otherwise.
pub const DEFAULT_SLEEP_EPSILON: Real = 0.3;

/// A generic physical body that has a mass, a volume, and experiences linear and
/// rotational movement.
///
/// Position and orientation are the primary state; the transform matrix and
/// the world-space inverse inertia tensor are derived from them by
/// `calculate_derived_data` and must not be edited directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RigidBody {
    pub inverse_mass: Real,
    /// Fraction of linear velocity kept per second.
    pub linear_damping: Real,
    /// Fraction of angular velocity kept per second.
    pub angular_damping: Real,
    pub position: Vector3<Real>,
    pub orientation: Quaternion<Real>,
    pub velocity: Vector3<Real>,
    /// Angular velocity in world space.
    pub rotation: Vector3<Real>,
    /// Constant acceleration such as gravity.
    pub acceleration: Vector3<Real>,
    inverse_inertia_tensor: Matrix3<Real>,
    inverse_inertia_tensor_world: Matrix3<Real>,
    transform_matrix: Matrix4<Real>,
    force_accum: Vector3<Real>,
    torque_accum: Vector3<Real>,
    last_frame_acceleration: Vector3<Real>,
    motion: Real,
    is_awake: bool,
    can_sleep: bool,
    sleep_epsilon: Real,
}

impl Default for RigidBody {
    fn default() -> Self {
        let mut body = RigidBody {
            inverse_mass: 1.0,
            linear_damping: 1.0,
            angular_damping: 1.0,
            position: Vector3::zero(),
            orientation: Quaternion::one(),
            velocity: Vector3::zero(),
            rotation: Vector3::zero(),
            acceleration: Vector3::zero(),
            inverse_inertia_tensor: Matrix3::identity(),
            inverse_inertia_tensor_world: Matrix3::identity(),
            transform_matrix: Matrix4::identity(),
            force_accum: Vector3::zero(),
            torque_accum: Vector3::zero(),
            last_frame_acceleration: Vector3::zero(),
            motion: 0.0,
            is_awake: true,
            can_sleep: false,
            sleep_epsilon: DEFAULT_SLEEP_EPSILON,
        };
        body.calculate_derived_data();
        body
    }
}

impl RigidBody {
    /// Construct a body at rest from a mass and a body-space inertia tensor.
    pub fn new(position: Vector3<Real>, mass: Real, inertia_tensor: Matrix3<Real>) -> Self {
        let mut body = RigidBody {
            position,
            ..RigidBody::default()
        };
        body.set_mass(mass);
        body.set_inertia_tensor(&inertia_tensor);
        body.calculate_derived_data();
        body
    }

    /// Construct an immovable body.
    pub fn fixed(position: Vector3<Real>, orientation: Quaternion<Real>) -> Self {
        let mut body = RigidBody {
            position,
            orientation,
            inverse_mass: 0.0,
            inverse_inertia_tensor: Matrix3::zero(),
            ..RigidBody::default()
        };
        body.calculate_derived_data();
        body
    }

    /// Recomputes the transform matrix and the world-space inverse inertia
    /// tensor from position and orientation. Normalizes the orientation.
    pub fn calculate_derived_data(&mut self) {
        self.orientation = self.orientation.normalize();
        self.transform_matrix = transform_matrix(self.position, self.orientation);
        self.inverse_inertia_tensor_world = transform_inertia_tensor(
            &self.inverse_inertia_tensor,
            &Matrix3::from(self.orientation),
        );
    }

    /// Advance the body by `duration` seconds.
    ///
    /// Bodies with infinite mass and sleeping bodies are left untouched.
    pub fn integrate(&mut self, duration: Real) {
        if self.inverse_mass <= 0.0 || !self.is_awake {
            return;
        }
        debug_assert!(duration > 0.0, "integration step must be positive, got {}", duration);

        self.position += self.velocity * duration;
        self.orientation = add_scaled_rotation(self.orientation, self.rotation, duration);

        // Derived data is still from the start of the step here, which is
        // what the accumulated torque was computed against.
        self.last_frame_acceleration = self.acceleration + self.force_accum * self.inverse_mass;
        let angular_acceleration = self.inverse_inertia_tensor_world * self.torque_accum;

        self.velocity += self.last_frame_acceleration * duration;
        self.rotation += angular_acceleration * duration;

        self.velocity *= self.linear_damping.powf(duration);
        self.rotation *= self.angular_damping.powf(duration);

        self.clear_accumulators();
        self.calculate_derived_data();

        if self.can_sleep {
            let current_motion = self.velocity.magnitude2() + self.rotation.magnitude2();
            let bias = (0.5 as Real).powf(duration);
            self.motion = bias * self.motion + (1.0 - bias) * current_motion;
            if self.motion < self.sleep_epsilon {
                self.set_awake(false);
            } else if self.motion > 10.0 * self.sleep_epsilon {
                self.motion = 10.0 * self.sleep_epsilon;
            }
        }
    }

    pub fn set_mass(&mut self, mass: Real) {
        debug_assert!(mass != 0.0, "body mass must be non-zero");
        self.inverse_mass = 1.0 / mass;
    }

    /// Returns the mass, or `REAL_MAX` for an immovable body.
    pub fn mass(&self) -> Real {
        if self.inverse_mass == 0.0 {
            REAL_MAX
        } else {
            1.0 / self.inverse_mass
        }
    }

    pub fn has_finite_mass(&self) -> bool {
        self.inverse_mass > 0.0
    }

    /// Sets the body-space inertia tensor. The tensor must be invertible.
    pub fn set_inertia_tensor(&mut self, inertia_tensor: &Matrix3<Real>) {
        match inertia_tensor.invert() {
            Some(inverse) => self.inverse_inertia_tensor = inverse,
            None => {
                debug_assert!(false, "inertia tensor must be invertible");
                self.inverse_inertia_tensor = Matrix3::zero();
            }
        }
        self.calculate_derived_data();
    }

    /// Sets the body-space inverse inertia tensor directly. A zero matrix
    /// makes the body impossible to rotate.
    pub fn set_inverse_inertia_tensor(&mut self, inverse: &Matrix3<Real>) {
        self.inverse_inertia_tensor = *inverse;
        self.calculate_derived_data();
    }

    pub fn inverse_inertia_tensor(&self) -> Matrix3<Real> {
        self.inverse_inertia_tensor
    }

    pub fn inverse_inertia_tensor_world(&self) -> Matrix3<Real> {
        self.inverse_inertia_tensor_world
    }

    /// The cached body-to-world transform.
    pub fn transform(&self) -> &Matrix4<Real> {
        &self.transform_matrix
    }

    pub fn point_in_world_space(&self, point: Vector3<Real>) -> Vector3<Real> {
        transform_point(&self.transform_matrix, point)
    }

    pub fn point_in_local_space(&self, point: Vector3<Real>) -> Vector3<Real> {
        transform_inverse(&self.transform_matrix, point)
    }

    pub fn direction_in_world_space(&self, direction: Vector3<Real>) -> Vector3<Real> {
        transform_direction(&self.transform_matrix, direction)
    }

    pub fn direction_in_local_space(&self, direction: Vector3<Real>) -> Vector3<Real> {
        transform_inverse_direction(&self.transform_matrix, direction)
    }

    /// Adds a force through the centre of mass.
    pub fn add_force(&mut self, force: Vector3<Real>) {
        self.force_accum += force;
        self.set_awake(true);
    }

    /// Adds a force at a point given in world space. Off-centre points
    /// produce torque.
    pub fn add_force_at_point(&mut self, force: Vector3<Real>, point: Vector3<Real>) {
        let pt = point - self.position;
        self.force_accum += force;
        self.torque_accum += pt.cross(force);
        self.set_awake(true);
    }

    /// Adds a force at a point given in body space.
    pub fn add_force_at_body_point(&mut self, force: Vector3<Real>, point: Vector3<Real>) {
        let pt = self.point_in_world_space(point);
        self.add_force_at_point(force, pt);
    }

    pub fn add_torque(&mut self, torque: Vector3<Real>) {
        self.torque_accum += torque;
        self.set_awake(true);
    }

    pub fn accumulated_force(&self) -> Vector3<Real> {
        self.force_accum
    }

    pub fn accumulated_torque(&self) -> Vector3<Real> {
        self.torque_accum
    }

    pub fn clear_accumulators(&mut self) {
        self.force_accum = Vector3::zero();
        self.torque_accum = Vector3::zero();
    }

    /// The acceleration the body experienced during its last integration,
    /// including the accumulated force.
    pub fn last_frame_acceleration(&self) -> Vector3<Real> {
        self.last_frame_acceleration
    }

    pub fn is_awake(&self) -> bool {
        self.is_awake
    }

    /// Wakes or puts the body to sleep. Sleeping bodies have their
    /// velocities zeroed and are skipped by integration.
    pub fn set_awake(&mut self, awake: bool) {
        if awake {
            if !self.is_awake {
                // Start with some motion so the body doesn't fall asleep
                // again immediately.
                self.motion = self.sleep_epsilon * 2.0;
            }
            self.is_awake = true;
        } else {
            self.is_awake = false;
            self.velocity = Vector3::zero();
            self.rotation = Vector3::zero();
        }
    }

    pub fn can_sleep(&self) -> bool {
        self.can_sleep
    }

    pub fn set_can_sleep(&mut self, can_sleep: bool) {
        if can_sleep && !self.can_sleep && self.is_awake {
            self.motion = self.sleep_epsilon * 2.0;
        }
        self.can_sleep = can_sleep;
        if !can_sleep && !self.is_awake {
            self.set_awake(true);
        }
    }

    pub fn set_sleep_epsilon(&mut self, sleep_epsilon: Real) {
        self.sleep_epsilon = sleep_epsilon;
    }

    /// Running average of the body's kinetic motion, used to decide when to
    /// sleep.
    pub fn motion(&self) -> Real {
        self.motion
    }
}

#[cfg(test)]
mod tests {
    mod body {
        use approx::assert_relative_eq;
        use cgmath::{InnerSpace, Quaternion, Rad, Rotation3, Vector3, Zero, One};

        use crate::body::*;
        use crate::math::*;

        fn unit_cube(mass: Real) -> RigidBody {
            RigidBody::new(
                Vector3::zero(),
                mass,
                cuboid_inertia_tensor(Vector3::new(0.5, 0.5, 0.5), mass),
            )
        }

        #[test]
        fn test_infinite_mass_never_moves() {
            let q = Quaternion::from_angle_x(Rad(0.3));
            let mut body = RigidBody::fixed(Vector3::new(0.0, 1.0, 0.0), q);
            body.rotation = Vector3::new(1.0, 0.0, 0.0);
            body.add_force_at_body_point(Vector3::new(0.0, 0.0, 10.0), Vector3::new(1.0, 0.0, 0.0));
            body.integrate(0.1);
            assert_eq!(body.position, Vector3::new(0.0, 1.0, 0.0));
            assert_relative_eq!(body.orientation, q);
            assert_eq!(body.velocity, Vector3::zero());
        }

        #[test]
        fn test_linear_integration() {
            let mut body = unit_cube(2.0);
            body.acceleration = Vector3::new(0.0, -10.0, 0.0);
            body.add_force(Vector3::new(4.0, 0.0, 0.0));
            body.integrate(0.5);
            assert_relative_eq!(body.velocity, Vector3::new(1.0, -5.0, 0.0));
            assert_relative_eq!(body.last_frame_acceleration(), Vector3::new(2.0, -10.0, 0.0));
            assert_eq!(body.accumulated_force(), Vector3::zero());
            assert_eq!(body.accumulated_torque(), Vector3::zero());
        }

        #[test]
        fn test_off_centre_force_produces_torque() {
            let mut body = unit_cube(1.0);
            body.add_force_at_body_point(Vector3::new(0.0, 1.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
            assert_relative_eq!(body.accumulated_torque(), Vector3::new(0.0, 0.0, 1.0));
            body.integrate(0.1);
            assert!(body.rotation.z > 0.0);
            assert_relative_eq!(body.rotation.x, 0.0);
        }

        #[test]
        fn test_orientation_stays_normalized() {
            let mut body = unit_cube(1.0);
            body.rotation = Vector3::new(3.0, -2.0, 5.0);
            for _ in 0..100 {
                body.integrate(0.05);
                assert_relative_eq!(body.orientation.magnitude(), 1.0, epsilon = 1.0e-5);
            }
            assert!(body.orientation != Quaternion::one());
        }

        #[test]
        fn test_derived_data_follows_state() {
            let mut body = unit_cube(1.0);
            body.velocity = Vector3::new(1.0, 0.0, 0.0);
            body.rotation = Vector3::new(0.0, 1.0, 0.0);
            body.integrate(0.1);
            let origin = body.point_in_world_space(Vector3::zero());
            assert_relative_eq!(origin, body.position);
            let local = Vector3::new(0.5, 0.25, -0.5);
            assert_relative_eq!(
                body.point_in_local_space(body.point_in_world_space(local)),
                local,
                epsilon = 1.0e-5
            );
        }

        #[test]
        fn test_sleeping() {
            let mut body = unit_cube(1.0);
            body.set_can_sleep(true);
            body.set_awake(false);
            body.set_awake(true);
            assert_relative_eq!(body.motion(), 2.0 * DEFAULT_SLEEP_EPSILON);
            for _ in 0..100 {
                body.integrate(0.1);
            }
            assert!(!body.is_awake());
            body.velocity = Vector3::new(1.0, 0.0, 0.0);
            body.integrate(0.1);
            assert_eq!(body.position, Vector3::zero());
            // Any applied force wakes it up again.
            body.add_force(Vector3::new(1.0, 0.0, 0.0));
            assert!(body.is_awake());
        }
    }
}
