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

use cgmath::{InnerSpace, Matrix, Matrix3, SquareMatrix, Vector3, Zero};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::body::{BodyHandle, BodySet, RigidBody};
use crate::math::*;

/// Closing speeds below this are treated as resting contact and do not
/// bounce.
pub const VELOCITY_LIMIT: Real = 0.25;

/// Largest rotation position resolution may apply to a body, as a fraction
/// of the contact's lever arm.
pub const ANGULAR_LIMIT: Real = 0.2;

/// A contact between two rigid bodies, or a body and the scenery.
///
/// The first block of fields describes the contact and is filled in by
/// collision detection. The second block is written by the resolver.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub body: BodyHandle,
    /// `None` when the body touches immovable scenery.
    pub other: Option<BodyHandle>,
    /// World space.
    pub contact_point: Vector3<Real>,
    /// Unit direction, pointing from `other` towards `body`.
    pub contact_normal: Vector3<Real>,
    pub penetration: Real,
    pub restitution: Real,
    /// Isotropic friction coefficient. Zero disables friction.
    pub friction: Real,

    /// Columns are the contact normal and the two contact tangents.
    pub contact_to_world: Matrix3<Real>,
    /// Closing velocity in contact coordinates.
    pub contact_velocity: Vector3<Real>,
    /// Velocity change along the normal needed to resolve the contact.
    pub desired_delta_velocity: Real,
    /// Contact point relative to each body's centre, in world space.
    pub relative_contact_position: [Vector3<Real>; 2],
}

/// Per-body changes applied while resolving one contact.
type Changes = ([Vector3<Real>; 2], [Vector3<Real>; 2]);

fn no_changes() -> Changes {
    ([Vector3::zero(); 2], [Vector3::zero(); 2])
}

impl Contact {
    pub fn new(
        body: BodyHandle,
        other: Option<BodyHandle>,
        contact_point: Vector3<Real>,
        contact_normal: Vector3<Real>,
        penetration: Real,
        restitution: Real,
        friction: Real,
    ) -> Self {
        Contact {
            body,
            other,
            contact_point,
            contact_normal,
            penetration,
            restitution,
            friction,
            contact_to_world: Matrix3::identity(),
            contact_velocity: Vector3::zero(),
            desired_delta_velocity: 0.0,
            relative_contact_position: [Vector3::zero(); 2],
        }
    }

    /// Both bodies, in resolution order.
    pub fn bodies(&self) -> [Option<BodyHandle>; 2] {
        [Some(self.body), self.other]
    }

    /// True if at least one side can be moved.
    pub fn is_movable(&self, bodies: &BodySet) -> bool {
        self.bodies()
            .iter()
            .filter_map(|h| h.and_then(|h| bodies.get(h)))
            .any(|b| b.has_finite_mass())
    }

    fn mass_properties(&self, bodies: &BodySet) -> ([Real; 2], [Matrix3<Real>; 2]) {
        let mut inverse_mass = [0.0; 2];
        let mut inverse_inertia = [Matrix3::zero(); 2];
        for (i, handle) in self.bodies().iter().enumerate() {
            if let Some(body) = handle.and_then(|h| bodies.get(h)) {
                inverse_mass[i] = body.inverse_mass;
                inverse_inertia[i] = body.inverse_inertia_tensor_world();
            }
        }
        (inverse_mass, inverse_inertia)
    }

    /// Computes the contact basis, relative positions, closing velocity
    /// and desired velocity change. Called once before resolution.
    pub fn calculate_internals(&mut self, bodies: &BodySet, duration: Real) {
        self.contact_to_world = orthonormal_basis(self.contact_normal);
        self.contact_velocity = Vector3::zero();
        self.relative_contact_position = [Vector3::zero(); 2];

        let handles = self.bodies();
        for (i, handle) in handles.iter().enumerate() {
            if let Some(body) = handle.and_then(|h| bodies.get(h)) {
                self.relative_contact_position[i] = self.contact_point - body.position;
                let velocity = self.local_velocity(body, i, duration);
                if i == 0 {
                    self.contact_velocity += velocity;
                } else {
                    self.contact_velocity -= velocity;
                }
            }
        }
        self.calculate_desired_delta_velocity(bodies, duration);
    }

    /// Velocity of the contact point on one body, in contact coordinates.
    fn local_velocity(&self, body: &RigidBody, i: usize, duration: Real) -> Vector3<Real> {
        let world_to_contact = self.contact_to_world.transpose();
        let velocity = body.rotation.cross(self.relative_contact_position[i]) + body.velocity;
        let contact_velocity = world_to_contact * velocity;

        // Planar velocity picked up from this frame's acceleration is removed
        // by friction, so it counts towards the tangential velocity. The
        // normal part is handled in the desired delta velocity.
        let mut acc_velocity = world_to_contact * (body.last_frame_acceleration() * duration);
        acc_velocity.x = 0.0;
        contact_velocity + acc_velocity
    }

    pub fn calculate_desired_delta_velocity(&mut self, bodies: &BodySet, duration: Real) {
        let mut velocity_from_acc = 0.0;
        if let Some(body) = bodies.get(self.body) {
            if body.is_awake() {
                velocity_from_acc += (body.last_frame_acceleration() * duration).dot(self.contact_normal);
            }
        }
        if let Some(other) = self.other.and_then(|h| bodies.get(h)) {
            if other.is_awake() {
                velocity_from_acc -= (other.last_frame_acceleration() * duration).dot(self.contact_normal);
            }
        }

        let restitution = if self.contact_velocity.x.abs() < VELOCITY_LIMIT {
            0.0
        } else {
            self.restitution
        };
        self.desired_delta_velocity =
            -self.contact_velocity.x - restitution * (self.contact_velocity.x - velocity_from_acc);
    }

    /// Wakes a sleeping body touching an awake one. Contacts with the
    /// scenery never wake anything.
    pub fn match_awake_state(&self, bodies: &mut BodySet) {
        let other = match self.other {
            Some(other) => other,
            None => return,
        };
        if let Some((body, other)) = bodies.get_pair_mut(self.body, other) {
            if body.is_awake() != other.is_awake() {
                if body.is_awake() {
                    other.set_awake(true);
                } else {
                    body.set_awake(true);
                }
            }
        }
    }

    /// Impulse in contact coordinates, ignoring friction.
    fn frictionless_impulse(&self, inverse_mass: &[Real; 2], inverse_inertia: &[Matrix3<Real>; 2]) -> Option<Vector3<Real>> {
        let n = self.contact_normal;
        let mut delta_velocity = 0.0;
        for i in 0..2 {
            let rcp = self.relative_contact_position[i];
            let delta_vel_world = (inverse_inertia[i] * rcp.cross(n)).cross(rcp);
            delta_velocity += delta_vel_world.dot(n) + inverse_mass[i];
        }
        if delta_velocity <= 0.0 {
            return None;
        }
        Some(Vector3::new(self.desired_delta_velocity / delta_velocity, 0.0, 0.0))
    }

    /// Impulse in contact coordinates, with isotropic friction. Static
    /// friction removes all tangential velocity; when that would take more
    /// than the friction cone allows, the tangential impulse is clamped to
    /// the cone.
    fn friction_impulse(&self, inverse_mass: &[Real; 2], inverse_inertia: &[Matrix3<Real>; 2]) -> Option<Vector3<Real>> {
        let mut delta_vel_world = Matrix3::zero();
        for i in 0..2 {
            let impulse_to_torque = skew_symmetric(self.relative_contact_position[i]);
            delta_vel_world += impulse_to_torque * inverse_inertia[i] * impulse_to_torque * -1.0;
        }

        let mut delta_velocity = self.contact_to_world.transpose() * delta_vel_world * self.contact_to_world;
        let total_inverse_mass = inverse_mass[0] + inverse_mass[1];
        delta_velocity.x.x += total_inverse_mass;
        delta_velocity.y.y += total_inverse_mass;
        delta_velocity.z.z += total_inverse_mass;

        let impulse_matrix = delta_velocity.invert()?;
        let vel_kill = Vector3::new(
            self.desired_delta_velocity,
            -self.contact_velocity.y,
            -self.contact_velocity.z,
        );
        let mut impulse = impulse_matrix * vel_kill;

        let planar = (impulse.y * impulse.y + impulse.z * impulse.z).sqrt();
        if planar > impulse.x * self.friction {
            // Dynamic friction.
            impulse.y /= planar;
            impulse.z /= planar;
            let normal = delta_velocity.x.x
                + delta_velocity.y.x * self.friction * impulse.y
                + delta_velocity.z.x * self.friction * impulse.z;
            if normal == 0.0 {
                return None;
            }
            impulse.x = self.desired_delta_velocity / normal;
            impulse.y *= self.friction * impulse.x;
            impulse.z *= self.friction * impulse.x;
        }
        Some(impulse)
    }

    /// Applies the impulse that resolves this contact's velocity. Returns
    /// the linear and angular velocity change of each body.
    pub fn apply_velocity_change(&self, bodies: &mut BodySet) -> Changes {
        let (inverse_mass, inverse_inertia) = self.mass_properties(bodies);
        let impulse_contact = if self.friction == 0.0 {
            self.frictionless_impulse(&inverse_mass, &inverse_inertia)
        } else {
            self.friction_impulse(&inverse_mass, &inverse_inertia)
        };
        let impulse_contact = match impulse_contact {
            Some(impulse) => impulse,
            None => return no_changes(),
        };

        let impulse = self.contact_to_world * impulse_contact;
        let rcp = &self.relative_contact_position;
        let velocity_change = [impulse * inverse_mass[0], impulse * -inverse_mass[1]];
        let rotation_change = [
            inverse_inertia[0] * rcp[0].cross(impulse),
            inverse_inertia[1] * impulse.cross(rcp[1]),
        ];

        for (i, handle) in self.bodies().iter().enumerate() {
            if let Some(body) = handle.and_then(|h| bodies.get_mut(h)) {
                body.velocity += velocity_change[i];
                body.rotation += rotation_change[i];
            }
        }
        (velocity_change, rotation_change)
    }

    /// Moves the bodies apart by `penetration` along the normal, sharing
    /// the move between linear and angular motion by inertia. Returns the
    /// linear and angular change of each body.
    pub fn apply_position_change(&self, bodies: &mut BodySet, penetration: Real) -> Changes {
        let n = self.contact_normal;
        let handles = self.bodies();
        let rcp = self.relative_contact_position;
        let mut angular_inertia = [0.0; 2];
        let mut linear_inertia = [0.0; 2];
        let mut total_inertia = 0.0;

        for i in 0..2 {
            if let Some(body) = handles[i].and_then(|h| bodies.get(h)) {
                let angular_inertia_world = (body.inverse_inertia_tensor_world() * rcp[i].cross(n)).cross(rcp[i]);
                angular_inertia[i] = angular_inertia_world.dot(n);
                linear_inertia[i] = body.inverse_mass;
                total_inertia += linear_inertia[i] + angular_inertia[i];
            }
        }
        if total_inertia <= 0.0 {
            return no_changes();
        }

        let (mut linear_change, mut angular_change) = no_changes();
        for i in 0..2 {
            let body = match handles[i].and_then(|h| bodies.get_mut(h)) {
                Some(body) => body,
                None => continue,
            };
            let sign = if i == 0 { 1.0 } else { -1.0 };
            let mut angular_move = sign * penetration * (angular_inertia[i] / total_inertia);
            let mut linear_move = sign * penetration * (linear_inertia[i] / total_inertia);

            // Large rotations on bodies with small lever arms look wrong, so
            // hand the excess over to linear motion.
            let projection = rcp[i] - n * rcp[i].dot(n);
            let max_magnitude = ANGULAR_LIMIT * projection.magnitude();
            if angular_move < -max_magnitude {
                let total_move = angular_move + linear_move;
                angular_move = -max_magnitude;
                linear_move = total_move - angular_move;
            } else if angular_move > max_magnitude {
                let total_move = angular_move + linear_move;
                angular_move = max_magnitude;
                linear_move = total_move - angular_move;
            }

            if angular_move != 0.0 && angular_inertia[i] != 0.0 {
                let target_angular_direction = rcp[i].cross(n);
                angular_change[i] = body.inverse_inertia_tensor_world()
                    * target_angular_direction
                    * (angular_move / angular_inertia[i]);
            }
            linear_change[i] = n * linear_move;

            body.position += linear_change[i];
            body.orientation = add_scaled_rotation(body.orientation, angular_change[i], 1.0);
            body.calculate_derived_data();
        }
        (linear_change, angular_change)
    }
}

/// Produces contacts between rigid bodies.
pub trait ContactGenerator {
    /// Appends at most `limit` contacts to `contacts` and returns the number
    /// written.
    fn add_contact(&self, bodies: &BodySet, contacts: &mut Vec<Contact>, limit: usize) -> usize;
}

/// Resolves rigid body contacts in two passes: interpenetration first, then
/// velocity. Each pass repeatedly picks the worst contact, resolves it, and
/// updates every contact sharing a body with it.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactResolver {
    velocity_iterations: usize,
    position_iterations: usize,
    velocity_epsilon: Real,
    position_epsilon: Real,
    velocity_iterations_used: usize,
    position_iterations_used: usize,
}

impl ContactResolver {
    pub fn new(iterations: usize) -> Self {
        ContactResolver::with_epsilon(iterations, 0.01, 0.01)
    }

    pub fn with_epsilon(iterations: usize, velocity_epsilon: Real, position_epsilon: Real) -> Self {
        ContactResolver {
            velocity_iterations: iterations,
            position_iterations: iterations,
            velocity_epsilon,
            position_epsilon,
            velocity_iterations_used: 0,
            position_iterations_used: 0,
        }
    }

    /// Sets both iteration budgets.
    pub fn set_iterations(&mut self, iterations: usize) {
        self.velocity_iterations = iterations;
        self.position_iterations = iterations;
    }

    pub fn set_velocity_iterations(&mut self, iterations: usize) {
        self.velocity_iterations = iterations;
    }

    pub fn set_position_iterations(&mut self, iterations: usize) {
        self.position_iterations = iterations;
    }

    pub fn set_epsilon(&mut self, velocity_epsilon: Real, position_epsilon: Real) {
        self.velocity_epsilon = velocity_epsilon;
        self.position_epsilon = position_epsilon;
    }

    pub fn velocity_iterations(&self) -> usize {
        self.velocity_iterations
    }

    pub fn position_iterations(&self) -> usize {
        self.position_iterations
    }

    pub fn velocity_iterations_used(&self) -> usize {
        self.velocity_iterations_used
    }

    pub fn position_iterations_used(&self) -> usize {
        self.position_iterations_used
    }

    pub fn is_valid(&self) -> bool {
        self.velocity_iterations > 0
            && self.position_iterations > 0
            && self.velocity_epsilon >= 0.0
            && self.position_epsilon >= 0.0
    }

    pub fn resolve_contacts(&mut self, contacts: &mut [Contact], bodies: &mut BodySet, duration: Real) {
        self.velocity_iterations_used = 0;
        self.position_iterations_used = 0;
        if contacts.is_empty() || !self.is_valid() {
            return;
        }

        self.prepare_contacts(contacts, bodies, duration);
        self.adjust_positions(contacts, bodies);
        self.adjust_velocities(contacts, bodies, duration);

        trace!(
            contacts = contacts.len(),
            position_iterations_used = self.position_iterations_used,
            velocity_iterations_used = self.velocity_iterations_used,
            "resolved body contacts"
        );
    }

    fn prepare_contacts(&self, contacts: &mut [Contact], bodies: &BodySet, duration: Real) {
        for contact in contacts.iter_mut() {
            contact.calculate_internals(bodies, duration);
        }
    }

    fn adjust_positions(&mut self, contacts: &mut [Contact], bodies: &mut BodySet) {
        while self.position_iterations_used < self.position_iterations {
            let mut max = self.position_epsilon;
            let mut index = None;
            for (i, contact) in contacts.iter().enumerate() {
                if contact.penetration > max && contact.is_movable(bodies) {
                    max = contact.penetration;
                    index = Some(i);
                }
            }
            let index = match index {
                Some(index) => index,
                None => break,
            };

            contacts[index].match_awake_state(bodies);
            let (linear_change, angular_change) = contacts[index].apply_position_change(bodies, max);
            let resolved = contacts[index].bodies();

            for contact in contacts.iter_mut() {
                let handles = contact.bodies();
                for b in 0..2 {
                    if handles[b].is_none() {
                        continue;
                    }
                    for d in 0..2 {
                        if handles[b] == resolved[d] {
                            let delta_position = linear_change[d]
                                + angular_change[d].cross(contact.relative_contact_position[b]);
                            let sign = if b == 1 { 1.0 } else { -1.0 };
                            contact.penetration += delta_position.dot(contact.contact_normal) * sign;
                        }
                    }
                }
            }
            self.position_iterations_used += 1;
        }
    }

    fn adjust_velocities(&mut self, contacts: &mut [Contact], bodies: &mut BodySet, duration: Real) {
        while self.velocity_iterations_used < self.velocity_iterations {
            let mut max = self.velocity_epsilon;
            let mut index = None;
            for (i, contact) in contacts.iter().enumerate() {
                if contact.desired_delta_velocity > max && contact.is_movable(bodies) {
                    max = contact.desired_delta_velocity;
                    index = Some(i);
                }
            }
            let index = match index {
                Some(index) => index,
                None => break,
            };

            contacts[index].match_awake_state(bodies);
            let (velocity_change, rotation_change) = contacts[index].apply_velocity_change(bodies);
            let resolved = contacts[index].bodies();

            for contact in contacts.iter_mut() {
                let handles = contact.bodies();
                for b in 0..2 {
                    if handles[b].is_none() {
                        continue;
                    }
                    for d in 0..2 {
                        if handles[b] == resolved[d] {
                            let delta_vel = velocity_change[d]
                                + rotation_change[d].cross(contact.relative_contact_position[b]);
                            let sign = if b == 1 { -1.0 } else { 1.0 };
                            contact.contact_velocity += contact.contact_to_world.transpose() * delta_vel * sign;
                            contact.calculate_desired_delta_velocity(bodies, duration);
                        }
                    }
                }
            }
            self.velocity_iterations_used += 1;
        }
    }
}
