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

use crate::body::{BodyHandle, BodySet};
use crate::contact::{Contact, ContactGenerator};
use crate::math::*;

/// Holds a point on one body close to a point on another.
///
/// A joint is a contact generator: whenever the two points drift more than
/// `error` apart it produces a contact that pulls them back together. The
/// contact never bounces and has full friction.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub bodies: [BodyHandle; 2],
    /// Joint location on each body, in that body's local space.
    pub positions: [Vector3<Real>; 2],
    /// Allowed separation before the joint acts.
    pub error: Real,
}

impl Joint {
    pub fn new(
        a: BodyHandle,
        a_position: Vector3<Real>,
        b: BodyHandle,
        b_position: Vector3<Real>,
        error: Real,
    ) -> Self {
        Joint {
            bodies: [a, b],
            positions: [a_position, b_position],
            error,
        }
    }

    /// Both joint points in world space.
    pub fn world_positions(&self, bodies: &BodySet) -> Option<[Vector3<Real>; 2]> {
        let a = bodies.get(self.bodies[0])?;
        let b = bodies.get(self.bodies[1])?;
        Some([
            a.point_in_world_space(self.positions[0]),
            b.point_in_world_space(self.positions[1]),
        ])
    }

    /// Distance between the two joint points.
    pub fn separation(&self, bodies: &BodySet) -> Option<Real> {
        self.world_positions(bodies).map(|[a, b]| (b - a).magnitude())
    }
}

impl ContactGenerator for Joint {
    fn add_contact(&self, bodies: &BodySet, contacts: &mut Vec<Contact>, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }
        let [a, b] = match self.world_positions(bodies) {
            Some(positions) => positions,
            None => return 0,
        };
        let a_to_b = b - a;
        let length = a_to_b.magnitude();
        if length <= self.error {
            return 0;
        }
        contacts.push(Contact::new(
            self.bodies[0],
            Some(self.bodies[1]),
            (a + b) * 0.5,
            a_to_b / length,
            length - self.error,
            0.0,
            1.0,
        ));
        1
    }
}
