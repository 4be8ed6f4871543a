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

//! Collision primitives attached to rigid bodies, and the narrow-phase tests
//! that turn overlapping primitives into contacts.
//!
//! Primitives come in two kinds:
//!
//! - `Sphere` and `Cuboid` are attached to a body with an offset transform
//!   and move with it.
//! - `Plane` is fixed scenery. Most tests treat it as a half-space, with
//!   everything behind the plane solid. `Sphere::collide_true_plane`
//!   treats it as a plane with two sides.
//!
//! `Overlaps` answers a yes or no question cheaply; `Collide` writes full
//! contacts into a `CollisionData`. Contact normals always point towards the
//! contact's first body.

use cgmath::{InnerSpace, Matrix4, SquareMatrix, Vector3};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::body::{BodyHandle, BodySet};
use crate::contact::{Contact, ContactGenerator};
use crate::math::*;

/// Axes shorter than this are parallel edge pairs and carry no information.
const PARALLEL_EPSILON: Real = 0.0001;

/// A fixed plane: every point `p` with `p.dot(normal) == offset`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Unit normal.
    pub normal: Vector3<Real>,
    pub offset: Real,
}

impl Plane {
    pub fn new(normal: Vector3<Real>, offset: Real) -> Self {
        Plane { normal, offset }
    }

    /// The ground plane y = 0.
    pub fn ground() -> Self {
        Plane::new(UP, 0.0)
    }

    /// Signed distance of `p` in front of the plane.
    pub fn distance(&self, p: Vector3<Real>) -> Real {
        p.dot(self.normal) - self.offset
    }
}

/// A sphere attached to a body.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub body: BodyHandle,
    /// Placement relative to the body.
    pub offset: Matrix4<Real>,
    pub radius: Real,
}

impl Sphere {
    pub fn new(body: BodyHandle, radius: Real) -> Self {
        Sphere {
            body,
            offset: Matrix4::identity(),
            radius,
        }
    }

    /// Centre in world space, or `None` if the body is gone.
    pub fn centre(&self, bodies: &BodySet) -> Option<Vector3<Real>> {
        let body = bodies.get(self.body)?;
        Some(translation_part(&(*body.transform() * self.offset)))
    }

    /// Contacts against a plane with two sides. The sphere is pushed out
    /// on whichever side its centre is.
    pub fn collide_true_plane(&self, plane: &Plane, bodies: &BodySet, data: &mut CollisionData) -> usize {
        let centre = match self.centre(bodies) {
            Some(centre) => centre,
            None => return 0,
        };
        let centre_distance = plane.distance(centre);
        if centre_distance * centre_distance > self.radius * self.radius {
            return 0;
        }

        let (normal, depth) = if centre_distance < 0.0 {
            (-plane.normal, centre_distance)
        } else {
            (plane.normal, -centre_distance)
        };
        data.add(
            self.body,
            None,
            centre - plane.normal * centre_distance,
            normal,
            depth + self.radius,
        )
    }
}

impl Inertia for Sphere {
    fn tensor(&self, m: Real) -> cgmath::Matrix3<Real> {
        sphere_inertia_tensor(self.radius, m)
    }
}

/// A box attached to a body.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cuboid {
    pub body: BodyHandle,
    /// Placement relative to the body.
    pub offset: Matrix4<Real>,
    pub half_size: Vector3<Real>,
}

impl Cuboid {
    pub fn new(body: BodyHandle, half_size: Vector3<Real>) -> Self {
        Cuboid {
            body,
            offset: Matrix4::identity(),
            half_size,
        }
    }

    fn placed(&self, bodies: &BodySet) -> Option<OrientedBox> {
        let body = bodies.get(self.body)?;
        Some(OrientedBox {
            half_size: self.half_size,
            transform: *body.transform() * self.offset,
        })
    }

    /// The eight corners in world space.
    pub fn vertices(&self, bodies: &BodySet) -> Option<SmallVec<[Vector3<Real>; 8]>> {
        self.placed(bodies).map(|b| b.vertices())
    }

    /// Contact between the box and a point that is not attached to any
    /// body. The normal pushes the box away from the point along the face
    /// the point is nearest to.
    pub fn collide_point(&self, point: Vector3<Real>, bodies: &BodySet, data: &mut CollisionData) -> usize {
        let placed = match self.placed(bodies) {
            Some(placed) => placed,
            None => return 0,
        };
        let local = transform_inverse(&placed.transform, point);

        let mut min_depth = REAL_MAX;
        let mut normal = Vector3::new(0.0, 0.0, 0.0);
        for i in 0..3 {
            let depth = self.half_size[i] - local[i].abs();
            if depth < 0.0 {
                return 0;
            }
            if depth < min_depth {
                min_depth = depth;
                normal = placed.axis(i) * if local[i] < 0.0 { 1.0 } else { -1.0 };
            }
        }
        data.add(self.body, None, point, normal, min_depth)
    }
}

impl Inertia for Cuboid {
    fn tensor(&self, m: Real) -> cgmath::Matrix3<Real> {
        cuboid_inertia_tensor(self.half_size, m)
    }
}

/// A box placed in world space for one test.
#[derive(Copy, Clone, Debug)]
struct OrientedBox {
    half_size: Vector3<Real>,
    transform: Matrix4<Real>,
}

impl OrientedBox {
    /// Local axis `i` in world space; axis 3 is the centre.
    fn axis(&self, i: usize) -> Vector3<Real> {
        self.transform[i].truncate()
    }

    fn centre(&self) -> Vector3<Real> {
        self.axis(3)
    }

    /// Half the length of the box projected onto `axis`.
    fn project(&self, axis: Vector3<Real>) -> Real {
        self.half_size.x * axis.dot(self.axis(0)).abs()
            + self.half_size.y * axis.dot(self.axis(1)).abs()
            + self.half_size.z * axis.dot(self.axis(2)).abs()
    }

    fn vertices(&self) -> SmallVec<[Vector3<Real>; 8]> {
        const SIGNS: [[Real; 3]; 8] = [
            [1.0, 1.0, 1.0],
            [-1.0, 1.0, 1.0],
            [1.0, -1.0, 1.0],
            [-1.0, -1.0, 1.0],
            [1.0, 1.0, -1.0],
            [-1.0, 1.0, -1.0],
            [1.0, -1.0, -1.0],
            [-1.0, -1.0, -1.0],
        ];
        SIGNS
            .iter()
            .map(|s| {
                let local = Vector3::new(s[0] * self.half_size.x, s[1] * self.half_size.y, s[2] * self.half_size.z);
                transform_point(&self.transform, local)
            })
            .collect()
    }

    fn overlaps_half_space(&self, plane: &Plane) -> bool {
        let box_distance = plane.normal.dot(self.centre()) - self.project(plane.normal);
        box_distance <= plane.offset
    }

    /// Overlap of the two boxes along `axis`. Negative means separated.
    fn penetration_on_axis(&self, other: &OrientedBox, axis: Vector3<Real>, to_centre: Vector3<Real>) -> Real {
        self.project(axis) + other.project(axis) - to_centre.dot(axis).abs()
    }

    /// The candidate separating axes: the face normals of both boxes, then
    /// the cross products of every pair of edges.
    fn separating_axes(&self, other: &OrientedBox) -> SmallVec<[Vector3<Real>; 15]> {
        let mut axes = SmallVec::new();
        for i in 0..3 {
            axes.push(self.axis(i));
        }
        for i in 0..3 {
            axes.push(other.axis(i));
        }
        for i in 0..3 {
            for j in 0..3 {
                axes.push(self.axis(i).cross(other.axis(j)));
            }
        }
        axes
    }
}

/// Where contacts go, and the material used for them.
pub struct CollisionData<'a> {
    contacts: &'a mut Vec<Contact>,
    limit: usize,
    written: usize,
    pub friction: Real,
    pub restitution: Real,
}

impl<'a> CollisionData<'a> {
    /// Writes at most `limit` contacts to the end of `contacts`.
    pub fn new(contacts: &'a mut Vec<Contact>, limit: usize, friction: Real, restitution: Real) -> Self {
        CollisionData {
            contacts,
            limit,
            written: 0,
            friction,
            restitution,
        }
    }

    pub fn contacts_left(&self) -> usize {
        self.limit - self.written
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Adds a contact if there is room. Returns the number added.
    pub fn add(
        &mut self,
        body: BodyHandle,
        other: Option<BodyHandle>,
        point: Vector3<Real>,
        normal: Vector3<Real>,
        penetration: Real,
    ) -> usize {
        if self.contacts_left() == 0 {
            return 0;
        }
        self.contacts.push(Contact::new(
            body,
            other,
            point,
            normal,
            penetration,
            self.restitution,
            self.friction,
        ));
        self.written += 1;
        1
    }
}

/// A type that can overlap another.
pub trait Overlaps<RHS> {
    /// Returns true if the two objects overlap. Primitives on removed
    /// bodies never overlap anything.
    fn overlaps(&self, rhs: &RHS, bodies: &BodySet) -> bool;
}

impl Overlaps<Plane> for Sphere {
    fn overlaps(&self, plane: &Plane, bodies: &BodySet) -> bool {
        self.centre(bodies)
            .map_or(false, |c| plane.distance(c) - self.radius <= 0.0)
    }
}

impl Overlaps<Sphere> for Sphere {
    fn overlaps(&self, rhs: &Sphere, bodies: &BodySet) -> bool {
        match (self.centre(bodies), rhs.centre(bodies)) {
            (Some(a), Some(b)) => {
                let r = self.radius + rhs.radius;
                (a - b).magnitude2() < r * r
            }
            _ => false,
        }
    }
}

impl Overlaps<Plane> for Cuboid {
    fn overlaps(&self, plane: &Plane, bodies: &BodySet) -> bool {
        self.placed(bodies).map_or(false, |b| b.overlaps_half_space(plane))
    }
}

impl Overlaps<Cuboid> for Cuboid {
    fn overlaps(&self, rhs: &Cuboid, bodies: &BodySet) -> bool {
        let (one, two) = match (self.placed(bodies), rhs.placed(bodies)) {
            (Some(one), Some(two)) => (one, two),
            _ => return false,
        };
        let to_centre = two.centre() - one.centre();
        one.separating_axes(&two)
            .iter()
            .filter(|axis| axis.magnitude2() >= PARALLEL_EPSILON)
            .all(|axis| one.penetration_on_axis(&two, axis.normalize(), to_centre) >= 0.0)
    }
}

/// A type that can generate contacts with another.
pub trait Collide<RHS> {
    /// Writes a contact for every point where the two objects touch into
    /// `data` and returns the number written.
    fn collide(&self, rhs: &RHS, bodies: &BodySet, data: &mut CollisionData) -> usize;
}

impl Collide<Plane> for Sphere {
    fn collide(&self, plane: &Plane, bodies: &BodySet, data: &mut CollisionData) -> usize {
        let centre = match self.centre(bodies) {
            Some(centre) => centre,
            None => return 0,
        };
        let ball_distance = plane.distance(centre) - self.radius;
        if ball_distance >= 0.0 {
            return 0;
        }
        data.add(
            self.body,
            None,
            centre - plane.normal * (ball_distance + self.radius),
            plane.normal,
            -ball_distance,
        )
    }
}

impl Collide<Sphere> for Sphere {
    fn collide(&self, rhs: &Sphere, bodies: &BodySet, data: &mut CollisionData) -> usize {
        let (one, two) = match (self.centre(bodies), rhs.centre(bodies)) {
            (Some(one), Some(two)) => (one, two),
            _ => return 0,
        };
        let midline = one - two;
        let size = midline.magnitude();
        if size <= 0.0 || size >= self.radius + rhs.radius {
            return 0;
        }
        data.add(
            self.body,
            Some(rhs.body),
            two + midline * 0.5,
            midline / size,
            self.radius + rhs.radius - size,
        )
    }
}

impl Collide<Plane> for Cuboid {
    fn collide(&self, plane: &Plane, bodies: &BodySet, data: &mut CollisionData) -> usize {
        let placed = match self.placed(bodies) {
            Some(placed) => placed,
            None => return 0,
        };
        if !placed.overlaps_half_space(plane) {
            return 0;
        }

        let mut written = 0;
        for vertex in placed.vertices() {
            let distance = plane.distance(vertex);
            if distance <= 0.0 {
                if data.contacts_left() == 0 {
                    break;
                }
                // Contact point on the plane, directly above the vertex.
                written += data.add(self.body, None, vertex - plane.normal * distance, plane.normal, -distance);
            }
        }
        written
    }
}

impl Collide<Sphere> for Cuboid {
    fn collide(&self, sphere: &Sphere, bodies: &BodySet, data: &mut CollisionData) -> usize {
        let (placed, centre) = match (self.placed(bodies), sphere.centre(bodies)) {
            (Some(placed), Some(centre)) => (placed, centre),
            _ => return 0,
        };
        let rel_centre = transform_inverse(&placed.transform, centre);
        for i in 0..3 {
            if rel_centre[i].abs() - sphere.radius > self.half_size[i] {
                return 0;
            }
        }

        let mut closest = rel_centre;
        for i in 0..3 {
            closest[i] = closest[i].max(-self.half_size[i]).min(self.half_size[i]);
        }
        let dist2 = (closest - rel_centre).magnitude2();
        if dist2 > sphere.radius * sphere.radius {
            return 0;
        }

        if dist2 > 0.0 {
            let closest_world = transform_point(&placed.transform, closest);
            return data.add(
                self.body,
                Some(sphere.body),
                closest_world,
                (closest_world - centre).normalize(),
                sphere.radius - dist2.sqrt(),
            );
        }

        // The centre is inside the box: push out through the nearest face.
        let mut axis = 0;
        for i in 1..3 {
            if self.half_size[i] - rel_centre[i].abs() < self.half_size[axis] - rel_centre[axis].abs() {
                axis = i;
            }
        }
        let sign = if rel_centre[axis] < 0.0 { 1.0 } else { -1.0 };
        data.add(
            self.body,
            Some(sphere.body),
            centre,
            placed.axis(axis) * sign,
            sphere.radius + self.half_size[axis] - rel_centre[axis].abs(),
        )
    }
}

impl Collide<Cuboid> for Sphere {
    fn collide(&self, cuboid: &Cuboid, bodies: &BodySet, data: &mut CollisionData) -> usize {
        cuboid.collide(self, bodies, data)
    }
}

impl Collide<Cuboid> for Cuboid {
    fn collide(&self, rhs: &Cuboid, bodies: &BodySet, data: &mut CollisionData) -> usize {
        let (one, two) = match (self.placed(bodies), rhs.placed(bodies)) {
            (Some(one), Some(two)) => (one, two),
            _ => return 0,
        };
        let to_centre = two.centre() - one.centre();

        // Find the axis of least penetration, remembering the best face
        // axis separately for the edge-edge fallback below.
        let mut penetration = REAL_MAX;
        let mut best = 0;
        let mut best_single_axis = 0;
        for (index, axis) in one.separating_axes(&two).iter().enumerate() {
            if index == 6 {
                best_single_axis = best;
            }
            if axis.magnitude2() < PARALLEL_EPSILON {
                continue;
            }
            let overlap = one.penetration_on_axis(&two, axis.normalize(), to_centre);
            if overlap < 0.0 {
                return 0;
            }
            if overlap < penetration {
                penetration = overlap;
                best = index;
            }
        }

        if best < 3 {
            return point_face(&one, &two, [self.body, rhs.body], to_centre, best, penetration, data);
        }
        if best < 6 {
            return point_face(&two, &one, [rhs.body, self.body], -to_centre, best - 3, penetration, data);
        }

        // Edge to edge.
        let one_axis_index = (best - 6) / 3;
        let two_axis_index = (best - 6) % 3;
        let one_axis = one.axis(one_axis_index);
        let two_axis = two.axis(two_axis_index);
        let mut axis = one_axis.cross(two_axis).normalize();
        if axis.dot(to_centre) > 0.0 {
            axis = -axis;
        }

        // Pick the edge on each box closest to the other box.
        let mut point_on_one = one.half_size;
        let mut point_on_two = two.half_size;
        for i in 0..3 {
            if i == one_axis_index {
                point_on_one[i] = 0.0;
            } else if one.axis(i).dot(axis) > 0.0 {
                point_on_one[i] = -point_on_one[i];
            }
            if i == two_axis_index {
                point_on_two[i] = 0.0;
            } else if two.axis(i).dot(axis) < 0.0 {
                point_on_two[i] = -point_on_two[i];
            }
        }
        let point_on_one = transform_point(&one.transform, point_on_one);
        let point_on_two = transform_point(&two.transform, point_on_two);

        let vertex = edge_contact_point(
            (point_on_one, one_axis, one.half_size[one_axis_index]),
            (point_on_two, two_axis, two.half_size[two_axis_index]),
            best_single_axis > 2,
        );
        data.add(self.body, Some(rhs.body), vertex, axis, penetration)
    }
}

/// Contact between a vertex of `two` and the face of `one` along axis
/// `best`.
fn point_face(
    one: &OrientedBox,
    two: &OrientedBox,
    bodies: [BodyHandle; 2],
    to_centre: Vector3<Real>,
    best: usize,
    penetration: Real,
    data: &mut CollisionData,
) -> usize {
    let mut normal = one.axis(best);
    if normal.dot(to_centre) > 0.0 {
        normal = -normal;
    }

    let mut vertex = two.half_size;
    for i in 0..3 {
        if two.axis(i).dot(normal) < 0.0 {
            vertex[i] = -vertex[i];
        }
    }
    data.add(
        bodies[0],
        Some(bodies[1]),
        transform_point(&two.transform, vertex),
        normal,
        penetration,
    )
}

/// Closest point between two edges, each given as a point on the edge, its
/// direction and half its length. When the closest point lies off either
/// edge, falls back to the midpoint of one of them.
fn edge_contact_point(
    (point_one, dir_one, one_size): (Vector3<Real>, Vector3<Real>, Real),
    (point_two, dir_two, two_size): (Vector3<Real>, Vector3<Real>, Real),
    use_one: bool,
) -> Vector3<Real> {
    let fallback = if use_one { point_one } else { point_two };

    let sm_one = dir_one.magnitude2();
    let sm_two = dir_two.magnitude2();
    let dp_one_two = dir_two.dot(dir_one);
    let to_st = point_one - point_two;
    let dp_sta_one = dir_one.dot(to_st);
    let dp_sta_two = dir_two.dot(to_st);

    let denom = sm_one * sm_two - dp_one_two * dp_one_two;
    if denom.abs() < PARALLEL_EPSILON {
        return fallback;
    }
    let mua = (dp_one_two * dp_sta_two - sm_two * dp_sta_one) / denom;
    let mub = (sm_one * dp_sta_two - dp_one_two * dp_sta_one) / denom;
    if mua.abs() > one_size || mub.abs() > two_size {
        return fallback;
    }

    let c_one = point_one + dir_one * mua;
    let c_two = point_two + dir_two * mub;
    (c_one + c_two) * 0.5
}

/// Any primitive that can be attached to a body.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Collider {
    Sphere(Sphere),
    Cuboid(Cuboid),
}

impl Collider {
    pub fn body(&self) -> BodyHandle {
        match self {
            Collider::Sphere(s) => s.body,
            Collider::Cuboid(c) => c.body,
        }
    }
}

impl From<Sphere> for Collider {
    fn from(sphere: Sphere) -> Self {
        Collider::Sphere(sphere)
    }
}

impl From<Cuboid> for Collider {
    fn from(cuboid: Cuboid) -> Self {
        Collider::Cuboid(cuboid)
    }
}

impl Inertia for Collider {
    fn tensor(&self, m: Real) -> cgmath::Matrix3<Real> {
        match self {
            Collider::Sphere(s) => s.tensor(m),
            Collider::Cuboid(c) => c.tensor(m),
        }
    }
}

impl Collide<Plane> for Collider {
    fn collide(&self, plane: &Plane, bodies: &BodySet, data: &mut CollisionData) -> usize {
        match self {
            Collider::Sphere(s) => s.collide(plane, bodies, data),
            Collider::Cuboid(c) => c.collide(plane, bodies, data),
        }
    }
}

impl Collide<Collider> for Collider {
    fn collide(&self, rhs: &Collider, bodies: &BodySet, data: &mut CollisionData) -> usize {
        match (self, rhs) {
            (Collider::Sphere(a), Collider::Sphere(b)) => a.collide(b, bodies, data),
            (Collider::Sphere(a), Collider::Cuboid(b)) => a.collide(b, bodies, data),
            (Collider::Cuboid(a), Collider::Sphere(b)) => a.collide(b, bodies, data),
            (Collider::Cuboid(a), Collider::Cuboid(b)) => a.collide(b, bodies, data),
        }
    }
}

/// Contact generator that tests every collider against every half-space and
/// every other collider. Colliders on the same body are never tested
/// against each other.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveContacts {
    pub colliders: Vec<Collider>,
    pub half_spaces: Vec<Plane>,
    pub friction: Real,
    pub restitution: Real,
}

impl PrimitiveContacts {
    pub fn new(friction: Real, restitution: Real) -> Self {
        PrimitiveContacts {
            colliders: Vec::new(),
            half_spaces: Vec::new(),
            friction,
            restitution,
        }
    }

    pub fn add_collider<C: Into<Collider>>(&mut self, collider: C) {
        self.colliders.push(collider.into());
    }

    pub fn add_half_space(&mut self, plane: Plane) {
        self.half_spaces.push(plane);
    }

    /// Drops every collider attached to `body`.
    pub fn remove_body(&mut self, body: BodyHandle) {
        self.colliders.retain(|c| c.body() != body);
    }
}

impl ContactGenerator for PrimitiveContacts {
    fn add_contact(&self, bodies: &BodySet, contacts: &mut Vec<Contact>, limit: usize) -> usize {
        let mut data = CollisionData::new(contacts, limit, self.friction, self.restitution);
        for collider in self.colliders.iter() {
            for plane in self.half_spaces.iter() {
                if data.contacts_left() == 0 {
                    return data.written();
                }
                collider.collide(plane, bodies, &mut data);
            }
        }
        for (i, a) in self.colliders.iter().enumerate() {
            for b in self.colliders[i + 1..].iter() {
                if data.contacts_left() == 0 {
                    return data.written();
                }
                if a.body() != b.body() {
                    a.collide(b, bodies, &mut data);
                }
            }
        }
        data.written()
    }
}
