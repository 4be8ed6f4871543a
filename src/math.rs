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

use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, Quaternion, SquareMatrix, Vector3, Zero};

/// The precision every simulation quantity is stored in.
#[cfg(not(feature = "f64"))]
pub type Real = f32;

/// The precision every simulation quantity is stored in.
#[cfg(feature = "f64")]
pub type Real = f64;

/// Largest representable `Real`, used as "no contact found yet".
pub const REAL_MAX: Real = Real::MAX;

/// Separating velocities and penetrations within this of zero count as
/// resolved.
pub const COLLISION_EPSILON: Real = 0.000001;

/// The world up vector. Ground planes face this way.
pub const UP: Vector3<Real> = Vector3 { x: 0.0, y: 1.0, z: 0.0 };

/// Normalizes `v`, returning the zero vector for zero-length input instead
/// of a vector of NaNs.
#[inline]
pub fn normalize_or_zero(v: Vector3<Real>) -> Vector3<Real> {
    let mag2 = v.magnitude2();
    if mag2 > 0.0 {
        v / mag2.sqrt()
    } else {
        Vector3::zero()
    }
}

/// Advances an orientation by an angular velocity scaled by `scale`, using
/// the quaternion derivative `dq = 0.5 * w * q`. The result is not
/// normalized.
#[inline]
pub fn add_scaled_rotation(q: Quaternion<Real>, v: Vector3<Real>, scale: Real) -> Quaternion<Real> {
    let w = Quaternion::from_sv(0.0, v * scale);
    q + w * q * 0.5
}

/// Builds the 4x4 transform of a body from its position and orientation.
#[inline]
pub fn transform_matrix(position: Vector3<Real>, orientation: Quaternion<Real>) -> Matrix4<Real> {
    Matrix4::from_translation(position) * Matrix4::from(orientation)
}

/// The upper-left rotation block of a rigid transform.
#[inline]
pub fn rotation_part(m: &Matrix4<Real>) -> Matrix3<Real> {
    Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate())
}

/// The translation column of a rigid transform.
#[inline]
pub fn translation_part(m: &Matrix4<Real>) -> Vector3<Real> {
    m.w.truncate()
}

/// Transforms a point from local into world space.
#[inline]
pub fn transform_point(m: &Matrix4<Real>, p: Vector3<Real>) -> Vector3<Real> {
    rotation_part(m) * p + translation_part(m)
}

/// Transforms a point from world into local space. Assumes `m` is a rigid
/// transform (rotation plus translation).
#[inline]
pub fn transform_inverse(m: &Matrix4<Real>, p: Vector3<Real>) -> Vector3<Real> {
    rotation_part(m).transpose() * (p - translation_part(m))
}

/// Rotates a direction from local into world space.
#[inline]
pub fn transform_direction(m: &Matrix4<Real>, d: Vector3<Real>) -> Vector3<Real> {
    rotation_part(m) * d
}

/// Rotates a direction from world into local space.
#[inline]
pub fn transform_inverse_direction(m: &Matrix4<Real>, d: Vector3<Real>) -> Vector3<Real> {
    rotation_part(m).transpose() * d
}

/// Returns the world-space inverse inertia tensor for a body-space tensor
/// and the body's rotation.
#[inline]
pub fn transform_inertia_tensor(iit_body: &Matrix3<Real>, rotation: &Matrix3<Real>) -> Matrix3<Real> {
    *rotation * *iit_body * rotation.transpose()
}

/// Linear interpolation of every entry of two matrices.
#[inline]
pub fn lerp_matrix3(a: &Matrix3<Real>, b: &Matrix3<Real>, t: Real) -> Matrix3<Real> {
    *a * (1.0 - t) + *b * t
}

/// The matrix `M` such that `M * w == v.cross(w)`.
#[inline]
pub fn skew_symmetric(v: Vector3<Real>) -> Matrix3<Real> {
    Matrix3::new(
        0.0, v.z, -v.y,
        -v.z, 0.0, v.x,
        v.y, -v.x, 0.0,
    )
}

/// Builds an orthonormal basis with `x` as the first column. The remaining
/// two columns are tangent to `x` and chosen to be numerically stable.
pub fn orthonormal_basis(x: Vector3<Real>) -> Matrix3<Real> {
    let (t0, t1) = if x.x.abs() > x.y.abs() {
        // Closer to the world X axis, so build from world Y.
        let s = 1.0 / (x.z * x.z + x.x * x.x).sqrt();
        let t0 = Vector3::new(x.z * s, 0.0, -x.x * s);
        let t1 = Vector3::new(x.y * t0.x, x.z * t0.x - x.x * t0.z, -x.y * t0.x);
        (t0, t1)
    } else {
        // Closer to the world Y axis, so build from world X.
        let s = 1.0 / (x.z * x.z + x.y * x.y).sqrt();
        let t0 = Vector3::new(0.0, -x.z * s, x.y * s);
        let t1 = Vector3::new(x.y * t0.z - x.z * t0.y, -x.x * t0.z, x.x * t0.y);
        (t0, t1)
    };
    Matrix3::from_cols(x, t0, t1)
}

/// A shape with a moment of inertia.
pub trait Inertia {
    fn tensor(&self, m: Real) -> Matrix3<Real>;
}

/// Inertia tensor of a solid sphere.
pub fn sphere_inertia_tensor(radius: Real, mass: Real) -> Matrix3<Real> {
    let i = 0.4 * mass * radius * radius;
    Matrix3::from_diagonal(Vector3::new(i, i, i))
}

/// Inertia tensor of a solid cuboid given its half extents.
pub fn cuboid_inertia_tensor(half_size: Vector3<Real>, mass: Real) -> Matrix3<Real> {
    let sq = Vector3::new(
        half_size.x * half_size.x,
        half_size.y * half_size.y,
        half_size.z * half_size.z,
    ) * 4.0;
    let k = mass / 12.0;
    Matrix3::from_diagonal(Vector3::new(
        k * (sq.y + sq.z),
        k * (sq.x + sq.z),
        k * (sq.x + sq.y),
    ))
}
