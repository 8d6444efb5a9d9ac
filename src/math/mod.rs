mod geometry;

use nalgebra as na;

pub use geometry::{
    barycentric_line, barycentric_triangle, closest_line_parameters, inverse_inertia_world,
    lever_arm_impulse_rotation, lever_arm_weight, tet_volume, triangle_area,
};

/// Scalar type used throughout the engine
pub type Real = f64;

/// A 3D vector
pub type Vector3 = na::Vector3<Real>;

/// A 3x3 matrix (inertia tensors, deformation gradients)
pub type Matrix3 = na::Matrix3<Real>;

/// A unit quaternion representing an orientation
pub type Quaternion = na::UnitQuaternion<Real>;

/// Constant for a very small number, used for comparisons
pub const EPSILON: Real = 1.0e-10;

/// Largest rotation (in radians) a single projection may apply to a rigid body
pub const MAX_ROTATION_PER_PROJECTION: Real = 0.5;

/// Returns true if the two floating point values are approximately equal
#[inline]
pub fn approx_eq(a: Real, b: Real) -> bool {
    approx::abs_diff_eq!(a, b, epsilon = EPSILON)
}

/// Returns true if the value is approximately zero
#[inline]
pub fn approx_zero(a: Real) -> bool {
    a.abs() < EPSILON
}

/// Returns `dir` normalized, or `None` when its length is (nearly) zero
#[inline]
pub fn try_normalize(dir: &Vector3) -> Option<Vector3> {
    dir.try_normalize(EPSILON)
}

/// Inverts a symmetric inertia tensor, returning zero for singular tensors
#[inline]
pub fn safe_inverse(m: &Matrix3) -> Matrix3 {
    m.try_inverse().unwrap_or_else(Matrix3::zeros)
}

/// Applies a small rotation vector to an orientation as a half-step quaternion increment
///
/// Computes `q + 0.5 * (0, rot) * q` and renormalizes.
pub fn integrate_rotation(q: &Quaternion, rot: &Vector3) -> Quaternion {
    let qv = q.into_inner();
    let dq = na::Quaternion::new(0.0, rot.x, rot.y, rot.z) * qv;
    Quaternion::new_normalize(qv + dq * 0.5)
}
