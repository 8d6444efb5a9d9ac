use super::{Matrix3, Quaternion, Real, Vector3, EPSILON, MAX_ROTATION_PER_PROJECTION};

/// Signed volume of the tetrahedron (x0, x1, x2, x3)
pub fn tet_volume(x0: &Vector3, x1: &Vector3, x2: &Vector3, x3: &Vector3) -> Real {
    (x1 - x0).cross(&(x2 - x0)).dot(&(x3 - x0)) / 6.0
}

/// Area of the triangle (x0, x1, x2)
pub fn triangle_area(x0: &Vector3, x1: &Vector3, x2: &Vector3) -> Real {
    0.5 * (x1 - x0).cross(&(x2 - x0)).norm()
}

/// Parametric coordinates `[1 - u, u]` of the projection of `p` onto the line (a, b)
///
/// Returns `None` for a zero length segment.
pub fn barycentric_line(p: &Vector3, a: &Vector3, b: &Vector3) -> Option<[Real; 2]> {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < EPSILON {
        return None;
    }
    let u = (p - a).dot(&ab) / len2;
    Some([1.0 - u, u])
}

/// Barycentric coordinates of `p` projected onto the plane of triangle (a, b, c)
///
/// Returns `None` if the triangle is degenerate.
pub fn barycentric_triangle(p: &Vector3, a: &Vector3, b: &Vector3, c: &Vector3) -> Option<[Real; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1.0e-12 {
        return None;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Some([1.0 - v - w, v, w])
}

/// Parameters of the closest points between the lines through (a0, a1) and (b0, b1)
///
/// Returns `(s, t)` unclamped, such that the closest points are `a0 + s (a1 - a0)` and
/// `b0 + t (b1 - b0)`. The points lie on both segments only when both are in `[0, 1]`.
/// Returns `None` for a zero length segment or parallel lines.
pub fn closest_line_parameters(a0: &Vector3, a1: &Vector3, b0: &Vector3, b1: &Vector3) -> Option<(Real, Real)> {
    let d1 = a1 - a0;
    let d2 = b1 - b0;
    let r = a0 - b0;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    if a < EPSILON || e < EPSILON {
        return None;
    }

    let b = d1.dot(&d2);
    let c = d1.dot(&r);
    let f = d2.dot(&r);
    let denom = a * e - b * b;
    if denom < EPSILON * a * e {
        return None;
    }
    let s = (b * f - c * e) / denom;
    let t = (a * f - b * c) / denom;
    Some((s, t))
}

/// Rotates a body frame inverse inertia tensor into world space
pub fn inverse_inertia_world(q: &Quaternion, inv_inertia: &Matrix3) -> Matrix3 {
    let r = q.to_rotation_matrix();
    r.matrix() * inv_inertia * r.matrix().transpose()
}

/// Angular contribution of a lever arm to the generalized inverse mass
///
/// `l = q^-1 (r x n)`, returns `l . (I^-1 l)` with the inverse inertia in the body frame.
pub fn lever_arm_weight(q: &Quaternion, inv_inertia: &Matrix3, r: &Vector3, n: &Vector3) -> Real {
    let l = q.inverse_transform_vector(&r.cross(n));
    l.dot(&(inv_inertia * l))
}

/// Rotation vector produced by applying impulse `p` at lever arm `r`
///
/// The result is expressed in world space and clamped to the per-projection limit.
pub fn lever_arm_impulse_rotation(q: &Quaternion, inv_inertia: &Matrix3, r: &Vector3, p: &Vector3) -> Vector3 {
    let local = inv_inertia * q.inverse_transform_vector(&r.cross(p));
    let mut rot = q.transform_vector(&local);
    let angle = rot.norm();
    if angle > MAX_ROTATION_PER_PROJECTION {
        rot *= MAX_ROTATION_PER_PROJECTION / angle;
    }
    rot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unit_tet_volume() {
        let v = tet_volume(
            &Vector3::zeros(),
            &Vector3::x(),
            &Vector3::y(),
            &Vector3::z(),
        );
        assert_relative_eq!(v, 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn crossing_segments_meet_in_the_middle() {
        let (s, t) = closest_line_parameters(
            &Vector3::new(-1.0, 0.0, 0.0),
            &Vector3::new(1.0, 0.0, 0.0),
            &Vector3::new(0.0, -1.0, 1.0),
            &Vector3::new(0.0, 1.0, 1.0),
        )
        .unwrap();
        assert_relative_eq!(s, 0.5, epsilon = 1e-12);
        assert_relative_eq!(t, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn line_parameters_are_not_clamped() {
        let (s, t) = closest_line_parameters(
            &Vector3::new(1.0, 0.0, 0.0),
            &Vector3::new(2.0, 0.0, 0.0),
            &Vector3::new(0.0, -1.0, 1.0),
            &Vector3::new(0.0, 1.0, 1.0),
        )
        .unwrap();
        assert_relative_eq!(s, -1.0, epsilon = 1e-12);
        assert_relative_eq!(t, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn parallel_lines_have_no_closest_parameters() {
        assert!(closest_line_parameters(
            &Vector3::zeros(),
            &Vector3::x(),
            &Vector3::y(),
            &Vector3::new(1.0, 1.0, 0.0),
        )
        .is_none());
    }

    #[test]
    fn triangle_weights_sum_to_one() {
        let w = barycentric_triangle(
            &Vector3::new(0.25, 0.25, 3.0),
            &Vector3::zeros(),
            &Vector3::x(),
            &Vector3::y(),
        )
        .unwrap();
        assert_relative_eq!(w[0] + w[1] + w[2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(w[1], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn rotation_is_clamped() {
        let rot = lever_arm_impulse_rotation(
            &Quaternion::identity(),
            &Matrix3::identity(),
            &Vector3::x(),
            &Vector3::new(0.0, 100.0, 0.0),
        );
        assert_relative_eq!(rot.norm(), MAX_ROTATION_PER_PROJECTION, epsilon = 1e-12);
    }
}
