use crate::constraints::{ConstraintBase, ConstraintFlags, PbdConstraint};
use crate::core::{ParticleId, PbdState, SolverType};
use crate::math::{barycentric_line, barycentric_triangle, closest_line_parameters, Real, EPSILON};

/// Tolerance on barycentric coordinates when boundary collisions are enabled
const BOUNDARY_TOLERANCE: Real = 0.05;

/// Feature pair resolved by a collision constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionKind {
    /// Resolves two points to each other
    PointPoint,

    /// Resolves a point to an edge
    PointEdge,

    /// Pushes a point back to the front side of a triangle
    PointTriangle,

    /// Resolves the closest points of two edges to each other
    EdgeEdge,
}

impl CollisionKind {
    /// Number of participants on side A and on side B
    pub fn side_sizes(self) -> (usize, usize) {
        match self {
            CollisionKind::PointPoint => (1, 1),
            CollisionKind::PointEdge => (1, 2),
            CollisionKind::PointTriangle => (1, 3),
            CollisionKind::EdgeEdge => (2, 2),
        }
    }
}

/// Collision between features of two deformable sides
///
/// The first participants belong to side A, the rest to side B. Each side scales its share
/// of the correction by its own stiffness, so a side with zero stiffness does not move.
/// Collision constraints always use the legacy projection with full strength.
#[derive(Debug, Clone)]
pub struct CollisionConstraint {
    base: ConstraintBase,
    kind: CollisionKind,
    stiffness: [Real; 2],
}

impl CollisionConstraint {
    /// Creates a collision constraint
    ///
    /// `particles` lists side A followed by side B and must match `kind`'s side sizes.
    pub fn new(kind: CollisionKind, particles: &[ParticleId], stiffness_a: Real, stiffness_b: Real) -> Self {
        let mut c = Self {
            base: ConstraintBase::new(Vec::with_capacity(4)),
            kind,
            stiffness: [stiffness_a, stiffness_b],
        };
        c.reset(kind, particles, stiffness_a, stiffness_b);
        c
    }

    /// Reinitializes a pooled constraint, keeping its allocations
    pub fn reset(&mut self, kind: CollisionKind, particles: &[ParticleId], stiffness_a: Real, stiffness_b: Real) {
        let (a, b) = kind.side_sizes();
        debug_assert_eq!(particles.len(), a + b, "particle count does not match {:?}", kind);

        self.kind = kind;
        self.stiffness = [stiffness_a, stiffness_b];
        self.base.reset(particles);
    }

    /// Returns the feature pair kind
    pub fn kind(&self) -> CollisionKind {
        self.kind
    }

    /// Returns the stiffness of side A and side B
    pub fn side_stiffness(&self) -> [Real; 2] {
        self.stiffness
    }

    fn tolerance(&self) -> Real {
        if self.base.flags.contains(ConstraintFlags::BOUNDARY_COLLISIONS) {
            BOUNDARY_TOLERANCE
        } else {
            0.0
        }
    }
}

impl PbdConstraint for CollisionConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn compute_value_and_gradient(&mut self, state: &PbdState) -> Option<Real> {
        let tol = self.tolerance();
        let lambda = self.base.lambda();
        let p = &self.base.particles;
        let g = &mut self.base.gradients;

        match self.kind {
            CollisionKind::PointPoint => {
                let diff = state.position(p[0]) - state.position(p[1]);
                let d = diff.norm();
                if d < EPSILON {
                    return None;
                }
                let n = diff / d;
                g[0] = n;
                g[1] = -n;
                Some(d)
            }
            CollisionKind::PointEdge => {
                let x0 = state.position(p[0]);
                let x1 = state.position(p[1]);
                let x2 = state.position(p[2]);
                let [w1, w2] = barycentric_line(x0, x1, x2)?;
                if w1 < -tol || w2 < -tol {
                    return None;
                }
                let diff = x0 - (x1 * w1 + x2 * w2);
                let d = diff.norm();
                if d < EPSILON {
                    return None;
                }
                let n = diff / d;
                g[0] = n;
                g[1] = -n * w1;
                g[2] = -n * w2;
                Some(d)
            }
            CollisionKind::PointTriangle => {
                let x0 = state.position(p[0]);
                let x1 = state.position(p[1]);
                let x2 = state.position(p[2]);
                let x3 = state.position(p[3]);
                let w = barycentric_triangle(x0, x1, x2, x3)?;
                if w.iter().any(|&wi| wi < -tol) {
                    return None;
                }
                let n = (x2 - x1).cross(&(x3 - x1)).try_normalize(EPSILON)?;
                let depth = (x0 - x1).dot(&n);
                // A contact resolved earlier in this solve stays active at zero
                // so the velocity pass still sees it
                if depth >= 0.0 && lambda == 0.0 {
                    return None;
                }
                g[0] = n;
                g[1] = -n * w[0];
                g[2] = -n * w[1];
                g[3] = -n * w[2];
                Some(depth.min(0.0))
            }
            CollisionKind::EdgeEdge => {
                let a0 = state.position(p[0]);
                let a1 = state.position(p[1]);
                let b0 = state.position(p[2]);
                let b1 = state.position(p[3]);
                let (s, t) = closest_line_parameters(a0, a1, b0, b1)?;
                let outside = |u: Real| u < -tol || u > 1.0 + tol;
                if outside(s) || outside(t) {
                    return None;
                }
                let (s, t) = (s.clamp(0.0, 1.0), t.clamp(0.0, 1.0));
                let pa = a0 + (a1 - a0) * s;
                let pb = b0 + (b1 - b0) * t;
                let diff = pa - pb;
                let d = diff.norm();
                if d < EPSILON {
                    return None;
                }
                let n = diff / d;
                g[0] = n * (1.0 - s);
                g[1] = n * s;
                g[2] = -n * (1.0 - t);
                g[3] = -n * t;
                Some(d)
            }
        }
    }

    fn particle_scale(&self, index: usize) -> Real {
        let (a, _) = self.kind.side_sizes();
        if index < a {
            self.stiffness[0]
        } else {
            self.stiffness[1]
        }
    }

    fn delta_lambda(&mut self, c: Real, w: Real, _dt: Real, _solver: SolverType) -> Real {
        let d_lambda = -c / w;
        self.base.add_lambda(d_lambda);
        d_lambda
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::core::BodyHandle;
    use crate::math::Vector3;

    #[test]
    fn point_behind_triangle_is_pushed_to_its_plane() {
        let mut state = PbdState::new();
        let tri = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, -1.0),
        ];
        let ids: Vec<ParticleId> = tri
            .iter()
            .map(|x| state.add_virtual_particle(*x, 0.0, Vector3::zeros(), false))
            .collect();
        let point = state.add_virtual_particle(Vector3::new(0.2, -0.1, -0.2), 1.0, Vector3::zeros(), false);

        let mut c = CollisionConstraint::new(
            CollisionKind::PointTriangle,
            &[point, ids[0], ids[1], ids[2]],
            1.0,
            1.0,
        );
        c.project(&mut state, 0.01, SolverType::Xpbd);

        assert_relative_eq!(state.position(point).y, 0.0, epsilon = 1e-12);
        assert_eq!(point.body, BodyHandle::VIRTUAL);
    }

    #[test]
    fn resolved_contact_stays_active_within_a_solve() {
        let mut state = PbdState::new();
        let ids: Vec<ParticleId> = [Vector3::zeros(), Vector3::x(), -Vector3::z()]
            .iter()
            .map(|x| state.add_virtual_particle(*x, 0.0, Vector3::zeros(), false))
            .collect();
        let point = state.add_virtual_particle(Vector3::new(0.2, -0.1, -0.2), 1.0, Vector3::zeros(), false);

        let mut c = CollisionConstraint::new(
            CollisionKind::PointTriangle,
            &[point, ids[0], ids[1], ids[2]],
            1.0,
            0.0,
        );
        c.project(&mut state, 0.01, SolverType::Xpbd);
        c.project(&mut state, 0.01, SolverType::Xpbd);
        assert!(c.base().is_active());
        assert_relative_eq!(state.position(point).y, 0.0, epsilon = 1e-12);

        // A fresh solve starts from zero and sees a separated point
        c.base_mut().zero_lambda();
        c.project(&mut state, 0.01, SolverType::Xpbd);
        assert!(!c.base().is_active());
    }
}
