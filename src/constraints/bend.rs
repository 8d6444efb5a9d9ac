use crate::constraints::{ConstraintBase, PbdConstraint};
use crate::core::{ParticleId, PbdState};
use crate::math::{Real, Vector3, EPSILON};

/// Straightens three consecutive particles of a line
///
/// The constraint measures the distance of the middle particle from the centroid of all
/// three and drives it towards the rest value, zero for a straight line.
#[derive(Debug, Clone)]
pub struct BendConstraint {
    base: ConstraintBase,
    rest_length: Real,
}

fn centroid_offset(x0: &Vector3, x1: &Vector3, x2: &Vector3) -> Vector3 {
    x1 - (x0 + x1 + x2) / 3.0
}

impl BendConstraint {
    /// Creates a bend constraint with an explicit rest value
    pub fn new(p0: ParticleId, p1: ParticleId, p2: ParticleId, rest_length: Real) -> Self {
        Self {
            base: ConstraintBase::new(vec![p0, p1, p2]),
            rest_length,
        }
    }

    /// Creates a bend constraint from the current configuration
    ///
    /// With `rest_length_zero` the line is driven straight regardless of its initial shape.
    pub fn from_state(
        state: &PbdState,
        p0: ParticleId,
        p1: ParticleId,
        p2: ParticleId,
        rest_length_zero: bool,
    ) -> Self {
        let rest_length = if rest_length_zero {
            0.0
        } else {
            centroid_offset(state.position(p0), state.position(p1), state.position(p2)).norm()
        };
        Self::new(p0, p1, p2, rest_length)
    }

    /// Returns the rest value
    pub fn get_rest_length(&self) -> Real {
        self.rest_length
    }
}

impl PbdConstraint for BendConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn compute_value_and_gradient(&mut self, state: &PbdState) -> Option<Real> {
        let p = &self.base.particles;
        let diff = centroid_offset(state.position(p[0]), state.position(p[1]), state.position(p[2]));
        let dist = diff.norm();
        if dist < EPSILON {
            return None;
        }
        let dir = diff / dist;

        let g = &mut self.base.gradients;
        g[0] = dir * (-1.0 / 3.0);
        g[1] = dir * (2.0 / 3.0);
        g[2] = dir * (-1.0 / 3.0);

        Some(dist - self.rest_length)
    }
}
