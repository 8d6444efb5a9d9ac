use crate::constraints::{ConstraintBase, PbdConstraint};
use crate::core::{ParticleId, PbdState};
use crate::math::{triangle_area, Real, EPSILON};

/// Preserves the area of a triangle
#[derive(Debug, Clone)]
pub struct AreaConstraint {
    base: ConstraintBase,
    rest_area: Real,
}

impl AreaConstraint {
    /// Creates an area constraint with an explicit rest area
    pub fn new(particles: [ParticleId; 3], rest_area: Real) -> Self {
        Self {
            base: ConstraintBase::new(particles.to_vec()),
            rest_area,
        }
    }

    /// Creates an area constraint whose rest area is the current one
    pub fn from_state(state: &PbdState, particles: [ParticleId; 3]) -> Self {
        let [a, b, c] = particles.map(|p| *state.position(p));
        Self::new(particles, triangle_area(&a, &b, &c))
    }

    /// Returns the rest area
    pub fn get_rest_area(&self) -> Real {
        self.rest_area
    }
}

impl PbdConstraint for AreaConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn compute_value_and_gradient(&mut self, state: &PbdState) -> Option<Real> {
        let p = &self.base.particles;
        let x0 = *state.position(p[0]);
        let x1 = *state.position(p[1]);
        let x2 = *state.position(p[2]);

        let n = (x1 - x0).cross(&(x2 - x0));
        let double_area = n.norm();
        if double_area < EPSILON {
            return None;
        }
        let n = n / double_area;

        let g = &mut self.base.gradients;
        g[0] = (x1 - x2).cross(&n) * 0.5;
        g[1] = (x2 - x0).cross(&n) * 0.5;
        g[2] = (x0 - x1).cross(&n) * 0.5;

        Some(0.5 * double_area - self.rest_area)
    }
}
