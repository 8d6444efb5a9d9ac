use crate::constraints::{ConstraintBase, PbdConstraint};
use crate::core::{ParticleId, PbdState};
use crate::math::{tet_volume, Real};

/// Preserves the signed volume of a tetrahedron
#[derive(Debug, Clone)]
pub struct VolumeConstraint {
    base: ConstraintBase,
    rest_volume: Real,
}

impl VolumeConstraint {
    /// Creates a volume constraint with an explicit rest volume
    pub fn new(particles: [ParticleId; 4], rest_volume: Real) -> Self {
        Self {
            base: ConstraintBase::new(particles.to_vec()),
            rest_volume,
        }
    }

    /// Creates a volume constraint whose rest volume is the current one
    pub fn from_state(state: &PbdState, particles: [ParticleId; 4]) -> Self {
        let [a, b, c, d] = particles.map(|p| *state.position(p));
        Self::new(particles, tet_volume(&a, &b, &c, &d))
    }

    /// Returns the rest volume
    pub fn get_rest_volume(&self) -> Real {
        self.rest_volume
    }
}

impl PbdConstraint for VolumeConstraint {
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
        let x3 = *state.position(p[3]);

        let one_sixth = 1.0 / 6.0;
        let g = &mut self.base.gradients;
        g[0] = (x1 - x2).cross(&(x3 - x1)) * one_sixth;
        g[1] = (x2 - x0).cross(&(x3 - x0)) * one_sixth;
        g[2] = (x3 - x0).cross(&(x1 - x0)) * one_sixth;
        g[3] = (x1 - x0).cross(&(x2 - x0)) * one_sixth;

        Some(tet_volume(&x0, &x1, &x2, &x3) - self.rest_volume)
    }
}
