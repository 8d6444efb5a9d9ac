use crate::constraints::{ConstraintBase, PbdConstraint};
use crate::core::{ParticleId, PbdState};
use crate::math::{Real, EPSILON};

/// Keeps two particles at a fixed rest length
#[derive(Debug, Clone)]
pub struct DistanceConstraint {
    base: ConstraintBase,

    /// The desired distance between the particles
    rest_length: Real,
}

impl DistanceConstraint {
    /// Creates a distance constraint with an explicit rest length
    pub fn new(p0: ParticleId, p1: ParticleId, rest_length: Real) -> Self {
        Self {
            base: ConstraintBase::new(vec![p0, p1]),
            rest_length: rest_length.max(0.0),
        }
    }

    /// Creates a distance constraint whose rest length is the current separation
    pub fn from_state(state: &PbdState, p0: ParticleId, p1: ParticleId) -> Self {
        let rest_length = (state.position(p1) - state.position(p0)).norm();
        Self::new(p0, p1, rest_length)
    }

    /// Returns the desired distance
    pub fn get_rest_length(&self) -> Real {
        self.rest_length
    }

    /// Sets the desired distance
    pub fn set_rest_length(&mut self, rest_length: Real) {
        self.rest_length = rest_length.max(0.0);
    }
}

impl PbdConstraint for DistanceConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn compute_value_and_gradient(&mut self, state: &PbdState) -> Option<Real> {
        let diff = state.position(self.base.particles[0]) - state.position(self.base.particles[1]);
        let length = diff.norm();
        if length < EPSILON {
            return None;
        }
        let n = diff / length;
        self.base.gradients[0] = n;
        self.base.gradients[1] = -n;
        Some(length - self.rest_length)
    }
}
