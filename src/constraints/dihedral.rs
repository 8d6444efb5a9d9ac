use crate::constraints::{ConstraintBase, PbdConstraint};
use crate::core::{ParticleId, PbdState};
use crate::math::{Real, Vector3, EPSILON};

/// Preserves the angle between two triangles sharing an edge
///
/// Particles 2 and 3 form the shared edge, particles 0 and 1 are the opposite vertices of
/// the two triangles.
#[derive(Debug, Clone)]
pub struct DihedralConstraint {
    base: ConstraintBase,
    rest_angle: Real,
}

struct DihedralEval {
    angle: Real,
    gradients: [Vector3; 4],
}

fn evaluate(p0: &Vector3, p1: &Vector3, p2: &Vector3, p3: &Vector3) -> Option<DihedralEval> {
    let e = p3 - p2;
    let e1 = p3 - p0;
    let e2 = p0 - p2;
    let e3 = p3 - p1;
    let e4 = p1 - p2;

    let n1 = e1.cross(&e);
    let n2 = e.cross(&e3);
    let a1 = n1.norm();
    let a2 = n2.norm();
    let l = e.norm();
    if a1 < EPSILON || a2 < EPSILON || l < EPSILON {
        return None;
    }
    let n1 = n1 / a1;
    let n2 = n2 / a2;

    let gradients = [
        n1 * (-l / a1),
        n2 * (-l / a2),
        n1 * (e.dot(&e1) / (a1 * l)) + n2 * (e.dot(&e3) / (a2 * l)),
        n1 * (e.dot(&e2) / (a1 * l)) + n2 * (e.dot(&e4) / (a2 * l)),
    ];
    let angle = n1.cross(&n2).dot(&e).atan2(l * n1.dot(&n2));
    Some(DihedralEval { angle, gradients })
}

impl DihedralConstraint {
    /// Creates a dihedral constraint with an explicit rest angle
    pub fn new(particles: [ParticleId; 4], rest_angle: Real) -> Self {
        Self {
            base: ConstraintBase::new(particles.to_vec()),
            rest_angle,
        }
    }

    /// Creates a dihedral constraint whose rest angle is the current one
    ///
    /// Returns `None` if either triangle or the shared edge is degenerate.
    pub fn from_state(state: &PbdState, particles: [ParticleId; 4]) -> Option<Self> {
        let [a, b, c, d] = particles.map(|p| *state.position(p));
        evaluate(&a, &b, &c, &d).map(|eval| Self::new(particles, eval.angle))
    }

    /// Returns the rest angle in radians
    pub fn get_rest_angle(&self) -> Real {
        self.rest_angle
    }
}

impl PbdConstraint for DihedralConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn compute_value_and_gradient(&mut self, state: &PbdState) -> Option<Real> {
        let p = &self.base.particles;
        let eval = evaluate(
            state.position(p[0]),
            state.position(p[1]),
            state.position(p[2]),
            state.position(p[3]),
        )?;
        self.base.gradients.copy_from_slice(&eval.gradients);
        Some(eval.angle - self.rest_angle)
    }
}
