use std::f64::consts::PI;

use crate::constraints::{ConstraintBase, PbdConstraint};
use crate::core::{BodyHandle, ParticleId, PbdState, SolverType};
use crate::math::{Real, Vector3};

/// Maximum number of neighbors gathered per particle
const MAX_NEIGHBORS: usize = 100;

/// Relaxation added to the denominator of the density multipliers
const DEFAULT_RELAXATION: Real = 600.0;

/// Incompressibility constraint over all particles of a fluid body
///
/// Densities are estimated with the poly6 kernel over neighbors within twice the kernel
/// radius, gradients with the spiky kernel. Unlike the other kinds this constraint solves
/// its own per particle multipliers instead of one shared projection.
#[derive(Debug, Clone)]
pub struct ConstantDensityConstraint {
    base: ConstraintBase,
    kernel_radius: Real,
    rest_density: Real,
    relaxation: Real,
    poly6_coeff: Real,
    spiky_coeff: Real,
    neighbors: Vec<Vec<usize>>,
    densities: Vec<Real>,
    lambdas: Vec<Real>,
    deltas: Vec<Vector3>,
}

impl ConstantDensityConstraint {
    /// Creates a constraint over the first `num_particles` particles of `body`
    pub fn new(
        body: BodyHandle,
        num_particles: usize,
        stiffness: Real,
        particle_radius: Real,
        rest_density: Real,
    ) -> Self {
        let particles = (0..num_particles).map(|i| ParticleId::new(body, i)).collect();
        let mut base = ConstraintBase::new(particles);
        base.set_stiffness(stiffness);
        let h = particle_radius;
        Self {
            base,
            kernel_radius: h,
            rest_density,
            relaxation: DEFAULT_RELAXATION,
            poly6_coeff: 315.0 / (64.0 * PI * h.powi(9)),
            spiky_coeff: 15.0 / (PI * h.powi(6)),
            neighbors: vec![Vec::new(); num_particles],
            densities: vec![0.0; num_particles],
            lambdas: vec![0.0; num_particles],
            deltas: vec![Vector3::zeros(); num_particles],
        }
    }

    /// Sets the relaxation parameter of the density multipliers
    pub fn set_relaxation(&mut self, relaxation: Real) {
        self.relaxation = relaxation;
    }

    /// Returns the density estimates of the last evaluation
    pub fn densities(&self) -> &[Real] {
        &self.densities
    }

    fn poly6(&self, r: &Vector3) -> Real {
        let len = r.norm();
        if len > self.kernel_radius || len == 0.0 {
            return 0.0;
        }
        let h2 = self.kernel_radius * self.kernel_radius;
        self.poly6_coeff * (h2 - len * len).powi(3)
    }

    fn grad_spiky(&self, r: &Vector3) -> Vector3 {
        let len = r.norm();
        if len > self.kernel_radius || len == 0.0 {
            return Vector3::zeros();
        }
        let d = self.kernel_radius - len;
        r * (-3.0 * self.spiky_coeff * d * d / len)
    }

    fn find_neighbors(&mut self, positions: &[Vector3]) {
        let radius = 2.0 * self.kernel_radius;
        for (i, pi) in positions.iter().enumerate() {
            let list = &mut self.neighbors[i];
            list.clear();
            list.extend(
                positions
                    .iter()
                    .enumerate()
                    .filter(|&(j, pj)| j != i && (pi - pj).norm() < radius)
                    .map(|(j, _)| j)
                    .take(MAX_NEIGHBORS),
            );
        }
    }
}

impl PbdConstraint for ConstantDensityConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    /// Returns the mean density error; the per particle solve happens in
    /// [`PbdConstraint::compute_correction`]
    fn compute_value_and_gradient(&mut self, _state: &PbdState) -> Option<Real> {
        if self.base.particles.is_empty() {
            return None;
        }
        let error: Real = self
            .densities
            .iter()
            .map(|d| d / self.rest_density - 1.0)
            .sum();
        Some(error / self.densities.len() as Real)
    }

    fn compute_correction(&mut self, state: &PbdState, dt: Real, _solver: SolverType) -> bool {
        if dt == 0.0 || self.base.particles.is_empty() {
            return false;
        }
        let body = state.body(self.base.particles[0].body);
        let n = self.base.particles.len().min(body.num_particles());
        let positions = &body.positions[..n];

        self.find_neighbors(positions);

        for i in 0..n {
            let density: Real = self.neighbors[i]
                .iter()
                .map(|&j| self.poly6(&(positions[i] - positions[j])))
                .sum();
            self.densities[i] = density;
        }

        for i in 0..n {
            let c = self.densities[i] / self.rest_density - 1.0;
            let gradient_sum: Real = self.neighbors[i]
                .iter()
                .map(|&j| self.grad_spiky(&(positions[i] - positions[j])).norm_squared())
                .sum::<Real>()
                / self.rest_density;
            self.lambdas[i] = -c / (gradient_sum + self.relaxation);
        }

        let scale = self.base.stiffness() / self.rest_density;
        for i in 0..n {
            let delta: Vector3 = self.neighbors[i]
                .iter()
                .map(|&j| self.grad_spiky(&(positions[i] - positions[j])) * (self.lambdas[i] + self.lambdas[j]))
                .sum();
            self.deltas[i] = delta * scale;
        }
        true
    }

    fn apply_correction(&self, state: &mut PbdState) {
        let Some(first) = self.base.particles.first() else {
            return;
        };
        let body = state.body_mut(first.body);
        let n = self.deltas.len().min(body.num_particles());
        for i in 0..n {
            if body.inv_masses[i] > 0.0 {
                body.positions[i] += self.deltas[i];
            }
        }
    }

    fn correct_velocity(&mut self, _state: &mut PbdState, _dt: Real) {}
}
