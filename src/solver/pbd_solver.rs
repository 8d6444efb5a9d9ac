use std::ops::Range;

use crate::constraints::{Constraint, ConstraintContainer, PbdConstraint};
use crate::core::{PbdState, SolverType};
use crate::math::Real;

/// Iterative projection solver for the internal constraints of a model
///
/// Each call resets the Lagrange multipliers and then runs a fixed number of sweeps. With
/// partitions available, partitions are visited in order and the constraints of one
/// partition are independent, so large partitions can be evaluated concurrently.
#[derive(Debug, Clone)]
pub struct PbdSolver {
    iterations: usize,
    dt: Real,
    solver_type: SolverType,
    partition_threshold: usize,
}

impl Default for PbdSolver {
    fn default() -> Self {
        Self {
            iterations: 10,
            dt: 0.01,
            solver_type: SolverType::Xpbd,
            partition_threshold: 16,
        }
    }
}

impl PbdSolver {
    /// Creates a solver with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of sweeps per solve
    pub fn set_iterations(&mut self, iterations: usize) {
        self.iterations = iterations;
    }

    /// Returns the number of sweeps per solve
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Sets the time step
    pub fn set_time_step(&mut self, dt: Real) {
        self.dt = dt;
    }

    /// Sets the projection scheme
    pub fn set_solver_type(&mut self, solver_type: SolverType) {
        self.solver_type = solver_type;
    }

    /// Partitions with fewer constraints than this are solved sequentially
    pub fn set_partition_threshold(&mut self, threshold: usize) {
        self.partition_threshold = threshold;
    }

    /// Projects every constraint of the container `iterations` times
    pub fn solve(&self, state: &mut PbdState, container: &mut ConstraintContainer) {
        let partitions: Vec<Range<usize>> = container.partitions().to_vec();
        let constraints = container.constraints_mut();
        for c in constraints.iter_mut() {
            c.base_mut().zero_lambda();
        }
        if self.dt == 0.0 {
            return;
        }

        for _ in 0..self.iterations {
            if partitions.is_empty() {
                self.solve_sequential(state, constraints);
                continue;
            }
            for range in &partitions {
                let partition = &mut constraints[range.clone()];
                if partition.len() >= self.partition_threshold {
                    self.solve_partition(state, partition);
                } else {
                    self.solve_sequential(state, partition);
                }
            }
        }
    }

    pub(crate) fn solve_sequential(&self, state: &mut PbdState, constraints: &mut [Constraint]) {
        for c in constraints {
            c.project(state, self.dt, self.solver_type);
        }
    }

    /// Evaluates an independent set against an immutable state, then applies the results
    #[cfg(feature = "parallel")]
    fn solve_partition(&self, state: &mut PbdState, constraints: &mut [Constraint]) {
        use rayon::prelude::*;

        let (dt, solver_type) = (self.dt, self.solver_type);
        let view: &PbdState = state;
        constraints.par_iter_mut().for_each(|c| {
            c.compute_correction(view, dt, solver_type);
        });
        for c in constraints.iter() {
            c.apply_correction(state);
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn solve_partition(&self, state: &mut PbdState, constraints: &mut [Constraint]) {
        self.solve_sequential(state, constraints);
    }
}
