use crate::constraints::{Constraint, PbdConstraint};
use crate::core::{PbdState, SolverType};
use crate::math::Real;

/// Solver for constraint lists injected each step, usually by collision handling
///
/// The lists are kept after the solve so their velocity correction can run once the
/// velocities have been updated, and are then handed back for recycling.
#[derive(Debug, Clone, Default)]
pub struct CollisionSolver {
    lists: Vec<Vec<Constraint>>,
}

impl CollisionSolver {
    /// Creates a solver without constraints
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a list of constraints for the next solve
    pub fn add_constraints(&mut self, constraints: Vec<Constraint>) {
        if !constraints.is_empty() {
            self.lists.push(constraints);
        }
    }

    /// Returns the queued lists
    pub fn constraint_lists(&self) -> &[Vec<Constraint>] {
        &self.lists
    }

    /// Returns the total number of queued constraints
    pub fn num_constraints(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// Projects every queued constraint `iterations` times, in queue order
    pub fn solve(&mut self, state: &mut PbdState, iterations: usize, dt: Real, solver_type: SolverType) {
        for c in self.lists.iter_mut().flatten() {
            c.base_mut().zero_lambda();
        }
        if dt == 0.0 {
            return;
        }
        for _ in 0..iterations {
            for c in self.lists.iter_mut().flatten() {
                c.project(state, dt, solver_type);
            }
        }
    }

    /// Applies friction and restitution of every queued constraint
    pub fn correct_velocities(&mut self, state: &mut PbdState, dt: Real) {
        for c in self.lists.iter_mut().flatten() {
            c.correct_velocity(state, dt);
        }
    }

    /// Removes and returns the queued lists
    pub fn take_constraint_lists(&mut self) -> Vec<Vec<Constraint>> {
        std::mem::take(&mut self.lists)
    }
}
