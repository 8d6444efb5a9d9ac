use std::collections::{HashMap, HashSet};
use std::ops::Range;

use tracing::debug;

use crate::constraints::{Constraint, PbdConstraint};
use crate::core::{BodyHandle, ParticleId};

/// Ordered collection of constraints, optionally split into independent partitions
///
/// A partition is a contiguous range of the constraint list in which no two constraints
/// share a particle. Partitioning reorders the list; any insertion or removal clears the
/// partitions and the caller is expected to rebuild them.
#[derive(Debug, Clone, Default)]
pub struct ConstraintContainer {
    constraints: Vec<Constraint>,
    partitions: Vec<Range<usize>>,
}

impl ConstraintContainer {
    /// Creates an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a constraint and returns its index
    pub fn add(&mut self, constraint: impl Into<Constraint>) -> usize {
        self.partitions.clear();
        self.constraints.push(constraint.into());
        self.constraints.len() - 1
    }

    /// Appends several constraints
    pub fn extend(&mut self, constraints: impl IntoIterator<Item = Constraint>) {
        self.partitions.clear();
        self.constraints.extend(constraints);
    }

    /// Removes the constraint at `index`, shifting the ones after it
    ///
    /// Returns `None` if the index is out of range.
    pub fn remove(&mut self, index: usize) -> Option<Constraint> {
        if index >= self.constraints.len() {
            return None;
        }
        self.partitions.clear();
        Some(self.constraints.remove(index))
    }

    /// Removes every constraint
    pub fn clear(&mut self) {
        self.constraints.clear();
        self.partitions.clear();
    }

    /// Returns the number of constraints
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Returns true if the container holds no constraints
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Returns the constraints in solve order
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Returns the constraints mutably
    ///
    /// The list itself cannot change length through this view, so partitions stay valid.
    pub fn constraints_mut(&mut self) -> &mut [Constraint] {
        &mut self.constraints
    }

    /// Returns the current partitions, empty if the container is not partitioned
    pub fn partitions(&self) -> &[Range<usize>] {
        &self.partitions
    }

    /// Returns true if partitions are available
    pub fn is_partitioned(&self) -> bool {
        !self.partitions.is_empty()
    }

    /// Drops the partitions; the solver then treats the whole list as one sequential run
    pub fn clear_partitions(&mut self) {
        self.partitions.clear();
    }

    /// Greedily colors the constraints so no two constraints of one color share a particle,
    /// then reorders the list so every color is a contiguous partition
    ///
    /// The relative order of constraints within one partition is preserved.
    pub fn partition_constraints(&mut self) {
        self.partitions.clear();
        if self.constraints.is_empty() {
            return;
        }

        let mut color_particles: Vec<HashSet<ParticleId>> = Vec::new();
        let colors: Vec<usize> = self
            .constraints
            .iter()
            .map(|c| {
                let particles = c.base().particles();
                let color = color_particles
                    .iter()
                    .position(|used| particles.iter().all(|p| !used.contains(p)))
                    .unwrap_or(color_particles.len());
                if color == color_particles.len() {
                    color_particles.push(HashSet::new());
                }
                color_particles[color].extend(particles.iter().copied());
                color
            })
            .collect();

        let mut tagged: Vec<(usize, Constraint)> = colors.into_iter().zip(self.constraints.drain(..)).collect();
        tagged.sort_by_key(|(color, _)| *color);

        let mut start = 0;
        for (i, window) in tagged.windows(2).enumerate() {
            if window[0].0 != window[1].0 {
                self.partitions.push(start..i + 1);
                start = i + 1;
            }
        }
        self.partitions.push(start..tagged.len());
        self.constraints.extend(tagged.into_iter().map(|(_, c)| c));

        debug!(
            constraints = self.constraints.len(),
            partitions = self.partitions.len(),
            "partitioned constraints"
        );
    }

    /// Builds the reverse index from particle index of `body` to the indices of the
    /// constraints referencing it
    pub fn particle_constraint_map(&self, body: BodyHandle) -> HashMap<usize, Vec<usize>> {
        let mut map: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, c) in self.constraints.iter().enumerate() {
            for pid in c.base().particles().iter().filter(|p| p.body == body) {
                let list = map.entry(pid.index).or_default();
                if list.last() != Some(&i) {
                    list.push(i);
                }
            }
        }
        map
    }

    /// Keeps only the constraints for which `keep` returns true
    ///
    /// Returns the number of removed constraints. Partitions are cleared.
    pub fn retain(&mut self, keep: impl FnMut(&Constraint) -> bool) -> usize {
        let before = self.constraints.len();
        self.constraints.retain(keep);
        self.partitions.clear();
        before - self.constraints.len()
    }

    /// Removes every constraint referencing one of `vertices` of `body`
    ///
    /// Returns the number of removed constraints. Partitions are cleared.
    pub fn remove_constraints_touching(&mut self, body: BodyHandle, vertices: &HashSet<usize>) -> usize {
        self.retain(|c| {
            !c.base()
                .particles()
                .iter()
                .any(|p| p.body == body && vertices.contains(&p.index))
        })
    }
}
