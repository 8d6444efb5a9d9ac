use tracing::warn;

use crate::constraints::{CollisionKind, Constraint, ContactKind};

/// Default number of recycled constraints kept per kind
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// Kind of a constraint produced by collision handling, in emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PooledKind {
    PointPoint,
    PointEdge,
    PointTriangle,
    EdgeEdge,
    BodyVertex,
    BodyEdge,
    BodyTriangle,
    BodyBody,
}

impl PooledKind {
    /// Number of kinds
    pub const COUNT: usize = 8;

    /// Every kind in emission order
    pub const ALL: [PooledKind; Self::COUNT] = [
        PooledKind::PointPoint,
        PooledKind::PointEdge,
        PooledKind::PointTriangle,
        PooledKind::EdgeEdge,
        PooledKind::BodyVertex,
        PooledKind::BodyEdge,
        PooledKind::BodyTriangle,
        PooledKind::BodyBody,
    ];

    /// Returns the pool kind of a constraint, `None` for constraints not produced by
    /// collision handling
    pub fn of(constraint: &Constraint) -> Option<Self> {
        match constraint {
            Constraint::Collision(c) => Some(match c.kind() {
                CollisionKind::PointPoint => PooledKind::PointPoint,
                CollisionKind::PointEdge => PooledKind::PointEdge,
                CollisionKind::PointTriangle => PooledKind::PointTriangle,
                CollisionKind::EdgeEdge => PooledKind::EdgeEdge,
            }),
            Constraint::Contact(c) => match c.kind() {
                ContactKind::VertexToBody => Some(PooledKind::BodyVertex),
                ContactKind::EdgeToBody => Some(PooledKind::BodyEdge),
                ContactKind::TriangleToBody => Some(PooledKind::BodyTriangle),
                ContactKind::BodyToBodyNormal { .. } => Some(PooledKind::BodyBody),
                _ => None,
            },
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Fixed capacity cache of spent collision constraints, one bin per kind
///
/// Constraints taken from the pool keep their allocations and are reinitialized in place.
#[derive(Debug, Clone)]
pub struct ConstraintPool {
    bins: [Vec<Constraint>; PooledKind::COUNT],
    capacity: usize,
}

impl Default for ConstraintPool {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }
}

impl ConstraintPool {
    /// Creates a pool holding at most `capacity` constraints per kind
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bins: Default::default(),
            capacity,
        }
    }

    /// Returns the capacity per kind
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of cached constraints of a kind
    pub fn available(&self, kind: PooledKind) -> usize {
        self.bins[kind.index()].len()
    }

    /// Takes a cached constraint of the given kind
    pub fn take(&mut self, kind: PooledKind) -> Option<Constraint> {
        self.bins[kind.index()].pop()
    }

    /// Returns spent constraints to the pool
    ///
    /// Constraints beyond the capacity of their bin are dropped; constraints that were not
    /// produced by collision handling are ignored.
    pub fn recycle(&mut self, constraints: impl IntoIterator<Item = Constraint>) {
        let mut dropped = 0usize;
        for c in constraints {
            let Some(kind) = PooledKind::of(&c) else {
                continue;
            };
            let bin = &mut self.bins[kind.index()];
            if bin.len() < self.capacity {
                bin.push(c);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(dropped, capacity = self.capacity, "collision constraint pool full");
        }
    }
}
