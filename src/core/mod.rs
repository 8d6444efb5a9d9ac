pub mod config;
pub mod model;
pub mod state;

pub use self::config::{FemConfig, PbdConfig, SolverType};
pub use self::model::PbdModel;
pub use self::state::PbdState;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A unique identifier for a body in the state
///
/// Handles are never reused after a body is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct BodyHandle(pub(crate) u32);

impl BodyHandle {
    /// Body holding transient virtual particles, cleared at the end of every step
    pub const VIRTUAL: BodyHandle = BodyHandle(0);

    /// Body holding persistent virtual particles
    pub const PERSISTENT_VIRTUAL: BodyHandle = BodyHandle(1);

    /// Returns the slot index of this handle
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns true for the two reserved virtual particle bodies
    #[inline]
    pub fn is_virtual(self) -> bool {
        self.0 < 2
    }
}

/// Address of one particle: the body it lives in and its index within that body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ParticleId {
    /// Owning body
    pub body: BodyHandle,

    /// Index within the body's particle arrays
    pub index: usize,
}

impl ParticleId {
    /// Creates a particle id
    #[inline]
    pub const fn new(body: BodyHandle, index: usize) -> Self {
        Self { body, index }
    }
}
