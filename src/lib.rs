//! Position based dynamics for deformable and rigid bodies
//!
//! Bodies are stored as particle arrays in a [`PbdState`]. Constraints reference particles
//! through [`ParticleId`]s and are projected by an iterative Gauss-Seidel solver, either
//! with the legacy stiffness based scheme or with XPBD compliance. [`PbdModel`] owns the
//! state, the constraints and the step pipeline.

pub mod math;
pub mod core;
pub mod bodies;
pub mod constraints;
pub mod solver;
pub mod integration;
pub mod collision;

/// Re-export common types for easier usage
pub use crate::core::{BodyHandle, ParticleId, PbdConfig, PbdModel, PbdState, SolverType};
pub use crate::bodies::{BodyGeometry, BodyType, CellIndices, PbdBody};
pub use crate::constraints::{Constraint, PbdConstraint};
pub use crate::math::{Quaternion, Real, Vector3};

/// Error types for the simulation
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum PbdError {
        #[error("Invalid parameter: {0}")]
        InvalidParameter(String),

        #[error("Resource not found: {0}")]
        ResourceNotFound(String),

        #[error("Invalid state: {0}")]
        InvalidState(String),

        #[error("Internal error: {0}")]
        InternalError(String),
    }
}

pub use crate::error::PbdError;

/// Result type for simulation operations
pub type Result<T> = std::result::Result<T, error::PbdError>;

/// Engine version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
