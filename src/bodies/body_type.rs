#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Kind of a simulated body, determining which per-particle arrays it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum BodyType {
    /// Free particles with position, velocity and mass only
    #[default]
    Deformable,

    /// Particles that additionally carry an orientation, angular velocity and inertia
    DeformableOriented,

    /// A single oriented particle standing for a whole rigid body
    Rigid,
}

impl BodyType {
    /// Returns true if bodies of this kind carry orientation arrays
    #[inline]
    pub fn is_oriented(self) -> bool {
        !matches!(self, BodyType::Deformable)
    }
}
