use crate::bodies::PbdBody;
use crate::math::{Real, Vector3};

/// Per body parameters of one integration step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationParams {
    /// Time step
    pub dt: Real,

    /// Gravitational acceleration
    pub gravity: Vector3,

    /// Linear damping of the body, already combined with the global factor
    pub linear_damping: Real,

    /// Angular damping of the body, already combined with the global factor
    pub angular_damping: Real,

    /// Velocity components are clamped to this magnitude
    pub velocity_threshold: Real,
}

/// Trait for the explicit prediction and velocity recovery around the constraint solve
pub trait Integrator: Send + Sync {
    /// Advances positions and orientations by the current velocities and external forces,
    /// saving the previous state
    fn integrate_position(&self, body: &mut PbdBody, params: &IntegrationParams);

    /// Recovers velocities from the position and orientation change of the step
    fn update_velocity(&self, body: &mut PbdBody, params: &IntegrationParams);

    /// Returns the name of the integrator
    fn name(&self) -> &str;
}
