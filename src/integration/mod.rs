mod integrator;
mod symplectic_euler;

pub use self::integrator::{IntegrationParams, Integrator};
pub use self::symplectic_euler::SymplecticEulerIntegrator;
