use std::collections::HashMap;

use tracing::warn;

use crate::constraints::generators::{ConstraintGenerator, GeneratorEntry, GeneratorKind};
use crate::constraints::FemMaterial;
use crate::core::BodyHandle;
use crate::error::PbdError;
use crate::math::{Real, Vector3};
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Projection scheme used by the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum SolverType {
    /// Legacy position based dynamics, stiffness in `[0, 1]`, iteration count dependent
    Pbd,

    /// Compliance based projection with an accumulated Lagrange multiplier
    #[default]
    Xpbd,
}

/// Material parameters shared by FEM constraints
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct FemConfig {
    /// Lame's second parameter (shear modulus)
    pub mu: Real,

    /// Lame's first parameter
    pub lambda: Real,

    /// Young's modulus
    pub young_modulus: Real,

    /// Poisson's ratio
    pub poisson_ratio: Real,
}

impl Default for FemConfig {
    fn default() -> Self {
        Self {
            mu: 0.0,
            lambda: 0.0,
            young_modulus: 1000.0,
            poisson_ratio: 0.2,
        }
    }
}

impl FemConfig {
    /// Creates a config from Young's modulus and Poisson's ratio, deriving the Lame parameters
    pub fn from_young_poisson(young_modulus: Real, poisson_ratio: Real) -> Self {
        let mut config = Self {
            mu: 0.0,
            lambda: 0.0,
            young_modulus,
            poisson_ratio,
        };
        config.compute_elastic_constants();
        config
    }

    /// Fills in whichever pair of elastic constants is missing
    ///
    /// If both Lame parameters are zero they are derived from Young's modulus and Poisson's
    /// ratio, otherwise Young's modulus and Poisson's ratio are derived from them.
    pub fn compute_elastic_constants(&mut self) {
        if self.mu.abs() < Real::MIN_POSITIVE && self.lambda.abs() < Real::MIN_POSITIVE {
            let e = self.young_modulus;
            let nu = self.poisson_ratio;
            if e == 0.0 && nu == 0.0 {
                warn!("Young's modulus and Poisson's ratio are both zero");
            }
            self.mu = e / (2.0 * (1.0 + nu));
            self.lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
        } else {
            let mu = self.mu;
            let lambda = self.lambda;
            self.young_modulus = mu * (3.0 * lambda + 2.0 * mu) / (lambda + mu);
            self.poisson_ratio = lambda / (2.0 * (lambda + mu));
        }
    }
}

/// Configuration parameters for the PBD simulation
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct PbdConfig {
    /// The fixed time step
    pub dt: Real,

    /// Number of sweeps over the internal constraints per step
    pub iterations: usize,

    /// Number of sweeps over the collision constraints per step
    pub collision_iterations: usize,

    /// Gravitational acceleration
    pub gravity: Vector3,

    /// Global damping factor for linear velocity
    pub linear_damping: Real,

    /// Global damping factor for angular velocity
    pub angular_damping: Real,

    /// Per body linear damping, combined with the global factor
    pub body_linear_damping: HashMap<BodyHandle, Real>,

    /// Per body angular damping, combined with the global factor
    pub body_angular_damping: HashMap<BodyHandle, Real>,

    /// Projection scheme
    pub solver_type: SolverType,

    /// Whether the internal constraints are graph colored into independent partitions
    pub do_partitioning: bool,

    /// Partitions smaller than this are always solved sequentially
    pub partition_threshold: usize,

    /// Velocity components are clamped to this magnitude after the velocity update
    pub velocity_threshold: Real,

    /// Material parameters for FEM constraints
    pub fem_params: FemConfig,

    generators: Vec<GeneratorEntry>,
}

impl Default for PbdConfig {
    fn default() -> Self {
        Self {
            dt: 0.01,
            iterations: 10,
            collision_iterations: 5,
            gravity: Vector3::new(0.0, -9.81, 0.0),
            linear_damping: 0.01,
            angular_damping: 0.01,
            body_linear_damping: HashMap::new(),
            body_angular_damping: HashMap::new(),
            solver_type: SolverType::Xpbd,
            do_partitioning: true,
            partition_threshold: 16,
            velocity_threshold: 1.0e5,
            fem_params: FemConfig::default(),
            generators: Vec::new(),
        }
    }
}

impl PbdConfig {
    /// Checks the run-time parameters
    pub fn validate(&self) -> Result<()> {
        if !self.dt.is_finite() || self.dt < 0.0 {
            return Err(PbdError::InvalidParameter(format!(
                "time step must be finite and non-negative, got {}",
                self.dt
            )));
        }
        if self.iterations == 0 {
            return Err(PbdError::InvalidParameter(
                "iteration count must be at least 1".to_string(),
            ));
        }
        let in_unit = |d: Real| (0.0..=1.0).contains(&d);
        if !in_unit(self.linear_damping) || !in_unit(self.angular_damping) {
            return Err(PbdError::InvalidParameter(
                "damping factors must lie in [0, 1]".to_string(),
            ));
        }
        if let Some((handle, _)) = self
            .body_linear_damping
            .iter()
            .chain(self.body_angular_damping.iter())
            .find(|&(_, &d)| !in_unit(d))
        {
            return Err(PbdError::InvalidParameter(format!(
                "damping override for body {:?} must lie in [0, 1]",
                handle
            )));
        }
        Ok(())
    }

    /// Returns the linear damping applied to a body
    pub fn get_linear_damping(&self, body: BodyHandle) -> Real {
        combine_damping(self.linear_damping, self.body_linear_damping.get(&body))
    }

    /// Returns the angular damping applied to a body
    pub fn get_angular_damping(&self, body: BodyHandle) -> Real {
        combine_damping(self.angular_damping, self.body_angular_damping.get(&body))
    }

    /// Sets a per body linear damping override
    pub fn set_body_linear_damping(&mut self, body: BodyHandle, damping: Real) {
        self.body_linear_damping.insert(body, damping);
    }

    /// Sets a per body angular damping override
    pub fn set_body_angular_damping(&mut self, body: BodyHandle, damping: Real) {
        self.body_angular_damping.insert(body, damping);
    }

    /// Returns the registered constraint generators
    pub fn generators(&self) -> &[GeneratorEntry] {
        &self.generators
    }

    /// Registers a geometric constraint generator for a body
    ///
    /// Bend and constant density constraints have dedicated registration functions.
    pub fn enable_constraint(&mut self, kind: GeneratorKind, stiffness: Real, body: BodyHandle) {
        let generator = match kind {
            GeneratorKind::Distance => ConstraintGenerator::Distance {
                stiffness,
                stretch: 1.0,
            },
            GeneratorKind::Volume => ConstraintGenerator::Volume { stiffness },
            GeneratorKind::Area => ConstraintGenerator::Area { stiffness },
            GeneratorKind::Dihedral => ConstraintGenerator::Dihedral { stiffness },
        };
        self.register(body, generator);
    }

    /// Registers a distance constraint generator whose rest lengths are scaled by `stretch`
    pub fn enable_distance_constraint(&mut self, stiffness: Real, stretch: Real, body: BodyHandle) {
        self.register(body, ConstraintGenerator::Distance { stiffness, stretch });
    }

    /// Registers a bend constraint generator for a line mesh
    ///
    /// `stride` is the vertex distance between the three particles of each constraint.
    pub fn enable_bend_constraint(
        &mut self,
        stiffness: Real,
        stride: usize,
        rest_length_zero: bool,
        body: BodyHandle,
    ) {
        self.register(
            body,
            ConstraintGenerator::Bend {
                stiffness,
                stride,
                rest_length_zero,
            },
        );
    }

    /// Registers a FEM tetrahedral constraint generator
    pub fn enable_fem_constraint(&mut self, material: FemMaterial, body: BodyHandle) {
        self.register(body, ConstraintGenerator::FemTet { material });
    }

    /// Registers a constant density (fluid) constraint over the whole body
    pub fn enable_constant_density_constraint(
        &mut self,
        stiffness: Real,
        particle_radius: Real,
        rest_density: Real,
        body: BodyHandle,
    ) {
        self.register(
            body,
            ConstraintGenerator::ConstantDensity {
                stiffness,
                particle_radius,
                rest_density,
            },
        );
    }

    /// Drops every generator registered for a body
    pub fn remove_generators(&mut self, body: BodyHandle) {
        self.generators.retain(|entry| entry.body != body);
    }

    fn register(&mut self, body: BodyHandle, generator: ConstraintGenerator) {
        self.generators
            .retain(|entry| !(entry.body == body && entry.generator.replaces(&generator)));
        self.generators.push(GeneratorEntry { body, generator });
    }
}

fn combine_damping(global: Real, body: Option<&Real>) -> Real {
    match body {
        Some(&b) => 1.0 - (1.0 - global) * (1.0 - b),
        None => global,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lame_from_young_poisson() {
        let fem = FemConfig::from_young_poisson(1000.0, 0.25);
        assert_relative_eq!(fem.mu, 400.0, epsilon = 1e-9);
        assert_relative_eq!(fem.lambda, 400.0, epsilon = 1e-9);
    }

    #[test]
    fn damping_override_combines_with_global() {
        let mut config = PbdConfig::default();
        config.linear_damping = 0.5;
        let body = BodyHandle(2);
        assert_relative_eq!(config.get_linear_damping(body), 0.5);

        config.set_body_linear_damping(body, 0.5);
        assert_relative_eq!(config.get_linear_damping(body), 0.75);
    }

    #[test]
    fn re_registering_replaces_generator() {
        let mut config = PbdConfig::default();
        let body = BodyHandle(2);
        config.enable_constraint(GeneratorKind::Distance, 1.0, body);
        config.enable_distance_constraint(10.0, 1.0, body);
        config.enable_bend_constraint(1.0, 1, false, body);
        config.enable_bend_constraint(1.0, 2, false, body);
        assert_eq!(config.generators().len(), 3);
    }

    #[test]
    fn zero_iterations_are_rejected() {
        let config = PbdConfig {
            iterations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
