use std::collections::HashMap;

use crate::bodies::{BodyGeometry, BodyType};
use crate::error::PbdError;
use crate::math::{safe_inverse, Matrix3, Quaternion, Real, Vector3};
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A simulated entity made of particles
///
/// All per-particle arrays share one length. Orientation arrays are only populated for
/// oriented and rigid bodies; a rigid body always has exactly one particle. Fixed
/// particles keep an inverse mass of zero, their original inverse mass is cached so the
/// node can be released again.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct PbdBody {
    body_type: BodyType,

    /// Current particle positions
    pub positions: Vec<Vector3>,

    /// Positions at the start of the current step
    pub prev_positions: Vec<Vector3>,

    /// Particle velocities
    pub velocities: Vec<Vector3>,

    /// Particle masses
    pub masses: Vec<Real>,

    /// Particle inverse masses, zero for fixed particles
    pub inv_masses: Vec<Real>,

    /// Particle orientations (oriented and rigid bodies)
    pub orientations: Vec<Quaternion>,

    /// Orientations at the start of the current step
    pub prev_orientations: Vec<Quaternion>,

    /// Particle angular velocities in world space
    pub angular_velocities: Vec<Vector3>,

    /// Inertia tensors in the particle frame
    pub inertias: Vec<Matrix3>,

    /// Inverse inertia tensors in the particle frame
    pub inv_inertias: Vec<Matrix3>,

    /// Mass used for particles without an explicit mass
    uniform_mass: Real,

    fixed_node_ids: Vec<usize>,

    /// Original inverse masses of fixed nodes, restored on release
    fixed_node_inv_masses: HashMap<usize, Real>,

    /// Accumulated external force, applied to every particle during integration
    external_force: Vector3,

    /// Accumulated external torque, applied to oriented particles during integration
    external_torque: Vector3,

    geometry: Option<BodyGeometry>,
}

impl Default for PbdBody {
    fn default() -> Self {
        Self::new()
    }
}

impl PbdBody {
    /// Creates an empty deformable body with unit uniform mass
    pub fn new() -> Self {
        Self {
            body_type: BodyType::Deformable,
            positions: Vec::new(),
            prev_positions: Vec::new(),
            velocities: Vec::new(),
            masses: Vec::new(),
            inv_masses: Vec::new(),
            orientations: Vec::new(),
            prev_orientations: Vec::new(),
            angular_velocities: Vec::new(),
            inertias: Vec::new(),
            inv_inertias: Vec::new(),
            uniform_mass: 1.0,
            fixed_node_ids: Vec::new(),
            fixed_node_inv_masses: HashMap::new(),
            external_force: Vector3::zeros(),
            external_torque: Vector3::zeros(),
            geometry: None,
        }
    }

    /// Creates an empty body of the given kind, used for the virtual particle arenas
    pub(crate) fn with_type(body_type: BodyType) -> Self {
        Self {
            body_type,
            ..Self::new()
        }
    }

    /// Returns the kind of this body
    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// Sets the body kind for geometry backed bodies
    ///
    /// Rigid bodies are configured through [`PbdBody::set_rigid`].
    pub fn set_body_type(&mut self, body_type: BodyType) -> Result<()> {
        if body_type == BodyType::Rigid {
            return Err(PbdError::InvalidParameter(
                "rigid bodies must be configured with set_rigid".to_string(),
            ));
        }
        self.body_type = body_type;
        Ok(())
    }

    /// Returns the number of particles
    #[inline]
    pub fn num_particles(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if the body has no particles
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the mass used for particles without an explicit mass
    pub fn uniform_mass(&self) -> Real {
        self.uniform_mass
    }

    /// Sets the mass used for particles without an explicit mass
    pub fn set_uniform_mass(&mut self, mass: Real) {
        self.uniform_mass = mass;
    }

    /// Returns the source geometry, if any
    pub fn geometry(&self) -> Option<&BodyGeometry> {
        self.geometry.as_ref()
    }

    /// Sets the geometry the body is populated from on initialization
    pub fn set_geometry(&mut self, geometry: BodyGeometry) {
        if geometry.orientations.is_some() && self.body_type == BodyType::Deformable {
            self.body_type = BodyType::DeformableOriented;
        }
        self.geometry = Some(geometry);
    }

    /// Returns the ids of the fixed particles
    pub fn fixed_node_ids(&self) -> &[usize] {
        &self.fixed_node_ids
    }

    /// Sets the ids of particles fixed on initialization
    pub fn set_fixed_node_ids(&mut self, ids: Vec<usize>) {
        self.fixed_node_ids = ids;
    }

    /// Returns true if the particle is currently fixed
    pub fn is_fixed(&self, index: usize) -> bool {
        self.fixed_node_inv_masses.contains_key(&index)
    }

    /// Configures the body as a rigid body made of one oriented particle
    pub fn set_rigid(
        &mut self,
        position: Vector3,
        mass: Real,
        orientation: Quaternion,
        inertia: Matrix3,
    ) -> Result<()> {
        if !(mass > 0.0) || !mass.is_finite() {
            return Err(PbdError::InvalidParameter(format!(
                "rigid body mass must be positive and finite, got {}",
                mass
            )));
        }

        self.body_type = BodyType::Rigid;
        self.uniform_mass = mass;
        self.positions = vec![position];
        self.prev_positions = vec![position];
        self.velocities = vec![Vector3::zeros()];
        self.masses = vec![mass];
        self.inv_masses = vec![1.0 / mass];
        self.orientations = vec![orientation];
        self.prev_orientations = vec![orientation];
        self.angular_velocities = vec![Vector3::zeros()];
        self.inertias = vec![inertia];
        self.inv_inertias = vec![safe_inverse(&inertia)];
        self.fixed_node_inv_masses.clear();
        Ok(())
    }

    /// Sets the linear and angular velocity of a rigid body
    pub fn set_rigid_velocity(&mut self, velocity: Vector3, angular_velocity: Vector3) -> Result<()> {
        self.ensure_rigid()?;
        self.velocities[0] = velocity;
        self.angular_velocities[0] = angular_velocity;
        Ok(())
    }

    /// Returns the position of a rigid body
    pub fn rigid_position(&self) -> Result<&Vector3> {
        self.ensure_rigid()?;
        Ok(&self.positions[0])
    }

    /// Returns the orientation of a rigid body
    pub fn rigid_orientation(&self) -> Result<&Quaternion> {
        self.ensure_rigid()?;
        Ok(&self.orientations[0])
    }

    fn ensure_rigid(&self) -> Result<()> {
        if self.body_type != BodyType::Rigid || self.positions.len() != 1 {
            return Err(PbdError::InvalidState(
                "body is not a configured rigid body".to_string(),
            ));
        }
        Ok(())
    }

    /// Populates the particle arrays from the geometry (or rigid parameters) and applies
    /// the fixed nodes
    pub fn initialize(&mut self) -> Result<()> {
        match self.body_type {
            BodyType::Rigid => {
                self.ensure_rigid()?;
                self.inv_masses = self
                    .masses
                    .iter()
                    .map(|&m| if m > 0.0 { 1.0 / m } else { 0.0 })
                    .collect();
            }
            _ => self.populate_from_geometry()?,
        }

        self.fixed_node_inv_masses.clear();
        let ids = self.fixed_node_ids.clone();
        for id in ids {
            self.fix_node(id)?;
        }
        Ok(())
    }

    fn populate_from_geometry(&mut self) -> Result<()> {
        let geometry = self.geometry.as_ref().ok_or_else(|| {
            PbdError::InvalidState("body has neither geometry nor rigid parameters".to_string())
        })?;
        let n = geometry.num_vertices();

        if let Some(max) = geometry.cells.max_index() {
            if max >= n {
                return Err(PbdError::InvalidParameter(format!(
                    "cell references vertex {} but geometry has {} vertices",
                    max, n
                )));
            }
        }

        let check = |name: &str, len: Option<usize>| -> Result<()> {
            match len {
                Some(len) if len != n => Err(PbdError::InvalidParameter(format!(
                    "{} has {} entries, expected {}",
                    name, len, n
                ))),
                _ => Ok(()),
            }
        };
        check("velocities", geometry.velocities.as_ref().map(Vec::len))?;
        check("masses", geometry.masses.as_ref().map(Vec::len))?;
        check("inverse masses", geometry.inverse_masses.as_ref().map(Vec::len))?;
        check("orientations", geometry.orientations.as_ref().map(Vec::len))?;
        check("angular velocities", geometry.angular_velocities.as_ref().map(Vec::len))?;
        check("inertias", geometry.inertias.as_ref().map(Vec::len))?;

        let invert = |m: Real| if m > 0.0 { 1.0 / m } else { 0.0 };
        let (masses, inv_masses) = match (&geometry.inverse_masses, &geometry.masses) {
            (Some(inv), _) => (inv.iter().map(|&w| invert(w)).collect(), inv.clone()),
            (None, Some(m)) => (m.clone(), m.iter().map(|&m| invert(m)).collect()),
            (None, None) => (vec![self.uniform_mass; n], vec![invert(self.uniform_mass); n]),
        };

        self.positions = geometry.vertices.clone();
        self.prev_positions = geometry.vertices.clone();
        self.velocities = geometry
            .velocities
            .clone()
            .unwrap_or_else(|| vec![Vector3::zeros(); n]);
        self.masses = masses;
        self.inv_masses = inv_masses;

        if self.body_type.is_oriented() {
            self.orientations = geometry
                .orientations
                .clone()
                .unwrap_or_else(|| vec![Quaternion::identity(); n]);
            self.prev_orientations = self.orientations.clone();
            self.angular_velocities = geometry
                .angular_velocities
                .clone()
                .unwrap_or_else(|| vec![Vector3::zeros(); n]);
            self.inertias = geometry
                .inertias
                .clone()
                .unwrap_or_else(|| vec![Matrix3::identity(); n]);
            self.inv_inertias = self.inertias.iter().map(safe_inverse).collect();
        } else {
            self.orientations.clear();
            self.prev_orientations.clear();
            self.angular_velocities.clear();
            self.inertias.clear();
            self.inv_inertias.clear();
        }
        Ok(())
    }

    /// Fixes a particle in place, caching its inverse mass
    pub fn fix_node(&mut self, index: usize) -> Result<()> {
        if index >= self.inv_masses.len() {
            return Err(PbdError::InvalidParameter(format!(
                "fixed node {} out of range, body has {} particles",
                index,
                self.inv_masses.len()
            )));
        }
        if !self.fixed_node_inv_masses.contains_key(&index) {
            self.fixed_node_inv_masses.insert(index, self.inv_masses[index]);
            self.inv_masses[index] = 0.0;
        }
        if !self.fixed_node_ids.contains(&index) {
            self.fixed_node_ids.push(index);
        }
        Ok(())
    }

    /// Releases a fixed particle, restoring its original inverse mass
    pub fn release_node(&mut self, index: usize) -> Result<()> {
        let inv_mass = self.fixed_node_inv_masses.remove(&index).ok_or_else(|| {
            PbdError::ResourceNotFound(format!("particle {} is not fixed", index))
        })?;
        self.inv_masses[index] = inv_mass;
        self.fixed_node_ids.retain(|&id| id != index);
        Ok(())
    }

    /// Adds to the external force applied on the next integration
    pub fn apply_force(&mut self, force: Vector3) {
        self.external_force += force;
    }

    /// Adds to the external torque applied on the next integration
    pub fn apply_torque(&mut self, torque: Vector3) {
        self.external_torque += torque;
    }

    /// Returns the accumulated external force
    pub fn external_force(&self) -> &Vector3 {
        &self.external_force
    }

    /// Returns the accumulated external torque
    pub fn external_torque(&self) -> &Vector3 {
        &self.external_torque
    }

    /// Resets the external force and torque accumulators
    pub fn clear_external_forces(&mut self) {
        self.external_force = Vector3::zeros();
        self.external_torque = Vector3::zeros();
    }

    /// Appends a particle, returning its index
    ///
    /// Orientation arrays are only extended for oriented bodies.
    pub(crate) fn push_particle(
        &mut self,
        position: Vector3,
        velocity: Vector3,
        mass: Real,
        orientation: Quaternion,
        angular_velocity: Vector3,
        inertia: Matrix3,
    ) -> usize {
        self.positions.push(position);
        self.prev_positions.push(position);
        self.velocities.push(velocity);
        self.masses.push(mass);
        self.inv_masses.push(if mass > 0.0 { 1.0 / mass } else { 0.0 });
        if self.body_type.is_oriented() {
            self.orientations.push(orientation);
            self.prev_orientations.push(orientation);
            self.angular_velocities.push(angular_velocity);
            self.inertias.push(inertia);
            self.inv_inertias.push(safe_inverse(&inertia));
        }
        self.positions.len() - 1
    }

    /// Removes every particle
    pub(crate) fn clear_particles(&mut self) {
        self.positions.clear();
        self.prev_positions.clear();
        self.velocities.clear();
        self.masses.clear();
        self.inv_masses.clear();
        self.orientations.clear();
        self.prev_orientations.clear();
        self.angular_velocities.clear();
        self.inertias.clear();
        self.inv_inertias.clear();
        self.fixed_node_inv_masses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_node_out_of_range_is_rejected() {
        let mut body = PbdBody::new();
        body.set_geometry(BodyGeometry::points(vec![Vector3::zeros(); 3]));
        body.set_fixed_node_ids(vec![5]);
        assert!(body.initialize().is_err());
    }

    #[test]
    fn release_restores_inverse_mass() {
        let mut body = PbdBody::new();
        body.set_uniform_mass(2.0);
        body.set_geometry(BodyGeometry::points(vec![Vector3::zeros(); 2]));
        body.set_fixed_node_ids(vec![1]);
        body.initialize().unwrap();
        assert_eq!(body.inv_masses[1], 0.0);

        body.release_node(1).unwrap();
        assert_eq!(body.inv_masses[1], 0.5);
        assert!(!body.is_fixed(1));
    }

    #[test]
    fn mismatched_attributes_are_rejected() {
        let mut body = PbdBody::new();
        body.set_geometry(
            BodyGeometry::points(vec![Vector3::zeros(); 3]).with_masses(vec![1.0, 2.0]),
        );
        assert!(body.initialize().is_err());
    }
}
