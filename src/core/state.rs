use tracing::debug;

use crate::bodies::{BodyType, PbdBody};
use crate::core::{BodyHandle, ParticleId};
use crate::error::PbdError;
use crate::math::{Matrix3, Quaternion, Real, Vector3};
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Arena of bodies addressed by [`BodyHandle`], with uniform per-particle accessors
///
/// Slots 0 and 1 are reserved for the transient and persistent virtual particle bodies.
/// Removing a body empties its slot; handles are never reused.
///
/// The per-particle accessors take a [`ParticleId`] and panic if it names a removed body
/// or an out of range particle. Constraints referencing removed bodies are a caller error.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct PbdState {
    bodies: Vec<Option<PbdBody>>,
}

impl Default for PbdState {
    fn default() -> Self {
        Self::new()
    }
}

impl PbdState {
    /// Creates a state containing only the two virtual particle bodies
    pub fn new() -> Self {
        Self {
            bodies: vec![
                Some(PbdBody::with_type(BodyType::DeformableOriented)),
                Some(PbdBody::with_type(BodyType::DeformableOriented)),
            ],
        }
    }

    /// Registers an empty body and returns its handle
    pub fn add_body(&mut self) -> BodyHandle {
        self.insert_body(PbdBody::new())
    }

    /// Registers a configured body and returns its handle
    pub fn insert_body(&mut self, body: PbdBody) -> BodyHandle {
        let handle = BodyHandle(self.bodies.len() as u32);
        self.bodies.push(Some(body));
        debug!(body = handle.0, "registered body");
        handle
    }

    /// Removes a body, invalidating its handle
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<PbdBody> {
        if handle.is_virtual() {
            return Err(PbdError::InvalidParameter(
                "virtual particle bodies cannot be removed".to_string(),
            ));
        }
        let body = self
            .bodies
            .get_mut(handle.index())
            .and_then(Option::take)
            .ok_or_else(|| PbdError::ResourceNotFound(format!("Body with handle {:?} not found", handle)))?;
        debug!(body = handle.0, "removed body");
        Ok(body)
    }

    /// Gets a body by its handle, returning an error if not found
    pub fn get_body(&self, handle: BodyHandle) -> Result<&PbdBody> {
        self.bodies
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| PbdError::ResourceNotFound(format!("Body with handle {:?} not found", handle)))
    }

    /// Gets a mutable reference to a body by its handle, returning an error if not found
    pub fn get_body_mut(&mut self, handle: BodyHandle) -> Result<&mut PbdBody> {
        self.bodies
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| PbdError::ResourceNotFound(format!("Body with handle {:?} not found", handle)))
    }

    /// Returns true if the handle names a live body
    pub fn contains(&self, handle: BodyHandle) -> bool {
        matches!(self.bodies.get(handle.index()), Some(Some(_)))
    }

    /// Returns the number of live bodies, including the virtual ones
    pub fn num_bodies(&self) -> usize {
        self.bodies.iter().filter(|b| b.is_some()).count()
    }

    /// Iterates over live bodies
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &PbdBody)> + '_ {
        self.bodies
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().map(|b| (BodyHandle(i as u32), b)))
    }

    /// Iterates mutably over live bodies
    pub fn bodies_mut(&mut self) -> impl Iterator<Item = (BodyHandle, &mut PbdBody)> + '_ {
        self.bodies
            .iter_mut()
            .enumerate()
            .filter_map(|(i, b)| b.as_mut().map(|b| (BodyHandle(i as u32), b)))
    }

    /// Copies every body of `other` into this state by value
    pub fn deep_copy(&mut self, other: &PbdState) {
        self.bodies.clone_from(&other.bodies);
    }

    /// Returns the body, panicking if it was removed
    ///
    /// # Panics
    ///
    /// Panics if the handle does not name a live body.
    #[inline]
    pub fn body(&self, handle: BodyHandle) -> &PbdBody {
        match self.bodies.get(handle.index()) {
            Some(Some(body)) => body,
            _ => panic!("body {:?} was removed or never registered", handle),
        }
    }

    /// Returns the body mutably, panicking if it was removed
    ///
    /// # Panics
    ///
    /// Panics if the handle does not name a live body.
    #[inline]
    pub fn body_mut(&mut self, handle: BodyHandle) -> &mut PbdBody {
        match self.bodies.get_mut(handle.index()) {
            Some(Some(body)) => body,
            _ => panic!("body {:?} was removed or never registered", handle),
        }
    }

    /// Returns the kind of the body owning the particle
    #[inline]
    pub fn body_type(&self, pid: ParticleId) -> BodyType {
        self.body(pid.body).body_type()
    }

    /// Returns the particle position
    #[inline]
    pub fn position(&self, pid: ParticleId) -> &Vector3 {
        &self.body(pid.body).positions[pid.index]
    }

    /// Returns the particle position mutably
    #[inline]
    pub fn position_mut(&mut self, pid: ParticleId) -> &mut Vector3 {
        &mut self.body_mut(pid.body).positions[pid.index]
    }

    /// Returns the particle position at the start of the step
    #[inline]
    pub fn prev_position(&self, pid: ParticleId) -> &Vector3 {
        &self.body(pid.body).prev_positions[pid.index]
    }

    /// Returns the particle velocity
    #[inline]
    pub fn velocity(&self, pid: ParticleId) -> &Vector3 {
        &self.body(pid.body).velocities[pid.index]
    }

    /// Returns the particle velocity mutably
    #[inline]
    pub fn velocity_mut(&mut self, pid: ParticleId) -> &mut Vector3 {
        &mut self.body_mut(pid.body).velocities[pid.index]
    }

    /// Returns the particle inverse mass
    #[inline]
    pub fn inv_mass(&self, pid: ParticleId) -> Real {
        self.body(pid.body).inv_masses[pid.index]
    }

    /// Returns the particle orientation
    ///
    /// # Panics
    ///
    /// Panics if the particle belongs to a body without orientations.
    #[inline]
    pub fn orientation(&self, pid: ParticleId) -> &Quaternion {
        &self.body(pid.body).orientations[pid.index]
    }

    /// Returns the particle orientation mutably
    #[inline]
    pub fn orientation_mut(&mut self, pid: ParticleId) -> &mut Quaternion {
        &mut self.body_mut(pid.body).orientations[pid.index]
    }

    /// Returns the particle angular velocity
    #[inline]
    pub fn angular_velocity(&self, pid: ParticleId) -> &Vector3 {
        &self.body(pid.body).angular_velocities[pid.index]
    }

    /// Returns the particle angular velocity mutably
    #[inline]
    pub fn angular_velocity_mut(&mut self, pid: ParticleId) -> &mut Vector3 {
        &mut self.body_mut(pid.body).angular_velocities[pid.index]
    }

    /// Returns the particle inverse inertia in its local frame
    #[inline]
    pub fn inv_inertia(&self, pid: ParticleId) -> &Matrix3 {
        &self.body(pid.body).inv_inertias[pid.index]
    }

    /// Adds a particle to one of the virtual bodies and returns its id
    pub fn add_virtual_particle(
        &mut self,
        position: Vector3,
        mass: Real,
        velocity: Vector3,
        persist: bool,
    ) -> ParticleId {
        self.add_virtual_oriented_particle(
            position,
            Quaternion::identity(),
            mass,
            Matrix3::identity(),
            velocity,
            Vector3::zeros(),
            persist,
        )
    }

    /// Adds an oriented particle to one of the virtual bodies and returns its id
    #[allow(clippy::too_many_arguments)]
    pub fn add_virtual_oriented_particle(
        &mut self,
        position: Vector3,
        orientation: Quaternion,
        mass: Real,
        inertia: Matrix3,
        velocity: Vector3,
        angular_velocity: Vector3,
        persist: bool,
    ) -> ParticleId {
        let handle = if persist {
            BodyHandle::PERSISTENT_VIRTUAL
        } else {
            BodyHandle::VIRTUAL
        };
        let index = self.body_mut(handle).push_particle(
            position,
            velocity,
            mass,
            orientation,
            angular_velocity,
            inertia,
        );
        ParticleId::new(handle, index)
    }

    /// Removes all transient virtual particles
    pub fn clear_virtual_particles(&mut self) {
        self.body_mut(BodyHandle::VIRTUAL).clear_particles();
    }

    /// Removes all persistent virtual particles
    pub fn clear_persistent_virtual_particles(&mut self) {
        self.body_mut(BodyHandle::PERSISTENT_VIRTUAL).clear_particles();
    }
}
