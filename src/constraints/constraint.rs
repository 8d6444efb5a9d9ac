use bitflags::bitflags;

use crate::bodies::BodyType;
use crate::core::{ParticleId, PbdState, SolverType};
use crate::math::{
    integrate_rotation, inverse_inertia_world, lever_arm_impulse_rotation, lever_arm_weight, Real,
    Vector3, EPSILON,
};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

bitflags! {
    /// Flags controlling per constraint behavior
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
    pub struct ConstraintFlags: u32 {
        /// Friction and restitution are applied after the velocity update
        const CORRECT_VELOCITY = 0x01;

        /// Collision constraints accept contacts slightly outside their feature
        const BOUNDARY_COLLISIONS = 0x02;

        /// The last evaluation reported degenerate geometry or a separated contact
        const INACTIVE = 0x04;
    }
}

/// Data shared by every constraint kind
///
/// Holds the particles the constraint touches, the gradients of its last evaluation, the
/// lever arms of rigid participants and the Lagrange multiplier accumulated during the
/// current step.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ConstraintBase {
    pub(crate) particles: Vec<ParticleId>,
    pub(crate) gradients: Vec<Vector3>,

    /// World space offsets from each rigid participant's center to its contact point
    pub(crate) lever_arms: Vec<Vector3>,

    stiffness: Real,
    compliance: Real,
    lambda: Real,

    /// Multiplier increment computed by the last evaluation, consumed by the apply phase
    pub(crate) d_lambda: Real,

    friction: Real,
    restitution: Real,
    pub(crate) flags: ConstraintFlags,
}

impl ConstraintBase {
    /// Creates the shared data for a constraint over the given particles
    ///
    /// Defaults to unit stiffness, zero compliance, no friction and no restitution.
    pub fn new(particles: Vec<ParticleId>) -> Self {
        let n = particles.len();
        Self {
            particles,
            gradients: vec![Vector3::zeros(); n],
            lever_arms: vec![Vector3::zeros(); n],
            stiffness: 1.0,
            compliance: 0.0,
            lambda: 0.0,
            d_lambda: 0.0,
            friction: 0.0,
            restitution: 0.0,
            flags: ConstraintFlags::empty(),
        }
    }

    /// Reinitializes the data for a new set of particles, keeping the allocations
    ///
    /// Restores every default of [`ConstraintBase::new`].
    pub(crate) fn reset(&mut self, particles: &[ParticleId]) {
        self.particles.clear();
        self.particles.extend_from_slice(particles);
        self.gradients.clear();
        self.gradients.resize(particles.len(), Vector3::zeros());
        self.lever_arms.clear();
        self.lever_arms.resize(particles.len(), Vector3::zeros());
        self.stiffness = 1.0;
        self.compliance = 0.0;
        self.lambda = 0.0;
        self.d_lambda = 0.0;
        self.friction = 0.0;
        self.restitution = 0.0;
        self.flags = ConstraintFlags::empty();
    }

    /// Returns the particles touched by the constraint
    #[inline]
    pub fn particles(&self) -> &[ParticleId] {
        &self.particles
    }

    /// Returns the gradients computed by the last evaluation
    #[inline]
    pub fn gradients(&self) -> &[Vector3] {
        &self.gradients
    }

    /// Returns the lever arms of the participants
    #[inline]
    pub fn lever_arms(&self) -> &[Vector3] {
        &self.lever_arms
    }

    /// Returns the legacy stiffness
    pub fn stiffness(&self) -> Real {
        self.stiffness
    }

    /// Sets the stiffness, the compliance becomes its reciprocal
    ///
    /// A non-positive stiffness gives infinite compliance, disabling the constraint in
    /// compliance based solves.
    pub fn set_stiffness(&mut self, stiffness: Real) {
        self.stiffness = stiffness;
        self.compliance = if stiffness > 0.0 {
            1.0 / stiffness
        } else {
            Real::INFINITY
        };
    }

    /// Returns the compliance
    pub fn compliance(&self) -> Real {
        self.compliance
    }

    /// Sets the compliance, zero means infinitely stiff
    pub fn set_compliance(&mut self, compliance: Real) {
        self.compliance = compliance.max(0.0);
    }

    /// Returns the accumulated Lagrange multiplier
    pub fn lambda(&self) -> Real {
        self.lambda
    }

    /// Resets the Lagrange multiplier, called once at the start of each step
    pub fn zero_lambda(&mut self) {
        self.lambda = 0.0;
        self.d_lambda = 0.0;
    }

    /// Returns the friction coefficient
    pub fn friction(&self) -> Real {
        self.friction
    }

    /// Sets the friction coefficient
    pub fn set_friction(&mut self, friction: Real) {
        self.friction = friction;
    }

    /// Returns the restitution coefficient
    pub fn restitution(&self) -> Real {
        self.restitution
    }

    /// Sets the restitution coefficient
    pub fn set_restitution(&mut self, restitution: Real) {
        self.restitution = restitution;
    }

    /// Returns the behavior flags
    pub fn flags(&self) -> ConstraintFlags {
        self.flags
    }

    /// Sets or clears the given flags
    pub fn set_flags(&mut self, flags: ConstraintFlags, value: bool) {
        self.flags.set(flags, value);
    }

    /// Enables friction and restitution velocity correction
    pub fn set_correct_velocity(&mut self, correct: bool) {
        self.flags.set(ConstraintFlags::CORRECT_VELOCITY, correct);
    }

    /// Returns false if the last evaluation reported the constraint inactive
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.flags.contains(ConstraintFlags::INACTIVE)
    }

    /// Generalized inverse mass `w = sum invMass_i |g_i|^2`, plus the angular terms of
    /// rigid participants
    pub fn generalized_inv_mass(&self, state: &PbdState) -> Real {
        self.particles
            .iter()
            .zip(&self.gradients)
            .zip(&self.lever_arms)
            .map(|((pid, g), r)| {
                let body = state.body(pid.body);
                let inv_mass = body.inv_masses[pid.index];
                if inv_mass <= 0.0 {
                    return 0.0;
                }
                let mut w = inv_mass * g.norm_squared();
                if body.body_type() == BodyType::Rigid {
                    w += lever_arm_weight(
                        &body.orientations[pid.index],
                        &body.inv_inertias[pid.index],
                        r,
                        g,
                    );
                }
                w
            })
            .sum()
    }

    pub(crate) fn add_lambda(&mut self, d_lambda: Real) {
        self.lambda += d_lambda;
    }

    /// Multiplier increment for constraint value `c` and generalized inverse mass `w`
    pub(crate) fn solve_delta_lambda(&mut self, c: Real, w: Real, dt: Real, solver: SolverType) -> Real {
        let d_lambda = match solver {
            SolverType::Pbd => -c * self.stiffness / w,
            SolverType::Xpbd => {
                let alpha = self.compliance / (dt * dt);
                if !alpha.is_finite() {
                    return 0.0;
                }
                -(c + alpha * self.lambda) / (w + alpha)
            }
        };
        self.lambda += d_lambda;
        d_lambda
    }

    /// Moves every participant by `invMass * d_lambda * g_i * scale(i)`, rotating rigid
    /// participants through their lever arms
    pub(crate) fn apply_positions(&self, state: &mut PbdState, scale: impl Fn(usize) -> Real) {
        if self.d_lambda == 0.0 {
            return;
        }
        for (i, pid) in self.particles.iter().enumerate() {
            let body = state.body_mut(pid.body);
            let inv_mass = body.inv_masses[pid.index];
            if inv_mass <= 0.0 {
                continue;
            }

            let p = self.gradients[i] * (self.d_lambda * scale(i));
            body.positions[pid.index] += p * inv_mass;

            let r = &self.lever_arms[i];
            if body.body_type() == BodyType::Rigid && r.norm_squared() > 0.0 {
                let q = body.orientations[pid.index];
                let rot = lever_arm_impulse_rotation(&q, &body.inv_inertias[pid.index], r, &p);
                body.orientations[pid.index] = integrate_rotation(&q, &rot);
            }
        }
    }

    fn point_velocity(&self, state: &PbdState, i: usize) -> Vector3 {
        let pid = self.particles[i];
        let body = state.body(pid.body);
        let v = body.velocities[pid.index];
        if body.body_type() == BodyType::Rigid {
            v + body.angular_velocities[pid.index].cross(&self.lever_arms[i])
        } else {
            v
        }
    }

    /// Applies friction and restitution to the relative velocity along the last gradients
    ///
    /// Participant weights are the projections of their gradients onto the largest one, so
    /// the relative velocity is `sum weight_i v_i` with that participant weighted one.
    /// The normal points against the reference gradient, a positive normal velocity
    /// approaches. Flipping the reference flips both, so the correction does not depend on
    /// which side it comes from.
    pub(crate) fn correct_velocity(&self, state: &mut PbdState, dt: Real) {
        if dt <= 0.0
            || !self.flags.contains(ConstraintFlags::CORRECT_VELOCITY)
            || self.flags.contains(ConstraintFlags::INACTIVE)
            || self.particles.is_empty()
        {
            return;
        }

        let g_ref = match self
            .gradients
            .iter()
            .max_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))
        {
            Some(g) => *g,
            None => return,
        };
        let g_ref_sq = g_ref.norm_squared();
        if g_ref_sq < EPSILON * EPSILON {
            return;
        }
        let normal = -g_ref / g_ref_sq.sqrt();
        let weights: Vec<Real> = self.gradients.iter().map(|g| g.dot(&g_ref) / g_ref_sq).collect();

        let relative_velocity: Vector3 = (0..self.particles.len())
            .map(|i| self.point_velocity(state, i) * weights[i])
            .sum();
        let vn = normal.dot(&relative_velocity);
        let vt = relative_velocity - normal * vn;
        let vt_mag = vt.norm();

        let restitution = if vn.abs() < 1.0e-10 { 0.0 } else { self.restitution };
        let mut dv = normal * (-vn + (-restitution * vn).min(0.0));
        if vt_mag > 0.0 {
            let normal_impulse = self.lambda.abs() / dt;
            dv -= vt * ((self.friction * normal_impulse).min(vt_mag) / vt_mag);
        }
        let dv_mag = dv.norm();
        if dv_mag == 0.0 {
            return;
        }
        let dir = dv / dv_mag;

        let w: Real = self
            .particles
            .iter()
            .enumerate()
            .map(|(i, pid)| {
                let body = state.body(pid.body);
                let inv_mass = body.inv_masses[pid.index];
                if inv_mass <= 0.0 {
                    return 0.0;
                }
                let mut gen = inv_mass;
                if body.body_type() == BodyType::Rigid {
                    gen += lever_arm_weight(
                        &body.orientations[pid.index],
                        &body.inv_inertias[pid.index],
                        &self.lever_arms[i],
                        &dir,
                    );
                }
                weights[i] * weights[i] * gen
            })
            .sum();
        if w == 0.0 {
            return;
        }

        let p = dv / w;
        for (i, pid) in self.particles.iter().enumerate() {
            let body = state.body_mut(pid.body);
            let inv_mass = body.inv_masses[pid.index];
            if inv_mass <= 0.0 {
                continue;
            }
            let impulse = p * weights[i];
            body.velocities[pid.index] += impulse * inv_mass;
            if body.body_type() == BodyType::Rigid {
                let inv_inertia =
                    inverse_inertia_world(&body.orientations[pid.index], &body.inv_inertias[pid.index]);
                body.angular_velocities[pid.index] += inv_inertia * self.lever_arms[i].cross(&impulse);
            }
        }
    }
}

/// Projection contract shared by every constraint kind
///
/// Implementors provide the constraint value and gradients; the solve itself is split into
/// an evaluation phase that only reads the state and an apply phase that writes it, so
/// constraints without shared particles can be evaluated concurrently.
pub trait PbdConstraint {
    /// Returns the shared constraint data
    fn base(&self) -> &ConstraintBase;

    /// Returns the shared constraint data mutably
    fn base_mut(&mut self) -> &mut ConstraintBase;

    /// Computes the constraint value and writes the gradients into the shared data
    ///
    /// Returns `None` when the geometry is degenerate or the contact no longer applies.
    fn compute_value_and_gradient(&mut self, state: &PbdState) -> Option<Real>;

    /// Scale applied to the correction of the participant at `index`
    fn particle_scale(&self, _index: usize) -> Real {
        1.0
    }

    /// Multiplier increment for value `c` and generalized inverse mass `w`
    fn delta_lambda(&mut self, c: Real, w: Real, dt: Real, solver: SolverType) -> Real {
        self.base_mut().solve_delta_lambda(c, w, dt, solver)
    }

    /// Evaluates the constraint against a read-only state and stores the correction
    ///
    /// Returns true if a correction is pending.
    fn compute_correction(&mut self, state: &PbdState, dt: Real, solver: SolverType) -> bool {
        self.base_mut().d_lambda = 0.0;
        if dt == 0.0 {
            return false;
        }

        let c = match self.compute_value_and_gradient(state) {
            Some(c) => c,
            None => {
                self.base_mut().flags.insert(ConstraintFlags::INACTIVE);
                return false;
            }
        };
        self.base_mut().flags.remove(ConstraintFlags::INACTIVE);

        let w = self.base().generalized_inv_mass(state);
        if w == 0.0 {
            return false;
        }

        let d_lambda = self.delta_lambda(c, w, dt, solver);
        self.base_mut().d_lambda = d_lambda;
        d_lambda != 0.0
    }

    /// Writes the correction computed by [`PbdConstraint::compute_correction`]
    fn apply_correction(&self, state: &mut PbdState) {
        self.base().apply_positions(state, |i| self.particle_scale(i));
    }

    /// Evaluates and applies one projection
    fn project(&mut self, state: &mut PbdState, dt: Real, solver: SolverType) {
        if self.compute_correction(state, dt, solver) {
            self.apply_correction(state);
        }
    }

    /// Applies friction and restitution after the velocity update
    fn correct_velocity(&mut self, state: &mut PbdState, dt: Real) {
        self.base().correct_velocity(state, dt);
    }
}
