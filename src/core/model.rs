use std::collections::HashSet;

use tracing::{debug, info};

use crate::bodies::PbdBody;
use crate::collision::{CollisionElement, CollisionSide, PbdCollisionHandler};
use crate::constraints::{Constraint, ConstraintContainer, PbdConstraint};
use crate::core::{BodyHandle, ParticleId, PbdConfig, PbdState};
use crate::error::PbdError;
use crate::integration::{IntegrationParams, Integrator, SymplecticEulerIntegrator};
use crate::math::{Matrix3, Quaternion, Real, Vector3};
use crate::solver::{CollisionSolver, PbdSolver};
use crate::Result;

type SyncObserver = Box<dyn FnMut(&PbdState) + Send>;

/// The simulation model: owns the bodies, the constraints and the step pipeline
///
/// A step runs, in order, position prediction, caller injection, the internal constraint
/// solve, the collision constraint solve, the velocity update with collision velocity
/// correction, removal of transient virtual particles and the sync observers.
pub struct PbdModel {
    /// Configuration of the simulation
    config: PbdConfig,

    /// Live body store
    state: PbdState,

    /// Snapshot taken at initialization
    initial_state: PbdState,

    /// Internal constraints
    constraints: ConstraintContainer,

    solver: PbdSolver,
    collision_solver: CollisionSolver,
    collision_handler: PbdCollisionHandler,
    integrator: Box<dyn Integrator>,
    observers: Vec<SyncObserver>,
    initialized: bool,
}

impl Default for PbdModel {
    fn default() -> Self {
        Self::new(PbdConfig::default())
    }
}

impl PbdModel {
    /// Creates a model with the given configuration
    pub fn new(config: PbdConfig) -> Self {
        Self {
            config,
            state: PbdState::new(),
            initial_state: PbdState::new(),
            constraints: ConstraintContainer::new(),
            solver: PbdSolver::new(),
            collision_solver: CollisionSolver::new(),
            collision_handler: PbdCollisionHandler::new(),
            integrator: Box::new(SymplecticEulerIntegrator::new()),
            observers: Vec::new(),
            initialized: false,
        }
    }

    /// Returns the configuration
    pub fn config(&self) -> &PbdConfig {
        &self.config
    }

    /// Returns the configuration mutably
    ///
    /// Run-time parameters take effect on the next step. Generators registered after
    /// [`PbdModel::initialize`] only run through [`PbdModel::add_constraints_for_vertices`].
    pub fn config_mut(&mut self) -> &mut PbdConfig {
        &mut self.config
    }

    /// Returns the live body store
    pub fn state(&self) -> &PbdState {
        &self.state
    }

    /// Returns the live body store mutably
    pub fn state_mut(&mut self) -> &mut PbdState {
        &mut self.state
    }

    /// Returns the snapshot taken at initialization
    pub fn initial_state(&self) -> &PbdState {
        &self.initial_state
    }

    /// Registers an empty body and returns its handle
    pub fn add_body(&mut self) -> BodyHandle {
        self.state.add_body()
    }

    /// Registers a configured body and returns its handle
    pub fn insert_body(&mut self, body: PbdBody) -> BodyHandle {
        self.state.insert_body(body)
    }

    /// Gets a body by its handle
    pub fn get_body(&self, handle: BodyHandle) -> Result<&PbdBody> {
        self.state.get_body(handle)
    }

    /// Gets a body mutably by its handle
    pub fn get_body_mut(&mut self, handle: BodyHandle) -> Result<&mut PbdBody> {
        self.state.get_body_mut(handle)
    }

    /// Removes a body together with its generators and every constraint referencing it
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<PbdBody> {
        let body = self.state.remove_body(handle)?;
        self.config.remove_generators(handle);

        let removed = self
            .constraints
            .retain(|c| c.base().particles().iter().all(|p| p.body != handle));
        self.rebuild_partitions();

        debug!(body = handle.0, removed, "removed body constraints");
        Ok(body)
    }

    /// Returns the internal constraints
    pub fn constraints(&self) -> &ConstraintContainer {
        &self.constraints
    }

    /// Returns the internal constraints mutably
    ///
    /// Changing the list clears the partitions; call [`PbdModel::rebuild_partitions`]
    /// afterwards.
    pub fn constraints_mut(&mut self) -> &mut ConstraintContainer {
        &mut self.constraints
    }

    /// Returns the collision handler owned by the model
    pub fn collision_handler(&self) -> &PbdCollisionHandler {
        &self.collision_handler
    }

    /// Returns the collision handler mutably, typically from a [`PbdModel::step_with`]
    /// closure
    pub fn collision_handler_mut(&mut self) -> &mut PbdCollisionHandler {
        &mut self.collision_handler
    }

    /// Replaces the time integrator
    pub fn set_integrator(&mut self, integrator: Box<dyn Integrator>) {
        self.integrator = integrator;
    }

    /// Returns true once [`PbdModel::initialize`] succeeded
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Populates the bodies, runs the registered constraint generators, partitions the
    /// constraints and takes the initial snapshot
    ///
    /// Constraints added before initialization are kept and solved before the generated
    /// ones.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Err(PbdError::InvalidState("model is already initialized".to_string()));
        }
        self.config.validate()?;
        self.config.fem_params.compute_elastic_constants();

        for (handle, body) in self.state.bodies_mut() {
            if !handle.is_virtual() {
                body.initialize()?;
            }
        }

        let mut generated = Vec::new();
        for entry in self.config.generators() {
            entry.generator.generate(
                &self.state,
                entry.body,
                &self.config.fem_params,
                None,
                &mut generated,
            )?;
        }
        self.constraints.extend(generated);
        self.rebuild_partitions();

        self.initial_state.deep_copy(&self.state);
        self.initialized = true;

        info!(
            bodies = self.state.num_bodies() - 2,
            constraints = self.constraints.len(),
            partitions = self.constraints.partitions().len(),
            "PBD model initialized"
        );
        Ok(())
    }

    /// Partitions the internal constraints if partitioning is enabled, otherwise drops
    /// any partitions
    pub fn rebuild_partitions(&mut self) {
        if self.config.do_partitioning {
            self.constraints.partition_constraints();
        } else {
            self.constraints.clear_partitions();
        }
    }

    /// Advances the simulation by one time step
    pub fn step(&mut self) {
        self.step_with(|_| {});
    }

    /// Advances the simulation by one time step, running `inject` after position
    /// prediction and before the solve
    ///
    /// `inject` is where collision handling and external controllers add collision
    /// constraints and virtual particles.
    pub fn step_with<F>(&mut self, inject: F)
    where
        F: FnOnce(&mut PbdModel),
    {
        self.integrate_position();
        inject(self);
        self.solve_constraints();
        self.solve_collision_constraints();
        self.update_velocity();
        self.state.clear_virtual_particles();
        self.notify_observers();
    }

    fn integration_params(&self, handle: BodyHandle) -> IntegrationParams {
        IntegrationParams {
            dt: self.config.dt,
            gravity: self.config.gravity,
            linear_damping: self.config.get_linear_damping(handle),
            angular_damping: self.config.get_angular_damping(handle),
            velocity_threshold: self.config.velocity_threshold,
        }
    }

    /// Predicts positions and orientations of every user body
    ///
    /// Accumulated external forces are consumed.
    pub fn integrate_position(&mut self) {
        let handles: Vec<BodyHandle> = self.user_bodies();
        for handle in handles {
            let params = self.integration_params(handle);
            let body = self.state.body_mut(handle);
            self.integrator.integrate_position(body, &params);
            body.clear_external_forces();
        }
    }

    /// Projects the internal constraints
    pub fn solve_constraints(&mut self) {
        self.solver.set_iterations(self.config.iterations);
        self.solver.set_time_step(self.config.dt);
        self.solver.set_solver_type(self.config.solver_type);
        self.solver.set_partition_threshold(self.config.partition_threshold);
        self.solver.solve(&mut self.state, &mut self.constraints);
    }

    /// Queues collision constraints for the current step
    pub fn add_collision_constraints(&mut self, constraints: Vec<Constraint>) {
        self.collision_solver.add_constraints(constraints);
    }

    /// Runs the model's collision handler over one batch of contacts and queues the
    /// generated constraints
    ///
    /// Returns the number of generated constraints.
    pub fn handle_collisions(
        &mut self,
        side_a: &CollisionSide<'_>,
        side_b: &CollisionSide<'_>,
        elements_a: &[CollisionElement],
        elements_b: &[CollisionElement],
    ) -> usize {
        let constraints = self
            .collision_handler
            .handle(&mut self.state, side_a, side_b, elements_a, elements_b);
        let count = constraints.len();
        self.collision_solver.add_constraints(constraints);
        count
    }

    /// Returns the number of queued collision constraints
    pub fn num_collision_constraints(&self) -> usize {
        self.collision_solver.num_constraints()
    }

    /// Projects the queued collision constraints
    pub fn solve_collision_constraints(&mut self) {
        self.collision_solver.solve(
            &mut self.state,
            self.config.collision_iterations,
            self.config.dt,
            self.config.solver_type,
        );
    }

    /// Recovers velocities from the displacement of the step, then applies friction and
    /// restitution of the queued collision constraints and recycles them
    pub fn update_velocity(&mut self) {
        let handles: Vec<BodyHandle> = self.user_bodies();
        for handle in handles {
            let params = self.integration_params(handle);
            self.integrator.update_velocity(self.state.body_mut(handle), &params);
        }

        if self.config.dt > 0.0 {
            self.collision_solver
                .correct_velocities(&mut self.state, self.config.dt);
        }
        let spent = self.collision_solver.take_constraint_lists();
        self.collision_handler.recycle(spent);
    }

    fn user_bodies(&self) -> Vec<BodyHandle> {
        self.state
            .bodies()
            .map(|(handle, _)| handle)
            .filter(|handle| !handle.is_virtual())
            .collect()
    }

    /// Registers an observer called with the state at the end of every step
    pub fn add_sync_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&PbdState) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    fn notify_observers(&mut self) {
        for observer in self.observers.iter_mut() {
            observer(&self.state);
        }
    }

    /// Restores every body from the snapshot taken at initialization
    pub fn reset_to_initial_state(&mut self) {
        self.state.deep_copy(&self.initial_state);
        let pending = self.collision_solver.take_constraint_lists();
        self.collision_handler.recycle(pending);
        for c in self.constraints.constraints_mut() {
            c.base_mut().zero_lambda();
        }
        debug!("reset model to initial state");
        self.notify_observers();
    }

    /// Adds a transient or persistent virtual particle
    pub fn add_virtual_particle(
        &mut self,
        position: Vector3,
        mass: Real,
        velocity: Vector3,
        persist: bool,
    ) -> ParticleId {
        self.state.add_virtual_particle(position, mass, velocity, persist)
    }

    /// Adds a transient or persistent oriented virtual particle
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
        self.state.add_virtual_oriented_particle(
            position,
            orientation,
            mass,
            inertia,
            velocity,
            angular_velocity,
            persist,
        )
    }

    /// Removes the transient virtual particles
    pub fn clear_virtual_particles(&mut self) {
        self.state.clear_virtual_particles();
    }

    /// Removes the persistent virtual particles
    pub fn clear_persistent_virtual_particles(&mut self) {
        self.state.clear_persistent_virtual_particles();
    }

    /// Adds an internal constraint and rebuilds the partitions
    pub fn add_constraint(&mut self, constraint: impl Into<Constraint>) -> usize {
        let index = self.constraints.add(constraint);
        self.rebuild_partitions();
        index
    }

    /// Adds several internal constraints and rebuilds the partitions
    pub fn add_constraints(&mut self, constraints: impl IntoIterator<Item = Constraint>) {
        self.constraints.extend(constraints);
        self.rebuild_partitions();
    }

    /// Reruns the generators of `body` restricted to cells touching `vertices`
    ///
    /// Used after a topology change. Existing constraints are not checked for duplicates.
    /// Returns the number of added constraints.
    pub fn add_constraints_for_vertices(
        &mut self,
        vertices: &HashSet<usize>,
        body: BodyHandle,
    ) -> Result<usize> {
        let mut generated = Vec::new();
        for entry in self.config.generators().iter().filter(|e| e.body == body) {
            entry.generator.generate(
                &self.state,
                body,
                &self.config.fem_params,
                Some(vertices),
                &mut generated,
            )?;
        }
        let added = generated.len();
        self.add_constraints(generated);
        debug!(body = body.0, added, "regenerated constraints for vertices");
        Ok(added)
    }

    /// Removes every internal constraint referencing one of `vertices` of `body`
    pub fn remove_constraints_touching(&mut self, body: BodyHandle, vertices: &HashSet<usize>) -> usize {
        let removed = self.constraints.remove_constraints_touching(body, vertices);
        self.rebuild_partitions();
        removed
    }
}
