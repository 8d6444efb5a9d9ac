use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use pbd_engine::{
    bodies::{BodyGeometry, BodyType, PbdBody},
    collision::{CollisionElement, CollisionSide, PooledKind},
    constraints::{Constraint, DistanceConstraint, FemMaterial, GeneratorKind},
    core::{BodyHandle, ParticleId, PbdConfig, PbdModel, SolverType},
    error::PbdError,
    math::{Matrix3, Quaternion, Real, Vector3},
};

fn still_config(dt: Real) -> PbdConfig {
    let mut config = PbdConfig::default();
    config.dt = dt;
    config.gravity = Vector3::new(0.0, -10.0, 0.0);
    config.linear_damping = 0.0;
    config.angular_damping = 0.0;
    config
}

/// Two triangles forming a unit square in the y = 0 plane
fn quad() -> BodyGeometry {
    BodyGeometry::triangles(
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 1.0),
        ],
        vec![[0, 1, 2], [1, 3, 2]],
    )
}

/// An `n` by `n` triangulated cloth with unit spacing in the y = 0 plane
fn cloth(n: usize) -> BodyGeometry {
    let mut vertices = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            vertices.push(Vector3::new(j as Real, 0.0, i as Real));
        }
    }
    let mut triangles = Vec::new();
    for i in 0..n - 1 {
        for j in 0..n - 1 {
            let v = i * n + j;
            triangles.push([v, v + 1, v + n]);
            triangles.push([v + 1, v + n + 1, v + n]);
        }
    }
    BodyGeometry::triangles(vertices, triangles)
}

fn body_with(geometry: BodyGeometry) -> PbdBody {
    let mut body = PbdBody::new();
    body.set_geometry(geometry);
    body
}

fn single_particle(model: &mut PbdModel, position: Vector3) -> BodyHandle {
    model.insert_body(body_with(BodyGeometry::points(vec![position])))
}

#[test]
fn test_initialize_runs_generators() {
    let mut model = PbdModel::new(still_config(0.01));
    let body = model.insert_body(body_with(quad()));
    model.config_mut().enable_constraint(GeneratorKind::Distance, 1.0e6, body);
    model.config_mut().enable_constraint(GeneratorKind::Dihedral, 1.0e3, body);
    model.initialize().unwrap();

    let constraints = model.constraints().constraints();
    let distances = constraints.iter().filter(|c| matches!(c, Constraint::Distance(_))).count();
    let dihedrals = constraints.iter().filter(|c| matches!(c, Constraint::Dihedral(_))).count();
    assert_eq!(distances, 5);
    assert_eq!(dihedrals, 1);
    assert_eq!(constraints[0].kind_name(), "distance");
    assert!(model.constraints().is_partitioned());
    assert!(model.is_initialized());
}

#[test]
fn test_initialize_rejects_mismatched_generator() {
    let mut model = PbdModel::default();
    let body = model.insert_body(body_with(quad()));
    model.config_mut().enable_constraint(GeneratorKind::Volume, 1.0, body);

    assert!(matches!(model.initialize(), Err(PbdError::InvalidParameter(_))));
}

#[test]
fn test_initialize_rejects_unknown_generator_body() {
    let mut model = PbdModel::default();
    let body = model.add_body();
    model.config_mut().enable_fem_constraint(FemMaterial::StVK, body);

    assert!(model.initialize().is_err());
}

#[test]
fn test_initialize_twice_fails() {
    let mut model = PbdModel::default();
    single_particle(&mut model, Vector3::zeros());
    model.initialize().unwrap();

    assert!(matches!(model.initialize(), Err(PbdError::InvalidState(_))));
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = PbdConfig::default();
    config.dt = -1.0;
    let mut model = PbdModel::new(config);
    single_particle(&mut model, Vector3::zeros());

    assert!(matches!(model.initialize(), Err(PbdError::InvalidParameter(_))));
}

#[test]
fn test_out_of_range_fixed_node_fails() {
    let mut model = PbdModel::default();
    let mut body = body_with(BodyGeometry::points(vec![Vector3::zeros()]));
    body.set_fixed_node_ids(vec![3]);
    model.insert_body(body);

    assert!(model.initialize().is_err());
}

#[test]
fn test_free_fall() {
    let mut model = PbdModel::new(still_config(0.1));
    let body = single_particle(&mut model, Vector3::zeros());
    model.initialize().unwrap();
    let pid = ParticleId::new(body, 0);

    model.step();
    assert_relative_eq!(model.state().position(pid).y, -0.1, epsilon = 1e-12);
    assert_relative_eq!(model.state().velocity(pid).y, -1.0, epsilon = 1e-12);

    model.step();
    assert_relative_eq!(model.state().position(pid).y, -0.3, epsilon = 1e-12);
    assert_relative_eq!(model.state().velocity(pid).y, -2.0, epsilon = 1e-12);
}

#[test]
fn test_body_damping_override() {
    let mut model = PbdModel::new(still_config(0.1));
    let damped = single_particle(&mut model, Vector3::zeros());
    let free = single_particle(&mut model, Vector3::x());
    model.config_mut().set_body_linear_damping(damped, 1.0);
    model.initialize().unwrap();

    model.step();
    assert_eq!(*model.state().position(ParticleId::new(damped, 0)), Vector3::zeros());
    assert_relative_eq!(model.state().position(ParticleId::new(free, 0)).y, -0.1, epsilon = 1e-12);
}

#[test]
fn test_external_force_is_consumed_by_one_step() {
    let mut config = still_config(0.1);
    config.gravity = Vector3::zeros();
    let mut model = PbdModel::new(config);
    let body = single_particle(&mut model, Vector3::zeros());
    model.initialize().unwrap();

    model.get_body_mut(body).unwrap().apply_force(Vector3::new(2.0, 0.0, 0.0));
    model.step();
    let pid = ParticleId::new(body, 0);
    assert_relative_eq!(model.state().velocity(pid).x, 0.2, epsilon = 1e-12);

    model.step();
    assert_relative_eq!(model.state().velocity(pid).x, 0.2, epsilon = 1e-12);
    assert_eq!(*model.get_body(body).unwrap().external_force(), Vector3::zeros());
}

#[test]
fn test_fixed_corners_hold_hanging_cloth() {
    let mut config = PbdConfig::default();
    config.iterations = 20;
    let mut model = PbdModel::new(config);
    let mut body = body_with(cloth(5));
    body.set_fixed_node_ids(vec![0, 4]);
    let handle = model.insert_body(body);
    model.config_mut().enable_constraint(GeneratorKind::Distance, 1.0e6, handle);
    model.initialize().unwrap();

    for _ in 0..50 {
        model.step();
    }

    let state = model.state();
    assert_eq!(*state.position(ParticleId::new(handle, 0)), Vector3::zeros());
    assert_eq!(*state.position(ParticleId::new(handle, 4)), Vector3::new(4.0, 0.0, 0.0));
    assert!(state.position(ParticleId::new(handle, 24)).y < -0.1);
    for i in 0..25 {
        assert!(state.position(ParticleId::new(handle, i)).iter().all(|c| c.is_finite()));
    }
}

#[test]
fn test_legacy_solver_keeps_rod_length() {
    let mut config = PbdConfig::default();
    config.solver_type = SolverType::Pbd;
    config.iterations = 50;
    config.do_partitioning = false;
    let mut model = PbdModel::new(config);
    let mut body = body_with(BodyGeometry::lines(
        vec![Vector3::zeros(), Vector3::x(), Vector3::new(2.0, 0.0, 0.0)],
        vec![[0, 1], [1, 2]],
    ));
    body.set_fixed_node_ids(vec![0]);
    let handle = model.insert_body(body);
    model.config_mut().enable_constraint(GeneratorKind::Distance, 1.0, handle);
    model.config_mut().enable_bend_constraint(0.1, 1, false, handle);
    model.initialize().unwrap();
    assert!(!model.constraints().is_partitioned());

    for _ in 0..20 {
        model.step();
    }
    let state = model.state();
    let segment = (state.position(ParticleId::new(handle, 1)) - state.position(ParticleId::new(handle, 0))).norm();
    assert_relative_eq!(segment, 1.0, epsilon = 1e-3);
}

#[test]
fn test_observers_see_every_step() {
    let mut model = PbdModel::default();
    let body = single_particle(&mut model, Vector3::zeros());
    model.initialize().unwrap();

    let heights = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&heights);
    model.add_sync_observer(move |state| {
        sink.lock().unwrap().push(state.position(ParticleId::new(body, 0)).y);
    });

    model.step();
    model.step();
    let heights = heights.lock().unwrap();
    assert_eq!(heights.len(), 2);
    assert!(heights[1] < heights[0]);
}

#[test]
fn test_reset_restores_initial_state() {
    let mut model = PbdModel::default();
    let body = single_particle(&mut model, Vector3::new(0.0, 1.0, 0.0));
    model.initialize().unwrap();

    for _ in 0..10 {
        model.step();
    }
    let pid = ParticleId::new(body, 0);
    assert!(model.state().position(pid).y < 1.0);

    model.reset_to_initial_state();
    assert_eq!(*model.state().position(pid), Vector3::new(0.0, 1.0, 0.0));
    assert_eq!(*model.state().velocity(pid), Vector3::zeros());
}

#[test]
fn test_virtual_particles_lifetime() {
    let mut model = PbdModel::default();
    single_particle(&mut model, Vector3::zeros());
    model.initialize().unwrap();

    let persistent = model.add_virtual_particle(Vector3::new(0.0, 5.0, 0.0), 0.0, Vector3::zeros(), true);
    model.step_with(|m| {
        let transient = m.add_virtual_particle(Vector3::zeros(), 1.0, Vector3::zeros(), false);
        assert_eq!(transient.body, BodyHandle::VIRTUAL);
        assert_eq!(m.state().body(BodyHandle::VIRTUAL).num_particles(), 1);
    });

    assert_eq!(model.state().body(BodyHandle::VIRTUAL).num_particles(), 0);
    // Virtual particles are never integrated
    assert_eq!(*model.state().position(persistent), Vector3::new(0.0, 5.0, 0.0));

    model.clear_persistent_virtual_particles();
    assert_eq!(model.state().body(BodyHandle::PERSISTENT_VIRTUAL).num_particles(), 0);
}

#[test]
fn test_injected_collision_stops_particle_at_floor() {
    let mut model = PbdModel::new(still_config(0.01));
    let body = single_particle(&mut model, Vector3::zeros());
    model.initialize().unwrap();
    let floor = vec![
        Vector3::new(-1.0, 0.0, 1.0),
        Vector3::new(1.0, 0.0, 1.0),
        Vector3::new(0.0, 0.0, -1.0),
    ];

    model.step_with(|m| {
        let generated = m.handle_collisions(
            &CollisionSide::deformable(body),
            &CollisionSide::fixed(&floor, None),
            &[CollisionElement::vertex(0)],
            &[CollisionElement::triangle([0, 1, 2])],
        );
        assert_eq!(generated, 1);
        assert_eq!(m.num_collision_constraints(), 1);
    });

    let pid = ParticleId::new(body, 0);
    assert_relative_eq!(model.state().position(pid).y, 0.0, epsilon = 1e-12);
    assert_relative_eq!(model.state().velocity(pid).y, 0.0, epsilon = 1e-12);
    assert_eq!(model.num_collision_constraints(), 0);
    assert_eq!(model.collision_handler().pool().available(PooledKind::PointTriangle), 1);
    assert_eq!(model.state().body(BodyHandle::VIRTUAL).num_particles(), 0);
}

#[test]
fn test_rigid_body_falls_without_spinning() {
    let mut model = PbdModel::new(still_config(0.01));
    let mut body = PbdBody::new();
    body.set_rigid(Vector3::zeros(), 2.0, Quaternion::identity(), Matrix3::identity())
        .unwrap();
    let handle = model.insert_body(body);
    model.initialize().unwrap();

    for _ in 0..10 {
        model.step();
    }
    let body = model.get_body(handle).unwrap();
    assert_eq!(body.body_type(), BodyType::Rigid);
    assert!(body.rigid_position().unwrap().y < 0.0);
    assert_relative_eq!(body.rigid_orientation().unwrap().angle(), 0.0, epsilon = 1e-12);
}

#[test]
fn test_topology_change_regenerates_constraints() {
    let mut model = PbdModel::new(still_config(0.01));
    let body = model.insert_body(body_with(quad()));
    model.config_mut().enable_constraint(GeneratorKind::Distance, 1.0e6, body);
    model.initialize().unwrap();
    assert_eq!(model.constraints().len(), 5);

    let vertex = HashSet::from([3]);
    assert_eq!(model.remove_constraints_touching(body, &vertex), 2);
    assert_eq!(model.constraints().len(), 3);

    assert_eq!(model.add_constraints_for_vertices(&vertex, body).unwrap(), 2);
    assert_eq!(model.constraints().len(), 5);
    assert!(model.constraints().is_partitioned());
}

#[test]
fn test_remove_body_drops_its_constraints() {
    let mut model = PbdModel::new(still_config(0.01));
    let a = model.insert_body(body_with(quad()));
    let b = single_particle(&mut model, Vector3::new(0.0, 1.0, 0.0));
    model.config_mut().enable_constraint(GeneratorKind::Distance, 1.0e6, a);
    model.initialize().unwrap();
    model.add_constraint(DistanceConstraint::new(
        ParticleId::new(a, 0),
        ParticleId::new(b, 0),
        1.0,
    ));
    assert_eq!(model.constraints().len(), 6);

    model.remove_body(b).unwrap();
    assert_eq!(model.constraints().len(), 5);
    assert!(model.get_body(b).is_err());
    assert!(model.remove_body(b).is_err());

    model.remove_body(a).unwrap();
    assert!(model.constraints().is_empty());
    assert!(model.config().generators().is_empty());
    model.step();
}

#[test]
fn test_reset_recycles_pending_collision_constraints() {
    let mut model = PbdModel::new(still_config(0.01));
    let body = single_particle(&mut model, Vector3::new(0.0, -0.1, 0.0));
    model.initialize().unwrap();
    let floor = vec![
        Vector3::new(-1.0, 0.0, 1.0),
        Vector3::new(1.0, 0.0, 1.0),
        Vector3::new(0.0, 0.0, -1.0),
    ];

    model.handle_collisions(
        &CollisionSide::deformable(body),
        &CollisionSide::fixed(&floor, None),
        &[CollisionElement::vertex(0)],
        &[CollisionElement::triangle([0, 1, 2])],
    );
    assert_eq!(model.num_collision_constraints(), 1);
    assert_eq!(model.collision_handler().pool().available(PooledKind::PointTriangle), 0);

    model.reset_to_initial_state();
    assert_eq!(model.num_collision_constraints(), 0);
    assert_eq!(model.collision_handler().pool().available(PooledKind::PointTriangle), 1);
}
