use approx::assert_relative_eq;
use pbd_engine::{
    bodies::{BodyGeometry, CellIndices, PbdBody},
    collision::{CellType, CollisionElement, CollisionSide, ConstraintPool, PbdCollisionHandler, PooledKind},
    constraints::{CollisionKind, Constraint, ContactKind, PbdConstraint},
    core::{BodyHandle, ParticleId, PbdState, SolverType},
    math::{Matrix3, Quaternion, Real, Vector3},
};

const DT: Real = 0.01;

fn deformable(state: &mut PbdState, geometry: BodyGeometry) -> BodyHandle {
    let mut body = PbdBody::new();
    body.set_geometry(geometry);
    body.initialize().unwrap();
    state.insert_body(body)
}

fn rigid(state: &mut PbdState, position: Vector3) -> BodyHandle {
    let mut body = PbdBody::new();
    body.set_rigid(position, 1.0, Quaternion::identity(), Matrix3::identity())
        .unwrap();
    body.initialize().unwrap();
    state.insert_body(body)
}

fn floor_triangle() -> Vec<Vector3> {
    vec![
        Vector3::new(-1.0, 0.0, 1.0),
        Vector3::new(1.0, 0.0, 1.0),
        Vector3::new(0.0, 0.0, -1.0),
    ]
}

fn collision_kind(c: &Constraint) -> Option<CollisionKind> {
    match c {
        Constraint::Collision(c) => Some(c.kind()),
        _ => None,
    }
}

#[test]
fn test_vertex_against_static_triangle() {
    let mut state = PbdState::new();
    let body = deformable(&mut state, BodyGeometry::points(vec![Vector3::new(0.0, -0.2, 0.0)]));
    let floor = floor_triangle();

    let mut handler = PbdCollisionHandler::new();
    let mut constraints = handler.handle(
        &mut state,
        &CollisionSide::deformable(body),
        &CollisionSide::fixed(&floor, None),
        &[CollisionElement::vertex(0)],
        &[CollisionElement::triangle([0, 1, 2])],
    );

    assert_eq!(constraints.len(), 1);
    assert_eq!(collision_kind(&constraints[0]), Some(CollisionKind::PointTriangle));
    // The triangle vertices became immovable virtual particles
    assert_eq!(state.body(BodyHandle::VIRTUAL).num_particles(), 3);
    assert!(state.body(BodyHandle::VIRTUAL).inv_masses.iter().all(|&w| w == 0.0));

    for c in constraints.iter_mut() {
        c.project(&mut state, DT, SolverType::Xpbd);
    }
    assert_relative_eq!(state.position(ParticleId::new(body, 0)).y, 0.0, epsilon = 1e-12);
}

#[test]
fn test_pair_order_is_canonicalized() {
    let mut state = PbdState::new();
    let body = deformable(&mut state, BodyGeometry::points(vec![Vector3::new(0.0, -0.2, 0.0)]));
    let floor = floor_triangle();

    let mut handler = PbdCollisionHandler::new();
    let constraints = handler.handle(
        &mut state,
        &CollisionSide::fixed(&floor, None),
        &CollisionSide::deformable(body),
        &[CollisionElement::triangle([0, 1, 2])],
        &[CollisionElement::vertex(0)],
    );

    assert_eq!(constraints.len(), 1);
    let particles = constraints[0].base().particles();
    assert_eq!(particles[0], ParticleId::new(body, 0));
    assert!(particles[1..].iter().all(|p| p.body == BodyHandle::VIRTUAL));
}

#[test]
fn test_triangle_cells_resolved_from_body_topology() {
    let mut state = PbdState::new();
    let cloth = deformable(&mut state, BodyGeometry::triangles(floor_triangle(), vec![[0, 1, 2]]));
    let ball = deformable(&mut state, BodyGeometry::points(vec![Vector3::new(0.0, -0.1, 0.0)]));

    let mut handler = PbdCollisionHandler::new();
    let constraints = handler.handle(
        &mut state,
        &CollisionSide::deformable(ball),
        &CollisionSide::deformable(cloth),
        &[CollisionElement::vertex(0)],
        &[CollisionElement::cell(CellType::Triangle, 0)],
    );

    assert_eq!(constraints.len(), 1);
    let particles = constraints[0].base().particles();
    assert_eq!(particles[1..], [0, 1, 2].map(|i| ParticleId::new(cloth, i)));
    assert_eq!(state.body(BodyHandle::VIRTUAL).num_particles(), 0);
}

#[test]
fn test_vertex_map_translates_collision_vertices() {
    let mut state = PbdState::new();
    let body = deformable(
        &mut state,
        BodyGeometry::points(vec![Vector3::new(5.0, 0.0, 0.0), Vector3::new(0.0, -0.2, 0.0)]),
    );
    let floor = floor_triangle();
    let cells = CellIndices::Points;
    let map = [1usize];

    let mut handler = PbdCollisionHandler::new();
    let constraints = handler.handle(
        &mut state,
        &CollisionSide::deformable(body).with_mapping(&cells, &map),
        &CollisionSide::fixed(&floor, None),
        &[CollisionElement::vertex(0)],
        &[CollisionElement::triangle([0, 1, 2])],
    );

    assert_eq!(constraints[0].base().particles()[0], ParticleId::new(body, 1));
}

#[test]
fn test_one_way_point_moves_to_target() {
    let mut state = PbdState::new();
    let body = deformable(&mut state, BodyGeometry::points(vec![Vector3::new(0.0, -0.3, 0.0)]));

    let mut handler = PbdCollisionHandler::new();
    let mut constraints = handler.handle(
        &mut state,
        &CollisionSide::deformable(body),
        &CollisionSide::fixed(&[], None),
        &[CollisionElement::PointIndexDirection {
            index: 0,
            dir: Vector3::y(),
            depth: 0.3,
        }],
        &[],
    );

    assert_eq!(constraints.len(), 1);
    assert_eq!(collision_kind(&constraints[0]), Some(CollisionKind::PointPoint));
    let target = constraints[0].base().particles()[1];
    assert_eq!(target.body, BodyHandle::VIRTUAL);
    assert_relative_eq!(state.position(target).y, 0.0, epsilon = 1e-12);

    constraints[0].project(&mut state, DT, SolverType::Xpbd);
    assert_relative_eq!(state.position(ParticleId::new(body, 0)).y, 0.0, epsilon = 1e-12);
    assert_relative_eq!(state.position(target).y, 0.0, epsilon = 1e-12);
}

#[test]
fn test_rigid_body_against_vertex() {
    let mut state = PbdState::new();
    let ball = rigid(&mut state, Vector3::zeros());
    let cloth = deformable(&mut state, BodyGeometry::points(vec![Vector3::new(0.0, 0.5, 0.0)]));
    let contact = [Vector3::new(0.0, 1.0, 0.0)];

    let mut handler = PbdCollisionHandler::new();
    handler.set_compliance(0.0);
    let mut constraints = handler.handle(
        &mut state,
        &CollisionSide::deformable(cloth),
        &CollisionSide::rigid(ball, &contact),
        &[CollisionElement::vertex(0)],
        &[CollisionElement::vertex(0)],
    );

    assert_eq!(constraints.len(), 1);
    let Constraint::Contact(contact_constraint) = &constraints[0] else {
        panic!("expected a rigid contact, got {}", constraints[0].kind_name());
    };
    assert_eq!(*contact_constraint.kind(), ContactKind::VertexToBody);
    assert_eq!(constraints[0].base().particles()[0], ParticleId::new(ball, 0));

    constraints[0].project(&mut state, DT, SolverType::Xpbd);
    let vertex = state.position(ParticleId::new(cloth, 0)).y;
    let contact_point = state.position(ParticleId::new(ball, 0)).y
        + state.orientation(ParticleId::new(ball, 0)).transform_vector(&Vector3::y()).y;
    assert!(vertex > 0.5);
    assert!((contact_point - vertex).abs() < 0.5);
}

#[test]
fn test_two_rigid_bodies_produce_normal_contact() {
    let mut state = PbdState::new();
    let a = rigid(&mut state, Vector3::zeros());
    let b = rigid(&mut state, Vector3::new(0.0, 1.5, 0.0));
    let (pa, pb) = (Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.0, 0.5, 0.0));

    let mut handler = PbdCollisionHandler::new();
    let constraints = handler.handle(
        &mut state,
        &CollisionSide::rigid(a, &[]),
        &CollisionSide::rigid(b, &[]),
        &[CollisionElement::PointDirection {
            point: pa,
            dir: Vector3::y(),
            depth: 0.5,
        }],
        &[CollisionElement::PointDirection {
            point: pb,
            dir: -Vector3::y(),
            depth: 0.5,
        }],
    );

    assert_eq!(constraints.len(), 1);
    assert_eq!(PooledKind::of(&constraints[0]), Some(PooledKind::BodyBody));
}

#[test]
fn test_output_is_grouped_by_kind() {
    let mut state = PbdState::new();
    let body = deformable(
        &mut state,
        BodyGeometry::points(vec![Vector3::new(0.0, -0.2, 0.0), Vector3::new(0.1, 0.0, 0.0)]),
    );
    let other = deformable(&mut state, BodyGeometry::points(vec![Vector3::new(0.1, 0.05, 0.0)]));
    let floor = floor_triangle();

    let mut handler = PbdCollisionHandler::new();
    let constraints = handler.handle(
        &mut state,
        &CollisionSide::deformable(body),
        &CollisionSide::fixed(&floor, None),
        &[CollisionElement::vertex(0)],
        &[CollisionElement::triangle([0, 1, 2])],
    );
    let mut all = constraints;
    all.extend(handler.handle(
        &mut state,
        &CollisionSide::deformable(body),
        &CollisionSide::deformable(other),
        &[CollisionElement::vertex(1)],
        &[CollisionElement::vertex(0)],
    ));
    assert_eq!(all.len(), 2);

    let mixed = handler.handle(
        &mut state,
        &CollisionSide::deformable(body),
        &CollisionSide::fixed(&floor, None),
        &[CollisionElement::vertex(0), CollisionElement::vertex(1)],
        &[CollisionElement::triangle([0, 1, 2]), CollisionElement::vertex(0)],
    );
    let kinds: Vec<_> = mixed.iter().map(collision_kind).collect();
    assert_eq!(kinds, vec![Some(CollisionKind::PointPoint), Some(CollisionKind::PointTriangle)]);
}

#[test]
fn test_spent_constraints_are_reused() {
    let mut state = PbdState::new();
    let body = deformable(&mut state, BodyGeometry::points(vec![Vector3::new(0.0, -0.2, 0.0)]));
    let floor = floor_triangle();
    let mut handler = PbdCollisionHandler::new();
    handler.set_friction(0.3);

    let run = |handler: &mut PbdCollisionHandler, state: &mut PbdState| {
        handler.handle(
            state,
            &CollisionSide::deformable(body),
            &CollisionSide::fixed(&floor, None),
            &[CollisionElement::vertex(0)],
            &[CollisionElement::triangle([0, 1, 2])],
        )
    };

    let first = run(&mut handler, &mut state);
    handler.recycle(vec![first]);
    assert_eq!(handler.pool().available(PooledKind::PointTriangle), 1);

    let second = run(&mut handler, &mut state);
    assert_eq!(handler.pool().available(PooledKind::PointTriangle), 0);
    assert_eq!(second.len(), 1);
    assert_relative_eq!(second[0].base().friction(), 0.3);
    assert_eq!(second[0].base().lambda(), 0.0);
}

#[test]
fn test_pool_drops_constraints_beyond_capacity() {
    let mut state = PbdState::new();
    let a = state.add_virtual_particle(Vector3::zeros(), 1.0, Vector3::zeros(), false);
    let b = state.add_virtual_particle(Vector3::x(), 1.0, Vector3::zeros(), false);

    let mut handler = PbdCollisionHandler::new();
    handler.set_pool(ConstraintPool::with_capacity(2));
    let spent: Vec<Constraint> = (0..5)
        .map(|_| {
            pbd_engine::constraints::CollisionConstraint::new(CollisionKind::PointPoint, &[a, b], 1.0, 1.0)
                .into()
        })
        .collect();
    handler.recycle(vec![spent]);

    assert_eq!(handler.pool().capacity(), 2);
    assert_eq!(handler.pool().available(PooledKind::PointPoint), 2);
    assert_eq!(handler.pool().available(PooledKind::EdgeEdge), 0);
}

#[test]
fn test_edge_against_edge() {
    let mut state = PbdState::new();
    let a = deformable(
        &mut state,
        BodyGeometry::lines(
            vec![Vector3::new(-1.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)],
            vec![[0, 1]],
        ),
    );
    let b = deformable(
        &mut state,
        BodyGeometry::lines(
            vec![Vector3::new(0.0, 0.1, -1.0), Vector3::new(0.0, 0.1, 1.0)],
            vec![[0, 1]],
        ),
    );

    let mut handler = PbdCollisionHandler::new();
    let constraints = handler.handle(
        &mut state,
        &CollisionSide::deformable(a),
        &CollisionSide::deformable(b),
        &[CollisionElement::cell(CellType::Edge, 0)],
        &[CollisionElement::edge([0, 1])],
    );

    assert_eq!(constraints.len(), 1);
    assert_eq!(collision_kind(&constraints[0]), Some(CollisionKind::EdgeEdge));
}
