use tracing::{debug, trace};

use crate::bodies::CellIndices;
use crate::collision::{
    CellType, CollisionElement, CollisionSide, ConstraintPool, ContactCase, PooledKind, SideKind,
};
use crate::constraints::{
    CollisionConstraint, CollisionKind, Constraint, ConstraintFlags, ContactConstraint, PbdConstraint,
};
use crate::core::{BodyHandle, ParticleId, PbdState};
use crate::math::{Real, Vector3};

/// One element together with the side it belongs to
#[derive(Clone, Copy)]
struct ElementSide<'e, 'a> {
    element: &'e CollisionElement,
    side: &'e CollisionSide<'a>,
}

/// Turns contact elements reported by collision detection into constraints
///
/// Elements are classified per side, brought into canonical order and dispatched to the
/// matching constraint kind. Vertices of non simulated sides become zero mass virtual
/// particles. Spent constraints are returned through [`PbdCollisionHandler::recycle`] and
/// reused on later calls.
#[derive(Debug, Clone)]
pub struct PbdCollisionHandler {
    friction: Real,
    restitution: Real,
    compliance: Real,
    stiffness: [Real; 2],
    correct_velocity: bool,
    boundary_collisions: bool,
    pool: ConstraintPool,
    bins: [Vec<Constraint>; PooledKind::COUNT],
}

impl Default for PbdCollisionHandler {
    fn default() -> Self {
        Self {
            friction: 0.0,
            restitution: 0.0,
            compliance: 1.0e-6,
            stiffness: [1.0, 1.0],
            correct_velocity: true,
            boundary_collisions: false,
            pool: ConstraintPool::default(),
            bins: Default::default(),
        }
    }
}

impl PbdCollisionHandler {
    /// Creates a handler with default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the friction coefficient of generated constraints
    pub fn set_friction(&mut self, friction: Real) {
        self.friction = friction;
    }

    /// Returns the friction coefficient
    pub fn friction(&self) -> Real {
        self.friction
    }

    /// Sets the restitution coefficient of generated constraints
    pub fn set_restitution(&mut self, restitution: Real) {
        self.restitution = restitution;
    }

    /// Returns the restitution coefficient
    pub fn restitution(&self) -> Real {
        self.restitution
    }

    /// Sets the compliance of rigid body contacts
    pub fn set_compliance(&mut self, compliance: Real) {
        self.compliance = compliance;
    }

    /// Sets the stiffness of side A and side B for deformable collisions
    ///
    /// Non simulated sides always use zero stiffness.
    pub fn set_stiffness(&mut self, stiffness_a: Real, stiffness_b: Real) {
        self.stiffness = [stiffness_a, stiffness_b];
    }

    /// Enables friction and restitution velocity correction
    pub fn set_use_correct_velocity(&mut self, correct: bool) {
        self.correct_velocity = correct;
    }

    /// Accepts contacts slightly outside their feature
    pub fn set_enable_boundary_collisions(&mut self, enable: bool) {
        self.boundary_collisions = enable;
    }

    /// Replaces the constraint pool
    pub fn set_pool(&mut self, pool: ConstraintPool) {
        self.pool = pool;
    }

    /// Returns the constraint pool
    pub fn pool(&self) -> &ConstraintPool {
        &self.pool
    }

    /// Returns spent constraints to the pool
    pub fn recycle(&mut self, lists: impl IntoIterator<Item = Vec<Constraint>>) {
        for list in lists {
            self.pool.recycle(list);
        }
    }

    /// Generates the constraints for one batch of contacts
    ///
    /// Element lists of equal length are handled as pairs. Otherwise each element is
    /// resolved one way, on its own side, against its direction and depth. Constraints are
    /// returned grouped by kind.
    pub fn handle(
        &mut self,
        state: &mut PbdState,
        side_a: &CollisionSide<'_>,
        side_b: &CollisionSide<'_>,
        elements_a: &[CollisionElement],
        elements_b: &[CollisionElement],
    ) -> Vec<Constraint> {
        if elements_a.len() == elements_b.len() {
            for (a, b) in elements_a.iter().zip(elements_b) {
                self.handle_pair(
                    state,
                    ElementSide { element: a, side: side_a },
                    Some(ElementSide { element: b, side: side_b }),
                );
            }
        } else {
            for a in elements_a {
                self.handle_pair(state, ElementSide { element: a, side: side_a }, None);
            }
            for b in elements_b {
                self.handle_pair(state, ElementSide { element: b, side: side_b }, None);
            }
        }

        let counts: Vec<usize> = self.bins.iter().map(Vec::len).collect();
        debug!(?counts, "collision constraints generated");

        let total = counts.iter().sum();
        let mut out = Vec::with_capacity(total);
        for bin in self.bins.iter_mut() {
            out.append(bin);
        }
        out
    }

    fn side_stiffness(&self, side: &CollisionSide<'_>, index: usize) -> Real {
        if side.is_simulated() {
            self.stiffness[index]
        } else {
            0.0
        }
    }

    fn handle_pair<'e, 'a>(
        &mut self,
        state: &mut PbdState,
        mut a: ElementSide<'e, 'a>,
        mut b: Option<ElementSide<'e, 'a>>,
    ) {
        let mut case_a = ContactCase::classify(a.element, a.side);
        let mut case_b = b.map_or(ContactCase::None, |b| ContactCase::classify(b.element, b.side));

        if let Some(other) = b.as_mut() {
            if ContactCase::should_swap(case_a, case_b) {
                std::mem::swap(&mut a, other);
                std::mem::swap(&mut case_a, &mut case_b);
            }
        }

        use ContactCase::*;
        let generated = match (case_a, case_b, b) {
            (Vertex | Primitive, Vertex, Some(b)) => self.add_point_point(state, a, Some(b)),
            (Vertex, None, _) => self.add_point_point(state, a, Option::None),
            (Vertex | Primitive, Edge, Some(b)) => self.add_point_edge(state, a, b),
            (Vertex | Primitive, Triangle, Some(b)) => self.add_point_triangle(state, a, b),
            (Edge, Edge, Some(b)) => self.add_edge_edge(state, a, b),
            (Body, Vertex | Primitive, Some(b)) => self.add_body_vertex(state, a, Some(b)),
            (Body, None, _) => self.add_body_vertex(state, a, Option::None),
            (Body, Edge, Some(b)) => self.add_body_edge(state, a, b),
            (Body, Triangle, Some(b)) => self.add_body_triangle(state, a, b),
            (Body, Body, Some(b)) => self.add_body_body(state, a, b),
            _ => {
                trace!(?case_a, ?case_b, "no handling for contact case");
                return;
            }
        };
        if generated.is_none() {
            trace!(?case_a, ?case_b, "contact element could not be resolved");
        }
    }

    fn take_collision(
        &mut self,
        kind: CollisionKind,
        pooled: PooledKind,
        particles: &[ParticleId],
        stiffness: [Real; 2],
    ) {
        let mut c = match self.pool.take(pooled) {
            Some(Constraint::Collision(mut c)) => {
                c.reset(kind, particles, stiffness[0], stiffness[1]);
                c
            }
            _ => CollisionConstraint::new(kind, particles, stiffness[0], stiffness[1]),
        };
        let base = c.base_mut();
        base.set_friction(self.friction);
        base.set_restitution(self.restitution);
        base.set_correct_velocity(self.correct_velocity);
        base.set_flags(ConstraintFlags::BOUNDARY_COLLISIONS, self.boundary_collisions);
        self.bins[pooled as usize].push(c.into());
    }

    fn take_contact(&mut self, pooled: PooledKind, init: impl FnOnce(Option<ContactConstraint>) -> ContactConstraint) {
        let reused = match self.pool.take(pooled) {
            Some(Constraint::Contact(c)) => Some(c),
            _ => None,
        };
        let mut c = init(reused);
        let base = c.base_mut();
        base.set_friction(self.friction);
        base.set_restitution(self.restitution);
        base.set_correct_velocity(self.correct_velocity);
        self.bins[pooled as usize].push(c.into());
    }

    fn add_point_point(&mut self, state: &mut PbdState, a: ElementSide<'_, '_>, b: Option<ElementSide<'_, '_>>) -> Option<()> {
        let pa = vertex(state, a)?;
        let (pb, stiffness_b) = match b {
            Some(b) => (vertex(state, b)?, self.side_stiffness(b.side, 1)),
            None => (one_way_target(state, a, pa)?, 0.0),
        };
        let stiffness = [self.side_stiffness(a.side, 0), stiffness_b];
        self.take_collision(CollisionKind::PointPoint, PooledKind::PointPoint, &[pa, pb], stiffness);
        Some(())
    }

    fn add_point_edge(&mut self, state: &mut PbdState, a: ElementSide<'_, '_>, b: ElementSide<'_, '_>) -> Option<()> {
        let pa = vertex(state, a)?;
        let [b0, b1] = cell_vertices::<2>(state, b, CellType::Edge)?;
        let stiffness = [self.side_stiffness(a.side, 0), self.side_stiffness(b.side, 1)];
        self.take_collision(CollisionKind::PointEdge, PooledKind::PointEdge, &[pa, b0, b1], stiffness);
        Some(())
    }

    fn add_point_triangle(&mut self, state: &mut PbdState, a: ElementSide<'_, '_>, b: ElementSide<'_, '_>) -> Option<()> {
        let pa = vertex(state, a)?;
        let [b0, b1, b2] = cell_vertices::<3>(state, b, CellType::Triangle)?;
        let stiffness = [self.side_stiffness(a.side, 0), self.side_stiffness(b.side, 1)];
        self.take_collision(
            CollisionKind::PointTriangle,
            PooledKind::PointTriangle,
            &[pa, b0, b1, b2],
            stiffness,
        );
        Some(())
    }

    fn add_edge_edge(&mut self, state: &mut PbdState, a: ElementSide<'_, '_>, b: ElementSide<'_, '_>) -> Option<()> {
        let [a0, a1] = cell_vertices::<2>(state, a, CellType::Edge)?;
        let [b0, b1] = cell_vertices::<2>(state, b, CellType::Edge)?;
        let stiffness = [self.side_stiffness(a.side, 0), self.side_stiffness(b.side, 1)];
        self.take_collision(CollisionKind::EdgeEdge, PooledKind::EdgeEdge, &[a0, a1, b0, b1], stiffness);
        Some(())
    }

    fn add_body_vertex(&mut self, state: &mut PbdState, a: ElementSide<'_, '_>, b: Option<ElementSide<'_, '_>>) -> Option<()> {
        let (body, contact) = body_and_contact_point(a)?;
        let pb = match b {
            Some(b) => vertex(state, b)?,
            None => {
                let target = match *a.element {
                    CollisionElement::PointDirection { dir, depth, .. }
                    | CollisionElement::PointIndexDirection { dir, depth, .. } => contact + dir * depth,
                    CollisionElement::CellIndex { .. } => return None,
                };
                state.add_virtual_particle(target, 0.0, Vector3::zeros(), false)
            }
        };
        let compliance = self.compliance;
        let view: &PbdState = state;
        self.take_contact(PooledKind::BodyVertex, |reused| match reused {
            Some(mut c) => {
                c.init_vertex_to_body(view, body, contact, pb, compliance);
                c
            }
            None => ContactConstraint::vertex_to_body(view, body, contact, pb, compliance),
        });
        Some(())
    }

    fn add_body_edge(&mut self, state: &mut PbdState, a: ElementSide<'_, '_>, b: ElementSide<'_, '_>) -> Option<()> {
        let (body, contact) = body_and_contact_point(a)?;
        let edge = cell_vertices::<2>(state, b, CellType::Edge)?;
        let compliance = self.compliance;
        let view: &PbdState = state;
        self.take_contact(PooledKind::BodyEdge, |reused| match reused {
            Some(mut c) => {
                c.init_edge_to_body(view, body, contact, edge, compliance);
                c
            }
            None => ContactConstraint::edge_to_body(view, body, contact, edge[0], edge[1], compliance),
        });
        Some(())
    }

    fn add_body_triangle(&mut self, state: &mut PbdState, a: ElementSide<'_, '_>, b: ElementSide<'_, '_>) -> Option<()> {
        let (body, contact) = body_and_contact_point(a)?;
        let tri = cell_vertices::<3>(state, b, CellType::Triangle)?;
        let compliance = self.compliance;
        let view: &PbdState = state;
        self.take_contact(PooledKind::BodyTriangle, |reused| match reused {
            Some(mut c) => {
                c.init_triangle_to_body(view, body, contact, tri, compliance);
                c
            }
            None => {
                ContactConstraint::triangle_to_body(view, body, contact, tri[0], tri[1], tri[2], compliance)
            }
        });
        Some(())
    }

    fn add_body_body(&mut self, state: &mut PbdState, a: ElementSide<'_, '_>, b: ElementSide<'_, '_>) -> Option<()> {
        let (body_a, contact_a) = body_and_contact_point(a)?;
        let (body_b, contact_b) = body_and_contact_point(b)?;
        let normal = match *a.element {
            CollisionElement::PointDirection { dir, .. } => dir,
            _ => Vector3::zeros(),
        };
        let compliance = self.compliance;
        let view: &PbdState = state;
        self.take_contact(PooledKind::BodyBody, |reused| match reused {
            Some(mut c) => {
                c.init_body_to_body_normal(view, [body_a, body_b], [contact_a, contact_b], normal, compliance);
                c
            }
            None => ContactConstraint::body_to_body_normal(
                view, body_a, body_b, contact_a, contact_b, normal, compliance,
            ),
        });
        Some(())
    }
}

/// Maps a colliding geometry vertex to a particle, adding a virtual particle for static
/// sides
fn particle_for(state: &mut PbdState, side: &CollisionSide<'_>, vertex: usize) -> Option<ParticleId> {
    let vertex = match side.vertex_map {
        Some(map) => *map.get(vertex)?,
        None => vertex,
    };
    match side.kind {
        SideKind::Deformable(body) => Some(ParticleId::new(body, vertex)),
        SideKind::Rigid(body) => Some(ParticleId::new(body, 0)),
        SideKind::Static => {
            let position = *side.vertices?.get(vertex)?;
            Some(state.add_virtual_particle(position, 0.0, Vector3::zeros(), false))
        }
    }
}

/// Resolves the single vertex of an element
fn vertex(state: &mut PbdState, es: ElementSide<'_, '_>) -> Option<ParticleId> {
    match *es.element {
        CollisionElement::CellIndex {
            cell_type: CellType::Vertex,
            ids,
            ..
        } => particle_for(state, es.side, ids[0]),
        CollisionElement::PointIndexDirection { index, .. } => particle_for(state, es.side, index),
        CollisionElement::PointDirection { point, .. } => {
            Some(state.add_virtual_particle(point, 0.0, Vector3::zeros(), false))
        }
        CollisionElement::CellIndex { .. } => None,
    }
}

/// Resolves the vertices of an edge or triangle element
fn cell_vertices<const N: usize>(
    state: &mut PbdState,
    es: ElementSide<'_, '_>,
    expected: CellType,
) -> Option<[ParticleId; N]> {
    let CollisionElement::CellIndex { cell_type, ids, count } = *es.element else {
        return None;
    };
    if cell_type != expected || expected.num_vertices() != N {
        return None;
    }

    let mut vertices = [0usize; N];
    if count == N {
        vertices.copy_from_slice(&ids[..N]);
    } else if count == 1 {
        let cell = lookup_cell(state, es.side, cell_type, ids[0])?;
        vertices.copy_from_slice(&cell[..N]);
    } else {
        return None;
    }

    let mut out = [ParticleId::new(BodyHandle::VIRTUAL, 0); N];
    for (slot, &v) in out.iter_mut().zip(&vertices) {
        *slot = particle_for(state, es.side, v)?;
    }
    Some(out)
}

fn lookup_cell(state: &PbdState, side: &CollisionSide<'_>, cell_type: CellType, cell: usize) -> Option<[usize; 3]> {
    let cells = match (side.cells, side.kind) {
        (Some(cells), _) => cells,
        (None, SideKind::Deformable(body)) => &state.get_body(body).ok()?.geometry()?.cells,
        _ => return None,
    };
    match (cells, cell_type) {
        (CellIndices::Lines(lines), CellType::Edge) => lines.get(cell).map(|l| [l[0], l[1], 0]),
        (CellIndices::Triangles(tris), CellType::Triangle) => tris.get(cell).copied(),
        _ => None,
    }
}

/// Returns the rigid body particle and the world space contact point of a body element
fn body_and_contact_point(es: ElementSide<'_, '_>) -> Option<(ParticleId, Vector3)> {
    let SideKind::Rigid(body) = es.side.kind else {
        return None;
    };
    let contact = match *es.element {
        CollisionElement::PointDirection { point, .. } => point,
        CollisionElement::PointIndexDirection { index, .. } => *es.side.vertices?.get(index)?,
        CollisionElement::CellIndex {
            cell_type: CellType::Vertex,
            ids,
            ..
        } => *es.side.vertices?.get(ids[0])?,
        CollisionElement::CellIndex { .. } => return None,
    };
    Some((ParticleId::new(body, 0), contact))
}

/// Adds the zero mass target of a one-way point contact
fn one_way_target(state: &mut PbdState, es: ElementSide<'_, '_>, particle: ParticleId) -> Option<ParticleId> {
    let target = match *es.element {
        CollisionElement::PointIndexDirection { dir, depth, .. } => state.position(particle) + dir * depth,
        CollisionElement::PointDirection { point, dir, depth } => point + dir * depth,
        CollisionElement::CellIndex { .. } => return None,
    };
    Some(state.add_virtual_particle(target, 0.0, Vector3::zeros(), false))
}
