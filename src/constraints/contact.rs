use crate::constraints::{ConstraintBase, PbdConstraint};
use crate::core::{ParticleId, PbdState};
use crate::math::{barycentric_triangle, Real, Vector3, EPSILON};

/// Geometry specific data of a rigid contact
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactKind {
    /// Resolves a point on a rigid body to a vertex
    VertexToBody,

    /// Resolves a point on a rigid body to an edge
    EdgeToBody,

    /// Resolves a point on a rigid body to the plane of a triangle
    TriangleToBody,

    /// Resolves two body-local points along a fixed contact normal
    BodyToBodyNormal {
        /// Anchor offsets in each body's local frame
        rest_r: [Vector3; 2],

        /// Contact normal pointing from body 0 towards body 1
        normal: Vector3,
    },

    /// Keeps two body-local anchors at a target separation
    BodyToBodyDistance {
        /// Anchor offsets in each body's local frame
        rest_r: [Vector3; 2],

        /// Target separation of the anchors
        rest_length: Real,
    },

    /// Keeps a point on the infinite line through two body-local points of a rigid body
    RigidLineToPoint {
        /// First point of the line in the body frame
        p_rest: Vector3,

        /// Second point of the line in the body frame
        q_rest: Vector3,
    },
}

/// A contact where at least one participant is a point on a rigid body
///
/// The first participant is always the rigid body (its lever arm converts linear
/// corrections into rotations). Vertex, edge and triangle contacts store the lever arm as
/// the world offset from the body center to the contact point at creation; body to body
/// contacts re-rotate their rest offsets into world space on every evaluation.
#[derive(Debug, Clone)]
pub struct ContactConstraint {
    base: ConstraintBase,
    kind: ContactKind,
}

/// Rotates a local anchor into world space for oriented participants
fn world_offset(state: &PbdState, pid: ParticleId, rest: &Vector3) -> Vector3 {
    if state.body_type(pid).is_oriented() {
        state.orientation(pid).transform_vector(rest)
    } else {
        *rest
    }
}

impl ContactConstraint {
    fn with_kind(particles: &[ParticleId], kind: ContactKind, compliance: Real) -> Self {
        let mut c = Self {
            base: ConstraintBase::new(Vec::with_capacity(particles.len())),
            kind,
        };
        c.reinit(particles, kind, compliance);
        c
    }

    fn reinit(&mut self, particles: &[ParticleId], kind: ContactKind, compliance: Real) {
        self.base.reset(particles);
        self.base.set_compliance(compliance);
        self.kind = kind;
    }

    /// Creates a vertex to body contact
    pub fn vertex_to_body(
        state: &PbdState,
        body: ParticleId,
        contact_pt_on_body: Vector3,
        x0: ParticleId,
        compliance: Real,
    ) -> Self {
        let mut c = Self::with_kind(&[body, x0], ContactKind::VertexToBody, compliance);
        c.base.lever_arms[0] = contact_pt_on_body - state.position(body);
        c
    }

    /// Reinitializes a pooled constraint as a vertex to body contact
    pub(crate) fn init_vertex_to_body(
        &mut self,
        state: &PbdState,
        body: ParticleId,
        contact_pt_on_body: Vector3,
        x0: ParticleId,
        compliance: Real,
    ) {
        self.reinit(&[body, x0], ContactKind::VertexToBody, compliance);
        self.base.lever_arms[0] = contact_pt_on_body - state.position(body);
    }

    /// Creates an edge to body contact
    pub fn edge_to_body(
        state: &PbdState,
        body: ParticleId,
        contact_pt_on_body: Vector3,
        x0: ParticleId,
        x1: ParticleId,
        compliance: Real,
    ) -> Self {
        let mut c = Self::with_kind(&[body, x0, x1], ContactKind::EdgeToBody, compliance);
        c.base.lever_arms[0] = contact_pt_on_body - state.position(body);
        c
    }

    /// Reinitializes a pooled constraint as an edge to body contact
    pub(crate) fn init_edge_to_body(
        &mut self,
        state: &PbdState,
        body: ParticleId,
        contact_pt_on_body: Vector3,
        edge: [ParticleId; 2],
        compliance: Real,
    ) {
        self.reinit(&[body, edge[0], edge[1]], ContactKind::EdgeToBody, compliance);
        self.base.lever_arms[0] = contact_pt_on_body - state.position(body);
    }

    /// Creates a triangle to body contact
    pub fn triangle_to_body(
        state: &PbdState,
        body: ParticleId,
        contact_pt_on_body: Vector3,
        x0: ParticleId,
        x1: ParticleId,
        x2: ParticleId,
        compliance: Real,
    ) -> Self {
        let mut c = Self::with_kind(&[body, x0, x1, x2], ContactKind::TriangleToBody, compliance);
        c.base.lever_arms[0] = contact_pt_on_body - state.position(body);
        c
    }

    /// Reinitializes a pooled constraint as a triangle to body contact
    pub(crate) fn init_triangle_to_body(
        &mut self,
        state: &PbdState,
        body: ParticleId,
        contact_pt_on_body: Vector3,
        tri: [ParticleId; 3],
        compliance: Real,
    ) {
        self.reinit(&[body, tri[0], tri[1], tri[2]], ContactKind::TriangleToBody, compliance);
        self.base.lever_arms[0] = contact_pt_on_body - state.position(body);
    }

    /// Creates a body to body contact along `normal`
    ///
    /// The contact points are given in world space and stored in the body frames.
    pub fn body_to_body_normal(
        state: &PbdState,
        body0: ParticleId,
        body1: ParticleId,
        contact_pt_on_body0: Vector3,
        contact_pt_on_body1: Vector3,
        normal: Vector3,
        compliance: Real,
    ) -> Self {
        let rest_r = Self::rest_offsets(state, [body0, body1], [contact_pt_on_body0, contact_pt_on_body1]);
        Self::with_kind(
            &[body0, body1],
            ContactKind::BodyToBodyNormal { rest_r, normal },
            compliance,
        )
    }

    /// Reinitializes a pooled constraint as a body to body contact
    pub(crate) fn init_body_to_body_normal(
        &mut self,
        state: &PbdState,
        bodies: [ParticleId; 2],
        contact_pts: [Vector3; 2],
        normal: Vector3,
        compliance: Real,
    ) {
        let rest_r = Self::rest_offsets(state, bodies, contact_pts);
        self.reinit(&bodies, ContactKind::BodyToBodyNormal { rest_r, normal }, compliance);
    }

    /// Creates a body to body distance constraint between two world space anchors
    pub fn body_to_body_distance(
        state: &PbdState,
        body0: ParticleId,
        body1: ParticleId,
        anchor0: Vector3,
        anchor1: Vector3,
        rest_length: Real,
        compliance: Real,
    ) -> Self {
        let rest_r = Self::rest_offsets(state, [body0, body1], [anchor0, anchor1]);
        Self::with_kind(
            &[body0, body1],
            ContactKind::BodyToBodyDistance { rest_r, rest_length },
            compliance,
        )
    }

    /// Creates a constraint keeping `point` on the line through `p` and `q` of a rigid body
    ///
    /// `p` and `q` are given in world space and stored in the body frame.
    pub fn rigid_line_to_point(
        state: &PbdState,
        body: ParticleId,
        p: Vector3,
        q: Vector3,
        point: ParticleId,
        compliance: Real,
    ) -> Self {
        let [p_rest, q_rest] = Self::rest_offsets(state, [body, body], [p, q]);
        Self::with_kind(
            &[body, point],
            ContactKind::RigidLineToPoint { p_rest, q_rest },
            compliance,
        )
    }

    fn rest_offsets(state: &PbdState, bodies: [ParticleId; 2], points: [Vector3; 2]) -> [Vector3; 2] {
        [0, 1].map(|i| {
            let offset = points[i] - state.position(bodies[i]);
            if state.body_type(bodies[i]).is_oriented() {
                state.orientation(bodies[i]).inverse_transform_vector(&offset)
            } else {
                offset
            }
        })
    }

    /// Returns the contact kind
    pub fn kind(&self) -> &ContactKind {
        &self.kind
    }

    fn edge_contact(&mut self, state: &PbdState) -> Option<Real> {
        let p = state.position(self.base.particles[0]) + self.base.lever_arms[0];
        let x1 = state.position(self.base.particles[1]);
        let x2 = state.position(self.base.particles[2]);

        let ab = x2 - x1;
        let length = ab.norm();
        if length < EPSILON {
            return None;
        }
        let dir = ab / length;
        let diff = p - x1;
        let along = dir.dot(&diff);
        if along < 0.0 || along > length {
            return None;
        }
        let perp = diff - dir * along;
        let depth = perp.norm();
        if depth < EPSILON {
            return None;
        }
        let normal = perp / depth;
        let u = along / length;

        let g = &mut self.base.gradients;
        g[0] = normal;
        g[1] = -normal * (1.0 - u);
        g[2] = -normal * u;
        Some(depth)
    }

    fn triangle_contact(&mut self, state: &PbdState) -> Option<Real> {
        let p = state.position(self.base.particles[0]) + self.base.lever_arms[0];
        let x1 = state.position(self.base.particles[1]);
        let x2 = state.position(self.base.particles[2]);
        let x3 = state.position(self.base.particles[3]);

        let weights = barycentric_triangle(&p, x1, x2, x3)?;
        if weights.iter().any(|&w| w < 0.0) {
            return None;
        }
        let normal = (x2 - x1).cross(&(x3 - x1)).try_normalize(EPSILON)?;
        let depth = (p - x1).dot(&normal);

        let g = &mut self.base.gradients;
        g[0] = normal;
        g[1] = -normal * weights[0];
        g[2] = -normal * weights[1];
        g[3] = -normal * weights[2];
        Some(depth)
    }
}

impl PbdConstraint for ContactConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn compute_value_and_gradient(&mut self, state: &PbdState) -> Option<Real> {
        match self.kind {
            ContactKind::VertexToBody => {
                let p = state.position(self.base.particles[0]) + self.base.lever_arms[0];
                let diff = state.position(self.base.particles[1]) - p;
                let c = diff.norm();
                if c < EPSILON {
                    return None;
                }
                let normal = diff / c;
                self.base.gradients[0] = -normal;
                self.base.gradients[1] = normal;
                Some(c)
            }
            ContactKind::EdgeToBody => self.edge_contact(state),
            ContactKind::TriangleToBody => self.triangle_contact(state),
            ContactKind::BodyToBodyNormal { rest_r, normal } => {
                let [b0, b1] = [self.base.particles[0], self.base.particles[1]];
                let r0 = world_offset(state, b0, &rest_r[0]);
                let r1 = world_offset(state, b1, &rest_r[1]);
                self.base.lever_arms[0] = r0;
                self.base.lever_arms[1] = r1;
                let diff = (state.position(b1) + r1) - (state.position(b0) + r0);
                self.base.gradients[0] = -normal;
                self.base.gradients[1] = normal;
                Some(diff.dot(&normal))
            }
            ContactKind::BodyToBodyDistance { rest_r, rest_length } => {
                let [b0, b1] = [self.base.particles[0], self.base.particles[1]];
                let r0 = world_offset(state, b0, &rest_r[0]);
                let r1 = world_offset(state, b1, &rest_r[1]);
                self.base.lever_arms[0] = r0;
                self.base.lever_arms[1] = r1;
                let diff = (state.position(b1) + r1) - (state.position(b0) + r0);
                let length = diff.norm();
                if length < EPSILON {
                    return None;
                }
                let dir = diff / length;
                self.base.gradients[0] = -dir;
                self.base.gradients[1] = dir;
                Some(length - rest_length)
            }
            ContactKind::RigidLineToPoint { p_rest, q_rest } => {
                let body = self.base.particles[0];
                let body_pos = *state.position(body);
                let orientation = state.orientation(body);
                let p = body_pos + orientation.transform_vector(&p_rest);
                let q = body_pos + orientation.transform_vector(&q_rest);
                let dir = (q - p).try_normalize(EPSILON)?;

                let pt = state.position(self.base.particles[1]);
                let diff = pt - q;
                let dist = diff - dir * diff.dot(&dir);
                let c = dist.norm();
                if c < EPSILON {
                    return None;
                }
                let normal = dist / c;
                self.base.gradients[1] = normal;
                self.base.gradients[0] = -normal;
                self.base.lever_arms[0] = (pt - dist) - body_pos;
                Some(c)
            }
        }
    }
}
