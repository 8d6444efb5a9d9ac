use crate::bodies::CellIndices;
use crate::core::BodyHandle;
use crate::math::{Real, Vector3};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Cell type referenced by a [`CollisionElement::CellIndex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum CellType {
    Vertex,
    Edge,
    Triangle,
}

impl CellType {
    /// Number of vertices of the cell
    pub fn num_vertices(self) -> usize {
        match self {
            CellType::Vertex => 1,
            CellType::Edge => 2,
            CellType::Triangle => 3,
        }
    }
}

/// One side of a contact as reported by collision detection
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum CollisionElement {
    /// A cell of the colliding mesh
    ///
    /// With `count == 1` for an edge or triangle, `ids[0]` is the cell index in the mesh.
    /// Otherwise the first `count` entries of `ids` are the vertex indices of the cell.
    CellIndex {
        cell_type: CellType,
        ids: [usize; 3],
        count: usize,
    },

    /// A point with a resolution direction and depth, not part of any mesh
    PointDirection {
        point: Vector3,
        dir: Vector3,
        depth: Real,
    },

    /// A mesh vertex with a resolution direction and depth
    PointIndexDirection { index: usize, dir: Vector3, depth: Real },
}

impl CollisionElement {
    /// A single vertex
    pub fn vertex(index: usize) -> Self {
        CollisionElement::CellIndex {
            cell_type: CellType::Vertex,
            ids: [index, 0, 0],
            count: 1,
        }
    }

    /// An edge given by its vertex indices
    pub fn edge(vertices: [usize; 2]) -> Self {
        CollisionElement::CellIndex {
            cell_type: CellType::Edge,
            ids: [vertices[0], vertices[1], 0],
            count: 2,
        }
    }

    /// A triangle given by its vertex indices
    pub fn triangle(vertices: [usize; 3]) -> Self {
        CollisionElement::CellIndex {
            cell_type: CellType::Triangle,
            ids: vertices,
            count: 3,
        }
    }

    /// An edge or triangle given by its cell index in the colliding mesh
    pub fn cell(cell_type: CellType, cell: usize) -> Self {
        CollisionElement::CellIndex {
            cell_type,
            ids: [cell, 0, 0],
            count: 1,
        }
    }
}

/// How one side of a collision pair takes part in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideKind {
    /// Vertices are particles of a deformable body
    Deformable(BodyHandle),

    /// The side is a rigid body; its colliding vertices are world space contact points
    Rigid(BodyHandle),

    /// The side is not simulated; its vertices become immovable virtual particles
    Static,
}

/// Everything the handler needs to know about one side of a collision pair
#[derive(Debug, Clone, Copy)]
pub struct CollisionSide<'a> {
    /// Participation of the side
    pub kind: SideKind,

    /// Colliding geometry vertices, required for static sides and rigid vertex contacts
    pub vertices: Option<&'a [Vector3]>,

    /// Colliding geometry cells used to resolve cell indices; deformable sides fall back to
    /// the body's topology
    pub cells: Option<&'a CellIndices>,

    /// Maps colliding geometry vertices to physics particles
    pub vertex_map: Option<&'a [usize]>,
}

impl<'a> CollisionSide<'a> {
    /// A deformable body colliding with its own physics geometry
    pub fn deformable(body: BodyHandle) -> Self {
        Self {
            kind: SideKind::Deformable(body),
            vertices: None,
            cells: None,
            vertex_map: None,
        }
    }

    /// A rigid body whose colliding geometry has the given world space vertices
    pub fn rigid(body: BodyHandle, vertices: &'a [Vector3]) -> Self {
        Self {
            kind: SideKind::Rigid(body),
            vertices: Some(vertices),
            cells: None,
            vertex_map: None,
        }
    }

    /// A non simulated geometry
    pub fn fixed(vertices: &'a [Vector3], cells: Option<&'a CellIndices>) -> Self {
        Self {
            kind: SideKind::Static,
            vertices: Some(vertices),
            cells,
            vertex_map: None,
        }
    }

    /// Uses a colliding geometry that differs from the physics geometry
    pub fn with_mapping(mut self, cells: &'a CellIndices, vertex_map: &'a [usize]) -> Self {
        self.cells = Some(cells);
        self.vertex_map = Some(vertex_map);
        self
    }

    /// Returns true if the side takes part in the simulation
    pub fn is_simulated(&self) -> bool {
        !matches!(self.kind, SideKind::Static)
    }
}

/// Classification of a collision element used to pick the generated constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactCase {
    Vertex,
    Edge,
    Triangle,

    /// Any element of a rigid body
    Body,

    /// A free point without a mesh vertex
    Primitive,

    /// Missing partner in one-way handling
    None,
}

impl ContactCase {
    /// Classifies an element on the given side
    pub fn classify(element: &CollisionElement, side: &CollisionSide<'_>) -> Self {
        if matches!(side.kind, SideKind::Rigid(_)) {
            return ContactCase::Body;
        }
        match element {
            CollisionElement::PointDirection { .. } => ContactCase::Primitive,
            CollisionElement::PointIndexDirection { .. } => ContactCase::Vertex,
            CollisionElement::CellIndex { cell_type, .. } => match cell_type {
                CellType::Vertex => ContactCase::Vertex,
                CellType::Edge => ContactCase::Edge,
                CellType::Triangle => ContactCase::Triangle,
            },
        }
    }

    /// Returns true if a pair should be swapped so the generated constraint sees its
    /// canonical order
    ///
    /// Vertices go before edges and triangles, rigid bodies on the left and free points
    /// on the left, except that a body keeps its place against a free point.
    pub fn should_swap(a: ContactCase, b: ContactCase) -> bool {
        use ContactCase::*;
        let swap = matches!((a, b), (Triangle, Vertex) | (Edge, Vertex))
            || (b == Body && a != Body)
            || (a != Primitive && b == Primitive);
        swap && !(a == Body && b == Primitive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContactCase::*;

    #[test]
    fn pairs_are_brought_into_canonical_order() {
        assert!(ContactCase::should_swap(Triangle, Vertex));
        assert!(ContactCase::should_swap(Edge, Vertex));
        assert!(ContactCase::should_swap(Vertex, Body));
        assert!(ContactCase::should_swap(Primitive, Body));
        assert!(ContactCase::should_swap(Triangle, Primitive));
        assert!(!ContactCase::should_swap(Body, Primitive));
        assert!(!ContactCase::should_swap(Vertex, Triangle));
        assert!(!ContactCase::should_swap(Body, Body));
    }
}
