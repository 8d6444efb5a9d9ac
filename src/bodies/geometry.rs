use crate::math::{Matrix3, Quaternion, Real, Vector3};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Connectivity of a body's source geometry
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum CellIndices {
    /// A point set without connectivity
    #[default]
    Points,

    /// Line segments (rods, threads)
    Lines(Vec<[usize; 2]>),

    /// Triangles (cloth, surfaces)
    Triangles(Vec<[usize; 3]>),

    /// Tetrahedra (volumetric meshes)
    Tetrahedra(Vec<[usize; 4]>),
}

impl CellIndices {
    /// Returns the number of vertices per cell, 1 for point sets
    pub fn vertices_per_cell(&self) -> usize {
        match self {
            CellIndices::Points => 1,
            CellIndices::Lines(_) => 2,
            CellIndices::Triangles(_) => 3,
            CellIndices::Tetrahedra(_) => 4,
        }
    }

    /// Returns the number of cells
    pub fn len(&self) -> usize {
        match self {
            CellIndices::Points => 0,
            CellIndices::Lines(c) => c.len(),
            CellIndices::Triangles(c) => c.len(),
            CellIndices::Tetrahedra(c) => c.len(),
        }
    }

    /// Returns true if there are no cells
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest vertex index referenced by any cell
    pub(crate) fn max_index(&self) -> Option<usize> {
        match self {
            CellIndices::Points => None,
            CellIndices::Lines(c) => c.iter().flatten().copied().max(),
            CellIndices::Triangles(c) => c.iter().flatten().copied().max(),
            CellIndices::Tetrahedra(c) => c.iter().flatten().copied().max(),
        }
    }

    /// Returns the unique edges of all cells, each as an ordered pair
    pub fn edges(&self) -> Vec<[usize; 2]> {
        let mut edges: Vec<[usize; 2]> = Vec::new();
        let mut push = |a: usize, b: usize| edges.push([a.min(b), a.max(b)]);
        match self {
            CellIndices::Points => {}
            CellIndices::Lines(cells) => cells.iter().for_each(|c| push(c[0], c[1])),
            CellIndices::Triangles(cells) => {
                for c in cells {
                    push(c[0], c[1]);
                    push(c[1], c[2]);
                    push(c[2], c[0]);
                }
            }
            CellIndices::Tetrahedra(cells) => {
                for c in cells {
                    push(c[0], c[1]);
                    push(c[0], c[2]);
                    push(c[0], c[3]);
                    push(c[1], c[2]);
                    push(c[1], c[3]);
                    push(c[2], c[3]);
                }
            }
        }
        edges.sort_unstable();
        edges.dedup();
        edges
    }
}

/// Source geometry and optional per-particle attributes a body is populated from
///
/// Attributes left as `None` fall back to uniform defaults when the body is initialized.
/// Providing orientations turns a deformable body into an oriented one.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct BodyGeometry {
    /// Rest (initial) vertex positions
    pub vertices: Vec<Vector3>,

    /// Cell connectivity
    pub cells: CellIndices,

    /// Initial per-vertex velocities
    pub velocities: Option<Vec<Vector3>>,

    /// Per-vertex masses
    pub masses: Option<Vec<Real>>,

    /// Per-vertex inverse masses, takes precedence over `masses`
    pub inverse_masses: Option<Vec<Real>>,

    /// Per-vertex orientations
    pub orientations: Option<Vec<Quaternion>>,

    /// Per-vertex angular velocities
    pub angular_velocities: Option<Vec<Vector3>>,

    /// Per-vertex inertia tensors
    pub inertias: Option<Vec<Matrix3>>,
}

impl BodyGeometry {
    /// Creates geometry from a point set
    pub fn points(vertices: Vec<Vector3>) -> Self {
        Self {
            vertices,
            ..Default::default()
        }
    }

    /// Creates geometry from a line mesh
    pub fn lines(vertices: Vec<Vector3>, cells: Vec<[usize; 2]>) -> Self {
        Self {
            vertices,
            cells: CellIndices::Lines(cells),
            ..Default::default()
        }
    }

    /// Creates geometry from a triangle mesh
    pub fn triangles(vertices: Vec<Vector3>, cells: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            cells: CellIndices::Triangles(cells),
            ..Default::default()
        }
    }

    /// Creates geometry from a tetrahedral mesh
    pub fn tetrahedra(vertices: Vec<Vector3>, cells: Vec<[usize; 4]>) -> Self {
        Self {
            vertices,
            cells: CellIndices::Tetrahedra(cells),
            ..Default::default()
        }
    }

    /// Sets initial velocities
    pub fn with_velocities(mut self, velocities: Vec<Vector3>) -> Self {
        self.velocities = Some(velocities);
        self
    }

    /// Sets per-vertex masses
    pub fn with_masses(mut self, masses: Vec<Real>) -> Self {
        self.masses = Some(masses);
        self
    }

    /// Sets per-vertex orientations
    pub fn with_orientations(mut self, orientations: Vec<Quaternion>) -> Self {
        self.orientations = Some(orientations);
        self
    }

    /// Sets per-vertex inertia tensors
    pub fn with_inertias(mut self, inertias: Vec<Matrix3>) -> Self {
        self.inertias = Some(inertias);
        self
    }

    /// Returns the number of vertices
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }
}
