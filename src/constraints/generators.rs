//! Configuration-time constraint generators
//!
//! A generator turns a body's topology and current positions into constraints. Generators
//! are registered on [`PbdConfig`](crate::core::PbdConfig) and run when the model is
//! initialized, or again for a subset of vertices after a topology change.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::bodies::{CellIndices, PbdBody};
use crate::constraints::{
    AreaConstraint, BendConstraint, ConstantDensityConstraint, Constraint, DihedralConstraint,
    DistanceConstraint, FemMaterial, FemTetConstraint, PbdConstraint, VolumeConstraint,
};
use crate::core::{BodyHandle, FemConfig, ParticleId, PbdState};
use crate::error::PbdError;
use crate::math::Real;
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Geometric generator kinds configured by a single stiffness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum GeneratorKind {
    /// Distance constraints along every unique edge
    Distance,

    /// Volume constraints per tetrahedron
    Volume,

    /// Area constraints per triangle
    Area,

    /// Dihedral constraints per pair of triangles sharing an edge
    Dihedral,
}

/// A constraint generator and its parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ConstraintGenerator {
    /// Distance constraints with rest lengths scaled by `stretch`
    Distance { stiffness: Real, stretch: Real },

    /// Volume constraints on a tetrahedral mesh
    Volume { stiffness: Real },

    /// Area constraints on a triangle mesh
    Area { stiffness: Real },

    /// Dihedral constraints on a triangle mesh
    Dihedral { stiffness: Real },

    /// Bend constraints over every `stride`-spaced vertex triple of a line mesh
    Bend {
        stiffness: Real,
        stride: usize,
        rest_length_zero: bool,
    },

    /// FEM strain energy constraints on a tetrahedral mesh
    FemTet { material: FemMaterial },

    /// One constant density constraint over every particle of the body
    ConstantDensity {
        stiffness: Real,
        particle_radius: Real,
        rest_density: Real,
    },
}

/// A generator registered for one body
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct GeneratorEntry {
    /// Body whose topology the generator reads
    pub body: BodyHandle,

    /// The generator
    pub generator: ConstraintGenerator,
}

impl ConstraintGenerator {
    /// Returns true if registering `other` for the same body replaces this generator
    ///
    /// Generators of the same kind replace each other, bend generators only when their
    /// strides match.
    pub fn replaces(&self, other: &ConstraintGenerator) -> bool {
        use ConstraintGenerator::*;
        match (self, other) {
            (Bend { stride: a, .. }, Bend { stride: b, .. }) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }

    /// Appends the generated constraints for `body` to `out`
    ///
    /// With `vertices` given only cells touching one of those vertices produce
    /// constraints.
    pub fn generate(
        &self,
        state: &PbdState,
        body: BodyHandle,
        fem: &FemConfig,
        vertices: Option<&HashSet<usize>>,
        out: &mut Vec<Constraint>,
    ) -> Result<()> {
        let pbd_body = state.get_body(body)?;
        if pbd_body.is_empty() {
            return Err(PbdError::InvalidState(format!(
                "constraint generator registered for body {:?} which has no particles",
                body
            )));
        }
        let touches = |cell: &[usize]| vertices.map_or(true, |set| cell.iter().any(|v| set.contains(v)));
        let pid = |i: usize| ParticleId::new(body, i);

        match *self {
            ConstraintGenerator::Distance { stiffness, stretch } => {
                let cells = cells_of(pbd_body, body, "distance")?;
                if matches!(cells, CellIndices::Points) {
                    return Err(mismatch(body, "distance", "line, triangle or tetrahedral"));
                }
                for [a, b] in cells.edges() {
                    if !touches(&[a, b][..]) {
                        continue;
                    }
                    let mut c = DistanceConstraint::from_state(state, pid(a), pid(b));
                    c.set_rest_length(c.get_rest_length() * stretch);
                    c.base_mut().set_stiffness(stiffness);
                    out.push(c.into());
                }
            }
            ConstraintGenerator::Volume { stiffness } => {
                let CellIndices::Tetrahedra(tets) = cells_of(pbd_body, body, "volume")? else {
                    return Err(mismatch(body, "volume", "tetrahedral"));
                };
                for tet in tets.iter().filter(|t| touches(&t[..])) {
                    let mut c = VolumeConstraint::from_state(state, (*tet).map(pid));
                    c.base_mut().set_stiffness(stiffness);
                    out.push(c.into());
                }
            }
            ConstraintGenerator::Area { stiffness } => {
                let CellIndices::Triangles(tris) = cells_of(pbd_body, body, "area")? else {
                    return Err(mismatch(body, "area", "triangle"));
                };
                for tri in tris.iter().filter(|t| touches(&t[..])) {
                    let mut c = AreaConstraint::from_state(state, (*tri).map(pid));
                    c.base_mut().set_stiffness(stiffness);
                    out.push(c.into());
                }
            }
            ConstraintGenerator::Dihedral { stiffness } => {
                let CellIndices::Triangles(tris) = cells_of(pbd_body, body, "dihedral")? else {
                    return Err(mismatch(body, "dihedral", "triangle"));
                };
                for quad in dihedral_quads(tris) {
                    if !touches(&quad[..]) {
                        continue;
                    }
                    if let Some(mut c) = DihedralConstraint::from_state(state, quad.map(pid)) {
                        c.base_mut().set_stiffness(stiffness);
                        out.push(c.into());
                    }
                }
            }
            ConstraintGenerator::Bend {
                stiffness,
                stride,
                rest_length_zero,
            } => {
                if !matches!(cells_of(pbd_body, body, "bend")?, CellIndices::Lines(_)) {
                    return Err(mismatch(body, "bend", "line"));
                }
                if stride == 0 {
                    return Err(PbdError::InvalidParameter(
                        "bend stride must be at least 1".to_string(),
                    ));
                }
                let n = pbd_body.num_particles();
                let mut k = 0;
                while k + 2 * stride < n {
                    let triple = [k, k + stride, k + 2 * stride];
                    if touches(&triple[..]) {
                        let mut c = BendConstraint::from_state(
                            state,
                            pid(triple[0]),
                            pid(triple[1]),
                            pid(triple[2]),
                            rest_length_zero,
                        );
                        c.base_mut().set_stiffness(stiffness);
                        out.push(c.into());
                    }
                    k += stride;
                }
            }
            ConstraintGenerator::FemTet { material } => {
                let CellIndices::Tetrahedra(tets) = cells_of(pbd_body, body, "FEM")? else {
                    return Err(mismatch(body, "FEM", "tetrahedral"));
                };
                for tet in tets.iter().filter(|t| touches(&t[..])) {
                    match FemTetConstraint::from_state(state, (*tet).map(pid), material, *fem) {
                        Some(c) => out.push(c.into()),
                        None => warn!(body = body.0, tet = ?tet, "degenerate rest element skipped"),
                    }
                }
            }
            ConstraintGenerator::ConstantDensity {
                stiffness,
                particle_radius,
                rest_density,
            } => {
                if vertices.is_none() {
                    out.push(
                        ConstantDensityConstraint::new(
                            body,
                            pbd_body.num_particles(),
                            stiffness,
                            particle_radius,
                            rest_density,
                        )
                        .into(),
                    );
                }
            }
        }
        Ok(())
    }
}

fn cells_of<'a>(body: &'a PbdBody, handle: BodyHandle, what: &str) -> Result<&'a CellIndices> {
    body.geometry().map(|g| &g.cells).ok_or_else(|| {
        PbdError::InvalidState(format!(
            "{} generator registered for body {:?} which has no topology",
            what, handle
        ))
    })
}

fn mismatch(body: BodyHandle, what: &str, expected: &str) -> PbdError {
    PbdError::InvalidParameter(format!(
        "{} generator on body {:?} requires a {} mesh",
        what, body, expected
    ))
}

/// Returns `[opposite0, opposite1, edge0, edge1]` for every edge shared by two triangles
///
/// Edges shared by more than two triangles use the first two in cell order.
fn dihedral_quads(tris: &[[usize; 3]]) -> Vec<[usize; 4]> {
    let mut edge_tris: HashMap<[usize; 2], Vec<usize>> = HashMap::new();
    let mut edge_order: Vec<[usize; 2]> = Vec::new();
    for (t, tri) in tris.iter().enumerate() {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            let key = [a.min(b), a.max(b)];
            let list = edge_tris.entry(key).or_default();
            if list.is_empty() {
                edge_order.push(key);
            }
            list.push(t);
        }
    }

    let opposite = |tri: &[usize; 3], edge: &[usize; 2]| {
        tri.iter().copied().find(|v| !edge.contains(v))
    };

    edge_order
        .iter()
        .filter_map(|edge| {
            let list = &edge_tris[edge];
            if list.len() < 2 {
                return None;
            }
            let o0 = opposite(&tris[list[0]], edge)?;
            let o1 = opposite(&tris[list[1]], edge)?;
            Some([o0, o1, edge[0], edge[1]])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_triangles_share_one_hinge() {
        let quads = dihedral_quads(&[[0, 1, 2], [1, 3, 2]]);
        assert_eq!(quads, vec![[0, 3, 1, 2]]);
    }

    #[test]
    fn bend_generators_with_different_strides_coexist() {
        let a = ConstraintGenerator::Bend {
            stiffness: 1.0,
            stride: 1,
            rest_length_zero: false,
        };
        let b = ConstraintGenerator::Bend {
            stiffness: 1.0,
            stride: 2,
            rest_length_zero: false,
        };
        assert!(!a.replaces(&b));
        assert!(ConstraintGenerator::Area { stiffness: 1.0 }.replaces(&ConstraintGenerator::Area { stiffness: 2.0 }));
    }
}
