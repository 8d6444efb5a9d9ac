use crate::constraints::{ConstraintBase, PbdConstraint};
use crate::core::{FemConfig, ParticleId, PbdState};
use crate::math::{tet_volume, Matrix3, Real, Vector3};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Hyperelastic material model of a FEM constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum FemMaterial {
    /// Linear (small strain) elasticity
    Linear,

    /// Saint Venant-Kirchhoff
    #[default]
    StVK,

    /// Corotational linear elasticity
    Corotation,

    /// Compressible Neo-Hookean
    NeoHookean,
}

/// Deformation gradients with a determinant below this are treated as inverted
const INVERSION_DETERMINANT: Real = 1.0e-8;

/// Singular values below this are considered collapsed
const SMALL_SINGULAR_VALUE: Real = 1.0e-4;

/// Lower clamp of the singular values of an inverted element
const SINGULAR_VALUE_CLAMP: Real = 0.577;

/// Strain energy constraint of a tetrahedral element
///
/// The constraint value is the element's strain energy `W(F) * V0` for the chosen material
/// and the gradients follow from the first Piola-Kirchhoff stress.
#[derive(Debug, Clone)]
pub struct FemTetConstraint {
    base: ConstraintBase,
    material: FemMaterial,
    config: FemConfig,
    rest_volume: Real,
    inv_rest_matrix: Matrix3,
    handle_inversions: bool,
}

fn shape_matrix(p: &[Vector3; 4]) -> Matrix3 {
    Matrix3::from_columns(&[p[0] - p[3], p[1] - p[3], p[2] - p[3]])
}

fn index_of_min(values: &Vector3) -> usize {
    values.imin()
}

impl FemTetConstraint {
    /// Creates a FEM constraint from rest positions
    ///
    /// Returns `None` if the rest element is degenerate. The compliance is set to
    /// `1 / (lambda + 2 mu)`.
    pub fn new(
        rest_positions: [Vector3; 4],
        particles: [ParticleId; 4],
        material: FemMaterial,
        config: FemConfig,
    ) -> Option<Self> {
        let rest = shape_matrix(&rest_positions);
        if rest.determinant().abs() <= 1.0e-16 {
            return None;
        }
        let inv_rest_matrix = rest.try_inverse()?;

        let [x0, x1, x2, x3] = rest_positions;
        let mut base = ConstraintBase::new(particles.to_vec());
        base.set_compliance(1.0 / (config.lambda + 2.0 * config.mu));

        Some(Self {
            base,
            material,
            config,
            rest_volume: tet_volume(&x0, &x1, &x2, &x3),
            inv_rest_matrix,
            handle_inversions: true,
        })
    }

    /// Creates a FEM constraint using the current particle positions as rest state
    pub fn from_state(
        state: &PbdState,
        particles: [ParticleId; 4],
        material: FemMaterial,
        config: FemConfig,
    ) -> Option<Self> {
        Self::new(particles.map(|p| *state.position(p)), particles, material, config)
    }

    /// Returns the material model
    pub fn material(&self) -> FemMaterial {
        self.material
    }

    /// Returns the rest volume of the element
    pub fn rest_volume(&self) -> Real {
        self.rest_volume
    }

    /// Enables or disables the recovery of inverted elements
    pub fn set_handle_inversions(&mut self, handle: bool) {
        self.handle_inversions = handle;
    }

    /// Computes the first Piola-Kirchhoff stress and the energy density of `f`
    fn stress_and_energy(&self, f: &Matrix3) -> Option<(Matrix3, Real)> {
        let mu = self.config.mu;
        let lambda = self.config.lambda;
        let identity = Matrix3::identity();

        let result = match self.material {
            FemMaterial::StVK => {
                let e = (f.transpose() * f - identity) * 0.5;
                let tr = e.trace();
                let p = f * (e * (2.0 * mu) + identity * (lambda * tr));
                let w = mu * (e.transpose() * e).trace() + 0.5 * lambda * tr * tr;
                (p, w)
            }
            FemMaterial::Corotation => {
                let svd = f.svd(true, true);
                let u = svd.u?;
                let v_t = svd.v_t?;
                let sigma = svd.singular_values;
                if sigma.iter().any(|&s| s.abs() < Real::MIN_POSITIVE) {
                    return None;
                }
                let r = u * v_t;
                let mut inv_ft = u;
                for i in 0..3 {
                    inv_ft.column_mut(i).scale_mut(1.0 / sigma[i]);
                }
                let inv_ft = inv_ft * v_t;
                let j = sigma[0] * sigma[1] * sigma[2];
                let fr = f - r;
                let p = fr * (2.0 * mu) + inv_ft * (lambda * (j - 1.0) * j);
                let w = mu * fr.norm_squared() + 0.5 * lambda * (j - 1.0) * (j - 1.0);
                (p, w)
            }
            FemMaterial::NeoHookean => {
                let i1 = (f * f.transpose()).trace();
                let i3 = (f.transpose() * f).determinant();
                if i3 <= 0.0 {
                    return None;
                }
                let log_i3 = i3.ln();
                let inv_ft = f.try_inverse()?.transpose();
                let p = (f - inv_ft) * mu + inv_ft * (0.5 * lambda * log_i3);
                let w = 0.5 * mu * (i1 - log_i3 - 3.0) + 0.125 * lambda * log_i3 * log_i3;
                (p, w)
            }
            FemMaterial::Linear => {
                let e = (f * f.transpose() - identity) * 0.5;
                let tr = e.trace();
                let p = e * (2.0 * mu) + identity * (lambda * tr);
                let w = mu * (e * e).trace() + 0.5 * lambda * tr * tr;
                (p, w)
            }
        };
        Some(result)
    }
}

/// Diagonalizes an inverted deformation gradient `F = U F^ V^T`
///
/// Reflections are moved out of `V` and `U` onto the smallest singular value and the
/// singular values are clamped from below, pushing the element back towards its
/// uninverted state. Returns `(U, F^, V^T)`.
fn handle_inversions(f: &Matrix3) -> Option<(Matrix3, Matrix3, Matrix3)> {
    let svd = f.svd(true, true);
    let mut sigma = svd.singular_values;
    let mut v = svd.v_t?.transpose();

    if v.determinant() < 0.0 {
        let column = index_of_min(&sigma);
        v.column_mut(column).neg_mut();
    }

    let small: Vec<usize> = (0..3).filter(|&i| sigma[i].abs() < SMALL_SINGULAR_VALUE).collect();
    let mut u = match small.len() {
        0 => {
            let f_hat = Matrix3::from_diagonal(&sigma);
            f * v * f_hat.try_inverse()?
        }
        1 => {
            let position = small[0];
            let mut u = f * v;
            for i in (0..3).filter(|&i| i != position) {
                u.column_mut(i).scale_mut(1.0 / sigma[i]);
            }
            let others: Vec<Vector3> = (0..3)
                .filter(|&i| i != position)
                .map(|i| u.column(i).into_owned())
                .collect();
            let basis = others[0].cross(&others[1]).try_normalize(Real::MIN_POSITIVE)?;
            u.set_column(position, &basis);
            u
        }
        _ => Matrix3::identity(),
    };

    if u.determinant() < 0.0 {
        let position = index_of_min(&sigma);
        sigma[position] = -sigma[position];
        u.column_mut(position).neg_mut();
    }

    for s in sigma.iter_mut() {
        if *s < SINGULAR_VALUE_CLAMP {
            *s = SINGULAR_VALUE_CLAMP;
        }
    }

    Some((u, Matrix3::from_diagonal(&sigma), v.transpose()))
}

impl PbdConstraint for FemTetConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn compute_value_and_gradient(&mut self, state: &PbdState) -> Option<Real> {
        let positions = [0, 1, 2, 3].map(|i| *state.position(self.base.particles[i]));
        let deformation = shape_matrix(&positions) * self.inv_rest_matrix;

        let (u, f, v_t) = if self.handle_inversions && deformation.determinant() <= INVERSION_DETERMINANT {
            handle_inversions(&deformation)?
        } else {
            (Matrix3::identity(), deformation, Matrix3::identity())
        };

        let (p_hat, energy) = self.stress_and_energy(&f)?;
        let p = u * p_hat * v_t;
        let grad = p * self.inv_rest_matrix.transpose() * self.rest_volume;

        let g = &mut self.base.gradients;
        g[0] = grad.column(0).into_owned();
        g[1] = grad.column(1).into_owned();
        g[2] = grad.column(2).into_owned();
        g[3] = -(g[0] + g[1] + g[2]);

        Some(energy * self.rest_volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn inverted_element_is_recovered_with_positive_singular_values() {
        let f = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -0.5));
        let (u, f_hat, v_t) = handle_inversions(&f).unwrap();
        assert!(f_hat.diagonal().iter().all(|&s| s >= SINGULAR_VALUE_CLAMP));
        assert_relative_eq!(u.determinant(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(v_t.determinant(), 1.0, epsilon = 1e-9);
    }
}
