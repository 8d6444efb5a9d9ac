mod area;
mod bend;
mod collision;
mod constant_density;
mod constraint;
mod contact;
mod container;
mod dihedral;
mod distance;
mod fem_tet;
pub mod generators;
mod volume;

pub use self::area::AreaConstraint;
pub use self::bend::BendConstraint;
pub use self::collision::{CollisionConstraint, CollisionKind};
pub use self::constant_density::ConstantDensityConstraint;
pub use self::constraint::{ConstraintBase, ConstraintFlags, PbdConstraint};
pub use self::contact::{ContactConstraint, ContactKind};
pub use self::container::ConstraintContainer;
pub use self::dihedral::DihedralConstraint;
pub use self::distance::DistanceConstraint;
pub use self::fem_tet::{FemMaterial, FemTetConstraint};
pub use self::generators::{ConstraintGenerator, GeneratorKind};
pub use self::volume::VolumeConstraint;

use crate::core::{PbdState, SolverType};
use crate::math::Real;

/// The closed set of constraint kinds handled by the solver
#[derive(Debug, Clone)]
pub enum Constraint {
    Distance(DistanceConstraint),
    Volume(VolumeConstraint),
    Area(AreaConstraint),
    Bend(BendConstraint),
    Dihedral(DihedralConstraint),
    FemTet(FemTetConstraint),
    ConstantDensity(ConstantDensityConstraint),
    Collision(CollisionConstraint),
    Contact(ContactConstraint),
}

macro_rules! dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            Constraint::Distance($c) => $body,
            Constraint::Volume($c) => $body,
            Constraint::Area($c) => $body,
            Constraint::Bend($c) => $body,
            Constraint::Dihedral($c) => $body,
            Constraint::FemTet($c) => $body,
            Constraint::ConstantDensity($c) => $body,
            Constraint::Collision($c) => $body,
            Constraint::Contact($c) => $body,
        }
    };
}

impl Constraint {
    /// Short name of the constraint kind, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constraint::Distance(_) => "distance",
            Constraint::Volume(_) => "volume",
            Constraint::Area(_) => "area",
            Constraint::Bend(_) => "bend",
            Constraint::Dihedral(_) => "dihedral",
            Constraint::FemTet(_) => "fem_tet",
            Constraint::ConstantDensity(_) => "constant_density",
            Constraint::Collision(_) => "collision",
            Constraint::Contact(_) => "contact",
        }
    }
}

impl PbdConstraint for Constraint {
    fn base(&self) -> &ConstraintBase {
        dispatch!(self, c => c.base())
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        dispatch!(self, c => c.base_mut())
    }

    fn compute_value_and_gradient(&mut self, state: &PbdState) -> Option<Real> {
        dispatch!(self, c => c.compute_value_and_gradient(state))
    }

    fn particle_scale(&self, index: usize) -> Real {
        dispatch!(self, c => c.particle_scale(index))
    }

    fn delta_lambda(&mut self, c_value: Real, w: Real, dt: Real, solver: SolverType) -> Real {
        dispatch!(self, c => c.delta_lambda(c_value, w, dt, solver))
    }

    fn compute_correction(&mut self, state: &PbdState, dt: Real, solver: SolverType) -> bool {
        dispatch!(self, c => c.compute_correction(state, dt, solver))
    }

    fn apply_correction(&self, state: &mut PbdState) {
        dispatch!(self, c => c.apply_correction(state))
    }

    fn correct_velocity(&mut self, state: &mut PbdState, dt: Real) {
        dispatch!(self, c => c.correct_velocity(state, dt))
    }
}

macro_rules! impl_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Constraint {
                fn from(c: $ty) -> Self {
                    Constraint::$variant(c)
                }
            }
        )*
    };
}

impl_from!(
    Distance(DistanceConstraint),
    Volume(VolumeConstraint),
    Area(AreaConstraint),
    Bend(BendConstraint),
    Dihedral(DihedralConstraint),
    FemTet(FemTetConstraint),
    ConstantDensity(ConstantDensityConstraint),
    Collision(CollisionConstraint),
    Contact(ContactConstraint),
);
