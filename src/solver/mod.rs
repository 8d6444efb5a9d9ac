mod collision_solver;
mod pbd_solver;

pub use self::collision_solver::CollisionSolver;
pub use self::pbd_solver::PbdSolver;
