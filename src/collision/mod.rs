//! Conversion of contact elements reported by collision detection into constraints

mod elements;
mod handling;
mod pool;

pub use self::elements::{CellType, CollisionElement, CollisionSide, ContactCase, SideKind};
pub use self::handling::PbdCollisionHandler;
pub use self::pool::{ConstraintPool, PooledKind, DEFAULT_POOL_CAPACITY};
