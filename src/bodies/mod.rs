mod body;
mod body_type;
mod geometry;

pub use self::body::PbdBody;
pub use self::body_type::BodyType;
pub use self::geometry::{BodyGeometry, CellIndices};
