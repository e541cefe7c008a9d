//! Planar geometry kernel for buffer-and-overlay pipelines.
//!
//! Everything here works in a projected, meter-based coordinate system and
//! shares one clipping engine (`geo::BooleanOps`), so buffer dissolve, erase
//! and clip can never disagree about topology.

pub mod area;
pub mod buffer;
pub mod error;
pub mod index;
pub mod model;
pub mod normalize;
pub mod setops;

pub use area::{area, polygon_area, ring_signed_area, AreaAccumulator};
pub use buffer::{buffer, buffer_each, circle, stadium, BufferParams, Dissolve, JoinStyle};
pub use error::GeometryError;
pub use index::{intersects, SpatialIndex};
pub use model::{distinct_points, polygon_from_rings, Shape, ShapeKind};
pub use normalize::{Normalizer, RepairReport, DEFAULT_TOLERANCE};
pub use setops::{difference, dissolve, intersection, union, union_all, SetOps};
