//! Coordinate handling for geospatial data
//!
//! Points, extents and coordinate reference system identities shared by
//! the raster and vector sides.

mod bbox;
mod point;
mod crs;

pub use self::bbox::BoundingBox;
pub use self::point::Point;
pub use self::crs::{CoordinateSystem, CoordinateSystemFactory, SpatialReference};
