//! Attach DTM elevations from a GeoTIFF to point features
//!
//! Points come from an ESRI shapefile or a GeoPackage layer; the raster is
//! a single-band GeoTIFF. Each point receives the value of the cell it
//! falls in, or the raster's nodata value when it falls outside.

pub mod io;
pub mod tiff;
pub mod utils;
pub mod compression;
pub mod coordinate;
pub mod raster;
pub mod vector;
pub mod errors;
pub mod config;
pub mod sampler;
pub mod sink;
pub mod commands;
pub mod api;

pub use crate::api::{ElevKit, RunReport};
pub use crate::config::Config;
pub use crate::errors::{ElevError, ElevResult};

pub use raster::{GeoTransform, RasterHandle};
pub use sampler::ElevationSource;
pub use sink::{SinkOptions, WriteMode};
pub use vector::{FormatTag, PointCollection};
pub use coordinate::{BoundingBox, CoordinateSystem, Point, SpatialReference};
