//! Elevation sampling of point collections
//!
//! The sampler looks up every record in one batch call to the elevation
//! source and stores the values in a single floating-point field. Records
//! off the grid keep the nodata sentinel as their value.

use log::{debug, info, warn};
use std::path::Path;

use crate::errors::{ElevError, ElevResult};
use crate::raster::RasterHandle;
use crate::vector::dbf::MAX_FIELD_NAME_BYTES;
use crate::vector::filegdb::MAX_FIELD_NAME_CHARS;
use crate::vector::{AttributeValue, FieldDef, FormatTag, PointCollection};

/// Anything that can answer elevation lookups for map coordinates
///
/// Implemented by [`RasterHandle`]; tests substitute in-memory grids.
pub trait ElevationSource {
    /// One value per coordinate, in order, with nodata for misses
    fn sample(&mut self, coords: &[(f64, f64)]) -> ElevResult<Vec<f64>>;

    /// The sentinel returned for coordinates without a value
    fn nodata(&self) -> f64;

    /// EPSG code of the source CRS, when known
    fn epsg(&self) -> Option<u32>;

    fn path(&self) -> &Path;
}

impl ElevationSource for RasterHandle {
    fn sample(&mut self, coords: &[(f64, f64)]) -> ElevResult<Vec<f64>> {
        RasterHandle::sample(self, coords)
    }

    fn nodata(&self) -> f64 {
        RasterHandle::nodata(self)
    }

    fn epsg(&self) -> Option<u32> {
        RasterHandle::epsg(self)
    }

    fn path(&self) -> &Path {
        RasterHandle::path(self)
    }
}

/// Checks that `name` can be stored in the dataset the points came from
///
/// DBF field names hold at most ten bytes; longer names are refused
/// instead of being cut. In a GeoPackage or geodatabase the name may not
/// shadow the feature id or geometry column.
pub fn validate_field_name(name: &str, points: &PointCollection, tag: &FormatTag) -> ElevResult<()> {
    if name.trim().is_empty() {
        return Err(ElevError::schema(tag.file_path(), "elevation field name is empty"));
    }

    match tag {
        FormatTag::SingleFile(path) => {
            if name.len() > MAX_FIELD_NAME_BYTES {
                return Err(ElevError::schema(path, format!(
                    "field name '{}' is {} bytes, shapefile fields allow at most {}",
                    name, name.len(), MAX_FIELD_NAME_BYTES)));
            }
        },
        FormatTag::Geodatabase { container, .. } if name.chars().count() > MAX_FIELD_NAME_CHARS => {
            return Err(ElevError::schema(container, format!(
                "field name '{}' is longer than the {} characters a geodatabase allows", name, MAX_FIELD_NAME_CHARS)));
        },
        FormatTag::LayeredContainer { container, .. } | FormatTag::Geodatabase { container, .. } => {
            let reserved = [&points.layer.fid_column, &points.layer.geometry_column];
            if reserved.iter().any(|c| c.as_deref().map_or(false, |c| c.eq_ignore_ascii_case(name))) {
                return Err(ElevError::schema(container, format!(
                    "field name '{}' is taken by the layer's key or geometry column", name)));
            }
        },
    }
    Ok(())
}

/// Compares the point and raster coordinate systems by EPSG code
///
/// Fails only when both codes are known and differ; an unknown side is
/// logged and let through.
pub fn check_crs(points: &PointCollection, raster: &dyn ElevationSource) -> ElevResult<()> {
    match (points.epsg(), raster.epsg()) {
        (Some(points_epsg), Some(raster_epsg)) if points_epsg != raster_epsg => Err(ElevError::CrsMismatch {
            path: raster.path().to_path_buf(),
            points_epsg,
            raster_epsg,
        }),
        (Some(code), Some(_)) => {
            debug!("Points and raster share EPSG:{}", code);
            Ok(())
        },
        (points_epsg, raster_epsg) => {
            warn!("Cannot compare coordinate systems (points: {}, raster: {}), assuming they match",
                  describe_epsg(points_epsg), describe_epsg(raster_epsg));
            Ok(())
        },
    }
}

fn describe_epsg(code: Option<u32>) -> String {
    code.map(|c| format!("EPSG:{}", c)).unwrap_or_else(|| "unknown".to_string())
}

/// Whether `value` is the nodata sentinel, NaN sentinels included
pub fn is_nodata(value: f64, nodata: f64) -> bool {
    value == nodata || (value.is_nan() && nodata.is_nan())
}

/// Samples the raster at every point and stores the values in `field_name`
///
/// An existing field of that name becomes a real-valued field in the
/// same schema position, so applying twice gives the same collection.
/// An empty collection comes back unchanged without touching the raster.
pub fn apply(mut points: PointCollection, raster: &mut dyn ElevationSource, field_name: &str) -> ElevResult<PointCollection> {
    if points.is_empty() {
        debug!("No points to sample");
        return Ok(points);
    }

    let coords = points.coordinates();
    let values = raster.sample(&coords)?;
    if values.len() != coords.len() {
        return Err(ElevError::io(raster.path(), format!(
            "raster returned {} values for {} points", values.len(), coords.len())));
    }

    let definition = FieldDef::elevation(field_name);
    match points.field_position(field_name) {
        Some(position) => {
            debug!("Overwriting existing field {}", points.fields[position]);
            let previous = std::mem::replace(&mut points.fields[position], definition);
            if previous.name != field_name {
                for record in points.records.iter_mut() {
                    record.attributes.remove(&previous.name);
                }
            }
        },
        None => points.fields.push(definition),
    }

    let nodata = raster.nodata();
    let mut misses = 0;
    for (record, value) in points.records.iter_mut().zip(values) {
        if is_nodata(value, nodata) {
            misses += 1;
        }
        record.set(field_name, AttributeValue::Real(value));
    }

    info!("Sampled {} points into {}", points.len(), field_name);
    if misses > 0 {
        warn!("{} of {} points have no elevation (nodata {})", misses, points.len(), nodata);
    }
    Ok(points)
}
