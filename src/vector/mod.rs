//! Point datasets: format detection, the in-memory model and the codecs
//!
//! Shapefiles, GeoPackage layers and File Geodatabase feature classes all
//! load into a [`PointCollection`].
//! The [`FormatTag`] resolved while loading travels with the points to the
//! sink, which writes them back through the same codec.

pub mod dbf;
pub mod filegdb;
pub mod format;
pub mod geopackage;
pub mod shapefile;
pub mod types;
mod wkb;

use log::debug;

use crate::errors::{ElevError, ElevResult};

pub use format::FormatTag;
pub use types::{AttributeValue, FieldDef, FieldType, GeometryType, LayerInfo, PointCollection, PointRecord};

/// Loads the point dataset at `path`
///
/// The path shape picks the codec: a `.shp` file, `<container>.gpkg/<layer>`
/// or `<container>.gdb/<layer>`.
/// A dataset without features cannot be sampled and is an I/O error.
pub fn load(path: &str) -> ElevResult<(PointCollection, FormatTag)> {
    let tag = FormatTag::from_path(path)?;
    debug!("Loading {} as {}", tag, tag.format_name());

    let points = match &tag {
        FormatTag::SingleFile(shp) => shapefile::read(shp)?,
        FormatTag::LayeredContainer { container, layer } => geopackage::read(container, layer)?,
        FormatTag::Geodatabase { container, layer } => filegdb::read(container, layer)?,
    };

    if points.is_empty() {
        return Err(ElevError::io(tag.file_path(), "dataset has no features"));
    }
    Ok((points, tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::Point;
    use crate::utils::progress::ProgressTracker;
    use tempfile::TempDir;

    #[test]
    fn test_load_dispatches_on_path_shape() {
        let dir = TempDir::new().unwrap();
        let mut points = PointCollection::new(GeometryType::Point);
        points.records.push(PointRecord::new(0, Point::new(1.0, 2.0)));

        let shp = dir.path().join("pts.shp");
        shapefile::write(&shp, &points).unwrap();
        let (loaded, tag) = load(shp.to_str().unwrap()).unwrap();
        assert_eq!(tag, FormatTag::SingleFile(shp.clone()));
        assert_eq!(loaded.coordinates(), vec![(1.0, 2.0)]);

        let gpkg = dir.path().join("db.gpkg");
        geopackage::write(&gpkg, "pts", &points, &ProgressTracker::hidden()).unwrap();
        let (loaded, tag) = load(&format!("{}/pts", gpkg.display())).unwrap();
        assert_eq!(tag, FormatTag::LayeredContainer { container: gpkg, layer: "pts".into() });
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_empty_dataset_is_io_error() {
        let dir = TempDir::new().unwrap();
        let shp = dir.path().join("empty.shp");
        shapefile::write(&shp, &PointCollection::new(GeometryType::Point)).unwrap();

        let err = load(shp.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), "IOError");
    }

    #[test]
    fn test_unsupported_path() {
        assert_eq!(load("points.geojson").unwrap_err().kind(), "UnsupportedFormat");
    }
}
