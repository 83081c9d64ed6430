//! Feature classes in Esri File Geodatabases
//!
//! A `.gdb` directory is read and written through GDAL's OpenFileGDB
//! driver, which needs elevkit built with the `filegdb` cargo feature.
//! Without it every call fails with `UnsupportedFormat` naming the feature.

#[cfg(feature = "filegdb")]
mod ogr;

#[cfg(feature = "filegdb")]
pub use ogr::{layer_exists, read, write};

#[cfg(not(feature = "filegdb"))]
pub use disabled::{layer_exists, read, write};

/// Cargo feature that enables File Geodatabase support
pub const CARGO_FEATURE: &str = "filegdb";

/// Default object id column of a feature class
pub const OBJECTID_COLUMN: &str = "OBJECTID";

/// Default geometry column of a feature class
pub const SHAPE_COLUMN: &str = "SHAPE";

/// Longest field name a feature class accepts
pub const MAX_FIELD_NAME_CHARS: usize = 64;

#[cfg(not(feature = "filegdb"))]
mod disabled {
    use std::path::Path;

    use super::CARGO_FEATURE;
    use crate::errors::{ElevError, ElevResult};
    use crate::utils::progress::ProgressTracker;
    use crate::vector::types::PointCollection;

    fn unavailable(container: &Path) -> ElevError {
        ElevError::unsupported_format(container, format!(
            "File Geodatabase layers need elevkit built with `--features {}`", CARGO_FEATURE))
    }

    pub fn read(container: &Path, _layer: &str) -> ElevResult<PointCollection> {
        Err(unavailable(container))
    }

    pub fn layer_exists(container: &Path, _layer: &str) -> ElevResult<bool> {
        Err(unavailable(container))
    }

    pub fn write(container: &Path, _layer: &str, _points: &PointCollection, _progress: &ProgressTracker) -> ElevResult<()> {
        Err(unavailable(container))
    }

}
