//! Error taxonomy for the elevation pipeline
//!
//! Every variant names the dataset it concerns so the command line can
//! report the offending path. Per-point anomalies are never errors; they
//! surface as nodata values instead.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::tiff::errors::TiffError;

/// Errors raised while loading, sampling or writing datasets
#[derive(Debug)]
pub enum ElevError {
    /// The path shape names no supported point format
    UnsupportedFormat { path: PathBuf, message: String },
    /// The file exists but its contents are not what the format requires
    InvalidFormat { path: PathBuf, message: String },
    /// Opening, reading or writing failed, or the dataset is empty or truncated
    Io { path: PathBuf, message: String },
    /// Geometry or attribute layout the pipeline cannot carry
    Schema { path: PathBuf, message: String },
    /// Points and raster declare different coordinate systems
    CrsMismatch { path: PathBuf, points_epsg: u32, raster_epsg: u32 },
    /// The output exists and overwriting was refused
    AlreadyExists { path: PathBuf },
    /// Invalid configuration or command line values
    Config { path: Option<PathBuf>, message: String },
}

/// Result type for pipeline operations
pub type ElevResult<T> = Result<T, ElevError>;

impl ElevError {
    pub fn unsupported_format(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        ElevError::UnsupportedFormat { path: path.as_ref().to_path_buf(), message: message.into() }
    }

    pub fn invalid_format(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        ElevError::InvalidFormat { path: path.as_ref().to_path_buf(), message: message.into() }
    }

    pub fn io(path: impl AsRef<Path>, error: impl fmt::Display) -> Self {
        ElevError::Io { path: path.as_ref().to_path_buf(), message: error.to_string() }
    }

    pub fn schema(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        ElevError::Schema { path: path.as_ref().to_path_buf(), message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ElevError::Config { path: None, message: message.into() }
    }

    /// Maps a TIFF error: I/O failures stay I/O, anything else means the
    /// file is not a usable GeoTIFF
    pub fn from_tiff(path: impl AsRef<Path>, error: TiffError) -> Self {
        match error {
            TiffError::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                ElevError::invalid_format(path, format!("truncated TIFF: {}", e))
            },
            TiffError::IoError(e) => ElevError::io(path, e),
            other => ElevError::invalid_format(path, other.to_string()),
        }
    }

    /// Maps an SQLite error: failures to reach or change the database are
    /// I/O, statements rejected by the table layout are schema problems
    pub fn from_sqlite(path: impl AsRef<Path>, error: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &error {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::ConstraintViolation | ErrorCode::TypeMismatch => ElevError::schema(path, error.to_string()),
                _ => ElevError::io(path, error),
            },
            rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::InvalidColumnName(_)
            | rusqlite::Error::QueryReturnedNoRows => ElevError::schema(path, error.to_string()),
            _ => ElevError::io(path, error),
        }
    }

    /// Short name of the error kind, as printed on the command line
    pub fn kind(&self) -> &'static str {
        match self {
            ElevError::UnsupportedFormat { .. } => "UnsupportedFormat",
            ElevError::InvalidFormat { .. } => "InvalidFormat",
            ElevError::Io { .. } => "IOError",
            ElevError::Schema { .. } => "SchemaError",
            ElevError::CrsMismatch { .. } => "CrsMismatch",
            ElevError::AlreadyExists { .. } => "AlreadyExists",
            ElevError::Config { .. } => "ConfigError",
        }
    }

    /// The dataset the error concerns
    pub fn path(&self) -> Option<&Path> {
        match self {
            ElevError::UnsupportedFormat { path, .. }
            | ElevError::InvalidFormat { path, .. }
            | ElevError::Io { path, .. }
            | ElevError::Schema { path, .. }
            | ElevError::CrsMismatch { path, .. }
            | ElevError::AlreadyExists { path } => Some(path),
            ElevError::Config { path, .. } => path.as_deref(),
        }
    }

    /// Process exit code for this error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            ElevError::UnsupportedFormat { .. } => 2,
            ElevError::InvalidFormat { .. } => 3,
            ElevError::Io { .. } => 4,
            ElevError::Schema { .. } => 5,
            ElevError::CrsMismatch { .. } => 6,
            ElevError::AlreadyExists { .. } => 7,
            ElevError::Config { .. } => 8,
        }
    }
}

impl fmt::Display for ElevError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElevError::UnsupportedFormat { path, message }
            | ElevError::InvalidFormat { path, message }
            | ElevError::Io { path, message }
            | ElevError::Schema { path, message } => {
                write!(f, "{}: {}: {}", self.kind(), path.display(), message)
            },
            ElevError::CrsMismatch { path, points_epsg, raster_epsg } => write!(
                f, "{}: {}: points are in EPSG:{} but the raster is in EPSG:{}",
                self.kind(), path.display(), points_epsg, raster_epsg),
            ElevError::AlreadyExists { path } => {
                write!(f, "{}: {}: output exists and overwriting is disabled", self.kind(), path.display())
            },
            ElevError::Config { path: Some(path), message } => {
                write!(f, "{}: {}: {}", self.kind(), path.display(), message)
            },
            ElevError::Config { path: None, message } => write!(f, "{}: {}", self.kind(), message),
        }
    }
}

impl std::error::Error for ElevError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiff_io_maps_to_io() {
        let err = ElevError::from_tiff("dem.tif", TiffError::IoError(io::Error::new(io::ErrorKind::PermissionDenied, "denied")));
        assert_eq!(err.kind(), "IOError");
        assert_eq!(err.path(), Some(Path::new("dem.tif")));
    }

    #[test]
    fn test_tiff_format_errors_map_to_invalid_format() {
        let err = ElevError::from_tiff("dem.tif", TiffError::InvalidByteOrder(0x1234));
        assert_eq!(err.kind(), "InvalidFormat");
        assert!(err.to_string().starts_with("InvalidFormat: dem.tif: "));

        let truncated = TiffError::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert_eq!(ElevError::from_tiff("dem.tif", truncated).kind(), "InvalidFormat");
    }

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let errors = [
            ElevError::unsupported_format("a", ""),
            ElevError::invalid_format("a", ""),
            ElevError::io("a", "x"),
            ElevError::schema("a", ""),
            ElevError::CrsMismatch { path: "a".into(), points_epsg: 1, raster_epsg: 2 },
            ElevError::AlreadyExists { path: "a".into() },
            ElevError::config(""),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|&c| c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
