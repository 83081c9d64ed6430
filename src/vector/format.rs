//! Point dataset format detection from the path shape

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::{ElevError, ElevResult};

lazy_static! {
    /// `<container>.gpkg/<layer>`, with either separator
    static ref LAYER_IN_CONTAINER: Regex =
        Regex::new(r"(?i)^(.+\.gpkg)[/\\]([^/\\]+)$").expect("valid layer path pattern");
    /// `<geodatabase>.gdb/<feature class>`, with either separator
    static ref FEATURE_CLASS: Regex =
        Regex::new(r"(?i)^(.+\.gdb)[/\\]([^/\\]+)$").expect("valid feature class path pattern");
}

/// Where a point dataset lives, resolved once when it is loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatTag {
    /// An ESRI shapefile set, named by its `.shp` file
    SingleFile(PathBuf),
    /// A feature table inside a GeoPackage
    LayeredContainer { container: PathBuf, layer: String },
    /// A feature class inside an Esri File Geodatabase directory
    Geodatabase { container: PathBuf, layer: String },
}

impl FormatTag {
    /// Resolves the format from the shape of a dataset path
    pub fn from_path(path: &str) -> ElevResult<Self> {
        if path.to_ascii_lowercase().ends_with(".shp") {
            return Ok(FormatTag::SingleFile(PathBuf::from(path)));
        }

        if let Some(caps) = LAYER_IN_CONTAINER.captures(path) {
            return Ok(FormatTag::LayeredContainer {
                container: PathBuf::from(&caps[1]),
                layer: caps[2].to_string(),
            });
        }

        if let Some(caps) = FEATURE_CLASS.captures(path) {
            return Ok(FormatTag::Geodatabase {
                container: PathBuf::from(&caps[1]),
                layer: caps[2].to_string(),
            });
        }

        Err(ElevError::unsupported_format(
            path, "expected a .shp file or a layer path such as points.gpkg/layer or points.gdb/layer"))
    }

    /// The file that holds the dataset
    pub fn file_path(&self) -> &Path {
        match self {
            FormatTag::SingleFile(path) => path,
            FormatTag::LayeredContainer { container, .. } | FormatTag::Geodatabase { container, .. } => container,
        }
    }

    pub fn format_name(&self) -> &'static str {
        match self {
            FormatTag::SingleFile(_) => "ESRI Shapefile",
            FormatTag::LayeredContainer { .. } => "GeoPackage",
            FormatTag::Geodatabase { .. } => "ESRI File Geodatabase",
        }
    }

    /// The sibling dataset with `suffix` inserted before the extension
    ///
    /// `a/pts.shp` becomes `a/pts<suffix>.shp` and `a/db.gpkg/pts` becomes
    /// `a/db<suffix>.gpkg/pts`; geodatabases follow the GeoPackage rule.
    pub fn derived(&self, suffix: &str) -> FormatTag {
        match self {
            FormatTag::SingleFile(path) => FormatTag::SingleFile(with_suffix(path, suffix)),
            FormatTag::LayeredContainer { container, layer } => FormatTag::LayeredContainer {
                container: with_suffix(container, suffix),
                layer: layer.clone(),
            },
            FormatTag::Geodatabase { container, layer } => FormatTag::Geodatabase {
                container: with_suffix(container, suffix),
                layer: layer.clone(),
            },
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatTag::SingleFile(path) => write!(f, "{}", path.display()),
            FormatTag::LayeredContainer { container, layer } | FormatTag::Geodatabase { container, layer } => {
                write!(f, "{}/{}", container.display(), layer)
            },
        }
    }
}
