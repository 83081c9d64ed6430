//! Writing sampled points back to disk
//!
//! The sink writes through the codec named by the [`FormatTag`] resolved at
//! load time, either over the source or into a derived sibling dataset.

use log::{debug, info};

use crate::errors::{ElevError, ElevResult};
use crate::utils::progress::ProgressTracker;
use crate::vector::{filegdb, geopackage, shapefile, FormatTag, PointCollection};

/// Suffix inserted before the extension of derived outputs
pub const DEFAULT_SUFFIX: &str = "_with_elevations";

/// Where the sampled points go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the source dataset
    InPlace,
    /// Write a sibling dataset with a suffixed name
    NewFile,
}

impl WriteMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "in_place" | "inplace" | "in-place" => Some(WriteMode::InPlace),
            "new_file" | "newfile" | "new-file" => Some(WriteMode::NewFile),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WriteMode::InPlace => "in_place",
            WriteMode::NewFile => "new_file",
        }
    }
}

/// How derived outputs are named and whether they may be replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOptions {
    pub mode: WriteMode,
    pub suffix: String,
    pub overwrite_existing: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        SinkOptions {
            mode: WriteMode::NewFile,
            suffix: DEFAULT_SUFFIX.to_string(),
            overwrite_existing: true,
        }
    }
}

/// The dataset a write with `options` would produce
pub fn target(tag: &FormatTag, options: &SinkOptions) -> FormatTag {
    match options.mode {
        WriteMode::InPlace => tag.clone(),
        WriteMode::NewFile => tag.derived(&options.suffix),
    }
}

/// Writes the points and returns the dataset written
///
/// In-place writes always replace the source. A derived output that
/// already exists is replaced only when `overwrite_existing` is set; in a
/// GeoPackage only the layer is replaced and the other layers are kept.
pub fn write(points: &PointCollection, tag: &FormatTag, options: &SinkOptions) -> ElevResult<FormatTag> {
    let output = target(tag, options);
    if options.mode == WriteMode::NewFile && !options.overwrite_existing && output_exists(&output)? {
        return Err(ElevError::AlreadyExists { path: output.file_path().to_path_buf() });
    }
    debug!("Writing {} points {} to {}", points.len(), options.mode.name(), output);

    let progress = ProgressTracker::for_records(points.len(), "Writing points");
    match &output {
        FormatTag::SingleFile(shp) => {
            shapefile::write(shp, points)?;
            progress.increment(points.len() as u64);
        },
        FormatTag::LayeredContainer { container, layer } => {
            geopackage::write(container, layer, points, &progress)?;
        },
        FormatTag::Geodatabase { container, layer } => {
            filegdb::write(container, layer, points, &progress)?;
        },
    }
    progress.finish();

    info!("Wrote {} points to {}", points.len(), output);
    Ok(output)
}

fn output_exists(output: &FormatTag) -> ElevResult<bool> {
    match output {
        FormatTag::SingleFile(shp) => Ok(shapefile::exists(shp)),
        FormatTag::LayeredContainer { container, layer } => geopackage::layer_exists(container, layer),
        FormatTag::Geodatabase { container, layer } => filegdb::layer_exists(container, layer),
    }
}
