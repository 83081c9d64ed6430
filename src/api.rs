use log::{debug, info};
use std::path::Path;

use crate::config::Config;
use crate::errors::{ElevError, ElevResult};
use crate::raster::RasterHandle;
use crate::sampler::{self, is_nodata};
use crate::sink;
use crate::vector::{self, FormatTag};

/// Outcome of one sampling run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Number of points sampled and written
    pub points: usize,
    /// Points that resolved to the raster nodata value
    pub nodata_points: usize,
    /// Nodata value of the raster
    pub nodata: f64,
    pub field: String,
    /// Dataset the points were written to
    pub output: FormatTag,
}

/// Main interface to the elevkit library
pub struct ElevKit {
    config: Config,
}

impl ElevKit {
    /// Create an instance for a validated configuration
    pub fn new(config: Config) -> ElevResult<Self> {
        config.validate()?;
        Ok(ElevKit { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Samples the configured raster at the configured points
    pub fn run(&self) -> ElevResult<RunReport> {
        let points = self.config.points.as_deref()
            .ok_or_else(|| ElevError::config("no point dataset given"))?;
        let raster = self.config.raster.as_deref()
            .ok_or_else(|| ElevError::config("no raster given"))?;
        self.sample_file(points, raster)
    }

    /// Attaches elevations from `raster_path` to the points at `points_path`
    ///
    /// The raster is opened before the points are touched and closed
    /// before anything is written. Nothing is written when any earlier
    /// step fails.
    pub fn sample_file(&self, points_path: &str, raster_path: &Path) -> ElevResult<RunReport> {
        let field = self.config.elevation_field_name.as_str();

        let (sampled, tag, nodata) = {
            let mut raster = RasterHandle::open(raster_path, self.config.fallback_nodata)?;
            let (points, tag) = vector::load(points_path)?;
            info!("Loaded {} points from {} ({})", points.len(), tag, tag.format_name());

            sampler::validate_field_name(field, &points, &tag)?;
            if self.config.check_crs {
                sampler::check_crs(&points, &raster)?;
            }
            let sampled = sampler::apply(points, &mut raster, field)?;
            (sampled, tag, raster.nodata())
        };
        debug!("Raster {} closed", raster_path.display());

        let output = sink::write(&sampled, &tag, &self.config.sink_options())?;
        let nodata_points = sampled.records.iter()
            .filter(|r| r.value(field).as_f64().map_or(false, |v| is_nodata(v, nodata)))
            .count();

        Ok(RunReport {
            points: sampled.len(),
            nodata_points,
            nodata,
            field: field.to_string(),
            output,
        })
    }

    /// Summaries of the raster and point dataset, without writing anything
    pub fn info(&self, points_path: Option<&str>, raster_path: Option<&Path>) -> ElevResult<String> {
        if points_path.is_none() && raster_path.is_none() {
            return Err(ElevError::config("nothing to describe: give a point dataset or a raster"));
        }

        let mut sections = Vec::new();
        if let Some(path) = raster_path {
            let raster = RasterHandle::open(path, self.config.fallback_nodata)?;
            sections.push(raster.describe());
        }
        if let Some(path) = points_path {
            let (points, tag) = vector::load(path)?;
            sections.push(format!("Dataset: {} ({})\n{}", tag, tag.format_name(), points.describe()));
        }
        Ok(sections.join("\n\n"))
    }
}
