//! Elevation sampling command

use log::{info, warn};

use crate::api::{ElevKit, RunReport};
use crate::commands::command_traits::Command;
use crate::config::Config;
use crate::errors::ElevResult;

/// Samples the raster at the points and writes the result
pub struct SampleCommand {
    config: Config,
}

impl SampleCommand {
    pub fn new(config: Config) -> Self {
        SampleCommand { config }
    }

    /// The line printed when the run succeeds
    pub fn summary(report: &RunReport) -> String {
        format!("Processed {} points, wrote {} to {}", report.points, report.field, report.output)
    }
}

impl Command for SampleCommand {
    fn execute(&self) -> ElevResult<()> {
        let kit = ElevKit::new(self.config.clone())?;
        let report = kit.run()?;

        if report.nodata_points > 0 {
            warn!("{} points fell outside the raster or on nodata cells ({})", report.nodata_points, report.nodata);
        }
        info!("Finished writing {}", report.output);
        println!("{}", Self::summary(&report));
        Ok(())
    }
}
