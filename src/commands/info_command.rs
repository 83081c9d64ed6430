//! Dataset inspection command
//!
//! Prints what the sampler would see for the given raster and points
//! without writing anything.

use crate::api::ElevKit;
use crate::commands::command_traits::Command;
use crate::config::Config;
use crate::errors::ElevResult;

pub struct InfoCommand {
    config: Config,
}

impl InfoCommand {
    pub fn new(config: Config) -> Self {
        InfoCommand { config }
    }
}

impl Command for InfoCommand {
    fn execute(&self) -> ElevResult<()> {
        let kit = ElevKit::new(self.config.clone())?;
        let summary = kit.info(self.config.points.as_deref(), self.config.raster.as_deref())?;
        println!("{}", summary);
        Ok(())
    }
}
