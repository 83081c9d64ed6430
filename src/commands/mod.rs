//! CLI command implementations
//!
//! This module contains the command line definition and the commands it
//! dispatches to, using the Command pattern.

pub mod command_traits;
pub mod info_command;
pub mod sample_command;

pub use command_traits::{Command, CommandFactory};
pub use info_command::InfoCommand;
pub use sample_command::SampleCommand;

use clap::{Arg, ArgAction, ArgMatches, Command as ClapCommand};
use std::path::{Path, PathBuf};

use crate::config::{Config, Overrides};
use crate::errors::{ElevError, ElevResult};
use crate::sink::WriteMode;

/// The command line interface definition
pub fn build_cli() -> ClapCommand {
    ClapCommand::new("elevkit")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Attach DTM elevations from a GeoTIFF to point features")
        .arg(
            Arg::new("points")
                .help("Point dataset: a .shp file, <container>.gpkg/<layer> or <container>.gdb/<layer>")
                .value_name("POINTS")
                .index(1),
        )
        .arg(
            Arg::new("raster")
                .help("Single-band GeoTIFF DTM (.tif or .tiff)")
                .value_name("RASTER")
                .index(2),
        )
        .arg(
            Arg::new("field")
                .short('f')
                .long("field")
                .help("Name of the elevation field [default: DTM_Elev]")
                .value_name("NAME"),
        )
        .arg(
            Arg::new("in-place")
                .short('i')
                .long("in-place")
                .help("Overwrite the input dataset instead of writing a new one")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-overwrite")
                .long("no-overwrite")
                .help("Fail if the derived output already exists")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-crs")
                .long("check-crs")
                .help("Fail when points and raster declare different EPSG codes")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("nodata")
                .long("nodata")
                .help("Nodata value for rasters that declare none [default: -9999]")
                .value_name("VALUE")
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("suffix")
                .long("suffix")
                .help("Suffix of the derived output [default: _with_elevations]")
                .value_name("SUFFIX"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML configuration file")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Write the full log to this file")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("info")
                .long("info")
                .help("Describe the raster and point dataset without writing")
                .action(ArgAction::SetTrue),
        )
}

/// Builds the configuration: defaults, then `--config`, then options
pub fn config_from_args(args: &ArgMatches) -> ElevResult<Config> {
    let mut config = match args.get_one::<String>("config") {
        Some(path) => Config::from_file(Path::new(path))?,
        None => Config::default(),
    };

    let fallback_nodata = args.get_one::<String>("nodata")
        .map(|value| value.trim().parse::<f64>()
            .map_err(|_| ElevError::config(format!("--nodata expects a number, got '{}'", value))))
        .transpose()?;
    let flag = |name: &str| if args.get_flag(name) { Some(true) } else { None };

    config.apply_overrides(Overrides {
        points: args.get_one::<String>("points").cloned(),
        raster: args.get_one::<String>("raster").map(PathBuf::from),
        elevation_field_name: args.get_one::<String>("field").cloned(),
        write_mode: flag("in-place").map(|_| WriteMode::InPlace),
        overwrite_existing: flag("no-overwrite").map(|_| false),
        check_crs: flag("check-crs"),
        fallback_nodata,
        output_suffix: args.get_one::<String>("suffix").cloned(),
    });
    Ok(config)
}

/// Factory for creating command instances based on CLI arguments
pub struct ElevkitCommandFactory;

impl ElevkitCommandFactory {
    pub fn new() -> Self {
        ElevkitCommandFactory
    }
}

impl Default for ElevkitCommandFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandFactory for ElevkitCommandFactory {
    fn create_command(&self, args: &ArgMatches) -> ElevResult<Box<dyn Command>> {
        let config = config_from_args(args)?;
        if args.get_flag("info") {
            Ok(Box::new(InfoCommand::new(config)))
        } else {
            Ok(Box::new(SampleCommand::new(config)))
        }
    }
}
