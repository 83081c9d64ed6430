//! Pipeline configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! command line options. The resulting [`Config`] is passed down the
//! pipeline explicitly.

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{ElevError, ElevResult};
use crate::sink::{SinkOptions, WriteMode, DEFAULT_SUFFIX};

pub const DEFAULT_FIELD_NAME: &str = "DTM_Elev";
pub const DEFAULT_NODATA: f64 = -9999.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Point dataset path, `.shp`, `<container>.gpkg/<layer>` or `<container>.gdb/<layer>`
    pub points: Option<String>,
    pub raster: Option<PathBuf>,
    pub elevation_field_name: String,
    pub write_mode: WriteMode,
    pub overwrite_existing: bool,
    pub check_crs: bool,
    /// Nodata used when the raster declares none
    pub fallback_nodata: f64,
    pub output_suffix: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            points: None,
            raster: None,
            elevation_field_name: DEFAULT_FIELD_NAME.to_string(),
            write_mode: WriteMode::NewFile,
            overwrite_existing: true,
            check_crs: false,
            fallback_nodata: DEFAULT_NODATA,
            output_suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

/// Values given on the command line, each overriding the file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub points: Option<String>,
    pub raster: Option<PathBuf>,
    pub elevation_field_name: Option<String>,
    pub write_mode: Option<WriteMode>,
    pub overwrite_existing: Option<bool>,
    pub check_crs: Option<bool>,
    pub fallback_nodata: Option<f64>,
    pub output_suffix: Option<String>,
}

fn type_error(source: Option<&Path>, key: &str, expected: &str, found: &toml::Value) -> ElevError {
    ElevError::Config {
        path: source.map(Path::to_path_buf),
        message: format!("'{}' must be {}, found {}", key, expected, found.type_str()),
    }
}

fn expect_str<'a>(source: Option<&Path>, key: &str, value: &'a toml::Value) -> ElevResult<&'a str> {
    value.as_str().ok_or_else(|| type_error(source, key, "a string", value))
}

fn expect_bool(source: Option<&Path>, key: &str, value: &toml::Value) -> ElevResult<bool> {
    value.as_bool().ok_or_else(|| type_error(source, key, "a boolean", value))
}

impl Config {
    /// Defaults overlaid with the TOML file at `path`
    pub fn from_file(path: &Path) -> ElevResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ElevError::Config {
            path: Some(path.to_path_buf()),
            message: format!("cannot read configuration: {}", e),
        })?;
        let mut config = Config::default();
        config.apply_toml(&content, Some(path))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Overlays the keys of a TOML document
    ///
    /// Unknown keys are reported and ignored. A known key with a value of
    /// the wrong type is a configuration error.
    pub fn apply_toml(&mut self, content: &str, source: Option<&Path>) -> ElevResult<()> {
        let table: toml::Table = toml::from_str(content).map_err(|e: toml::de::Error| ElevError::Config {
            path: source.map(Path::to_path_buf),
            message: format!("invalid TOML: {}", e.message()),
        })?;

        for (key, value) in &table {
            match key.as_str() {
                "points" => self.points = Some(expect_str(source, key, value)?.to_string()),
                "raster" => self.raster = Some(PathBuf::from(expect_str(source, key, value)?)),
                "elevation_field_name" => self.elevation_field_name = expect_str(source, key, value)?.to_string(),
                "write_mode" => {
                    let name = expect_str(source, key, value)?;
                    self.write_mode = WriteMode::parse(name).ok_or_else(|| ElevError::Config {
                        path: source.map(Path::to_path_buf),
                        message: format!("'write_mode' must be in_place or new_file, found '{}'", name),
                    })?;
                },
                "overwrite_existing" => self.overwrite_existing = expect_bool(source, key, value)?,
                "check_crs" => self.check_crs = expect_bool(source, key, value)?,
                "fallback_nodata" => {
                    self.fallback_nodata = match value {
                        toml::Value::Float(v) => *v,
                        toml::Value::Integer(v) => *v as f64,
                        other => return Err(type_error(source, key, "a number", other)),
                    };
                },
                "output_suffix" => self.output_suffix = expect_str(source, key, value)?.to_string(),
                unknown => warn!("Ignoring unknown configuration key '{}'", unknown),
            }
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(points) = overrides.points {
            self.points = Some(points);
        }
        if let Some(raster) = overrides.raster {
            self.raster = Some(raster);
        }
        if let Some(name) = overrides.elevation_field_name {
            self.elevation_field_name = name;
        }
        if let Some(mode) = overrides.write_mode {
            self.write_mode = mode;
        }
        if let Some(overwrite) = overrides.overwrite_existing {
            self.overwrite_existing = overwrite;
        }
        if let Some(check) = overrides.check_crs {
            self.check_crs = check;
        }
        if let Some(nodata) = overrides.fallback_nodata {
            self.fallback_nodata = nodata;
        }
        if let Some(suffix) = overrides.output_suffix {
            self.output_suffix = suffix;
        }
    }

    /// Checks values that no dataset can satisfy
    pub fn validate(&self) -> ElevResult<()> {
        if self.elevation_field_name.trim().is_empty() {
            return Err(ElevError::config("elevation field name must not be empty"));
        }
        if self.write_mode == WriteMode::NewFile && self.output_suffix.is_empty() {
            return Err(ElevError::config("output suffix must not be empty when writing a new file"));
        }
        if self.output_suffix.contains(['/', '\\']) {
            return Err(ElevError::config(format!("output suffix '{}' must not contain a path separator", self.output_suffix)));
        }
        Ok(())
    }

    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            mode: self.write_mode,
            suffix: self.output_suffix.clone(),
            overwrite_existing: self.overwrite_existing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.elevation_field_name, "DTM_Elev");
        assert_eq!(config.write_mode, WriteMode::NewFile);
        assert!(config.overwrite_existing);
        assert!(!config.check_crs);
        assert_eq!(config.fallback_nodata, -9999.0);
        assert_eq!(config.sink_options(), SinkOptions::default());
    }

    #[test]
    fn test_toml_values() {
        let mut config = Config::default();
        config.apply_toml(r#"
            points = "data/db.gpkg/wells"
            raster = "dem.tif"
            elevation_field_name = "z_dtm"
            write_mode = "in_place"
            check_crs = true
            fallback_nodata = -32768
            colour = "blue"
        "#, None).unwrap();

        assert_eq!(config.points.as_deref(), Some("data/db.gpkg/wells"));
        assert_eq!(config.raster, Some(PathBuf::from("dem.tif")));
        assert_eq!(config.elevation_field_name, "z_dtm");
        assert_eq!(config.write_mode, WriteMode::InPlace);
        assert!(config.check_crs);
        assert_eq!(config.fallback_nodata, -32768.0);
    }

    #[test]
    fn test_wrong_types_are_config_errors() {
        for doc in ["check_crs = \"yes\"", "fallback_nodata = \"none\"", "write_mode = \"append\"", "points = 3", "= broken"] {
            let err = Config::default().apply_toml(doc, Some(Path::new("elevkit.toml"))).unwrap_err();
            assert_eq!(err.kind(), "ConfigError", "{}", doc);
            assert_eq!(err.path(), Some(Path::new("elevkit.toml")));
        }
    }

    #[test]
    fn test_overrides_win() {
        let mut config = Config::default();
        config.apply_toml("elevation_field_name = \"from_file\"\ncheck_crs = true", None).unwrap();
        config.apply_overrides(Overrides {
            elevation_field_name: Some("from_cli".to_string()),
            write_mode: Some(WriteMode::InPlace),
            ..Overrides::default()
        });

        assert_eq!(config.elevation_field_name, "from_cli");
        assert_eq!(config.write_mode, WriteMode::InPlace);
        assert!(config.check_crs);
    }

    #[test]
    fn test_validation() {
        assert!(Config::default().validate().is_ok());
        let empty_field = Config { elevation_field_name: " ".into(), ..Config::default() };
        assert_eq!(empty_field.validate().unwrap_err().kind(), "ConfigError");
        let bad_suffix = Config { output_suffix: "../x".into(), ..Config::default() };
        assert!(bad_suffix.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/elevkit.toml")).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }
}
