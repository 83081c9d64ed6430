//! Logger utility for application-wide logging
//!
//! This module provides a `log` backend that writes every enabled record to
//! an optional log file and echoes warnings and errors to stderr.

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

/// Custom logger implementation
pub struct Logger {
    /// File handle for log output
    file: Mutex<Option<File>>,
    level: LevelFilter,
}

impl Logger {
    /// Creates a logger writing to `log_file`, if given, at `level`
    pub fn new(log_file: Option<&Path>, level: LevelFilter) -> io::Result<Self> {
        let file = log_file.map(File::create).transpose()?;
        Ok(Logger {
            file: Mutex::new(file),
            level,
        })
    }

    /// Formats a record the way it appears in the log file
    fn format_line(record: &Record) -> String {
        format!("{} [{}] {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"), record.level(), record.target(), record.args())
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                writeln!(file, "{}", line)?;
                file.flush()?;
            }
        }
        Ok(())
    }

    /// Installs the global logger; `verbose` lowers the threshold to debug
    pub fn init_global_logger(log_file: Option<&Path>, verbose: bool) -> io::Result<()> {
        let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
        let global_logger = Logger::new(log_file, level)?;

        if log::set_boxed_logger(Box::new(global_logger)).is_err() {
            eprintln!("Warning: Global logger was already initialized");
        }

        log::set_max_level(level);
        Ok(())
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = self.write_line(&Self::format_line(record));

        if record.level() <= Level::Warn {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }
}
