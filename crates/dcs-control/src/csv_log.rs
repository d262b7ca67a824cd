//! CSV measurement log
//!
//! One header row, then one row per sample:
//!
//! ```text
//! Timestamp,Voltage (V),Current (A)
//! 2025-03-14T09:26:53.589793,12.000,0.501
//! ```
//!
//! Every row is flushed as soon as it is written so that a crash loses at
//! most the sample in flight.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::error::LogError;
use crate::measurement::Measurement;

/// Header row
pub const CSV_HEADER: &str = "Timestamp,Voltage (V),Current (A)";

/// Directory under the home directory that receives logs by default
pub const DEFAULT_LOG_DIR_NAME: &str = "sorensen_dcs_logs";

/// strftime pattern of default log file names
pub const DEFAULT_LOG_FILENAME_FORMAT: &str = "%Y-%m-%d-%H%M-Sorensen_DCS_IV.csv";

/// ISO-8601 local timestamp with microseconds, no offset
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Default directory for measurement logs (`~/sorensen_dcs_logs`)
pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_LOG_DIR_NAME)
}

/// Default log file name for a session starting at `now`
pub fn default_log_filename(now: DateTime<Local>) -> String {
    now.format(DEFAULT_LOG_FILENAME_FORMAT).to_string()
}

/// Default log file path for a session starting now
pub fn default_log_path() -> PathBuf {
    default_log_dir().join(default_log_filename(Local::now()))
}

/// One data row, without line terminator
pub fn format_row(measurement: &Measurement) -> String {
    format!(
        "{},{:.3},{:.3}",
        measurement.timestamp.format(TIMESTAMP_FORMAT),
        measurement.voltage,
        measurement.current
    )
}

/// Writes measurements to a CSV file
pub struct CsvLogger {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    rows: usize,
}

impl CsvLogger {
    /// Create a logger for `path`; nothing is touched until [`open`](Self::open)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            rows: 0,
        }
    }

    /// Create a logger and open it immediately
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let mut logger = Self::new(path);
        logger.open()?;
        Ok(logger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Data rows written since the file was opened
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Create parent directories, truncate the file and write the header
    pub fn open(&mut self) -> Result<(), LogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(&self.path)?);
        writeln!(writer, "{}", CSV_HEADER)?;
        writer.flush()?;

        self.writer = Some(writer);
        self.rows = 0;
        info!("Logging measurements to {}", self.path.display());
        Ok(())
    }

    /// Append one sample and flush
    pub fn log(&mut self, measurement: &Measurement) -> Result<(), LogError> {
        let writer = self.writer.as_mut().ok_or(LogError::NotOpen)?;
        writeln!(writer, "{}", format_row(measurement))?;
        writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Append a sample taken now
    pub fn log_values(&mut self, voltage: f64, current: f64) -> Result<(), LogError> {
        self.log(&Measurement::now(voltage, current))
    }

    /// Flush and close the file; safe to call more than once
    pub fn close(&mut self) -> Result<(), LogError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!("Closed {} after {} rows", self.path.display(), self.rows);
        }
        Ok(())
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
