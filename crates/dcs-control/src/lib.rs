//! Sorensen DCS Control Library
//!
//! This crate drives a connected DCS supply:
//!
//! - [`PowerSupply`]: the instrument-driver interface, implemented by
//!   [`DcsSupply`] over any async byte stream
//! - [`DcsController`]: turns driver errors into status messages
//! - [`CsvLogger`]: timestamped voltage/current log files
//! - [`run_supply_task`]: the task that owns the supply, refreshing readings
//!   and logging on timers while serving UI commands
//!
//! # Example
//!
//! ```rust,no_run
//! use dcs_control::{DcsSupply, PowerSupply, DEFAULT_CONNECT_TIMEOUT};
//!
//! # async fn demo() -> Result<(), dcs_control::SupplyError> {
//! let mut supply = DcsSupply::connect("/dev/ttyUSB0", 19200, DEFAULT_CONNECT_TIMEOUT).await?;
//! supply.set_output_voltage(12.0).await?;
//! let reading = supply.measure().await?;
//! println!("{:.3} V, {:.3} A", reading.voltage, reading.current);
//! supply.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod csv_log;
pub mod driver;
pub mod error;
pub mod measurement;
pub mod task;

pub use controller::DcsController;
pub use csv_log::{
    default_log_dir, default_log_filename, default_log_path, format_row, CsvLogger, CSV_HEADER,
    DEFAULT_LOG_DIR_NAME, DEFAULT_LOG_FILENAME_FORMAT,
};
pub use driver::{DcsSupply, PowerSupply, DEFAULT_CONNECT_TIMEOUT};
pub use error::{LogError, SupplyError};
pub use measurement::{Measurement, Quantity};
pub use task::{
    clamp_log_interval, run_supply_task, SupplyEvent, SupplyInfo, SupplyTaskCommand,
    SupplyTaskConfig, DEFAULT_REFRESH_INTERVAL, MAX_LOG_INTERVAL, MIN_LOG_INTERVAL,
};
