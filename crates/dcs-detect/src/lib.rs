//! Sorensen DCS Discovery Library
//!
//! This crate finds Sorensen DCS power supplies on serial ports: it lists
//! the candidate ports, sends each one `*IDN?` and keeps the ports that
//! answer.
//!
//! # Example
//!
//! ```rust,no_run
//! use dcs_detect::scan_for_devices;
//!
//! for device in scan_for_devices(19200) {
//!     println!("{} -> {}", device.port, device.identification);
//! }
//! ```

pub mod error;
pub mod probe;
pub mod scan;
pub mod scanner;
pub mod transport;

pub use error::{DetectError, ProbeFailure};
pub use probe::{
    probe_port, DeviceProber, IdentifyPolicy, Probe, ProbeConfig, ProbeResult,
    DEFAULT_SCAN_TIMEOUT,
};
pub use scan::{
    scan_for_devices, CancelToken, DeviceRecord, PortSource, ScanOrchestrator, ScanProgress,
    ScanReport,
};
pub use scanner::{Platform, PortFilter, PortScanner, ScannerConfig, SerialPortInfo};
pub use transport::{read_line, LinkSettings, SerialTransport, SystemOpener, TransportOpener};
