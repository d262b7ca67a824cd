//! Serial port scanner
//!
//! This module provides serial port enumeration, with an optional filter
//! that keeps only ports following the host platform's USB-serial naming
//! conventions.

use serde::{Deserialize, Serialize};
use serialport::{available_ports, SerialPortType};
use tracing::{debug, info, warn};

/// Information about a serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// OS-reported description, if any
    pub description: Option<String>,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    /// Create a bare entry carrying only a port name
    pub fn named(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            description: None,
            vid: None,
            pid: None,
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }

    /// Create from serialport crate's port info
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                description: usb.product.clone().or_else(|| usb.manufacturer.clone()),
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number.clone(),
                manufacturer: usb.manufacturer.clone(),
                product: usb.product.clone(),
                ..Self::named(name)
            },
            SerialPortType::BluetoothPort => Self {
                description: Some("Bluetooth".to_string()),
                ..Self::named(name)
            },
            SerialPortType::PciPort | SerialPortType::Unknown => Self::named(name),
        }
    }

    /// Human-readable label for pickers
    ///
    /// `"<port> - <description>"` when the OS reports a description that
    /// differs from the bare port name, otherwise just the port name.
    pub fn display_label(&self) -> String {
        match &self.description {
            Some(desc) if !desc.is_empty() && desc != &self.port => {
                format!("{} - {}", self.port, desc)
            }
            _ => self.port.clone(),
        }
    }
}

/// Host platform, used to pick naming conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    /// The platform this binary was built for
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Platform::Linux,
            "macos" => Platform::MacOs,
            "windows" => Platform::Windows,
            _ => Platform::Other,
        }
    }

    /// Check if a port name follows this platform's USB-serial naming
    ///
    /// Unrecognized platforms accept every name.
    pub fn is_likely_serial_port(&self, port_name: &str) -> bool {
        match self {
            Platform::Linux => ["ttyUSB", "ttyACM", "ttyS"]
                .iter()
                .any(|p| port_name.contains(p)),
            Platform::MacOs => ["usbserial", "usbmodem"]
                .iter()
                .any(|p| port_name.contains(p)),
            Platform::Windows => port_name.to_ascii_uppercase().starts_with("COM"),
            Platform::Other => true,
        }
    }
}

/// Which enumerated ports become scan candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortFilter {
    /// Every port the OS reports
    #[default]
    All,
    /// Only ports matching the platform's USB-serial naming conventions
    OsConvention,
}

impl PortFilter {
    /// Human-readable name for settings UI
    pub fn name(&self) -> &'static str {
        match self {
            PortFilter::All => "All ports",
            PortFilter::OsConvention => "USB-serial ports only",
        }
    }
}

/// Serial port scanner configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Candidate filter policy
    pub filter: PortFilter,
    /// Platform whose naming conventions the filter applies
    pub platform: Platform,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            filter: PortFilter::All,
            platform: Platform::current(),
        }
    }
}

/// Serial port scanner
pub struct PortScanner {
    config: ScannerConfig,
}

impl PortScanner {
    /// Create a new scanner with default configuration
    pub fn new() -> Self {
        Self {
            config: ScannerConfig::default(),
        }
    }

    /// Create a scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Create a scanner using the given filter on the current platform
    pub fn with_filter(filter: PortFilter) -> Self {
        Self::with_config(ScannerConfig {
            filter,
            ..ScannerConfig::default()
        })
    }

    /// Current configuration
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Enumerate all available serial ports
    ///
    /// Never fails: an enumeration error is logged and yields an empty list.
    pub fn enumerate_ports(&self) -> Vec<SerialPortInfo> {
        debug!("Enumerating serial ports...");
        let ports = match available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("Failed to enumerate ports: {}", e);
                return Vec::new();
            }
        };

        let result = self.select(
            ports
                .into_iter()
                .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
                .collect(),
        );

        if result.is_empty() {
            info!("No serial ports found");
        } else {
            info!("Found {} serial port(s)", result.len());
            for port in &result {
                debug!("  {}", port.display_label());
            }
        }

        result
    }

    /// Apply the filter policy, then sort by name and drop duplicate paths
    pub fn select(&self, ports: Vec<SerialPortInfo>) -> Vec<SerialPortInfo> {
        let mut result: Vec<_> = ports
            .into_iter()
            .filter(|p| self.should_keep_port(&p.port))
            .collect();

        result.sort_by(|a, b| a.port.cmp(&b.port));
        result.dedup_by(|a, b| a.port == b.port);
        result
    }

    /// Human-readable description of a port by name
    ///
    /// Falls back to the bare name when the port is not currently visible.
    pub fn describe(&self, port_name: &str) -> String {
        available_ports()
            .unwrap_or_default()
            .into_iter()
            .find(|p| p.port_name == port_name)
            .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type).display_label())
            .unwrap_or_else(|| port_name.to_string())
    }

    /// Check if a port passes the filter policy
    fn should_keep_port(&self, port_name: &str) -> bool {
        match self.config.filter {
            PortFilter::All => true,
            PortFilter::OsConvention => self.config.platform.is_likely_serial_port(port_name),
        }
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new()
    }
}
