//! Virtual DCS supply
//!
//! Models a supply driving a resistive load: the output regulates voltage
//! until the load would draw more than the current setpoint, then regulates
//! current instead. Commands arrive one line at a time, exactly as the
//! instrument's RS-232 interface sees them.

use dcs_protocol::{Ratings, ScpiCommand};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Most recent command lines kept for inspection
pub const RECEIVED_HISTORY: usize = 256;

/// Ratings used when the configured model does not follow the DCS pattern
const FALLBACK_RATINGS: Ratings = Ratings {
    max_voltage: 60.0,
    max_current: 18.0,
};

/// Configuration for a virtual supply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualSupplyConfig {
    /// Model designation reported by `*IDN?`
    pub model: String,
    /// Serial number reported by `*IDN?`
    pub serial_number: String,
    /// Firmware revision reported by `*IDN?`
    pub firmware: String,
    /// Load resistance in ohms; `None` is an open circuit
    pub load_ohms: Option<f64>,
    /// Programmable limits; `None` derives them from the model
    #[serde(default)]
    pub ratings: Option<Ratings>,
}

impl Default for VirtualSupplyConfig {
    fn default() -> Self {
        Self {
            model: "DCS60-18E".to_string(),
            serial_number: "SIM0001".to_string(),
            firmware: "1.0".to_string(),
            load_ohms: Some(10.0),
            ratings: None,
        }
    }
}

/// Which quantity the output is currently regulating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegulationMode {
    ConstantVoltage,
    ConstantCurrent,
}

/// Snapshot of the virtual supply's observable state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualSupplyState {
    pub voltage_setpoint: f64,
    pub current_setpoint: f64,
    pub output_voltage: f64,
    pub output_current: f64,
    pub mode: RegulationMode,
    /// Whether the front panel is locked out by remote control
    pub remote: bool,
}

/// Simulated DCS power supply
pub struct VirtualSupply {
    config: VirtualSupplyConfig,
    ratings: Ratings,
    voltage_setpoint: f64,
    current_setpoint: f64,
    remote: bool,
    /// Rejected or unparseable commands since the last `*CLS`
    error_count: usize,
    /// Last [`RECEIVED_HISTORY`] command lines, oldest first
    received: Vec<String>,
}

impl VirtualSupply {
    /// Create a virtual supply with both setpoints at zero
    pub fn new(config: VirtualSupplyConfig) -> Self {
        let ratings = config
            .ratings
            .or_else(|| Ratings::from_model(&config.model).ok())
            .unwrap_or(FALLBACK_RATINGS);
        Self {
            config,
            ratings,
            voltage_setpoint: 0.0,
            current_setpoint: 0.0,
            remote: false,
            error_count: 0,
            received: Vec::new(),
        }
    }

    /// Create a virtual supply reporting the given model
    pub fn with_model(model: impl Into<String>) -> Self {
        Self::new(VirtualSupplyConfig {
            model: model.into(),
            ..VirtualSupplyConfig::default()
        })
    }

    pub fn config(&self) -> &VirtualSupplyConfig {
        &self.config
    }

    /// Programmable limits of this supply
    pub fn ratings(&self) -> Ratings {
        self.ratings
    }

    /// The `*IDN?` response line, without terminator
    pub fn identification(&self) -> String {
        format!(
            "SORENSEN,{},{},{}",
            self.config.model, self.config.serial_number, self.config.firmware
        )
    }

    pub fn voltage_setpoint(&self) -> f64 {
        self.voltage_setpoint
    }

    pub fn current_setpoint(&self) -> f64 {
        self.current_setpoint
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Most recent command lines, oldest first
    pub fn received(&self) -> &[String] {
        &self.received
    }

    /// Change the load; `None` disconnects it
    pub fn set_load(&mut self, ohms: Option<f64>) {
        self.config.load_ohms = ohms.filter(|r| r.is_finite() && *r > 0.0);
    }

    /// Output voltage, current and regulation mode into the present load
    pub fn operating_point(&self) -> (f64, f64, RegulationMode) {
        let Some(ohms) = self.config.load_ohms else {
            return (self.voltage_setpoint, 0.0, RegulationMode::ConstantVoltage);
        };

        let demanded = self.voltage_setpoint / ohms;
        if demanded <= self.current_setpoint {
            (self.voltage_setpoint, demanded, RegulationMode::ConstantVoltage)
        } else {
            (
                self.current_setpoint * ohms,
                self.current_setpoint,
                RegulationMode::ConstantCurrent,
            )
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> VirtualSupplyState {
        let (output_voltage, output_current, mode) = self.operating_point();
        VirtualSupplyState {
            voltage_setpoint: self.voltage_setpoint,
            current_setpoint: self.current_setpoint,
            output_voltage,
            output_current,
            mode,
            remote: self.remote,
        }
    }

    /// Process one command line and return the response line, if any
    ///
    /// Unknown commands and out-of-range setpoints are counted as errors and
    /// produce no response, as on the instrument.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        if self.received.len() == RECEIVED_HISTORY {
            self.received.remove(0);
        }
        self.received.push(line.to_string());

        let command = match ScpiCommand::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Virtual supply rejected {:?}: {}", line, e);
                self.error_count += 1;
                return None;
            }
        };
        debug!("Virtual supply processing {:?}", command);

        self.remote = !matches!(command, ScpiCommand::ReturnToLocal);

        match command {
            ScpiCommand::Identify => Some(self.identification()),
            ScpiCommand::ClearStatus => {
                self.error_count = 0;
                None
            }
            ScpiCommand::MeasureVoltage => Some(format_value(self.operating_point().0)),
            ScpiCommand::MeasureCurrent => Some(format_value(self.operating_point().1)),
            ScpiCommand::SetVoltage(volts) => {
                if in_range(volts, self.ratings.max_voltage) {
                    self.voltage_setpoint = volts;
                } else {
                    warn!("Virtual supply voltage {} out of range", volts);
                    self.error_count += 1;
                }
                None
            }
            ScpiCommand::SetCurrent(amps) => {
                if in_range(amps, self.ratings.max_current) {
                    self.current_setpoint = amps;
                } else {
                    warn!("Virtual supply current {} out of range", amps);
                    self.error_count += 1;
                }
                None
            }
            ScpiCommand::VoltageSetpoint => Some(format_value(self.voltage_setpoint)),
            ScpiCommand::CurrentSetpoint => Some(format_value(self.current_setpoint)),
            ScpiCommand::MaxVoltage => Some(format_value(self.ratings.max_voltage)),
            ScpiCommand::MaxCurrent => Some(format_value(self.ratings.max_current)),
            ScpiCommand::ReturnToLocal => None,
        }
    }
}

impl Default for VirtualSupply {
    fn default() -> Self {
        Self::new(VirtualSupplyConfig::default())
    }
}

fn in_range(value: f64, max: f64) -> bool {
    value.is_finite() && (0.0..=max).contains(&value)
}

fn format_value(value: f64) -> String {
    format!("{:.3}", value)
}
