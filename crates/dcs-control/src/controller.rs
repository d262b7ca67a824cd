//! Error-absorbing supply controller
//!
//! The controller is what the UI side talks to. Every driver error is logged
//! and kept as the last error message, and the call reports plain success or
//! failure instead, so a flaky cable never takes the application down.

use std::time::Duration;

use tokio_serial::SerialStream;
use tracing::{info, warn};

use crate::driver::{DcsSupply, PowerSupply};
use crate::error::SupplyError;
use crate::measurement::Measurement;

/// Owns at most one connected supply
pub struct DcsController<S = DcsSupply<SerialStream>> {
    supply: Option<S>,
    last_error: Option<String>,
}

impl DcsController<DcsSupply<SerialStream>> {
    /// Open `port` and connect to the supply on it
    ///
    /// Any supply already attached is disconnected first.
    pub async fn connect(&mut self, port: &str, baud_rate: u32, timeout: Duration) -> bool {
        self.disconnect().await;
        let result = DcsSupply::connect(port, baud_rate, timeout).await;
        match self.record("connecting", result) {
            Some(supply) => {
                self.supply = Some(supply);
                true
            }
            None => false,
        }
    }
}

impl<S: PowerSupply> DcsController<S> {
    /// Create a controller with nothing connected
    pub fn new() -> Self {
        Self {
            supply: None,
            last_error: None,
        }
    }

    /// Create a controller around an already connected supply
    pub fn with_supply(supply: S) -> Self {
        Self {
            supply: Some(supply),
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.supply.is_some()
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Return the supply to local control and drop the connection
    pub async fn disconnect(&mut self) {
        if let Some(mut supply) = self.supply.take() {
            let result = supply.disconnect().await;
            self.record("disconnecting", result);
            info!("Disconnected from {}", supply.model());
        }
    }

    /// Measure output voltage and current
    pub async fn measurements(&mut self) -> Option<Measurement> {
        let supply = self.connected()?;
        let result = supply.measure().await;
        self.record("reading measurements", result)
    }

    /// Program the voltage setpoint; true when the supply confirmed it
    pub async fn set_voltage(&mut self, volts: f64) -> bool {
        let Some(supply) = self.connected() else {
            return false;
        };
        let result = supply.set_output_voltage(volts).await;
        self.record("setting voltage", result).is_some()
    }

    /// Program the current limit; true when the supply confirmed it
    pub async fn set_current(&mut self, amps: f64) -> bool {
        let Some(supply) = self.connected() else {
            return false;
        };
        let result = supply.set_output_current(amps).await;
        self.record("setting current", result).is_some()
    }

    pub fn model(&self) -> Option<String> {
        self.supply.as_ref().map(|s| s.model().to_string())
    }

    pub fn serial_number(&self) -> Option<String> {
        self.supply.as_ref().map(|s| s.serial_number().to_string())
    }

    pub fn max_voltage(&self) -> Option<f64> {
        self.supply.as_ref().map(|s| s.max_voltage())
    }

    pub fn max_current(&self) -> Option<f64> {
        self.supply.as_ref().map(|s| s.max_current())
    }

    fn connected(&mut self) -> Option<&mut S> {
        if self.supply.is_none() {
            self.last_error = Some(SupplyError::NotConnected.to_string());
        }
        self.supply.as_mut()
    }

    /// Keep the outcome of a driver call as the last error, if it failed
    ///
    /// A lost connection also drops the supply.
    fn record<T>(&mut self, action: &str, result: Result<T, SupplyError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Error {}: {}", action, e);
                if e.is_connection_lost() {
                    self.supply = None;
                }
                self.last_error = Some(format!("Error {}: {}", action, e));
                None
            }
        }
    }
}

impl<S: PowerSupply> Default for DcsController<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcs_protocol::Identity;

    /// Supply whose every I/O call fails with the configured error
    struct Broken {
        closed: bool,
    }

    impl PowerSupply for Broken {
        async fn identify(&mut self) -> Result<Identity, SupplyError> {
            Err(self.error())
        }
        async fn output_voltage(&mut self) -> Result<f64, SupplyError> {
            Err(self.error())
        }
        async fn output_current(&mut self) -> Result<f64, SupplyError> {
            Err(self.error())
        }
        async fn set_output_voltage(&mut self, _volts: f64) -> Result<(), SupplyError> {
            Err(self.error())
        }
        async fn set_output_current(&mut self, _amps: f64) -> Result<(), SupplyError> {
            Err(self.error())
        }
        fn model(&self) -> &str {
            "DCS60-18E"
        }
        fn serial_number(&self) -> &str {
            "1"
        }
        fn max_voltage(&self) -> f64 {
            60.0
        }
        fn max_current(&self) -> f64 {
            18.0
        }
        async fn disconnect(&mut self) -> Result<(), SupplyError> {
            Ok(())
        }
    }

    impl Broken {
        fn error(&self) -> SupplyError {
            if self.closed {
                SupplyError::Closed
            } else {
                SupplyError::Timeout {
                    command: "MEAS:VOLT?".to_string(),
                    timeout_ms: 500,
                }
            }
        }
    }

    #[tokio::test]
    async fn test_disconnected_controller() {
        let mut controller: DcsController<Broken> = DcsController::new();
        assert!(!controller.is_connected());
        assert!(controller.measurements().await.is_none());
        assert!(!controller.set_voltage(1.0).await);
        assert_eq!(controller.model(), None);
        assert_eq!(controller.last_error(), Some("not connected"));
    }

    #[tokio::test]
    async fn test_errors_become_messages() {
        let mut controller = DcsController::with_supply(Broken { closed: false });

        assert!(controller.measurements().await.is_none());
        assert!(controller.last_error().unwrap().contains("MEAS:VOLT?"));
        assert!(!controller.set_current(1.0).await);
        assert!(controller.is_connected());
        assert_eq!(controller.max_voltage(), Some(60.0));
    }

    #[tokio::test]
    async fn test_closed_connection_drops_supply() {
        let mut controller = DcsController::with_supply(Broken { closed: true });
        assert!(controller.measurements().await.is_none());
        assert!(!controller.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_clears_supply() {
        let mut controller = DcsController::with_supply(Broken { closed: false });
        controller.disconnect().await;
        assert!(!controller.is_connected());
        assert_eq!(controller.serial_number(), None);
    }
}
