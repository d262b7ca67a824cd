//! Instrument driver
//!
//! [`PowerSupply`] is the interface the rest of the application programs
//! against. [`DcsSupply`] implements it over any async byte stream: a real
//! serial port in production, an in-memory duplex connected to a simulated
//! supply in tests.

use std::future::Future;
use std::time::Duration;

use dcs_protocol::{
    decode_line, parse_reading, EncodeCommand, Identity, LineCodec, ProtocolCodec, ProtocolError,
    Ratings, ScpiCommand,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};
use tracing::{debug, info, trace};

use crate::error::SupplyError;
use crate::measurement::{Measurement, Quantity};

/// Time allowed for each query once connected
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Largest difference between a programmed setpoint and its read-back
/// (setpoints are sent with 3 decimals)
const SETPOINT_TOLERANCE: f64 = 0.001;

/// A programmable DC power supply
///
/// Async methods return `Send` futures so that a supply can be owned by a
/// spawned task.
pub trait PowerSupply: Send {
    /// Query and cache the identification
    fn identify(&mut self) -> impl Future<Output = Result<Identity, SupplyError>> + Send;

    /// Measured output voltage in volts
    fn output_voltage(&mut self) -> impl Future<Output = Result<f64, SupplyError>> + Send;

    /// Measured output current in amperes
    fn output_current(&mut self) -> impl Future<Output = Result<f64, SupplyError>> + Send;

    /// Program the voltage setpoint
    fn set_output_voltage(
        &mut self,
        volts: f64,
    ) -> impl Future<Output = Result<(), SupplyError>> + Send;

    /// Program the current limit
    fn set_output_current(
        &mut self,
        amps: f64,
    ) -> impl Future<Output = Result<(), SupplyError>> + Send;

    /// Model designation from the last identification
    fn model(&self) -> &str;

    /// Serial number from the last identification
    fn serial_number(&self) -> &str;

    /// Largest programmable voltage
    fn max_voltage(&self) -> f64;

    /// Largest programmable current
    fn max_current(&self) -> f64;

    /// Return the front panel to local control and close the connection
    fn disconnect(&mut self) -> impl Future<Output = Result<(), SupplyError>> + Send;

    /// Measure voltage then current
    fn measure(&mut self) -> impl Future<Output = Result<Measurement, SupplyError>> + Send {
        async move {
            let voltage = self.output_voltage().await?;
            let current = self.output_current().await?;
            Ok(Measurement::now(voltage, current))
        }
    }
}

/// Sorensen DCS supply speaking SCPI over an async stream
pub struct DcsSupply<T> {
    io: T,
    codec: LineCodec,
    timeout: Duration,
    identity: Identity,
    ratings: Ratings,
    /// Replies still owed by queries that timed out
    late_replies: usize,
}

impl DcsSupply<SerialStream> {
    /// Open a serial port and run the connection handshake
    pub async fn connect(port: &str, baud_rate: u32, timeout: Duration) -> Result<Self, SupplyError> {
        let open_failed = |e: tokio_serial::Error| SupplyError::OpenFailed {
            port: port.to_string(),
            reason: e.to_string(),
        };

        let mut stream = tokio_serial::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open_native_async()
            .map_err(open_failed)?;

        stream.write_request_to_send(true).map_err(open_failed)?;
        stream.write_data_terminal_ready(true).map_err(open_failed)?;

        info!("Opened {} at {} baud", port, baud_rate);
        Self::open(stream, timeout).await
    }
}

impl<T> DcsSupply<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Run the connection handshake over an already open stream
    ///
    /// Clears the status queue, identifies the supply and works out its
    /// ratings, from the model designation when it follows the DCS pattern,
    /// otherwise by querying the programmable maxima.
    pub async fn open(io: T, timeout: Duration) -> Result<Self, SupplyError> {
        let mut supply = Self {
            io,
            codec: LineCodec::new(),
            timeout,
            identity: Identity::parse(""),
            ratings: Ratings {
                max_voltage: 0.0,
                max_current: 0.0,
            },
            late_replies: 0,
        };

        supply.send(&ScpiCommand::ClearStatus).await?;
        let identity = supply.identify().await?;

        supply.ratings = match identity.ratings() {
            Some(ratings) => ratings,
            None => {
                debug!("Model {:?} has no rating, querying limits", identity.model);
                supply.query_ratings().await?
            }
        };

        info!(
            "Connected to {} (serial {}), {} V / {} A",
            identity.label(),
            identity.serial_number,
            supply.ratings.max_voltage,
            supply.ratings.max_current
        );
        Ok(supply)
    }

    /// Identification from the last `*IDN?`
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn ratings(&self) -> Ratings {
        self.ratings
    }

    /// Write a command without waiting for a response
    async fn send(&mut self, command: &ScpiCommand) -> Result<(), SupplyError> {
        trace!("Sending {}", command.text());
        self.io.write_all(&command.encode()).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Write a query and read its response line within the timeout
    async fn query(&mut self, command: &ScpiCommand) -> Result<String, SupplyError> {
        self.discard_late_replies().await;
        self.codec.clear();
        self.send(command).await?;

        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.read_response()).await {
            Ok(result) => result,
            Err(_) => {
                self.late_replies += 1;
                Err(SupplyError::Timeout {
                    command: command.text(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Read and drop the replies of timed-out queries
    ///
    /// Each owed reply gets one timeout period to arrive. If one never
    /// shows up the supply dropped it and nothing more is owed.
    async fn discard_late_replies(&mut self) {
        while self.late_replies > 0 {
            match tokio::time::timeout(self.timeout, self.read_response()).await {
                Ok(Ok(line)) => {
                    debug!("Discarding late reply {:?}", line);
                    self.late_replies -= 1;
                }
                Ok(Err(SupplyError::Parse(e))) => {
                    debug!("Discarding unreadable late reply: {}", e);
                    self.late_replies -= 1;
                }
                Ok(Err(_)) | Err(_) => {
                    self.late_replies = 0;
                }
            }
        }
    }

    async fn read_response(&mut self) -> Result<String, SupplyError> {
        let mut buf = [0u8; 128];
        loop {
            if let Some(frame) = self.codec.next_frame() {
                let line = decode_line(&frame)?;
                trace!("Received {:?}", line);
                return Ok(line);
            }

            let n = self.io.read(&mut buf).await?;
            if n == 0 {
                return Err(SupplyError::Closed);
            }
            self.codec.push_bytes(&buf[..n]);
        }
    }

    async fn query_value(&mut self, command: &ScpiCommand) -> Result<f64, SupplyError> {
        let line = self.query(command).await?;
        Ok(parse_reading(&line)?)
    }

    async fn query_ratings(&mut self) -> Result<Ratings, SupplyError> {
        let max_voltage = self.query_value(&ScpiCommand::MaxVoltage).await?;
        let max_current = self.query_value(&ScpiCommand::MaxCurrent).await?;

        if max_voltage <= 0.0 || max_current <= 0.0 {
            return Err(ProtocolError::InvalidResponse(format!(
                "limits {} V / {} A",
                max_voltage, max_current
            ))
            .into());
        }
        Ok(Ratings {
            max_voltage,
            max_current,
        })
    }

    /// Range-check, program and verify a setpoint
    async fn program(&mut self, quantity: Quantity, value: f64) -> Result<(), SupplyError> {
        let (max, set, readback) = match quantity {
            Quantity::Voltage => (
                self.ratings.max_voltage,
                ScpiCommand::SetVoltage(value),
                ScpiCommand::VoltageSetpoint,
            ),
            Quantity::Current => (
                self.ratings.max_current,
                ScpiCommand::SetCurrent(value),
                ScpiCommand::CurrentSetpoint,
            ),
        };

        if !value.is_finite() || !(0.0..=max).contains(&value) {
            return Err(SupplyError::OutOfRange {
                quantity,
                value,
                max,
            });
        }

        self.send(&set).await?;
        let actual = self.query_value(&readback).await?;
        if (actual - value).abs() > SETPOINT_TOLERANCE {
            return Err(SupplyError::VerifyFailed {
                quantity,
                requested: value,
                actual,
            });
        }

        debug!("{} set to {:.3} {}", quantity, value, quantity.unit());
        Ok(())
    }
}

impl<T> PowerSupply for DcsSupply<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn identify(&mut self) -> Result<Identity, SupplyError> {
        let line = self.query(&ScpiCommand::Identify).await?;
        self.identity = Identity::parse(&line);
        Ok(self.identity.clone())
    }

    async fn output_voltage(&mut self) -> Result<f64, SupplyError> {
        self.query_value(&ScpiCommand::MeasureVoltage).await
    }

    async fn output_current(&mut self) -> Result<f64, SupplyError> {
        self.query_value(&ScpiCommand::MeasureCurrent).await
    }

    async fn set_output_voltage(&mut self, volts: f64) -> Result<(), SupplyError> {
        self.program(Quantity::Voltage, volts).await
    }

    async fn set_output_current(&mut self, amps: f64) -> Result<(), SupplyError> {
        self.program(Quantity::Current, amps).await
    }

    fn model(&self) -> &str {
        &self.identity.model
    }

    fn serial_number(&self) -> &str {
        &self.identity.serial_number
    }

    fn max_voltage(&self) -> f64 {
        self.ratings.max_voltage
    }

    fn max_current(&self) -> f64 {
        self.ratings.max_current
    }

    async fn disconnect(&mut self) -> Result<(), SupplyError> {
        self.send(&ScpiCommand::ReturnToLocal).await?;
        self.io.shutdown().await?;
        info!("Returned {} to local control", self.identity.label());
        Ok(())
    }
}
