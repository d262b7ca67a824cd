//! Error types for driving a DCS supply

use std::io;

use dcs_protocol::{ParseError, ProtocolError};
use thiserror::Error;

use crate::measurement::Quantity;

/// Errors that can occur while talking to a connected supply
#[derive(Debug, Error)]
pub enum SupplyError {
    /// Failed to open the serial port
    #[error("failed to open {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// I/O error on the connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Query got no complete response in time
    #[error("no response to {command} within {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    /// Response could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Protocol-level failure
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Setpoint outside what the supply can program
    #[error("{quantity} {value} outside 0..={max}")]
    OutOfRange {
        quantity: Quantity,
        value: f64,
        max: f64,
    },

    /// Supply did not take the programmed setpoint
    #[error("{quantity} set to {requested} but supply reports {actual}")]
    VerifyFailed {
        quantity: Quantity,
        requested: f64,
        actual: f64,
    },

    /// No supply connected
    #[error("not connected")]
    NotConnected,

    /// Connection closed by the other end
    #[error("connection closed")]
    Closed,
}

impl SupplyError {
    /// Whether the link to the supply is gone for good
    pub fn is_connection_lost(&self) -> bool {
        match self {
            SupplyError::Closed => true,
            SupplyError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Errors from the CSV measurement log
#[derive(Debug, Error)]
pub enum LogError {
    /// Could not create, write or flush the log file
    #[error("log file error: {0}")]
    Io(#[from] io::Error),

    /// Logging attempted before `open` or after `close`
    #[error("log file is not open")]
    NotOpen,
}
