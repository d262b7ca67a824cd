//! Error types for DCS protocol parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Line contained bytes that are not valid UTF-8
    #[error("response is not valid UTF-8")]
    NotUtf8,

    /// Line was empty after trimming terminators and whitespace
    #[error("empty response")]
    Empty,

    /// Numeric field could not be parsed
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// Model designation does not follow the DCS<volts>-<amps> pattern
    #[error("invalid model designation: {0}")]
    InvalidModel(String),

    /// Unknown or unsupported command
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Invalid response from the instrument
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
