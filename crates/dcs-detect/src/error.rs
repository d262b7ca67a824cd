//! Error types for DCS detection

use thiserror::Error;

/// Errors that can occur while opening a serial port during detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to open serial port
    #[error("failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },
}

/// Why a probe did not identify a device
///
/// Every variant collapses to `ProbeResult::NotFound` at the prober
/// boundary; the distinction only shows up in logs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    /// Port busy, missing, or failed during write/read
    #[error("transport unavailable")]
    TransportUnavailable,

    /// Timed out with zero bytes read
    #[error("no response")]
    NoResponse,

    /// Response bytes could not be decoded as text
    #[error("malformed response")]
    MalformedResponse,

    /// Decoded response lacks the device marker (strict policy only)
    #[error("response does not identify a DCS supply")]
    NotIdentified,
}
