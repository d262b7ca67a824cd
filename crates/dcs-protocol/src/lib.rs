//! Sorensen DCS Protocol Library
//!
//! This crate provides encoding and parsing for the plain-text SCPI dialect
//! spoken by Sorensen DCS-series programmable DC power supplies over RS-232.
//!
//! # Framing
//!
//! - Commands are ASCII terminated by `\r`
//! - Responses are ASCII lines terminated by `\n` (usually `\r\n`)
//! - The serial link runs at a fixed rate (19200 baud, 8-N-1)
//!
//! # Example
//!
//! ```rust
//! use dcs_protocol::{EncodeCommand, Identity, LineCodec, ProtocolCodec, ScpiCommand};
//!
//! assert_eq!(ScpiCommand::Identify.encode(), b"*IDN?\r");
//!
//! let mut codec = LineCodec::new();
//! codec.push_bytes(b"SORENSEN,DCS60-18E,123456,1.0\r\n");
//!
//! let line = codec.next_frame().unwrap();
//! let identity = Identity::parse(&dcs_protocol::decode_line(&line).unwrap());
//! assert_eq!(identity.model, "DCS60-18E");
//! ```

pub mod command;
pub mod error;
pub mod identity;

pub use command::ScpiCommand;
pub use error::{ParseError, ProtocolError};
pub use identity::{has_device_marker, Identity, Ratings, DEVICE_MARKERS};

/// Default serial rate of DCS supplies
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Byte terminating every command sent to the instrument
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// Byte terminating every response line from the instrument
pub const RESPONSE_TERMINATOR: u8 = b'\n';

/// Maximum line length (reasonable limit to prevent buffer overflow)
const MAX_LINE_LEN: usize = 256;

/// Trait for codecs that split an incoming byte stream into frames
pub trait ProtocolCodec {
    /// The frame type produced by this codec
    type Frame;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete frame from the buffer
    fn next_frame(&mut self) -> Option<Self::Frame>;

    /// Clear the internal buffer
    fn clear(&mut self);
}

/// Encode a command to protocol bytes
pub trait EncodeCommand {
    /// Encode this command to bytes, including the terminator
    fn encode(&self) -> Vec<u8>;
}

/// Streaming line codec
///
/// Splits on either `\r` or `\n` and drops empty lines, so it handles
/// `\r`-terminated commands as well as `\r\n`-terminated responses.
/// Frames are returned as raw bytes without terminators; use
/// [`decode_line`] to turn them into text.
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new line codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Number of buffered bytes not yet returned as a frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec for LineCodec {
    type Frame = Vec<u8>;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Prevent buffer overflow from a peer that never terminates a line
        if self.buffer.len() > MAX_LINE_LEN * 4 {
            let start = self.buffer.len() - MAX_LINE_LEN;
            tracing::warn!("Line buffer overflow, discarding {} bytes", start);
            self.buffer.drain(..start);
        }
    }

    fn next_frame(&mut self) -> Option<Self::Frame> {
        loop {
            let term_pos = self.buffer.iter().position(|&b| b == b'\r' || b == b'\n')?;
            let mut line: Vec<u8> = self.buffer.drain(..=term_pos).collect();
            line.pop();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Decode a response line into trimmed text
///
/// Fails on invalid UTF-8 and on lines that are empty once terminators and
/// surrounding whitespace are removed.
pub fn decode_line(bytes: &[u8]) -> Result<String, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(trimmed.to_string())
}

/// Parse a numeric response such as `12.003` or `12.003V`
pub fn parse_reading(line: &str) -> Result<f64, ParseError> {
    let trimmed = line.trim();
    let number = trimmed.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    number
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber(trimmed.to_string()))
}
