//! Serial transport used by the prober
//!
//! The prober never touches the `serialport` crate directly. It asks a
//! [`TransportOpener`] for a byte stream, so tests can substitute a scripted
//! transport and production code opens real hardware through
//! [`SystemOpener`].

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::trace;

use crate::error::DetectError;

/// Longest identification line accepted before giving up on a terminator
const MAX_LINE_LEN: usize = 256;

/// Fixed link settings for one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Baud rate (8 data bits, no parity, 1 stop bit)
    pub baud_rate: u32,
    /// Read timeout; bounds the whole line read, not each byte
    pub timeout: Duration,
}

/// Byte stream to an open serial device
pub trait SerialTransport: Read + Write {
    /// Bound the next read to `remaining`
    fn limit_read(&mut self, remaining: Duration) -> io::Result<()>;
}

impl SerialTransport for Box<dyn SerialPort> {
    fn limit_read(&mut self, remaining: Duration) -> io::Result<()> {
        self.set_timeout(remaining).map_err(io::Error::from)
    }
}

/// Opens a byte stream to a named serial device
pub trait TransportOpener {
    /// The open transport; dropping it closes the device
    type Transport: SerialTransport;

    /// Open `port` 8-N-1 with RTS and DTR asserted
    fn open(&self, port: &str, settings: LinkSettings) -> Result<Self::Transport, DetectError>;
}

/// Opens real serial devices through the `serialport` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl TransportOpener for SystemOpener {
    type Transport = Box<dyn SerialPort>;

    fn open(&self, port: &str, settings: LinkSettings) -> Result<Self::Transport, DetectError> {
        let open_failed = |e: serialport::Error| DetectError::OpenFailed {
            port: port.to_string(),
            reason: e.to_string(),
        };

        let mut stream = serialport::new(port, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.timeout)
            .open()
            .map_err(open_failed)?;

        // Some DCS interface boards stay silent until both lines are asserted
        stream.write_request_to_send(true).map_err(open_failed)?;
        stream.write_data_terminal_ready(true).map_err(open_failed)?;

        Ok(stream)
    }
}

/// Read bytes up to and including the first `\n`
///
/// The read is bounded by `timeout` overall: every read is limited to the
/// time left before the deadline. A timeout after some bytes have arrived
/// returns what was read; a timeout with nothing read returns
/// `ErrorKind::TimedOut`.
pub fn read_line<R: SerialTransport + ?Sized>(
    reader: &mut R,
    timeout: Duration,
) -> io::Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut line = Vec::with_capacity(64);
    let mut buf = [0u8; 64];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        reader.limit_read(remaining)?;

        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let chunk = &buf[..n];
                trace!("Read {} bytes: {:?}", n, String::from_utf8_lossy(chunk));
                if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
                    line.extend_from_slice(&chunk[..=pos]);
                    break;
                }
                line.extend_from_slice(chunk);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                break
            }
            Err(e) => return Err(e),
        }

        if line.len() >= MAX_LINE_LEN {
            break;
        }
    }

    if line.is_empty() {
        return Err(io::Error::new(io::ErrorKind::TimedOut, "no response"));
    }
    Ok(line)
}
