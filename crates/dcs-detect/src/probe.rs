//! Identification probing
//!
//! A probe opens one candidate port, sends `*IDN?`, reads a single response
//! line and decides whether a DCS supply answered. It never returns an
//! error: every failure is logged and reported as [`ProbeResult::NotFound`].

use std::io::Write;
use std::time::Duration;

use dcs_protocol::{decode_line, has_device_marker, EncodeCommand, ParseError, ScpiCommand};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::error::ProbeFailure;
use crate::transport::{read_line, LinkSettings, SystemOpener, TransportOpener};

/// Timeout for each probe during a scan
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_millis(250);

/// Result of probing a serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// No usable identification
    NotFound,
    /// A device answered with this identification line (trimmed)
    Found(String),
}

impl ProbeResult {
    /// Check if a device answered
    pub fn is_found(&self) -> bool {
        matches!(self, ProbeResult::Found(_))
    }

    /// The identification line, if found
    pub fn identification(&self) -> Option<&str> {
        match self {
            ProbeResult::Found(id) => Some(id),
            ProbeResult::NotFound => None,
        }
    }
}

/// How much of a response is needed to count as a DCS supply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentifyPolicy {
    /// Any non-empty response line
    #[default]
    AnyResponse,
    /// Response must contain `SORENSEN` or `DCS` (case-insensitive)
    RequireMarker,
}

impl IdentifyPolicy {
    /// Check whether a decoded identification line is accepted
    pub fn accepts(&self, identification: &str) -> bool {
        match self {
            IdentifyPolicy::AnyResponse => !identification.is_empty(),
            IdentifyPolicy::RequireMarker => has_device_marker(identification),
        }
    }

    /// Human-readable name for settings UI
    pub fn name(&self) -> &'static str {
        match self {
            IdentifyPolicy::AnyResponse => "Any response",
            IdentifyPolicy::RequireMarker => "Require SORENSEN/DCS",
        }
    }
}

/// Configuration for probing
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Baud rate used when probing through the [`Probe`] trait defaults
    pub baud_rate: u32,
    /// Timeout for each probe attempt
    pub timeout: Duration,
    /// Identification policy
    pub policy: IdentifyPolicy,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            baud_rate: dcs_protocol::DEFAULT_BAUD_RATE,
            timeout: DEFAULT_SCAN_TIMEOUT,
            policy: IdentifyPolicy::default(),
        }
    }
}

/// Anything that can probe a named port
///
/// Implemented by [`DeviceProber`] and by plain closures, which lets the
/// scan orchestrator run against scripted probes in tests.
pub trait Probe {
    /// Probe `port` and classify the response
    fn probe(&self, port: &str, baud_rate: u32, timeout: Duration) -> ProbeResult;
}

impl<F> Probe for F
where
    F: Fn(&str, u32, Duration) -> ProbeResult,
{
    fn probe(&self, port: &str, baud_rate: u32, timeout: Duration) -> ProbeResult {
        self(port, baud_rate, timeout)
    }
}

/// DCS identification prober
pub struct DeviceProber<O = SystemOpener> {
    opener: O,
    config: ProbeConfig,
}

impl DeviceProber<SystemOpener> {
    /// Create a new prober with default configuration
    pub fn new() -> Self {
        Self::with_config(ProbeConfig::default())
    }

    /// Create a prober with custom configuration
    pub fn with_config(config: ProbeConfig) -> Self {
        Self {
            opener: SystemOpener,
            config,
        }
    }
}

impl Default for DeviceProber<SystemOpener> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: TransportOpener> DeviceProber<O> {
    /// Create a prober over a custom transport opener
    pub fn with_opener(opener: O, config: ProbeConfig) -> Self {
        Self { opener, config }
    }

    /// Current configuration
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe a port with the configured baud rate and timeout
    pub fn probe_default(&self, port: &str) -> ProbeResult {
        self.probe(port, self.config.baud_rate, self.config.timeout)
    }

    /// Run one open-write-read-close cycle and classify the outcome
    ///
    /// The transport is dropped (and the device closed) before this returns
    /// on every path.
    pub fn identify(
        &self,
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<String, ProbeFailure> {
        let settings = LinkSettings { baud_rate, timeout };

        let mut transport = self.opener.open(port, settings).map_err(|e| {
            debug!("{}", e);
            ProbeFailure::TransportUnavailable
        })?;

        let command = ScpiCommand::Identify.encode();
        trace!("Sending {:?} to {}", String::from_utf8_lossy(&command), port);
        transport
            .write_all(&command)
            .and_then(|_| transport.flush())
            .map_err(|e| {
                debug!("Write to {} failed: {}", port, e);
                ProbeFailure::TransportUnavailable
            })?;

        let line = read_line(&mut transport, timeout).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => ProbeFailure::NoResponse,
            _ => {
                debug!("Read from {} failed: {}", port, e);
                ProbeFailure::TransportUnavailable
            }
        })?;

        drop(transport);

        let identification = decode_line(&line).map_err(|e| match e {
            ParseError::Empty => ProbeFailure::NoResponse,
            _ => ProbeFailure::MalformedResponse,
        })?;

        if !self.config.policy.accepts(&identification) {
            debug!("{} answered {:?}, not a DCS supply", port, identification);
            return Err(ProbeFailure::NotIdentified);
        }

        Ok(identification)
    }
}

impl<O: TransportOpener> Probe for DeviceProber<O> {
    fn probe(&self, port: &str, baud_rate: u32, timeout: Duration) -> ProbeResult {
        debug!("Probing {} at {} baud", port, baud_rate);
        match self.identify(port, baud_rate, timeout) {
            Ok(identification) => {
                info!("Found {} on {}", identification, port);
                ProbeResult::Found(identification)
            }
            Err(failure) => {
                debug!("No device on {}: {}", port, failure);
                ProbeResult::NotFound
            }
        }
    }
}

/// Probe a specific port at a given baud rate
///
/// This is a convenience function for manual probing from the UI.
pub fn probe_port(port_name: &str, baud_rate: u32) -> ProbeResult {
    DeviceProber::new().probe(port_name, baud_rate, DEFAULT_SCAN_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectError;
    use crate::transport::SerialTransport;
    use std::cell::RefCell;
    use std::io::{self, Read};
    use std::rc::Rc;

    /// What a scripted transport does when opened
    #[derive(Clone)]
    enum Script {
        OpenFails,
        WriteFails,
        Respond(Vec<u8>),
        Silent,
        ReadFails,
    }

    /// Shared record of what the prober did with the transport
    #[derive(Default)]
    struct Journal {
        opened: usize,
        closed: usize,
        written: Vec<u8>,
        settings: Option<LinkSettings>,
    }

    struct MockOpener {
        script: Script,
        journal: Rc<RefCell<Journal>>,
    }

    struct MockTransport {
        script: Script,
        journal: Rc<RefCell<Journal>>,
        served: bool,
    }

    impl TransportOpener for MockOpener {
        type Transport = MockTransport;

        fn open(&self, port: &str, settings: LinkSettings) -> Result<MockTransport, DetectError> {
            if let Script::OpenFails = self.script {
                return Err(DetectError::OpenFailed {
                    port: port.to_string(),
                    reason: "Port not found".to_string(),
                });
            }
            let mut journal = self.journal.borrow_mut();
            journal.opened += 1;
            journal.settings = Some(settings);
            Ok(MockTransport {
                script: self.script.clone(),
                journal: self.journal.clone(),
                served: false,
            })
        }
    }

    impl SerialTransport for MockTransport {
        fn limit_read(&mut self, _remaining: Duration) -> io::Result<()> {
            Ok(())
        }
    }

    impl Read for MockTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match &self.script {
                Script::Respond(data) if !self.served => {
                    self.served = true;
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                Script::ReadFails => Err(io::ErrorKind::BrokenPipe.into()),
                _ => Err(io::ErrorKind::TimedOut.into()),
            }
        }
    }

    impl Write for MockTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Script::WriteFails = self.script {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.journal.borrow_mut().written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for MockTransport {
        fn drop(&mut self) {
            self.journal.borrow_mut().closed += 1;
        }
    }

    fn prober(script: Script, policy: IdentifyPolicy) -> (DeviceProber<MockOpener>, Rc<RefCell<Journal>>) {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let opener = MockOpener {
            script,
            journal: journal.clone(),
        };
        let config = ProbeConfig {
            policy,
            ..ProbeConfig::default()
        };
        (DeviceProber::with_opener(opener, config), journal)
    }

    fn run(script: Script) -> (ProbeResult, Rc<RefCell<Journal>>) {
        let (p, journal) = prober(script, IdentifyPolicy::AnyResponse);
        (p.probe("COM3", 19200, Duration::from_millis(250)), journal)
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.policy, IdentifyPolicy::AnyResponse);
    }

    #[test]
    fn test_dcs_device_found() {
        let (result, journal) = run(Script::Respond(b"SORENSEN,DCS60-18E,123456,1.0\r\n".to_vec()));

        assert_eq!(result, ProbeResult::Found("SORENSEN,DCS60-18E,123456,1.0".to_string()));
        let journal = journal.borrow();
        assert_eq!(journal.opened, 1);
        assert_eq!(journal.closed, 1);
        assert_eq!(journal.written, b"*IDN?\r");
        assert_eq!(
            journal.settings,
            Some(LinkSettings {
                baud_rate: 19200,
                timeout: Duration::from_millis(250)
            })
        );
    }

    #[test]
    fn test_lowercase_response_kept_verbatim() {
        let (result, _) = run(Script::Respond(b"sorensen,dcs60-18e,123456,1.0\r\n".to_vec()));
        assert_eq!(result.identification(), Some("sorensen,dcs60-18e,123456,1.0"));
    }

    #[test]
    fn test_open_failure_is_not_found() {
        let (result, journal) = run(Script::OpenFails);
        assert_eq!(result, ProbeResult::NotFound);
        assert_eq!(journal.borrow().opened, 0);
    }

    #[test]
    fn test_write_failure_closes_port() {
        let (result, journal) = run(Script::WriteFails);
        assert_eq!(result, ProbeResult::NotFound);
        assert_eq!(journal.borrow().closed, 1);
    }

    #[test]
    fn test_read_timeout_closes_port() {
        let (result, journal) = run(Script::Silent);
        assert_eq!(result, ProbeResult::NotFound);
        assert_eq!(journal.borrow().closed, 1);
    }

    #[test]
    fn test_read_error_is_not_found() {
        let (result, journal) = run(Script::ReadFails);
        assert_eq!(result, ProbeResult::NotFound);
        assert_eq!(journal.borrow().closed, 1);
    }

    #[test]
    fn test_empty_response_is_not_found() {
        let (result, _) = run(Script::Respond(b"\r\n".to_vec()));
        assert_eq!(result, ProbeResult::NotFound);
    }

    #[test]
    fn test_non_utf8_response_is_not_found() {
        let (result, journal) = run(Script::Respond(vec![0xFF, 0xFE, 0x80, b'\n']));
        assert_eq!(result, ProbeResult::NotFound);
        assert_eq!(journal.borrow().closed, 1);
    }

    #[test]
    fn test_failure_classification() {
        let cases = [
            (Script::OpenFails, ProbeFailure::TransportUnavailable),
            (Script::WriteFails, ProbeFailure::TransportUnavailable),
            (Script::ReadFails, ProbeFailure::TransportUnavailable),
            (Script::Silent, ProbeFailure::NoResponse),
            (Script::Respond(vec![0xC3, 0x28, b'\n']), ProbeFailure::MalformedResponse),
        ];

        for (script, expected) in cases {
            let (p, _) = prober(script, IdentifyPolicy::AnyResponse);
            assert_eq!(
                p.identify("COM3", 19200, Duration::from_millis(250)),
                Err(expected)
            );
        }
    }

    #[test]
    fn test_any_response_policy_accepts_other_devices() {
        let (result, _) = run(Script::Respond(b"Some Other Device\r\n".to_vec()));
        assert_eq!(result, ProbeResult::Found("Some Other Device".to_string()));
    }

    #[test]
    fn test_marker_policy_rejects_other_devices() {
        let (p, journal) = prober(
            Script::Respond(b"Some Other Device\r\n".to_vec()),
            IdentifyPolicy::RequireMarker,
        );
        assert_eq!(
            p.identify("COM3", 19200, Duration::from_millis(250)),
            Err(ProbeFailure::NotIdentified)
        );
        assert_eq!(journal.borrow().closed, 1);
    }

    #[test]
    fn test_marker_policy_accepts_dcs() {
        let (p, _) = prober(
            Script::Respond(b"sorensen,dcs60-18e,123456,1.0\r\n".to_vec()),
            IdentifyPolicy::RequireMarker,
        );
        assert!(p.probe_default("COM3").is_found());
    }
}
