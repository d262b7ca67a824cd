//! Scan orchestration
//!
//! A scan enumerates candidate ports and probes them one at a time, in
//! enumeration order, keeping only the ports that answered. Probes never
//! overlap: each one owns its port for the duration of the exchange.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dcs_protocol::Identity;
use tracing::{debug, info};

use crate::probe::{DeviceProber, Probe, ProbeConfig, ProbeResult};
use crate::scanner::{PortScanner, ScannerConfig};

/// Source of candidate port names
pub trait PortSource {
    /// Current candidates, without duplicates
    fn list_ports(&self) -> Vec<String>;
}

impl PortSource for PortScanner {
    fn list_ports(&self) -> Vec<String> {
        self.enumerate_ports().into_iter().map(|p| p.port).collect()
    }
}

impl PortSource for Vec<String> {
    fn list_ports(&self) -> Vec<String> {
        self.clone()
    }
}

/// A port that answered the identification query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Port name
    pub port: String,
    /// Trimmed identification line
    pub identification: String,
}

impl DeviceRecord {
    /// Parsed view of the identification line
    pub fn identity(&self) -> Identity {
        Identity::parse(&self.identification)
    }

    /// Label for pickers ("/dev/ttyUSB0: SORENSEN DCS60-18E")
    pub fn display_label(&self) -> String {
        format!("{}: {}", self.port, self.identity().label())
    }
}

/// Cooperative cancellation flag for an in-flight scan
///
/// Checked between probes only; a probe already running finishes within its
/// own timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress notifications emitted during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanProgress {
    /// Enumeration finished
    Started { total: usize },
    /// About to probe a port (index is zero-based)
    Probing {
        index: usize,
        total: usize,
        port: String,
    },
    /// A device answered
    Found(DeviceRecord),
}

/// Outcome of a scan pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Devices found, in probe order
    pub devices: Vec<DeviceRecord>,
    /// Number of probes performed
    pub probed: usize,
    /// Whether the scan stopped early on request
    pub cancelled: bool,
}

/// Enumerate-then-probe scan driver
pub struct ScanOrchestrator<S = PortScanner, P = DeviceProber> {
    source: S,
    prober: P,
    timeout: Duration,
}

impl ScanOrchestrator<PortScanner, DeviceProber> {
    /// Create an orchestrator over real hardware
    pub fn new(scanner: ScannerConfig, probe: ProbeConfig) -> Self {
        let timeout = probe.timeout;
        Self {
            source: PortScanner::with_config(scanner),
            prober: DeviceProber::with_config(probe),
            timeout,
        }
    }
}

impl<S: PortSource, P: Probe> ScanOrchestrator<S, P> {
    /// Create an orchestrator from explicit parts
    pub fn with_parts(source: S, prober: P, timeout: Duration) -> Self {
        Self {
            source,
            prober,
            timeout,
        }
    }

    /// Per-probe timeout used by this orchestrator
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Scan every candidate and return the ports that answered
    pub fn scan(&self, baud_rate: u32) -> Vec<DeviceRecord> {
        self.scan_with(baud_rate, &CancelToken::new(), |_| {})
            .devices
    }

    /// Scan with cancellation and progress reporting
    ///
    /// Returns whatever was found before cancellation, if any.
    pub fn scan_with<F>(&self, baud_rate: u32, cancel: &CancelToken, mut on_progress: F) -> ScanReport
    where
        F: FnMut(ScanProgress),
    {
        let mut report = ScanReport::default();

        if cancel.is_cancelled() {
            report.cancelled = true;
            return report;
        }

        let candidates = self.source.list_ports();
        let total = candidates.len();
        info!("Scanning {} port(s) at {} baud", total, baud_rate);
        on_progress(ScanProgress::Started { total });

        for (index, port) in candidates.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Scan cancelled after {} of {} port(s)", index, total);
                report.cancelled = true;
                break;
            }

            on_progress(ScanProgress::Probing {
                index,
                total,
                port: port.clone(),
            });

            let result = self.prober.probe(&port, baud_rate, self.timeout);
            report.probed += 1;

            match result {
                ProbeResult::Found(identification) => {
                    let record = DeviceRecord {
                        port,
                        identification,
                    };
                    on_progress(ScanProgress::Found(record.clone()));
                    report.devices.push(record);
                }
                ProbeResult::NotFound => debug!("Nothing on {}", port),
            }
        }

        info!(
            "Scan finished: {} device(s) on {} probed port(s)",
            report.devices.len(),
            report.probed
        );
        report
    }
}

/// Scan all ports with default settings
///
/// This is a convenience function for one-shot discovery.
pub fn scan_for_devices(baud_rate: u32) -> Vec<DeviceRecord> {
    ScanOrchestrator::new(ScannerConfig::default(), ProbeConfig::default()).scan(baud_rate)
}
