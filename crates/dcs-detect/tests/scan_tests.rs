//! Integration tests for DCS discovery
//!
//! These tests drive the public API end to end with scripted port lists and
//! probes, without any serial hardware attached.

use std::cell::RefCell;
use std::time::Duration;

use dcs_detect::{
    CancelToken, Platform, PortFilter, PortScanner, ProbeResult, ScanOrchestrator, ScanProgress,
    ScannerConfig, SerialPortInfo,
};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub const SCAN_TIMEOUT: Duration = Duration::from_millis(250);

    pub fn port_list(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    /// Probe that answers on the listed ports with a DCS identification
    pub fn answering_on(
        ports: &'static [&'static str],
    ) -> impl Fn(&str, u32, Duration) -> ProbeResult {
        move |port: &str, _baud: u32, _timeout: Duration| {
            if ports.iter().any(|p| *p == port) {
                ProbeResult::Found(format!("SORENSEN,DCS60-18E,{},1.0", port.len()))
            } else {
                ProbeResult::NotFound
            }
        }
    }
}

use helpers::*;

#[test]
fn test_scan_report_lists_devices_in_port_order() {
    let scan = ScanOrchestrator::with_parts(
        port_list(&["/dev/ttyS0", "/dev/ttyUSB0", "/dev/ttyUSB1"]),
        answering_on(&["/dev/ttyUSB0", "/dev/ttyUSB1"]),
        SCAN_TIMEOUT,
    );

    let report = scan.scan_with(19200, &CancelToken::new(), |_| {});

    assert!(!report.cancelled);
    assert_eq!(report.probed, 3);
    let ports: Vec<_> = report.devices.iter().map(|d| d.port.as_str()).collect();
    assert_eq!(ports, ["/dev/ttyUSB0", "/dev/ttyUSB1"]);
    assert_eq!(report.devices[0].identity().manufacturer, "SORENSEN");
}

#[test]
fn test_no_devices_yields_empty_scan() {
    let scan = ScanOrchestrator::with_parts(
        port_list(&["COM1", "COM2"]),
        answering_on(&[]),
        SCAN_TIMEOUT,
    );
    assert!(scan.scan(19200).is_empty());
}

#[test]
fn test_cancel_from_progress_callback() {
    let scan = ScanOrchestrator::with_parts(
        port_list(&["COM1", "COM2", "COM3"]),
        answering_on(&["COM1", "COM2", "COM3"]),
        SCAN_TIMEOUT,
    );
    let cancel = CancelToken::new();
    let probed = RefCell::new(Vec::new());

    let report = scan.scan_with(19200, &cancel, |event| {
        if let ScanProgress::Probing { index, port, .. } = event {
            probed.borrow_mut().push(port);
            if index == 1 {
                cancel.cancel();
            }
        }
    });

    // The probe announced just before cancellation still runs
    assert!(report.cancelled);
    assert_eq!(report.probed, 2);
    assert_eq!(*probed.borrow(), ["COM1", "COM2"]);
}

#[test]
fn test_filtered_scanner_as_port_source() {
    let scanner = PortScanner::with_config(ScannerConfig {
        filter: PortFilter::OsConvention,
        platform: Platform::Windows,
    });
    let ports = scanner.select(vec![
        SerialPortInfo::named("LPT1"),
        SerialPortInfo::named("COM4"),
    ]);
    let names: Vec<String> = ports.into_iter().map(|p| p.port).collect();

    let scan = ScanOrchestrator::with_parts(names, answering_on(&["COM4"]), SCAN_TIMEOUT);
    let devices = scan.scan(19200);

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].port, "COM4");
}

// ============================================================================
// Property Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    fn port_name() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u8..8).prop_map(|n| format!("/dev/ttyUSB{}", n)),
            (0u8..8).prop_map(|n| format!("/dev/ttyS{}", n)),
            (1u8..16).prop_map(|n| format!("COM{}", n)),
            "[a-z]{1,6}".prop_map(|s| format!("/dev/{}", s)),
        ]
    }

    proptest! {
        #[test]
        fn select_never_yields_duplicates(names in prop::collection::vec(port_name(), 0..24)) {
            let scanner = PortScanner::with_config(ScannerConfig {
                filter: PortFilter::All,
                platform: Platform::Linux,
            });
            let ports = scanner.select(names.iter().map(SerialPortInfo::named).collect());

            let mut seen: Vec<&str> = ports.iter().map(|p| p.port.as_str()).collect();
            let len = seen.len();
            seen.dedup();
            prop_assert_eq!(seen.len(), len);
        }

        #[test]
        fn filtered_select_is_subset(names in prop::collection::vec(port_name(), 0..24)) {
            let scanner = PortScanner::with_config(ScannerConfig {
                filter: PortFilter::OsConvention,
                platform: Platform::Linux,
            });
            let ports = scanner.select(names.iter().map(SerialPortInfo::named).collect());

            for port in &ports {
                prop_assert!(names.contains(&port.port));
                prop_assert!(Platform::Linux.is_likely_serial_port(&port.port));
            }
        }

        #[test]
        fn scan_probes_every_candidate_once(names in prop::collection::vec(port_name(), 0..12)) {
            let calls = Cell::new(0usize);
            let prober = |_port: &str, _baud: u32, _timeout: Duration| {
                calls.set(calls.get() + 1);
                ProbeResult::NotFound
            };
            let scan = ScanOrchestrator::with_parts(names.clone(), prober, SCAN_TIMEOUT);

            prop_assert!(scan.scan(19200).is_empty());
            prop_assert_eq!(calls.get(), names.len());
        }
    }
}
