//! List serial ports and scan them for DCS supplies
//!
//! Run with `cargo run -p dcs-detect --example scan_ports`.
//! Set `RUST_LOG=dcs_detect=debug` to see every probe.

use dcs_detect::{
    CancelToken, Platform, PortFilter, PortScanner, ProbeConfig, ScanOrchestrator, ScanProgress,
    ScannerConfig,
};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dcs_detect=info")),
        )
        .init();

    let rule = "=".repeat(60);
    println!("{rule}\nSorensen DCS Device Scanner\n{rule}");

    println!("\nPlatform: {:?}", Platform::current());

    let scanner = PortScanner::with_filter(PortFilter::All);
    let ports = scanner.enumerate_ports();
    println!("\nAvailable serial ports:");
    if ports.is_empty() {
        println!("   No serial ports found");
    }
    for port in &ports {
        println!("   - {}", port.display_label());
    }

    println!("\nScanning for DCS devices...");
    let probe = ProbeConfig::default();
    let baud_rate = probe.baud_rate;
    let scan = ScanOrchestrator::new(ScannerConfig::default(), probe);
    let report = scan.scan_with(baud_rate, &CancelToken::new(), |event| {
        if let ScanProgress::Probing { index, total, port } = event {
            println!("   [{}/{}] {}", index + 1, total, port);
        }
    });

    if report.devices.is_empty() {
        println!("\nNo DCS devices found");
    } else {
        println!("\nFound {} DCS device(s):", report.devices.len());
        for device in &report.devices {
            println!("   - {}", device.display_label());
            if let Some(ratings) = device.identity().ratings() {
                println!(
                    "     rated {:.1} V / {:.1} A",
                    ratings.max_voltage, ratings.max_current
                );
            }
        }
    }

    println!("\n{rule}");
    Ok(())
}
