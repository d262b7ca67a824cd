//! Port enumeration and background scanning

use dcs_detect::{CancelToken, ScanOrchestrator};

use super::{BackgroundMessage, DcsApp, ScanState};

impl DcsApp {
    /// Refresh available ports for the picker
    pub(super) fn refresh_ports(&mut self) {
        self.available_ports = self.scanner.enumerate_ports();
        tracing::debug!("{} serial ports available", self.available_ports.len());
    }

    /// Start a scan on a background thread
    ///
    /// The thread reports progress and the final report over the background
    /// channel; the UI thread never blocks on a probe.
    pub(super) fn start_scan(&mut self) {
        if self.scan.is_some() {
            return;
        }

        let cancel = CancelToken::new();
        self.scan = Some(ScanState {
            cancel: cancel.clone(),
            probed: 0,
            total: 0,
            current_port: None,
        });
        self.found_devices.clear();
        self.set_status("Scanning ports...".into());

        let orchestrator =
            ScanOrchestrator::new(self.settings.scanner_config(), self.settings.probe_config());
        let baud_rate = self.settings.baud_rate;
        let tx = self.bg_tx.clone();

        std::thread::spawn(move || {
            let progress_tx = tx.clone();
            let report = orchestrator.scan_with(baud_rate, &cancel, |progress| {
                let _ = progress_tx.send(BackgroundMessage::ScanProgress(progress));
            });
            let _ = tx.send(BackgroundMessage::ScanComplete(report));
        });
    }

    /// Ask the running scan to stop after the current probe
    pub(super) fn cancel_scan(&mut self) {
        if let Some(scan) = &self.scan {
            scan.cancel.cancel();
            self.set_status("Cancelling scan...".into());
        }
    }

    /// Ports offered in the picker: scan hits first, then everything else
    pub(super) fn port_choices(&self) -> Vec<(String, String)> {
        let mut choices: Vec<(String, String)> = self
            .found_devices
            .iter()
            .map(|d| (d.port.clone(), d.display_label()))
            .collect();

        for port in &self.available_ports {
            if !choices.iter().any(|(name, _)| *name == port.port) {
                choices.push((port.port.clone(), port.display_label()));
            }
        }
        choices
    }
}
