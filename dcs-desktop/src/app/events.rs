//! Event processing - scan messages and supply task events

use dcs_control::SupplyEvent;
use dcs_detect::ScanProgress;
use tokio::sync::broadcast::error::TryRecvError;

use crate::settings::ConnectionKind;

use super::{BackgroundMessage, DcsApp};

impl DcsApp {
    /// Process background messages
    pub(super) fn process_messages(&mut self) {
        while let Ok(msg) = self.bg_rx.try_recv() {
            match msg {
                BackgroundMessage::ScanProgress(progress) => self.handle_scan_progress(progress),
                BackgroundMessage::ScanComplete(report) => {
                    self.scan = None;
                    let count = report.devices.len();
                    self.found_devices = report.devices;

                    if let Some(first) = self.found_devices.first() {
                        if self.session.is_none() {
                            self.selected_port = first.port.clone();
                        }
                    }

                    let summary = match count {
                        0 => format!("No supplies found ({} ports probed)", report.probed),
                        1 => "Found 1 supply".to_string(),
                        n => format!("Found {} supplies", n),
                    };
                    if report.cancelled {
                        self.set_status(format!("Scan cancelled. {}", summary));
                    } else {
                        self.set_status(summary);
                    }
                }
            }
        }
    }

    fn handle_scan_progress(&mut self, progress: ScanProgress) {
        match progress {
            ScanProgress::Started { total } => {
                if let Some(scan) = self.scan.as_mut() {
                    scan.total = total;
                }
            }
            ScanProgress::Probing { index, total, port } => {
                if let Some(scan) = self.scan.as_mut() {
                    scan.probed = index;
                    scan.total = total;
                    scan.current_port = Some(port);
                }
            }
            ScanProgress::Found(device) => {
                self.report_info("Scan", format!("Found {}", device.display_label()));
                self.found_devices.push(device);
            }
        }
    }

    /// Drain events from the supply task and state from the simulated supply
    pub(super) fn process_supply_events(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Some(sim) = session.sim.as_mut() {
            loop {
                match sim.state_rx.try_recv() {
                    Ok(state) => sim.state = Some(state),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        }

        let mut events = Vec::new();
        while let Ok(event) = session.event_rx.try_recv() {
            events.push(event);
        }

        for event in events {
            self.handle_supply_event(event);
        }
    }

    fn handle_supply_event(&mut self, event: SupplyEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match event {
            SupplyEvent::Connected(info) => {
                self.voltage_input = self.voltage_input.clamp(0.0, info.max_voltage);
                self.current_input = self.current_input.clamp(0.0, info.max_current);
                let message = format!(
                    "Connected to {} (S/N {}) on {}",
                    info.model, info.serial_number, session.port
                );
                let remembered = (session.kind == ConnectionKind::SerialPort)
                    .then(|| session.port.clone());
                session.info = Some(info);

                if remembered.is_some() && self.settings.last_port != remembered {
                    self.settings.last_port = remembered;
                    self.save_settings();
                }
                self.set_status(message);
            }
            SupplyEvent::Reading(measurement) => {
                session.reading = Some(measurement);
            }
            SupplyEvent::SetpointApplied { quantity, value } => {
                self.set_status(format!(
                    "Set {} to {:.3} {}",
                    quantity,
                    value,
                    quantity.unit()
                ));
            }
            SupplyEvent::SetpointFailed {
                quantity,
                value,
                reason,
            } => {
                self.report_warning(
                    "Supply",
                    format!(
                        "Could not set {} to {:.3} {}: {}",
                        quantity,
                        value,
                        quantity.unit(),
                        reason
                    ),
                );
            }
            SupplyEvent::LoggingStarted { path } => {
                let message = format!("Logging to {}", path.display());
                session.log_path = Some(path);
                self.set_status(message);
            }
            SupplyEvent::LoggingStopped { path, rows } => {
                session.log_path = None;
                self.set_status(format!("Logged {} rows to {}", rows, path.display()));
            }
            SupplyEvent::Error(message) => {
                self.report_warning("Supply", message);
            }
            SupplyEvent::Disconnected => {
                // A failed connect keeps its error in the status bar
                let was_connected = session.is_connected();
                self.close_session();
                if was_connected {
                    self.set_status("Disconnected".into());
                }
            }
        }
    }
}
