//! Main application state and UI
//!
//! This module contains the core `DcsApp` struct and is organized into submodules:
//! - `ports`: Port enumeration and background scanning
//! - `connection`: Starting and stopping the supply task (serial or simulated)
//! - `events`: Draining scan messages and supply events
//! - `logging`: CSV logging start/stop and the save dialog
//! - `status`: Status messaging and settings save helpers
//! - `ui_panels`: UI panel drawing methods

mod connection;
mod events;
mod logging;
mod ports;
mod status;
mod ui_panels;

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};

use dcs_control::{Measurement, SupplyEvent, SupplyInfo, SupplyTaskCommand};
use dcs_detect::{CancelToken, DeviceRecord, PortScanner, ScanProgress, ScanReport, SerialPortInfo};
use dcs_sim::{VirtualSupplyCommand, VirtualSupplyState};
use eframe::CreationContext;
use tokio::sync::{broadcast, mpsc as tokio_mpsc};
use tokio::task::JoinHandle;

use crate::settings::{ConnectionKind, Settings};

/// How often the UI polls channels while something is running
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long exit waits for the supply task to finish
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Messages from background threads
pub enum BackgroundMessage {
    /// Scan progress notification
    ScanProgress(ScanProgress),
    /// Scan finished or was cancelled
    ScanComplete(ScanReport),
}

/// A scan running on a background thread
pub(super) struct ScanState {
    pub cancel: CancelToken,
    pub probed: usize,
    pub total: usize,
    pub current_port: Option<String>,
}

/// Controls for the simulated supply behind a simulated session
pub(super) struct SimulatedLink {
    pub cmd_tx: tokio_mpsc::Sender<VirtualSupplyCommand>,
    pub state_rx: broadcast::Receiver<VirtualSupplyState>,
    pub state: Option<VirtualSupplyState>,
    /// Load resistance shown on the slider
    pub load_ohms: f64,
    pub open_circuit: bool,
    pub silent: bool,
}

/// A running supply task and what the UI knows about it
pub(super) struct SupplySession {
    pub kind: ConnectionKind,
    pub port: String,
    pub cmd_tx: tokio_mpsc::Sender<SupplyTaskCommand>,
    pub task: JoinHandle<()>,
    pub event_rx: tokio_mpsc::UnboundedReceiver<SupplyEvent>,
    /// Set once the supply has identified itself
    pub info: Option<SupplyInfo>,
    pub reading: Option<Measurement>,
    /// Open log file, while logging
    pub log_path: Option<PathBuf>,
    /// Shutdown requested, waiting for the task to end
    pub closing: bool,
    pub sim: Option<SimulatedLink>,
}

impl SupplySession {
    pub fn is_connected(&self) -> bool {
        self.info.is_some()
    }

    pub fn is_logging(&self) -> bool {
        self.log_path.is_some()
    }
}

/// Main application state
pub struct DcsApp {
    /// Settings
    pub(super) settings: Settings,
    /// Port scanner used for the picker
    pub(super) scanner: PortScanner,
    /// Available serial ports
    pub(super) available_ports: Vec<SerialPortInfo>,
    /// Supplies that answered the last scan
    pub(super) found_devices: Vec<DeviceRecord>,
    /// Port to connect to (picked or typed)
    pub(super) selected_port: String,
    /// Scan in progress
    pub(super) scan: Option<ScanState>,
    /// Connected (or connecting) supply
    pub(super) session: Option<SupplySession>,
    /// Voltage setpoint being edited
    pub(super) voltage_input: f64,
    /// Current limit being edited
    pub(super) current_input: f64,
    /// Status message
    pub(super) status_message: Option<(String, Instant)>,
    /// Show settings panel
    pub(super) show_settings: bool,
    /// Show About window
    pub(super) show_about: bool,
    /// Background message receiver
    pub(super) bg_rx: Receiver<BackgroundMessage>,
    /// Background message sender (for cloning to threads)
    pub(super) bg_tx: Sender<BackgroundMessage>,
    /// Tokio runtime handle for spawning async tasks
    pub(super) rt_handle: tokio::runtime::Handle,
    /// Tokio runtime (must be kept alive for async tasks)
    _runtime: tokio::runtime::Runtime,
}

impl DcsApp {
    /// Create a new application
    pub fn new(_cc: &CreationContext<'_>, runtime: tokio::runtime::Runtime) -> Self {
        let rt_handle = runtime.handle().clone();
        let (bg_tx, bg_rx) = std::sync::mpsc::channel();
        let settings = Settings::load();

        let mut app = Self {
            scanner: settings.port_scanner(),
            available_ports: Vec::new(),
            found_devices: Vec::new(),
            selected_port: settings.last_port.clone().unwrap_or_default(),
            scan: None,
            session: None,
            voltage_input: 0.0,
            current_input: 0.0,
            status_message: None,
            show_settings: false,
            show_about: false,
            bg_rx,
            bg_tx,
            rt_handle,
            settings,
            _runtime: runtime,
        };

        app.refresh_ports();
        app
    }

    /// Whether anything is running that the UI should keep polling for
    fn is_busy(&self) -> bool {
        self.scan.is_some() || self.session.is_some()
    }
}

impl eframe::App for DcsApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_messages();
        self.process_supply_events();

        // Clear old status messages
        if let Some((_, when)) = &self.status_message {
            if when.elapsed().as_secs() > 5 {
                self.status_message = None;
            }
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.draw_toolbar(ui);
        });

        if self.show_settings {
            egui::SidePanel::right("settings")
                .default_width(280.0)
                .show(ctx, |ui| {
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        ui.heading("Settings");
                        ui.separator();
                        self.draw_settings_panel(ui);

                        ui.add_space(16.0);
                        ui.separator();
                        if ui.button("Close").clicked() {
                            self.show_settings = false;
                        }
                    });
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.draw_connection_panel(ui);

                if self.session.is_some() {
                    ui.add_space(12.0);
                    ui.separator();
                    self.draw_output_panel(ui);

                    ui.add_space(12.0);
                    ui.separator();
                    self.draw_logging_panel(ui);

                    ui.add_space(12.0);
                    ui.separator();
                    self.draw_simulation_panel(ui);
                }
            });
        });

        self.draw_about_window(ctx);

        if self.is_busy() {
            ctx.request_repaint_after(POLL_INTERVAL);
        }
    }
}

impl Drop for DcsApp {
    fn drop(&mut self) {
        if let Some(scan) = &self.scan {
            scan.cancel.cancel();
        }
        // Give the supply task a chance to return the supply to local control
        if let Some(session) = self.session.take() {
            let _ = session.cmd_tx.try_send(SupplyTaskCommand::Shutdown);
            let _ = self
                .rt_handle
                .block_on(async { tokio::time::timeout(SHUTDOWN_GRACE, session.task).await });
        }
    }
}
