//! Application settings

use std::path::PathBuf;
use std::time::Duration;

use dcs_control::{clamp_log_interval, default_log_dir, SupplyTaskConfig};
use dcs_detect::{IdentifyPolicy, PortFilter, PortScanner, ProbeConfig, ScannerConfig};
use dcs_sim::VirtualSupplyConfig;
use egui::Ui;
use serde::{Deserialize, Serialize};

/// How the supply is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// A physical supply on a serial port
    #[default]
    SerialPort,
    /// The built-in simulated supply
    Simulated,
}

impl ConnectionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionKind::SerialPort => "Serial port",
            ConnectionKind::Simulated => "Simulated supply",
        }
    }
}

/// Application settings
///
/// Missing fields fall back to their defaults, so files written by older
/// versions still load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Serial baud rate for scanning and connecting
    pub baud_rate: u32,
    /// Per-port `*IDN?` timeout during a scan, in milliseconds
    pub scan_timeout_ms: u64,
    /// Per-query timeout once connected, in milliseconds
    pub connect_timeout_ms: u64,
    /// Display refresh period, in milliseconds
    pub refresh_ms: u64,
    /// Logging period, in seconds
    pub log_interval_s: f64,
    /// Which ports a scan probes
    pub port_filter: PortFilter,
    /// Which scan responses count as a supply
    pub identify_policy: IdentifyPolicy,
    /// Serial port or simulated supply
    pub connection: ConnectionKind,
    /// Port of the last successful connection
    pub last_port: Option<String>,
    /// Directory the last log file was saved in
    pub log_dir: Option<PathBuf>,
    /// Simulated supply to start for simulated connections
    pub simulated: VirtualSupplyConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            baud_rate: dcs_protocol::DEFAULT_BAUD_RATE,
            scan_timeout_ms: 250,
            connect_timeout_ms: 500,
            refresh_ms: 500,
            log_interval_s: 1.0,
            port_filter: PortFilter::default(),
            identify_policy: IdentifyPolicy::default(),
            connection: ConnectionKind::default(),
            last_port: None,
            log_dir: None,
            simulated: VirtualSupplyConfig::default(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for sorensen-dcs
    /// Uses $XDG_CONFIG_HOME/sorensen-dcs, falls back to ~/.config/sorensen-dcs
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("sorensen-dcs"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("sorensen-dcs"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, using defaults on any error
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), String> {
        let path =
            Self::settings_path().ok_or_else(|| "Could not determine settings path".to_string())?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(&path, json).map_err(|e| format!("Failed to write settings: {}", e))?;

        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    /// Logging period, clamped to the range the supply task accepts
    pub fn log_interval(&self) -> Duration {
        let seconds = if self.log_interval_s.is_finite() {
            self.log_interval_s.max(0.0)
        } else {
            0.0
        };
        clamp_log_interval(Duration::from_secs_f64(seconds))
    }

    /// Where the save dialog starts
    pub fn log_directory(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(default_log_dir)
    }

    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            filter: self.port_filter,
            ..ScannerConfig::default()
        }
    }

    /// Scanner for the port picker, filtered like the scan
    pub fn port_scanner(&self) -> PortScanner {
        PortScanner::with_config(self.scanner_config())
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            baud_rate: self.baud_rate,
            timeout: self.scan_timeout(),
            policy: self.identify_policy,
        }
    }

    pub fn task_config(&self) -> SupplyTaskConfig {
        SupplyTaskConfig {
            refresh_interval: self.refresh_interval(),
        }
    }

    /// Check if settings have changed and auto-save if so
    /// Returns any error message for display
    fn auto_save_if_changed(&self, previous: &Settings) -> Option<String> {
        if self != previous {
            if let Err(e) = self.save() {
                return Some(e);
            }
        }
        None
    }

    /// Draw settings UI (auto-saves on change)
    /// Returns an error message if save failed
    pub fn draw(&mut self, ui: &mut Ui) -> Option<String> {
        let previous = self.clone();

        egui::Grid::new("settings_grid")
            .num_columns(2)
            .spacing([10.0, 8.0])
            .show(ui, |ui| {
                ui.label("Baud rate:");
                egui::ComboBox::from_id_salt("settings_baud")
                    .selected_text(format!("{}", self.baud_rate))
                    .show_ui(ui, |ui| {
                        for &baud in &[1200u32, 2400, 4800, 9600, 19200, 38400, 57600, 115200] {
                            ui.selectable_value(&mut self.baud_rate, baud, format!("{}", baud));
                        }
                    });
                ui.end_row();

                ui.label("Scan timeout (ms):");
                ui.add(egui::DragValue::new(&mut self.scan_timeout_ms).range(50..=5000));
                ui.end_row();

                ui.label("Query timeout (ms):");
                ui.add(egui::DragValue::new(&mut self.connect_timeout_ms).range(50..=10000));
                ui.end_row();

                ui.label("Display refresh (ms):");
                ui.add(egui::DragValue::new(&mut self.refresh_ms).range(50..=10000));
                ui.end_row();

                ui.label("Scan ports:");
                egui::ComboBox::from_id_salt("settings_port_filter")
                    .selected_text(self.port_filter.name())
                    .show_ui(ui, |ui| {
                        for filter in [PortFilter::All, PortFilter::OsConvention] {
                            ui.selectable_value(&mut self.port_filter, filter, filter.name());
                        }
                    });
                ui.end_row();

                ui.label("Accept:");
                egui::ComboBox::from_id_salt("settings_identify_policy")
                    .selected_text(self.identify_policy.name())
                    .show_ui(ui, |ui| {
                        for policy in [IdentifyPolicy::AnyResponse, IdentifyPolicy::RequireMarker] {
                            ui.selectable_value(&mut self.identify_policy, policy, policy.name());
                        }
                    });
                ui.end_row();

                ui.label("Simulated model:");
                ui.text_edit_singleline(&mut self.simulated.model);
                ui.end_row();
            });

        ui.add_space(16.0);

        if let Some(path) = Self::settings_path() {
            ui.label(
                egui::RichText::new(format!("Config: {}", path.display()))
                    .small()
                    .color(egui::Color32::GRAY),
            );
        }

        self.auto_save_if_changed(&previous)
    }
}
