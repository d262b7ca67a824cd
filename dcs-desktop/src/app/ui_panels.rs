//! UI panel drawing methods

use dcs_control::SupplyTaskCommand;
use dcs_sim::{RegulationMode, VirtualSupplyCommand};
use egui::{Color32, RichText, Ui};

use crate::settings::ConnectionKind;

use super::DcsApp;

const VOLTAGE_COLOR: Color32 = Color32::from_rgb(120, 220, 120);
const CURRENT_COLOR: Color32 = Color32::from_rgb(120, 180, 255);
const LOGGING_COLOR: Color32 = Color32::from_rgb(255, 165, 0);

impl DcsApp {
    /// Draw the toolbar
    pub(super) fn draw_toolbar(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            if ui.button("Settings").clicked() {
                self.show_settings = !self.show_settings;
            }
            if ui.button("About").clicked() {
                self.show_about = true;
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                match &self.session {
                    Some(session) if session.is_connected() => {
                        ui.label(RichText::new("*").color(Color32::GREEN).size(16.0));
                        ui.label("Connected");
                        if session.is_logging() {
                            ui.label(RichText::new("REC").color(LOGGING_COLOR).strong());
                        }
                    }
                    Some(_) => {
                        ui.spinner();
                        ui.label("Connecting");
                    }
                    None => {
                        ui.label(RichText::new("o").color(Color32::GRAY).size(16.0));
                        ui.label("Not connected");
                    }
                }

                ui.separator();

                if let Some((msg, _)) = &self.status_message {
                    ui.label(msg);
                }
            });
        });
    }

    /// Draw the settings side panel
    pub(super) fn draw_settings_panel(&mut self, ui: &mut Ui) {
        let previous_refresh = self.settings.refresh_interval();
        let previous_filter = self.settings.port_filter;
        if let Some(error) = self.settings.draw(ui) {
            self.handle_save_error(error);
        }

        if self.settings.port_filter != previous_filter {
            self.scanner = self.settings.port_scanner();
            self.refresh_ports();
        }

        let refresh = self.settings.refresh_interval();
        if refresh != previous_refresh {
            self.send_task_command(
                SupplyTaskCommand::SetRefreshInterval(refresh),
                "SetRefreshInterval",
            );
        }
    }

    /// Draw port selection, scanning and connect/disconnect controls
    pub(super) fn draw_connection_panel(&mut self, ui: &mut Ui) {
        ui.heading("Connection");

        let has_session = self.session.is_some();
        let prev_kind = self.settings.connection;
        let mut refresh_clicked = false;
        let mut scan_clicked = false;
        let mut cancel_clicked = false;
        let mut connect_clicked = false;
        let mut disconnect_clicked = false;
        let mut use_port: Option<String> = None;

        ui.add_enabled_ui(!has_session, |ui| {
            egui::Grid::new("connection_grid")
                .num_columns(2)
                .spacing([10.0, 6.0])
                .show(ui, |ui| {
                    ui.label("Connection:");
                    egui::ComboBox::from_id_salt("connection_kind")
                        .selected_text(self.settings.connection.name())
                        .show_ui(ui, |ui| {
                            for kind in [ConnectionKind::SerialPort, ConnectionKind::Simulated] {
                                ui.selectable_value(&mut self.settings.connection, kind, kind.name());
                            }
                        });
                    ui.end_row();

                    if self.settings.connection == ConnectionKind::SerialPort {
                        ui.label("Port:");
                        ui.horizontal(|ui| {
                            // Owned copy so the combo box can borrow selected_port mutably
                            let choices = self.port_choices();
                            let selected_label = choices
                                .iter()
                                .find(|(port, _)| *port == self.selected_port)
                                .map(|(_, label)| label.clone())
                                .unwrap_or_else(|| {
                                    if self.selected_port.is_empty() {
                                        "Select port...".to_string()
                                    } else {
                                        self.selected_port.clone()
                                    }
                                });

                            egui::ComboBox::from_id_salt("port_picker")
                                .selected_text(selected_label)
                                .width(260.0)
                                .show_ui(ui, |ui| {
                                    if choices.is_empty() {
                                        ui.label(
                                            RichText::new("No ports found")
                                                .color(Color32::GRAY)
                                                .small(),
                                        );
                                    }
                                    for (port, label) in &choices {
                                        ui.selectable_value(
                                            &mut self.selected_port,
                                            port.clone(),
                                            label,
                                        );
                                    }
                                });

                            if ui
                                .button("Refresh")
                                .on_hover_text("Re-read the list of serial ports")
                                .clicked()
                            {
                                refresh_clicked = true;
                            }
                        });
                        ui.end_row();

                        ui.label("Manual:");
                        ui.add(
                            egui::TextEdit::singleline(&mut self.selected_port)
                                .hint_text("/dev/ttyUSB0 or COM3")
                                .desired_width(200.0),
                        );
                        ui.end_row();
                    }
                });
        });

        if self.settings.connection == ConnectionKind::SerialPort {
            ui.horizontal(|ui| match &self.scan {
                Some(scan) => {
                    ui.spinner();
                    let text = match &scan.current_port {
                        Some(port) => {
                            format!("Probing {} ({}/{})", port, scan.probed + 1, scan.total)
                        }
                        None => "Enumerating ports...".to_string(),
                    };
                    ui.label(text);
                    if ui.button("Cancel").clicked() {
                        cancel_clicked = true;
                    }
                }
                None => {
                    if ui
                        .add_enabled(!has_session, egui::Button::new("Scan for supplies"))
                        .on_hover_text("Send *IDN? to every port and list the ones that answer")
                        .clicked()
                    {
                        scan_clicked = true;
                    }
                }
            });

            for device in &self.found_devices {
                ui.horizontal(|ui| {
                    ui.label(RichText::new(&device.port).monospace());
                    ui.label(
                        RichText::new(&device.identification)
                            .color(Color32::GREEN)
                            .small(),
                    );
                    if !has_session && ui.small_button("Use").clicked() {
                        use_port = Some(device.port.clone());
                    }
                });
            }
        }

        ui.add_space(4.0);
        ui.horizontal(|ui| match &self.session {
            None => {
                let can_connect = self.scan.is_none()
                    && (self.settings.connection == ConnectionKind::Simulated
                        || !self.selected_port.trim().is_empty());
                if ui
                    .add_enabled(can_connect, egui::Button::new("Connect"))
                    .clicked()
                {
                    connect_clicked = true;
                }
            }
            Some(session) => {
                let label = if session.closing {
                    "Disconnecting..."
                } else {
                    "Disconnect"
                };
                if ui
                    .add_enabled(!session.closing, egui::Button::new(label))
                    .clicked()
                {
                    disconnect_clicked = true;
                }

                match &session.info {
                    Some(info) => {
                        ui.label(
                            RichText::new(format!(
                                "{} S/N {} on {}",
                                info.model, info.serial_number, session.port
                            ))
                            .color(Color32::GREEN),
                        );
                    }
                    None => {
                        ui.spinner();
                        ui.label(format!("Connecting to {}...", session.port));
                    }
                }
            }
        });

        // Handle deferred actions
        if self.settings.connection != prev_kind {
            self.save_settings();
        }
        if refresh_clicked {
            self.refresh_ports();
        }
        if let Some(port) = use_port {
            self.selected_port = port;
        }
        if scan_clicked {
            self.start_scan();
        }
        if cancel_clicked {
            self.cancel_scan();
        }
        if connect_clicked {
            self.connect();
        }
        if disconnect_clicked {
            self.disconnect();
        }
    }

    /// Draw live readings and setpoint controls
    pub(super) fn draw_output_panel(&mut self, ui: &mut Ui) {
        let Some(session) = &self.session else {
            return;
        };
        let Some(info) = session.info.clone() else {
            return;
        };
        let reading = session.reading;

        ui.heading("Output");

        ui.horizontal(|ui| {
            let (volts, amps) = match reading {
                Some(m) => (format!("{:.3} V", m.voltage), format!("{:.3} A", m.current)),
                None => ("-.--- V".to_string(), "-.--- A".to_string()),
            };
            ui.label(
                RichText::new(volts)
                    .size(32.0)
                    .strong()
                    .monospace()
                    .color(VOLTAGE_COLOR),
            );
            ui.add_space(24.0);
            ui.label(
                RichText::new(amps)
                    .size(32.0)
                    .strong()
                    .monospace()
                    .color(CURRENT_COLOR),
            );
        });

        if let Some(m) = reading {
            ui.label(
                RichText::new(format!("Updated {}", m.timestamp.format("%H:%M:%S")))
                    .small()
                    .color(Color32::GRAY),
            );
        }

        ui.add_space(8.0);

        let mut set_voltage = false;
        let mut set_current = false;

        egui::Grid::new("setpoint_grid")
            .num_columns(4)
            .spacing([10.0, 6.0])
            .show(ui, |ui| {
                ui.label("Voltage:");
                ui.add(
                    egui::DragValue::new(&mut self.voltage_input)
                        .range(0.0..=info.max_voltage)
                        .speed(0.01)
                        .fixed_decimals(3)
                        .suffix(" V"),
                );
                if ui.button("Set").clicked() {
                    set_voltage = true;
                }
                ui.label(
                    RichText::new(format!("max {:.3} V", info.max_voltage))
                        .small()
                        .color(Color32::GRAY),
                );
                ui.end_row();

                ui.label("Current:");
                ui.add(
                    egui::DragValue::new(&mut self.current_input)
                        .range(0.0..=info.max_current)
                        .speed(0.01)
                        .fixed_decimals(3)
                        .suffix(" A"),
                );
                if ui.button("Set").clicked() {
                    set_current = true;
                }
                ui.label(
                    RichText::new(format!("max {:.3} A", info.max_current))
                        .small()
                        .color(Color32::GRAY),
                );
                ui.end_row();
            });

        if set_voltage {
            self.send_task_command(SupplyTaskCommand::SetVoltage(self.voltage_input), "SetVoltage");
        }
        if set_current {
            self.send_task_command(SupplyTaskCommand::SetCurrent(self.current_input), "SetCurrent");
        }
    }

    /// Draw the logging toggle and interval
    pub(super) fn draw_logging_panel(&mut self, ui: &mut Ui) {
        let Some(session) = &self.session else {
            return;
        };
        if !session.is_connected() {
            return;
        }
        let log_path = session.log_path.clone();

        ui.heading("Logging");

        let prev_interval = self.settings.log_interval_s;
        let mut start_clicked = false;
        let mut stop_clicked = false;

        ui.horizontal(|ui| {
            ui.label("Interval:");
            ui.add_enabled(
                log_path.is_none(),
                egui::DragValue::new(&mut self.settings.log_interval_s)
                    .range(0.1..=60.0)
                    .speed(0.1)
                    .fixed_decimals(1)
                    .suffix(" s"),
            );

            match &log_path {
                None => {
                    if ui
                        .button("Start logging...")
                        .on_hover_text("Choose a CSV file and start recording readings")
                        .clicked()
                    {
                        start_clicked = true;
                    }
                }
                Some(_) => {
                    if ui.button("Stop logging").clicked() {
                        stop_clicked = true;
                    }
                }
            }
        });

        if let Some(path) = &log_path {
            ui.label(
                RichText::new(format!("Logging to {}", path.display()))
                    .small()
                    .color(LOGGING_COLOR),
            );
        }

        if self.settings.log_interval_s != prev_interval {
            self.save_settings();
        }
        if start_clicked {
            self.start_logging();
        }
        if stop_clicked {
            self.stop_logging();
        }
    }

    /// Draw the simulated supply's state and load controls
    pub(super) fn draw_simulation_panel(&mut self, ui: &mut Ui) {
        let Some(sim) = self.session.as_mut().and_then(|s| s.sim.as_mut()) else {
            return;
        };

        ui.horizontal(|ui| {
            ui.heading("Simulated Supply");
            ui.label(
                RichText::new("[SIM]")
                    .color(LOGGING_COLOR)
                    .strong()
                    .size(10.0),
            );
        });

        if let Some(state) = sim.state {
            egui::Grid::new("sim_state")
                .num_columns(2)
                .spacing([10.0, 4.0])
                .show(ui, |ui| {
                    ui.label("Setpoints:");
                    ui.label(
                        RichText::new(format!(
                            "{:.3} V / {:.3} A",
                            state.voltage_setpoint, state.current_setpoint
                        ))
                        .monospace(),
                    );
                    ui.end_row();

                    ui.label("Mode:");
                    let mode = match state.mode {
                        RegulationMode::ConstantVoltage => "CV",
                        RegulationMode::ConstantCurrent => "CC",
                    };
                    ui.label(RichText::new(mode).monospace());
                    ui.end_row();

                    ui.label("Control:");
                    let (control, color) = if state.remote {
                        ("Remote", Color32::from_rgb(255, 200, 80))
                    } else {
                        ("Local", Color32::GREEN)
                    };
                    ui.label(RichText::new(control).monospace().color(color));
                    ui.end_row();
                });
        }

        let prev_load = sim.load_ohms;
        let prev_open = sim.open_circuit;
        let prev_silent = sim.silent;

        ui.horizontal(|ui| {
            ui.label("Load:");
            ui.add_enabled(
                !sim.open_circuit,
                egui::Slider::new(&mut sim.load_ohms, 0.1..=1000.0)
                    .logarithmic(true)
                    .suffix(" ohm"),
            );
            ui.checkbox(&mut sim.open_circuit, "Open circuit");
        });
        ui.checkbox(&mut sim.silent, "Unplug cable (stop answering)");

        let load_cmd = (sim.load_ohms != prev_load || sim.open_circuit != prev_open).then(|| {
            VirtualSupplyCommand::SetLoad((!sim.open_circuit).then_some(sim.load_ohms))
        });
        let silent_cmd =
            (sim.silent != prev_silent).then_some(VirtualSupplyCommand::SetSilent(sim.silent));

        if let Some(cmd) = load_cmd {
            self.send_sim_command(cmd);
        }
        if let Some(cmd) = silent_cmd {
            self.send_sim_command(cmd);
        }
    }

    /// Draw the About window
    pub(super) fn draw_about_window(&mut self, ctx: &egui::Context) {
        let log_dir = self.settings.log_directory();

        egui::Window::new("About")
            .open(&mut self.show_about)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.heading("Sorensen DCS Control");
                ui.label(format!("Version {}", env!("CARGO_PKG_VERSION")));
                ui.add_space(8.0);
                ui.label(
                    "Finds Sorensen DCS power supplies on serial ports, shows and programs \
                     their output, and logs readings to CSV.",
                );
                ui.add_space(8.0);
                ui.label(
                    RichText::new(format!("Logs: {}", log_dir.display()))
                        .small()
                        .color(Color32::GRAY),
                );
            });
    }
}
