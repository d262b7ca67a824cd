//! CSV logging start/stop

use std::path::PathBuf;

use chrono::Local;
use dcs_control::{default_log_filename, SupplyTaskCommand};

use super::DcsApp;

impl DcsApp {
    /// Ask for a file name and start logging to it
    pub(super) fn start_logging(&mut self) {
        let Some(path) = self.choose_log_path() else {
            return; // User cancelled
        };

        if let Some(dir) = path.parent().map(PathBuf::from) {
            if self.settings.log_dir.as_ref() != Some(&dir) {
                self.settings.log_dir = Some(dir);
                self.save_settings();
            }
        }

        let interval = self.settings.log_interval();
        self.send_task_command(SupplyTaskCommand::StartLogging { path, interval }, "StartLogging");
    }

    pub(super) fn stop_logging(&mut self) {
        self.send_task_command(SupplyTaskCommand::StopLogging, "StopLogging");
    }

    /// Show the save dialog, starting in the log directory with a
    /// timestamped file name
    fn choose_log_path(&self) -> Option<PathBuf> {
        let dir = self.settings.log_directory();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!("Could not create {}: {}", dir.display(), e);
        }

        rfd::FileDialog::new()
            .set_title("Save measurement log")
            .set_directory(&dir)
            .set_file_name(default_log_filename(Local::now()))
            .add_filter("CSV files", &["csv"])
            .add_filter("All files", &["*"])
            .save_file()
    }
}
