//! Status messaging and save helpers

use std::time::Instant;

use super::DcsApp;

impl DcsApp {
    /// Set a status message (also logged as Info)
    pub(super) fn set_status(&mut self, msg: String) {
        self.status_message = Some((msg.clone(), Instant::now()));
        tracing::info!(source = "Status", "{}", msg);
    }

    /// Report an info message via tracing only
    pub(super) fn report_info(&mut self, source: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(source = source, "{}", message);
    }

    /// Report a warning via tracing and the status bar
    pub(super) fn report_warning(&mut self, source: &str, message: impl Into<String>) {
        let message = message.into();
        self.status_message = Some((format!("{}: {}", source, message), Instant::now()));
        tracing::warn!(source = source, "{}", message);
    }

    /// Report an error via tracing and the status bar
    pub(super) fn report_err(&mut self, source: &str, message: impl Into<String>) {
        let message = message.into();
        self.status_message = Some((format!("{}: {}", source, message), Instant::now()));
        tracing::error!(source = source, "{}", message);
    }

    /// Handle a settings save error
    pub(super) fn handle_save_error(&mut self, error: String) {
        self.report_err("Settings", error);
    }

    /// Save settings, reporting any failure
    pub(super) fn save_settings(&mut self) {
        if let Err(e) = self.settings.save() {
            self.handle_save_error(e);
        }
    }
}
