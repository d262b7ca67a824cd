//! Supply actor task
//!
//! A single task owns the connected supply and serialises every exchange
//! with it. The select! loop multiplexes:
//! - A display-refresh timer that reads the output
//! - An optional logging timer that appends a CSV row
//! - Commands from the UI
//!
//! Results go back to the UI as [`SupplyEvent`]s.

use std::future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::controller::DcsController;
use crate::csv_log::CsvLogger;
use crate::driver::PowerSupply;
use crate::measurement::{Measurement, Quantity};

/// Default display refresh period
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// Shortest accepted logging period
pub const MIN_LOG_INTERVAL: Duration = Duration::from_millis(100);

/// Longest accepted logging period
pub const MAX_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest accepted refresh period
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(50);

/// Commands that can be sent to a supply task
#[derive(Debug, Clone)]
pub enum SupplyTaskCommand {
    /// Program the voltage setpoint
    SetVoltage(f64),
    /// Program the current limit
    SetCurrent(f64),
    /// Start logging to `path` every `interval` (clamped to 0.1..=60 s)
    StartLogging { path: PathBuf, interval: Duration },
    /// Stop logging and close the file
    StopLogging,
    /// Change the display refresh period
    SetRefreshInterval(Duration),
    /// Return the supply to local control and end the task
    Shutdown,
}

/// What the UI needs to know about a connected supply
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyInfo {
    pub model: String,
    pub serial_number: String,
    pub max_voltage: f64,
    pub max_current: f64,
}

/// Events emitted by a supply task
#[derive(Debug, Clone)]
pub enum SupplyEvent {
    /// Task started with a connected supply
    Connected(SupplyInfo),
    /// Fresh output reading
    Reading(Measurement),
    /// The supply confirmed a new setpoint
    SetpointApplied { quantity: Quantity, value: f64 },
    /// A setpoint was rejected or not confirmed
    SetpointFailed {
        quantity: Quantity,
        value: f64,
        reason: String,
    },
    /// Log file opened
    LoggingStarted { path: PathBuf },
    /// Log file closed
    LoggingStopped { path: PathBuf, rows: usize },
    /// Recoverable failure, for the status bar
    Error(String),
    /// Task ended; the supply is no longer connected
    Disconnected,
}

/// Supply task settings
#[derive(Debug, Clone)]
pub struct SupplyTaskConfig {
    /// Display refresh period
    pub refresh_interval: Duration,
}

impl Default for SupplyTaskConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Clamp a requested logging period to the accepted range
pub fn clamp_log_interval(requested: Duration) -> Duration {
    requested.clamp(MIN_LOG_INTERVAL, MAX_LOG_INTERVAL)
}

/// An open log file and its timer
struct LogSession {
    logger: CsvLogger,
    timer: Interval,
}

impl LogSession {
    /// Wait for the next logging tick, or forever when not logging
    async fn tick(session: &mut Option<LogSession>) {
        match session {
            Some(session) => {
                session.timer.tick().await;
            }
            None => future::pending::<()>().await,
        }
    }
}

fn refresh_timer(period: Duration) -> Interval {
    let mut timer = interval(period.max(MIN_REFRESH_INTERVAL));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

/// Run the supply actor task
///
/// Returns when a shutdown command arrives, the command channel closes, or
/// the connection to the supply is lost. The supply is returned to local
/// control and any open log is closed on the way out.
pub async fn run_supply_task<S: PowerSupply>(
    mut controller: DcsController<S>,
    config: SupplyTaskConfig,
    mut cmd_rx: mpsc::Receiver<SupplyTaskCommand>,
    event_tx: mpsc::UnboundedSender<SupplyEvent>,
) {
    let (Some(model), Some(serial_number), Some(max_voltage), Some(max_current)) = (
        controller.model(),
        controller.serial_number(),
        controller.max_voltage(),
        controller.max_current(),
    ) else {
        warn!("Supply task started without a connected supply");
        let _ = event_tx.send(SupplyEvent::Disconnected);
        return;
    };

    info!("Supply task starting for {}", model);
    let _ = event_tx.send(SupplyEvent::Connected(SupplyInfo {
        model,
        serial_number,
        max_voltage,
        max_current,
    }));

    let mut refresh = refresh_timer(config.refresh_interval);
    let mut logging: Option<LogSession> = None;

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                match controller.measurements().await {
                    Some(measurement) => {
                        let _ = event_tx.send(SupplyEvent::Reading(measurement));
                    }
                    None => report_error(&controller, &event_tx),
                }
            }

            _ = LogSession::tick(&mut logging) => {
                let Some(measurement) = controller.measurements().await else {
                    report_error(&controller, &event_tx);
                    if controller.is_connected() {
                        continue;
                    }
                    break;
                };
                let _ = event_tx.send(SupplyEvent::Reading(measurement));

                if let Some(session) = logging.as_mut() {
                    if let Err(e) = session.logger.log(&measurement) {
                        warn!("Logging failed: {}", e);
                        let _ = event_tx.send(SupplyEvent::Error(format!("Logging failed: {}", e)));
                        stop_logging(&mut logging, &event_tx);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SupplyTaskCommand::SetVoltage(volts)) => {
                        let applied = controller.set_voltage(volts).await;
                        report_setpoint(&controller, &event_tx, Quantity::Voltage, volts, applied);
                    }
                    Some(SupplyTaskCommand::SetCurrent(amps)) => {
                        let applied = controller.set_current(amps).await;
                        report_setpoint(&controller, &event_tx, Quantity::Current, amps, applied);
                    }
                    Some(SupplyTaskCommand::StartLogging { path, interval }) => {
                        stop_logging(&mut logging, &event_tx);
                        match CsvLogger::create(&path) {
                            Ok(logger) => {
                                let period = clamp_log_interval(interval);
                                let mut timer = interval_at(Instant::now() + period, period);
                                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                                logging = Some(LogSession { logger, timer });
                                let _ = event_tx.send(SupplyEvent::LoggingStarted { path });
                            }
                            Err(e) => {
                                warn!("Failed to open log file {}: {}", path.display(), e);
                                let _ = event_tx.send(SupplyEvent::Error(format!(
                                    "Failed to open log file {}: {}",
                                    path.display(),
                                    e
                                )));
                            }
                        }
                    }
                    Some(SupplyTaskCommand::StopLogging) => {
                        stop_logging(&mut logging, &event_tx);
                    }
                    Some(SupplyTaskCommand::SetRefreshInterval(period)) => {
                        debug!("Refresh interval set to {:?}", period);
                        refresh = refresh_timer(period);
                    }
                    Some(SupplyTaskCommand::Shutdown) => {
                        info!("Shutdown requested for supply task");
                        break;
                    }
                    None => {
                        debug!("Command channel closed for supply task");
                        break;
                    }
                }
            }
        }

        if !controller.is_connected() {
            break;
        }
    }

    stop_logging(&mut logging, &event_tx);
    controller.disconnect().await;
    let _ = event_tx.send(SupplyEvent::Disconnected);
    info!("Supply task ended");
}

fn report_error<S: PowerSupply>(
    controller: &DcsController<S>,
    event_tx: &mpsc::UnboundedSender<SupplyEvent>,
) {
    if let Some(message) = controller.last_error() {
        let _ = event_tx.send(SupplyEvent::Error(message.to_string()));
    }
}

fn report_setpoint<S: PowerSupply>(
    controller: &DcsController<S>,
    event_tx: &mpsc::UnboundedSender<SupplyEvent>,
    quantity: Quantity,
    value: f64,
    applied: bool,
) {
    let event = if applied {
        info!("{} set to {:.3} {}", quantity, value, quantity.unit());
        SupplyEvent::SetpointApplied { quantity, value }
    } else {
        SupplyEvent::SetpointFailed {
            quantity,
            value,
            reason: controller.last_error().unwrap_or("unknown error").to_string(),
        }
    };
    let _ = event_tx.send(event);
}

fn stop_logging(logging: &mut Option<LogSession>, event_tx: &mpsc::UnboundedSender<SupplyEvent>) {
    let Some(mut session) = logging.take() else {
        return;
    };
    if let Err(e) = session.logger.close() {
        warn!("Error closing log file: {}", e);
    }
    info!(
        "Logging stopped after {} rows to {}",
        session.logger.rows(),
        session.logger.path().display()
    );
    let _ = event_tx.send(SupplyEvent::LoggingStopped {
        path: session.logger.path().to_path_buf(),
        rows: session.logger.rows(),
    });
}
