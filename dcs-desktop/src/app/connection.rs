//! Supply connection management
//!
//! Every connection, real or simulated, ends up as a `run_supply_task` on the
//! runtime. The UI keeps the command sender and the event receiver.

use std::time::Duration;

use dcs_control::{
    run_supply_task, DcsController, DcsSupply, SupplyEvent, SupplyTaskCommand, SupplyTaskConfig,
};
use dcs_sim::{run_virtual_supply_task, VirtualSupply, VirtualSupplyCommand};
use tokio::sync::{broadcast, mpsc as tokio_mpsc};
use tokio::task::JoinHandle;

use crate::settings::ConnectionKind;

use super::{DcsApp, SimulatedLink, SupplySession};

/// Port name shown for the simulated supply
pub(super) const SIMULATED_PORT: &str = "[SIMULATED]";

/// Default load when the simulated supply starts open-circuit
const DEFAULT_SIM_LOAD_OHMS: f64 = 10.0;

impl DcsApp {
    /// Connect using the selected connection kind
    pub(super) fn connect(&mut self) {
        if self.session.is_some() {
            return;
        }

        let (cmd_tx, cmd_rx) = tokio_mpsc::channel::<SupplyTaskCommand>(32);
        let (event_tx, event_rx) = tokio_mpsc::unbounded_channel::<SupplyEvent>();
        let timeout = self.settings.connect_timeout();
        let config = self.settings.task_config();
        let kind = self.settings.connection;

        let (port, task, sim) = match kind {
            ConnectionKind::SerialPort => {
                let port = self.selected_port.trim().to_string();
                if port.is_empty() {
                    self.set_status("No port selected".into());
                    return;
                }
                let task = self.spawn_serial(port.clone(), timeout, config, cmd_rx, event_tx);
                (port, task, None)
            }
            ConnectionKind::Simulated => {
                let (task, sim) = self.spawn_simulated(timeout, config, cmd_rx, event_tx);
                (SIMULATED_PORT.to_string(), task, Some(sim))
            }
        };

        self.set_status(format!("Connecting to {}...", port));
        self.session = Some(SupplySession {
            kind,
            port,
            cmd_tx,
            task,
            event_rx,
            info: None,
            reading: None,
            log_path: None,
            closing: false,
            sim,
        });
    }

    /// Ask the supply task to return the supply to local control and stop
    pub(super) fn disconnect(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.closing {
            return;
        }

        session.closing = true;
        if let Err(e) = session.cmd_tx.try_send(SupplyTaskCommand::Shutdown) {
            // Dropping the sender ends the task too
            tracing::debug!("Supply task not accepting commands: {}", e);
            self.close_session();
        }
    }

    /// Forget the session, shutting down its simulated supply if any
    pub(super) fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Some(sim) = session.sim {
                let _ = sim.cmd_tx.try_send(VirtualSupplyCommand::Shutdown);
            }
        }
    }

    /// Send a command to the supply task, logging a warning if it is not accepted
    pub(super) fn send_task_command(&mut self, cmd: SupplyTaskCommand, context: &str) {
        let Some(session) = &self.session else {
            return;
        };
        if let Err(e) = session.cmd_tx.try_send(cmd) {
            self.report_warning(
                "Supply",
                format!("Failed to send {} command: {} (channel full or closed)", context, e),
            );
        }
    }

    /// Send a command to the simulated supply behind the session
    pub(super) fn send_sim_command(&mut self, cmd: VirtualSupplyCommand) {
        let Some(sim) = self.session.as_ref().and_then(|s| s.sim.as_ref()) else {
            return;
        };
        if let Err(e) = sim.cmd_tx.try_send(cmd) {
            tracing::warn!(source = "Simulation", "Failed to send command: {}", e);
        }
    }

    fn spawn_serial(
        &self,
        port: String,
        timeout: Duration,
        config: SupplyTaskConfig,
        cmd_rx: tokio_mpsc::Receiver<SupplyTaskCommand>,
        event_tx: tokio_mpsc::UnboundedSender<SupplyEvent>,
    ) -> JoinHandle<()> {
        let baud_rate = self.settings.baud_rate;
        self.rt_handle.spawn(async move {
            let mut controller: DcsController = DcsController::new();
            if controller.connect(&port, baud_rate, timeout).await {
                run_supply_task(controller, config, cmd_rx, event_tx).await;
            } else {
                let reason = controller
                    .last_error()
                    .unwrap_or("connection failed")
                    .to_string();
                let _ = event_tx.send(SupplyEvent::Error(reason));
                let _ = event_tx.send(SupplyEvent::Disconnected);
            }
        })
    }

    /// Start a simulated supply on one end of an in-memory pipe and a
    /// supply task on the other
    fn spawn_simulated(
        &self,
        timeout: Duration,
        config: SupplyTaskConfig,
        cmd_rx: tokio_mpsc::Receiver<SupplyTaskCommand>,
        event_tx: tokio_mpsc::UnboundedSender<SupplyEvent>,
    ) -> (JoinHandle<()>, SimulatedLink) {
        let (host, device) = tokio::io::duplex(1024);
        let (sim_cmd_tx, sim_cmd_rx) = tokio_mpsc::channel::<VirtualSupplyCommand>(16);
        let (state_tx, state_rx) = broadcast::channel(64);

        let supply = VirtualSupply::new(self.settings.simulated.clone());
        let load = supply.config().load_ohms;

        self.rt_handle.spawn(async move {
            if let Err(e) = run_virtual_supply_task(device, supply, sim_cmd_rx, state_tx).await {
                tracing::warn!(source = "Simulation", "Simulated supply stopped: {}", e);
            }
        });

        let task = self.rt_handle.spawn(async move {
            match DcsSupply::open(host, timeout).await {
                Ok(supply) => {
                    run_supply_task(DcsController::with_supply(supply), config, cmd_rx, event_tx)
                        .await;
                }
                Err(e) => {
                    let _ = event_tx.send(SupplyEvent::Error(format!("Error connecting: {}", e)));
                    let _ = event_tx.send(SupplyEvent::Disconnected);
                }
            }
        });

        let link = SimulatedLink {
            cmd_tx: sim_cmd_tx,
            state_rx,
            state: None,
            load_ohms: load.unwrap_or(DEFAULT_SIM_LOAD_OHMS),
            open_circuit: load.is_none(),
            silent: false,
        };
        (task, link)
    }
}
