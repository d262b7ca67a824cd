//! Integration tests for DCS control
//!
//! These tests connect the real driver to a simulated supply over an
//! in-memory duplex stream and verify:
//! - The connection handshake and ratings discovery
//! - Setpoint programming, read-back verification and range checks
//! - Controller error handling
//! - The supply task's refresh and logging timers

use std::time::Duration;

use dcs_control::{
    run_supply_task, DcsController, DcsSupply, PowerSupply, Quantity, SupplyError, SupplyEvent,
    SupplyTaskCommand, SupplyTaskConfig, CSV_HEADER,
};
use dcs_protocol::Ratings;
use dcs_sim::{
    run_virtual_supply_task, VirtualSupply, VirtualSupplyCommand, VirtualSupplyConfig,
    VirtualSupplyState,
};
use tokio::io::DuplexStream;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub const TIMEOUT: Duration = Duration::from_millis(200);

    /// Handles for steering and observing a running simulated supply
    pub struct Sim {
        pub cmd_tx: mpsc::Sender<VirtualSupplyCommand>,
        pub state_rx: broadcast::Receiver<VirtualSupplyState>,
    }

    /// Spawn a simulated supply and return the driver's end of the link
    pub fn spawn_sim(config: VirtualSupplyConfig) -> (DuplexStream, Sim) {
        let (client, sim_stream) = tokio::io::duplex(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, state_rx) = broadcast::channel(64);
        tokio::spawn(run_virtual_supply_task(
            sim_stream,
            VirtualSupply::new(config),
            cmd_rx,
            state_tx,
        ));
        (client, Sim { cmd_tx, state_rx })
    }

    /// Connect the driver to a default DCS60-18E simulation
    pub async fn connect_sim() -> (DcsSupply<DuplexStream>, Sim) {
        let (io, sim) = spawn_sim(VirtualSupplyConfig::default());
        let supply = DcsSupply::open(io, TIMEOUT).await.unwrap();
        (supply, sim)
    }

    /// Wait for the first event matching `pred`, skipping others
    pub async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<SupplyEvent>, pred: F) -> SupplyEvent
    where
        F: Fn(&SupplyEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = rx.recv().await.expect("supply task ended early");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// First simulator state back under local control after remote use
    pub async fn wait_for_local(sim: &mut Sim) -> VirtualSupplyState {
        tokio::time::timeout(Duration::from_secs(1), async {
            let mut was_remote = false;
            loop {
                let state = sim.state_rx.recv().await.unwrap();
                if state.remote {
                    was_remote = true;
                } else if was_remote {
                    return state;
                }
            }
        })
        .await
        .unwrap()
    }

    pub fn scratch_csv(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("dcs-control-it-{}-{}", std::process::id(), name))
            .join("session.csv")
    }
}

use helpers::*;

// ============================================================================
// Driver Tests
// ============================================================================

mod driver_tests {
    use super::*;

    #[tokio::test]
    async fn handshake_identifies_supply() {
        let (mut supply, _sim) = connect_sim().await;

        assert_eq!(supply.model(), "DCS60-18E");
        assert_eq!(supply.serial_number(), "SIM0001");
        assert_eq!(supply.identity().manufacturer, "SORENSEN");

        let identity = supply.identify().await.unwrap();
        assert_eq!(identity.raw, "SORENSEN,DCS60-18E,SIM0001,1.0");
    }

    #[tokio::test]
    async fn ratings_from_model_designation() {
        let (io, _sim) = spawn_sim(VirtualSupplyConfig {
            model: "DCS150-7E".to_string(),
            ..VirtualSupplyConfig::default()
        });
        let supply = DcsSupply::open(io, TIMEOUT).await.unwrap();

        assert_eq!(supply.max_voltage(), 150.0);
        assert_eq!(supply.max_current(), 7.0);
    }

    #[tokio::test]
    async fn ratings_queried_when_model_has_none() {
        let (io, _sim) = spawn_sim(VirtualSupplyConfig {
            model: "BENCH".to_string(),
            ..VirtualSupplyConfig::default()
        });
        let supply = DcsSupply::open(io, TIMEOUT).await.unwrap();

        assert_eq!(supply.max_voltage(), 60.0);
        assert_eq!(supply.max_current(), 18.0);
    }

    #[tokio::test]
    async fn queried_limits_follow_the_supply() {
        let (io, _sim) = spawn_sim(VirtualSupplyConfig {
            model: "XG 150-5.6".to_string(),
            ratings: Some(Ratings {
                max_voltage: 150.0,
                max_current: 5.6,
            }),
            ..VirtualSupplyConfig::default()
        });
        let mut supply = DcsSupply::open(io, TIMEOUT).await.unwrap();

        assert_eq!(supply.ratings().max_voltage, 150.0);
        assert_eq!(supply.max_current(), 5.6);
        supply.set_output_voltage(120.0).await.unwrap();
    }

    #[tokio::test]
    async fn setpoints_program_and_measure() {
        let (mut supply, _sim) = connect_sim().await;

        supply.set_output_current(2.0).await.unwrap();
        supply.set_output_voltage(12.0).await.unwrap();

        // 12 V into the default 10 ohm load
        let reading = supply.measure().await.unwrap();
        assert_eq!(reading.voltage, 12.0);
        assert_eq!(reading.current, 1.2);
    }

    #[tokio::test]
    async fn current_limit_takes_over() {
        let (mut supply, sim) = connect_sim().await;
        sim.cmd_tx
            .send(VirtualSupplyCommand::SetLoad(Some(2.0)))
            .await
            .unwrap();

        supply.set_output_current(1.5).await.unwrap();
        supply.set_output_voltage(12.0).await.unwrap();

        assert_eq!(supply.output_current().await.unwrap(), 1.5);
        assert_eq!(supply.output_voltage().await.unwrap(), 3.0);
    }

    #[tokio::test]
    async fn out_of_range_setpoint_rejected() {
        let (mut supply, _sim) = connect_sim().await;

        let err = supply.set_output_voltage(61.0).await.unwrap_err();
        assert!(matches!(
            err,
            SupplyError::OutOfRange { quantity: Quantity::Voltage, max, .. } if max == 60.0
        ));

        let err = supply.set_output_current(-1.0).await.unwrap_err();
        assert!(matches!(err, SupplyError::OutOfRange { quantity: Quantity::Current, .. }));
    }

    #[tokio::test]
    async fn silent_supply_times_out() {
        let (mut supply, sim) = connect_sim().await;
        sim.cmd_tx
            .send(VirtualSupplyCommand::SetSilent(true))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = supply.output_voltage().await.unwrap_err();
        assert!(matches!(err, SupplyError::Timeout { ref command, .. } if command == "MEAS:VOLT?"));
    }

    #[tokio::test]
    async fn disconnect_returns_to_local() {
        let (mut supply, mut sim) = connect_sim().await;
        supply.set_output_voltage(5.0).await.unwrap();

        supply.disconnect().await.unwrap();

        let state = wait_for_local(&mut sim).await;
        assert_eq!(state.voltage_setpoint, 5.0);
    }
}

// ============================================================================
// Controller Tests
// ============================================================================

mod controller_tests {
    use super::*;

    #[tokio::test]
    async fn controller_reports_values() {
        let (supply, _sim) = connect_sim().await;
        let mut controller = DcsController::with_supply(supply);

        assert!(controller.is_connected());
        assert_eq!(controller.model().as_deref(), Some("DCS60-18E"));
        assert_eq!(controller.max_current(), Some(18.0));

        assert!(controller.set_current(1.0).await);
        assert!(controller.set_voltage(5.0).await);
        let m = controller.measurements().await.unwrap();
        assert_eq!((m.voltage, m.current), (5.0, 0.5));
    }

    #[tokio::test]
    async fn controller_absorbs_driver_errors() {
        let (supply, _sim) = connect_sim().await;
        let mut controller = DcsController::with_supply(supply);

        assert!(!controller.set_voltage(100.0).await);
        assert!(controller.last_error().unwrap().contains("voltage"));
        assert!(controller.is_connected());
    }

    #[tokio::test]
    async fn controller_drops_closed_connection() {
        let (supply, sim) = connect_sim().await;
        let mut controller = DcsController::with_supply(supply);

        sim.cmd_tx.send(VirtualSupplyCommand::Shutdown).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(controller.measurements().await.is_none());
        assert!(!controller.is_connected());
    }
}

// ============================================================================
// Supply Task Tests
// ============================================================================

mod task_tests {
    use super::*;

    fn spawn_task(
        supply: DcsSupply<DuplexStream>,
        refresh: Duration,
    ) -> (
        mpsc::Sender<SupplyTaskCommand>,
        mpsc::UnboundedReceiver<SupplyEvent>,
        tokio::task::JoinHandle<()>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_supply_task(
            DcsController::with_supply(supply),
            SupplyTaskConfig {
                refresh_interval: refresh,
            },
            cmd_rx,
            event_tx,
        ));
        (cmd_tx, event_rx, handle)
    }

    #[tokio::test]
    async fn task_announces_supply_and_refreshes() {
        let (supply, _sim) = connect_sim().await;
        let (cmd_tx, mut events, handle) = spawn_task(supply, Duration::from_millis(50));

        let SupplyEvent::Connected(info) =
            wait_for(&mut events, |e| matches!(e, SupplyEvent::Connected(_))).await
        else {
            unreachable!()
        };
        assert_eq!(info.model, "DCS60-18E");
        assert_eq!(info.max_voltage, 60.0);

        for _ in 0..2 {
            wait_for(&mut events, |e| matches!(e, SupplyEvent::Reading(_))).await;
        }

        cmd_tx.send(SupplyTaskCommand::Shutdown).await.unwrap();
        wait_for(&mut events, |e| matches!(e, SupplyEvent::Disconnected)).await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn task_applies_setpoints() {
        let (supply, _sim) = connect_sim().await;
        let (cmd_tx, mut events, _handle) = spawn_task(supply, Duration::from_secs(5));

        cmd_tx.send(SupplyTaskCommand::SetVoltage(24.0)).await.unwrap();
        let event = wait_for(&mut events, |e| {
            matches!(
                e,
                SupplyEvent::SetpointApplied { .. } | SupplyEvent::SetpointFailed { .. }
            )
        })
        .await;
        assert!(matches!(
            event,
            SupplyEvent::SetpointApplied { quantity: Quantity::Voltage, value } if value == 24.0
        ));

        cmd_tx.send(SupplyTaskCommand::SetCurrent(99.0)).await.unwrap();
        let event = wait_for(&mut events, |e| {
            matches!(
                e,
                SupplyEvent::SetpointApplied { .. } | SupplyEvent::SetpointFailed { .. }
            )
        })
        .await;
        assert!(matches!(
            event,
            SupplyEvent::SetpointFailed { quantity: Quantity::Current, .. }
        ));
    }

    #[tokio::test]
    async fn task_writes_log_rows_on_interval() {
        let (supply, _sim) = connect_sim().await;
        let (cmd_tx, mut events, handle) = spawn_task(supply, Duration::from_secs(5));
        let path = scratch_csv("interval");

        cmd_tx
            .send(SupplyTaskCommand::StartLogging {
                path: path.clone(),
                interval: Duration::from_millis(100),
            })
            .await
            .unwrap();
        wait_for(&mut events, |e| matches!(e, SupplyEvent::LoggingStarted { .. })).await;

        tokio::time::sleep(Duration::from_millis(350)).await;
        cmd_tx.send(SupplyTaskCommand::StopLogging).await.unwrap();

        let SupplyEvent::LoggingStopped { rows, path: logged } =
            wait_for(&mut events, |e| matches!(e, SupplyEvent::LoggingStopped { .. })).await
        else {
            unreachable!()
        };
        assert_eq!(logged, path);
        assert!(rows >= 2, "expected at least 2 rows, got {}", rows);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), rows + 1);
        assert!(lines[1].ends_with(",0.000,0.000"));

        cmd_tx.send(SupplyTaskCommand::Shutdown).await.unwrap();
        handle.await.unwrap();
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn shutdown_closes_log_and_returns_to_local() {
        let (supply, mut sim) = connect_sim().await;
        let (cmd_tx, mut events, handle) = spawn_task(supply, Duration::from_secs(5));
        let path = scratch_csv("shutdown");

        cmd_tx
            .send(SupplyTaskCommand::StartLogging {
                path: path.clone(),
                interval: Duration::from_secs(10),
            })
            .await
            .unwrap();
        wait_for(&mut events, |e| matches!(e, SupplyEvent::LoggingStarted { .. })).await;

        cmd_tx.send(SupplyTaskCommand::Shutdown).await.unwrap();
        let event = wait_for(&mut events, |e| matches!(e, SupplyEvent::LoggingStopped { .. })).await;
        assert!(matches!(event, SupplyEvent::LoggingStopped { rows: 0, .. }));
        wait_for(&mut events, |e| matches!(e, SupplyEvent::Disconnected)).await;
        handle.await.unwrap();

        wait_for_local(&mut sim).await;
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn task_ends_when_supply_goes_away() {
        let (supply, sim) = connect_sim().await;
        let (_cmd_tx, mut events, handle) = spawn_task(supply, Duration::from_millis(50));

        wait_for(&mut events, |e| matches!(e, SupplyEvent::Reading(_))).await;
        sim.cmd_tx.send(VirtualSupplyCommand::Shutdown).await.unwrap();

        wait_for(&mut events, |e| matches!(e, SupplyEvent::Disconnected)).await;
        handle.await.unwrap();
    }
}
