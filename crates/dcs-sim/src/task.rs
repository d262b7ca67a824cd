//! Virtual supply actor task
//!
//! This module provides an async task that owns a [`VirtualSupply`] and
//! serves it over an async byte stream. The task uses a select! loop to:
//! - Read command lines from the stream and answer queries
//! - Handle control commands (load changes, silence, shutdown) from a channel
//! - Emit state snapshots via a broadcast channel when anything changes

use std::io;

use dcs_protocol::{decode_line, LineCodec, ProtocolCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::supply::{VirtualSupply, VirtualSupplyState};

/// Commands that can be sent to a virtual supply actor
#[derive(Debug, Clone)]
pub enum VirtualSupplyCommand {
    /// Change the load resistance (`None` is an open circuit)
    SetLoad(Option<f64>),
    /// Stop answering queries, as an unplugged cable would
    SetSilent(bool),
    /// Shutdown the virtual supply actor
    Shutdown,
}

/// Run the virtual supply actor task
///
/// Returns when the stream closes, the command channel closes, or a
/// shutdown command arrives.
pub async fn run_virtual_supply_task<S>(
    mut stream: S,
    mut supply: VirtualSupply,
    mut cmd_rx: mpsc::Receiver<VirtualSupplyCommand>,
    state_tx: broadcast::Sender<VirtualSupplyState>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = LineCodec::new();
    let mut buf = [0u8; 256];
    let mut silent = false;

    info!("Starting virtual supply task for {}", supply.config().model);
    let mut last_state = supply.state();
    let _ = state_tx.send(last_state);

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual supply stream closed");
                        break;
                    }
                    Ok(n) => {
                        codec.push_bytes(&buf[..n]);
                        while let Some(frame) = codec.next_frame() {
                            let line = match decode_line(&frame) {
                                Ok(line) => line,
                                Err(e) => {
                                    warn!("Virtual supply dropped frame: {}", e);
                                    continue;
                                }
                            };

                            let Some(response) = supply.handle_line(&line) else {
                                continue;
                            };
                            if silent {
                                debug!("Virtual supply silent, not answering {:?}", line);
                                continue;
                            }
                            stream.write_all(response.as_bytes()).await?;
                            stream.write_all(b"\r\n").await?;
                            stream.flush().await?;
                        }

                        let state = supply.state();
                        if state != last_state {
                            last_state = state;
                            let _ = state_tx.send(state);
                        }
                    }
                    Err(e) => {
                        warn!("Virtual supply stream error: {}", e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualSupplyCommand::SetLoad(ohms)) => {
                        info!("Virtual supply load set to {:?} ohm", ohms);
                        supply.set_load(ohms);
                        let state = supply.state();
                        if state != last_state {
                            last_state = state;
                            let _ = state_tx.send(state);
                        }
                    }
                    Some(VirtualSupplyCommand::SetSilent(value)) => {
                        info!("Virtual supply silent: {}", value);
                        silent = value;
                    }
                    Some(VirtualSupplyCommand::Shutdown) => {
                        info!("Shutdown requested for virtual supply");
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual supply");
                        break;
                    }
                }
            }
        }
    }

    info!("Virtual supply task ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};

    const WAIT: Duration = Duration::from_millis(200);

    async fn read_response<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> String {
        let mut line = String::new();
        tokio::time::timeout(WAIT, reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        line
    }

    #[tokio::test]
    async fn test_answers_identification_query() {
        let (client, supply_stream) = tokio::io::duplex(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, _state_rx) = broadcast::channel(8);
        let task = tokio::spawn(run_virtual_supply_task(
            supply_stream,
            VirtualSupply::default(),
            cmd_rx,
            state_tx,
        ));

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);

        write_half.write_all(b"*IDN?\r").await.unwrap();
        assert_eq!(
            read_response(&mut reader).await,
            "SORENSEN,DCS60-18E,SIM0001,1.0\r\n"
        );

        cmd_tx.send(VirtualSupplyCommand::Shutdown).await.unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_setpoint_change_emits_state() {
        let (mut client, supply_stream) = tokio::io::duplex(1024);
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, mut state_rx) = broadcast::channel(8);
        let task = tokio::spawn(run_virtual_supply_task(
            supply_stream,
            VirtualSupply::default(),
            cmd_rx,
            state_tx,
        ));

        let initial = state_rx.recv().await.unwrap();
        assert_eq!(initial.voltage_setpoint, 0.0);

        client.write_all(b"SOUR:CURR 1.5\rSOUR:VOLT 12\r").await.unwrap();

        let state = tokio::time::timeout(WAIT, state_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.voltage_setpoint, 12.0);
        assert_eq!(state.current_setpoint, 1.5);
        assert!(state.remote);

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_silent_supply_does_not_answer() {
        let (client, supply_stream) = tokio::io::duplex(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, _state_rx) = broadcast::channel(8);
        let task = tokio::spawn(run_virtual_supply_task(
            supply_stream,
            VirtualSupply::default(),
            cmd_rx,
            state_tx,
        ));

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);

        cmd_tx.send(VirtualSupplyCommand::SetSilent(true)).await.unwrap();
        tokio::task::yield_now().await;
        write_half.write_all(b"*IDN?\r").await.unwrap();

        let mut line = String::new();
        let result = tokio::time::timeout(WAIT, reader.read_line(&mut line)).await;
        assert!(result.is_err());

        cmd_tx.send(VirtualSupplyCommand::Shutdown).await.unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_command() {
        let (_client, supply_stream) = tokio::io::duplex(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, _state_rx) = broadcast::channel(8);
        let task = tokio::spawn(run_virtual_supply_task(
            supply_stream,
            VirtualSupply::default(),
            cmd_rx,
            state_tx,
        ));

        cmd_tx.send(VirtualSupplyCommand::Shutdown).await.unwrap();

        let result = tokio::time::timeout(WAIT, task).await.unwrap();
        assert!(result.is_ok());
    }
}
