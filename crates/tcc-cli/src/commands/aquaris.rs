//! Aquaris command implementation.
//!
//! Writes are confirmed by the device state: after a successful command the
//! next poll is awaited and the reported state printed, so what is shown is
//! always what the cooler says, never what was asked for.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tcc_core::{AquarisClient, Command, SessionEvent};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::{AquarisAction, OutputFormat};
use crate::format::{format_aquaris_json, format_aquaris_text, format_snapshot_line};
use crate::util::{open_stream, require_outcome, write_output};

/// How long to wait for the poll that follows a write.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn cmd_aquaris(
    client: &AquarisClient,
    action: AquarisAction,
    output: Option<&PathBuf>,
    quiet: bool,
    no_color: bool,
) -> Result<()> {
    let result = match action {
        AquarisAction::Status { format } => show_state(client, format, output, no_color),
        AquarisAction::Watch { count, format } => watch(client, count, format, output, quiet).await,
        AquarisAction::Led { color, mode, off } => {
            let command = match color {
                Some(color) if !off => Command::SetLed { color, mode },
                _ => Command::LedOff,
            };
            apply(client, command, "LED", quiet, no_color).await
        }
        AquarisAction::Fan { duty, off } => {
            let command = match duty {
                Some(duty_cycle) if !off => Command::SetFan { duty_cycle },
                _ => Command::FanOff,
            };
            apply(client, command, "fan", quiet, no_color).await
        }
        AquarisAction::Pump { duty, voltage, off } => {
            let command = match duty {
                Some(duty_cycle) if !off => Command::SetPump {
                    duty_cycle,
                    voltage,
                },
                _ => Command::PumpOff,
            };
            apply(client, command, "pump", quiet, no_color).await
        }
    };

    if let Err(e) = client.disconnect().await {
        tracing::warn!("Failed to close cooler connection: {}", e);
    }
    result
}

fn show_state(
    client: &AquarisClient,
    format: OutputFormat,
    output: Option<&PathBuf>,
    no_color: bool,
) -> Result<()> {
    let Some(state) = client.state() else {
        bail!("The cooler has not reported its state");
    };
    let firmware = client.firmware_version();
    let content = match format {
        OutputFormat::Json => format_aquaris_json(&state, firmware.as_deref())?,
        OutputFormat::Text => format_aquaris_text(&state, firmware.as_deref(), no_color),
    };
    write_output(output, &content)
}

/// Dispatch `command`, then print the state from the next poll.
async fn apply(
    client: &AquarisClient,
    command: Command,
    what: &str,
    quiet: bool,
    no_color: bool,
) -> Result<()> {
    let mut states = client.subscribe_state();
    states.borrow_and_update();

    tracing::debug!("Sending {}", command);
    require_outcome(client.dispatch(command).await, what)?;

    if quiet {
        return Ok(());
    }
    match tokio::time::timeout(CONFIRM_TIMEOUT, states.changed()).await {
        Ok(Ok(())) => {
            if let Some(state) = client.state() {
                eprint!("{}", format_aquaris_text(&state, None, no_color));
            }
        }
        _ => eprintln!("Sent; the cooler has not reported back yet."),
    }
    Ok(())
}

async fn watch(
    client: &AquarisClient,
    count: u32,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
) -> Result<()> {
    let mut out = open_stream(output)?;
    let mut states = client.subscribe_state();
    let mut events = client.events();
    let mut printed: u32 = 0;

    if !quiet {
        eprintln!("Watching cooler state. Press Ctrl+C to stop.");
    }

    // The state read on connect counts as the first sample
    states.mark_changed();

    loop {
        if count > 0 && printed >= count {
            return Ok(());
        }

        tokio::select! {
            changed = states.changed() => {
                changed.context("Cooler state channel closed")?;
                let Some(snapshot) = states.borrow_and_update().clone() else {
                    continue;
                };
                let line = match format {
                    OutputFormat::Json => format_aquaris_json(&snapshot.state, None)?,
                    OutputFormat::Text => format_snapshot_line(&snapshot),
                };
                out.write_all(line.as_bytes())?;
                printed += 1;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Disconnected { reason, .. }) => {
                    bail!("Cooler connection ended: {}", reason);
                }
                Ok(SessionEvent::PollFailed { consecutive, error }) => {
                    tracing::warn!("Poll failed ({} in a row): {}", consecutive, error);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
