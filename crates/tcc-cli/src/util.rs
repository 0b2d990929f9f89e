//! Utility functions for CLI operations.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tcc_core::{AquarisClient, CommandOutcome, IpcTransport, TccdClient};

use crate::cli::{AquarisArgs, DaemonArgs};
use crate::config::Config;

/// Write output to file or stdout.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Open the destination for streaming commands, which write line by line.
pub fn open_stream(output: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(io::LineWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

/// Connect to the daemon, with CLI flags taking precedence over the config.
pub async fn connect_daemon(args: &DaemonArgs, config: &Config) -> Result<TccdClient> {
    let mut daemon = config.daemon.clone();
    if let Some(socket) = &args.socket {
        daemon.socket = socket.clone();
    }
    if let Some(timeout) = args.timeout {
        daemon.connect_timeout = timeout;
    }

    let transport = Arc::new(IpcTransport::new(&daemon.socket));
    let client = TccdClient::with_options(transport, daemon.session_options())
        .context("Invalid daemon connection options")?;

    if !client.init(&daemon.target).await {
        bail!(
            "Could not reach the control center daemon at {}.\n\
             Is tccd running? Use --socket or TCCD_SOCKET to point at another socket.",
            daemon.socket.display()
        );
    }
    tracing::debug!("Connected to daemon at {}", daemon.socket.display());
    Ok(client)
}

/// Connect to the cooler, with CLI flags taking precedence over the config.
pub async fn connect_aquaris(args: &AquarisArgs, config: &Config) -> Result<AquarisClient> {
    let mut aquaris = config.aquaris.clone();
    if let Some(socket) = &args.socket {
        aquaris.socket = socket.clone();
    }
    if let Some(timeout) = args.timeout {
        aquaris.connect_timeout = timeout;
    }
    let device = require_device(args.device.clone().or(aquaris.device.clone()))?;

    let transport = Arc::new(IpcTransport::new(&aquaris.socket));
    let client =
        AquarisClient::with_options(transport, aquaris.session_options(), aquaris.sync_options())
            .context("Invalid cooler connection options")?;

    client
        .connect(&device)
        .await
        .with_context(|| format!("Failed to connect to cooler {}", device))?;
    Ok(client)
}

/// Get the device address, with a helpful error message.
pub fn require_device(device: Option<String>) -> Result<String> {
    device.filter(|d| !d.trim().is_empty()).ok_or_else(|| {
        anyhow::anyhow!(
            "No device specified. Use --device <ADDRESS>, set AQUARIS_DEVICE, \
             or set `device` in the [aquaris] config table."
        )
    })
}

/// Turn a daemon setter's `bool` into a CLI result.
pub fn require_applied(applied: bool, what: &str) -> Result<()> {
    if applied {
        Ok(())
    } else {
        bail!("The daemon did not accept the new {}", what)
    }
}

/// Turn a cooler command outcome into a CLI result.
pub fn require_outcome(outcome: CommandOutcome, what: &str) -> Result<()> {
    match outcome {
        CommandOutcome::Applied => Ok(()),
        CommandOutcome::NotConnected => bail!("Cannot set {}: cooler is not connected", what),
        CommandOutcome::Invalid(reason) => bail!("Invalid {}: {}", what, reason),
        CommandOutcome::Failed(reason) => bail!("Failed to set {}: {}", what, reason),
    }
}
