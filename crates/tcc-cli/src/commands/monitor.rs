//! Monitor command implementation.
//!
//! Prints daemon signals as they arrive. Runs until interrupted or until the
//! daemon goes away.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use tcc_core::{SessionEvent, TccdClient};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::util::open_stream;

pub async fn cmd_monitor(tccd: &TccdClient, output: Option<&PathBuf>, quiet: bool) -> Result<()> {
    let mut out = open_stream(output)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = tccd.on_mode_reapply_pending_changed(move |pending| {
        let _ = tx.send(pending);
    });
    let mut events = tccd.events();

    if !quiet {
        eprintln!("Watching daemon signals. Press Ctrl+C to stop.");
    }

    let result = loop {
        tokio::select! {
            Some(pending) = rx.recv() => {
                writeln!(out, "{}", format_mode_reapply(pending))?;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Disconnected { reason, .. }) => {
                    break Err(anyhow::anyhow!("Daemon connection ended: {}", reason));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break Ok(()),
            },
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    tccd.unsubscribe(subscription);
    result
}

fn format_mode_reapply(pending: bool) -> String {
    if pending {
        "ModeReapplyPendingChanged: power mode needs to be re-applied".to_string()
    } else {
        "ModeReapplyPendingChanged: power mode re-applied".to_string()
    }
}
