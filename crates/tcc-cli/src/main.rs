use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;
mod util;

use cli::{Cli, Commands};
use commands::{
    cmd_aquaris, cmd_charging, cmd_config, cmd_fn_lock, cmd_monitor, cmd_profiles, cmd_status,
    load_checked,
};
use util::{connect_aquaris, connect_daemon};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let output = cli.output.as_ref();
    let (quiet, no_color) = (cli.quiet, cli.no_color);

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "tccctl", &mut io::stdout());
            Ok(())
        }
        Commands::Config { action } => cmd_config(action, &config_path, output, quiet),
        Commands::Status { daemon, format } => {
            let config = load_checked(&config_path)?;
            let tccd = connect_daemon(&daemon, &config).await?;
            let result = cmd_status(&tccd, format, output, no_color).await;
            tccd.disconnect().await.ok();
            result
        }
        Commands::Charging { daemon, action } => {
            let config = load_checked(&config_path)?;
            let tccd = connect_daemon(&daemon, &config).await?;
            let result = cmd_charging(&tccd, action, output, quiet, no_color).await;
            tccd.disconnect().await.ok();
            result
        }
        Commands::FnLock { daemon, state } => {
            let config = load_checked(&config_path)?;
            let tccd = connect_daemon(&daemon, &config).await?;
            let result = cmd_fn_lock(&tccd, state, output, quiet, no_color).await;
            tccd.disconnect().await.ok();
            result
        }
        Commands::Profiles { daemon, action } => {
            let config = load_checked(&config_path)?;
            let tccd = connect_daemon(&daemon, &config).await?;
            let result = cmd_profiles(&tccd, action, output, quiet, no_color).await;
            tccd.disconnect().await.ok();
            result
        }
        Commands::Monitor { daemon } => {
            let config = load_checked(&config_path)?;
            let tccd = connect_daemon(&daemon, &config).await?;
            let result = cmd_monitor(&tccd, output, quiet).await;
            tccd.disconnect().await.ok();
            result
        }
        Commands::Aquaris { device, action } => {
            let config = load_checked(&config_path)?;
            let client = connect_aquaris(&device, &config).await?;
            cmd_aquaris(&client, action, output, quiet, no_color).await
        }
    }
}
