//! Config command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::cli::ConfigAction;
use crate::config::{Config, ConfigError};
use crate::util::write_output;

pub fn cmd_config(
    action: ConfigAction,
    path: &Path,
    output: Option<&PathBuf>,
    quiet: bool,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_or_default(path)?;
            let content =
                toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
            write_output(output, &content)?;
        }
        ConfigAction::Path => {
            write_output(output, &format!("{}\n", path.display()))?;
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "{} already exists. Use --force to overwrite it.",
                    path.display()
                );
            }
            Config::default().save(path)?;
            if !quiet {
                eprintln!("Wrote default configuration to {}", path.display());
            }
        }
        ConfigAction::Validate => {
            if !path.exists() {
                bail!("No configuration file at {}", path.display());
            }
            Config::load_validated(path)?;
            if !quiet {
                eprintln!("{} is valid", path.display());
            }
        }
    }
    Ok(())
}

/// The configuration at `path`, or defaults when there is no file.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        Config::load(path)
    } else {
        Ok(Config::default())
    }
}

/// Load and validate the configuration a device command runs with.
pub fn load_checked(path: &Path) -> Result<Config> {
    let config = load_or_default(path)?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    tracing::debug!("Using configuration from {}", path.display());
    Ok(config)
}
