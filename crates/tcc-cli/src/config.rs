//! Configuration file for `tccctl`.
//!
//! Lives at `<config dir>/tcc/tccctl.toml` and has one table per endpoint:
//!
//! ```toml
//! [daemon]
//! socket = "/run/tccd/tccd.sock"
//! target = "com.tuxedocomputers.tccd"
//! connect_timeout = 10
//! call_timeout = 5
//!
//! [aquaris]
//! socket = "/run/tccd/aquaris.sock"
//! device = "AA:BB:CC:DD:EE:FF"
//! poll_interval_ms = 1000
//! max_failures = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tcc_core::tccd::methods;
use tcc_core::{SessionOptions, SyncOptions};

/// Fastest poll interval accepted from the config file.
const MIN_POLL_INTERVAL_MS: u64 = 100;
/// Slowest poll interval accepted from the config file.
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hardware-control daemon connection.
    pub daemon: DaemonConfig,
    /// Liquid-cooler connection.
    pub aquaris: AquarisConfig,
}

impl Config {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = self.daemon.validate();
        errors.extend(self.aquaris.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// `[daemon]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Socket the daemon listens on.
    pub socket: PathBuf,
    /// Bus name passed in the open handshake.
    pub target: String,
    /// Connect timeout in seconds.
    pub connect_timeout: u64,
    /// Per-call timeout in seconds, 0 for none.
    pub call_timeout: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from("/run/tccd/tccd.sock"),
            target: "com.tuxedocomputers.tccd".to_string(),
            connect_timeout: 10,
            call_timeout: 5,
        }
    }
}

impl DaemonConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.socket.as_os_str().is_empty() {
            errors.push(ValidationError::new("daemon.socket", "must not be empty"));
        }
        if self.target.trim().is_empty() {
            errors.push(ValidationError::new("daemon.target", "must not be empty"));
        }
        if self.connect_timeout == 0 {
            errors.push(ValidationError::new(
                "daemon.connect_timeout",
                "must be at least 1 second",
            ));
        }
        errors
    }

    /// Session options for the daemon client.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::default()
            .probe_method(methods::TUXEDO_WMI_AVAILABLE)
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .call_timeout(optional_secs(self.call_timeout))
    }
}

/// `[aquaris]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AquarisConfig {
    /// Socket of the service bridging to the cooler.
    pub socket: PathBuf,
    /// Default device address.
    pub device: Option<String>,
    /// Connect timeout in seconds.
    pub connect_timeout: u64,
    /// Time between state polls.
    pub poll_interval_ms: u64,
    /// Failed polls in a row before giving up on the device. Unset keeps
    /// polling forever.
    pub max_failures: Option<u32>,
}

impl Default for AquarisConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from("/run/tccd/aquaris.sock"),
            device: None,
            connect_timeout: 10,
            poll_interval_ms: 1000,
            max_failures: None,
        }
    }
}

impl AquarisConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.socket.as_os_str().is_empty() {
            errors.push(ValidationError::new("aquaris.socket", "must not be empty"));
        }
        if let Some(device) = &self.device
            && device.trim().is_empty()
        {
            errors.push(ValidationError::new(
                "aquaris.device",
                "must not be empty when set",
            ));
        }
        if self.connect_timeout == 0 {
            errors.push(ValidationError::new(
                "aquaris.connect_timeout",
                "must be at least 1 second",
            ));
        }
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            errors.push(ValidationError::new(
                "aquaris.poll_interval_ms",
                format!(
                    "must be between {} and {} ms, got {}",
                    MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS, self.poll_interval_ms
                ),
            ));
        }
        if self.max_failures == Some(0) {
            errors.push(ValidationError::new(
                "aquaris.max_failures",
                "must be at least 1 when set",
            ));
        }
        errors
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::default().connect_timeout(Duration::from_secs(self.connect_timeout))
    }

    pub fn sync_options(&self) -> SyncOptions {
        let builder =
            SyncOptions::builder().poll_interval(Duration::from_millis(self.poll_interval_ms));
        match self.max_failures {
            Some(max) => builder.max_consecutive_failures(max).build(),
            None => builder.build(),
        }
    }
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field path (e.g., `aquaris.poll_interval_ms`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tcc")
        .join("tccctl.toml")
}
