//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tcc_core::ProfileFilter;
use tcc_types::{ChargeType, Rgb};

#[derive(Parser)]
#[command(name = "tccctl")]
#[command(
    author,
    version,
    about = "Control a TUXEDO laptop and its Aquaris liquid cooler",
    long_about = None
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Configuration file (default: <config dir>/tcc/tccctl.toml)
    #[arg(long, global = true, env = "TCCCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Daemon connection arguments, overriding the `[daemon]` config table
#[derive(Debug, Clone, Default, Args)]
pub struct DaemonArgs {
    /// Daemon socket path
    #[arg(long, env = "TCCD_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Connection timeout in seconds
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,
}

/// Cooler connection arguments, overriding the `[aquaris]` config table
#[derive(Debug, Clone, Default, Args)]
pub struct AquarisArgs {
    /// Device address, or use AQUARIS_DEVICE env var
    #[arg(short, long, env = "AQUARIS_DEVICE")]
    pub device: Option<String>,

    /// Cooler service socket path
    #[arg(long, env = "AQUARIS_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Connection timeout in seconds
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show daemon and hardware status
    Status {
        #[command(flatten)]
        daemon: DaemonArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show or change battery charging settings
    Charging {
        #[command(flatten)]
        daemon: DaemonArgs,

        #[command(subcommand)]
        action: ChargingAction,
    },

    /// Show or change the Fn-lock state
    FnLock {
        #[command(flatten)]
        daemon: DaemonArgs,

        /// New state; omit to show the current one
        #[arg(value_enum)]
        state: Option<Toggle>,
    },

    /// List, export and activate power profiles
    Profiles {
        #[command(flatten)]
        daemon: DaemonArgs,

        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Control the Aquaris liquid cooler
    Aquaris {
        #[command(flatten)]
        device: AquarisArgs,

        #[command(subcommand)]
        action: AquarisAction,
    },

    /// Watch for daemon signals until interrupted
    Monitor {
        #[command(flatten)]
        daemon: DaemonArgs,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// On/off switch value
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn is_on(self) -> bool {
        self == Toggle::On
    }
}

#[derive(Debug, Subcommand)]
pub enum ChargingAction {
    /// Show the current charging settings and what the hardware offers
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Select a charging profile
    Profile {
        /// Profile descriptor, as listed by `charging show`
        name: String,
    },

    /// Select a charging priority
    Priority {
        /// Priority descriptor, as listed by `charging show`
        name: String,
    },

    /// Set the charge start and/or end threshold
    Thresholds {
        /// Start charging below this percentage
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
        start: Option<u32>,

        /// Stop charging at this percentage
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
        end: Option<u32>,
    },

    /// Set the charge type
    Type {
        /// Standard or Custom
        #[arg(value_parser = parse_charge_type)]
        charge_type: ChargeType,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProfileAction {
    /// List profiles
    List {
        /// Which profiles to list
        #[arg(long, value_parser = parse_profile_filter, default_value = "all")]
        filter: ProfileFilter,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the active profile
    Active {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Export custom profiles as JSON
    Export,

    /// Check a profile file against the custom profiles on this machine
    CheckImport {
        /// JSON file with an array of profiles
        file: PathBuf,

        /// What to do when a profile id already exists
        #[arg(long, value_enum, default_value = "keep-both")]
        on_conflict: ConflictPolicy,
    },

    /// Activate a profile temporarily
    Use {
        /// Profile id
        #[arg(conflicts_with = "name", required_unless_present = "name")]
        id: Option<String>,

        /// Select by name instead of id
        #[arg(long)]
        name: Option<String>,
    },
}

/// Conflict policy for `profiles check-import`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConflictPolicy {
    /// Replace the existing profile
    KeepNew,
    /// Skip the incoming profile
    KeepOld,
    /// Keep both, giving the incoming profile a new id
    KeepBoth,
}

#[derive(Debug, Subcommand)]
pub enum AquarisAction {
    /// Show the cooler state once
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the cooler state on every poll
    Watch {
        /// Number of states to print (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Set the LED color and mode, or switch it off
    Led {
        /// Color as hex, e.g. ff8000 or #ff8000
        #[arg(value_parser = parse_rgb, required_unless_present = "off")]
        color: Option<Rgb>,

        /// Animation mode
        #[arg(short, long, default_value = "0")]
        mode: u8,

        /// Switch the LED off
        #[arg(long, conflicts_with = "color")]
        off: bool,
    },

    /// Set the fan duty cycle, or switch it off
    Fan {
        /// Duty cycle in percent
        #[arg(
            value_parser = clap::value_parser!(u8).range(0..=100),
            required_unless_present = "off"
        )]
        duty: Option<u8>,

        /// Switch the fan off
        #[arg(long, conflicts_with = "duty")]
        off: bool,
    },

    /// Set the pump duty cycle and voltage, or switch it off
    Pump {
        /// Duty cycle in percent
        #[arg(
            value_parser = clap::value_parser!(u8).range(0..=100),
            required_unless_present = "off"
        )]
        duty: Option<u8>,

        /// Voltage level
        #[arg(long, default_value = "0")]
        voltage: u8,

        /// Switch the pump off
        #[arg(long, conflicts_with = "duty")]
        off: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check the configuration file for errors
    Validate,
}

fn parse_rgb(s: &str) -> Result<Rgb, String> {
    let hex = if s.starts_with('#') {
        s.to_string()
    } else {
        format!("#{}", s)
    };
    hex.parse::<Rgb>().map_err(|e| e.to_string())
}

fn parse_charge_type(s: &str) -> Result<ChargeType, String> {
    match s.parse::<ChargeType>() {
        Ok(ChargeType::Unknown) | Err(_) => {
            Err(format!("'{}' is not a settable charge type", s))
        }
        Ok(charge_type) => Ok(charge_type),
    }
}

fn parse_profile_filter(s: &str) -> Result<ProfileFilter, String> {
    s.parse::<ProfileFilter>().map_err(|e| e.to_string())
}
