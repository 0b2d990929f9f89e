//! Command implementations for the CLI.

mod aquaris;
mod charging;
mod config;
mod fnlock;
mod monitor;
mod profiles;
mod status;

pub use aquaris::cmd_aquaris;
pub use charging::cmd_charging;
pub use config::{cmd_config, load_checked};
pub use fnlock::cmd_fn_lock;
pub use monitor::cmd_monitor;
pub use profiles::cmd_profiles;
pub use status::cmd_status;
