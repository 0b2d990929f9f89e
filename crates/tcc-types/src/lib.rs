//! Platform-agnostic types for the TUXEDO control center client.
//!
//! This crate provides the shared data types used by the client core
//! (tcc-core) and the command-line front end (tcc-cli).
//!
//! # Features
//!
//! - Liquid-cooler state snapshot and RGB color handling
//! - Fan, display, power-limit and charging types reported by the daemon
//! - Profile and settings documents
//! - Error types for value parsing
//!
//! # Example
//!
//! ```
//! use tcc_types::{AquarisState, Rgb};
//!
//! let state = AquarisState { led_on: true, red: 255, ..Default::default() };
//! assert_eq!(state.color(), Rgb::new(255, 0, 0));
//! ```

pub mod error;
pub mod profile;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use profile::{MAX_PROFILE_NAME_LEN, Profile, Settings};
pub use types::{
    ActiveDisplayMode, AquarisState, ChargeType, DisplayFreqRes, DisplayMode, FanData,
    MAX_DUTY_CYCLE, Rgb, TdpInfo, TimeData,
};
