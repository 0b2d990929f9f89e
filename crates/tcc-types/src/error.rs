//! Error types for value parsing in tcc-types.

use thiserror::Error;

/// Errors that can occur when parsing values reported by the daemon or a
/// peripheral.
///
/// This error type is transport-agnostic and does not include
/// connection errors (those belong in tcc-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// A hex color string was not of the form `#rrggbb`.
    #[error("Invalid color '{0}': expected #rrggbb")]
    InvalidColor(String),

    /// A charge type string was not one of the known sysfs values.
    #[error("Unknown charge type: {0}")]
    UnknownChargeType(String),
}

/// Result type alias using tcc-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
