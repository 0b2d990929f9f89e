//! Error types for tcc-core.
//!
//! Every failure on the transport boundary is turned into an [`Error`] value;
//! nothing in this crate panics on remote misbehavior.
//!
//! # Who sees which errors
//!
//! | Error | Surfaced by | Absorbed by |
//! |-------|-------------|-------------|
//! | [`Error::ConnectionFailed`] | `connect` | - |
//! | [`Error::AlreadyConnecting`], [`Error::AlreadyConnected`], [`Error::DisconnectInProgress`] | `connect` | - |
//! | [`Error::NotConnected`] | `Session::call` | commands (`CommandOutcome::NotConnected`), accessors |
//! | [`Error::Call`], [`Error::Parse`], [`Error::Timeout`] | `Session::call` | accessors (typed default), commands (`CommandOutcome::Failed`), polling (snapshot kept) |
//! | [`Error::ConnectionLost`] | `Session::call` | the session itself moves to `Disconnected` |
//! | [`Error::Cancelled`] | in-flight calls during `disconnect` | polling |
//!
//! Accessors deliberately collapse [`Error::Call`] and [`Error::Parse`]: a
//! payload that cannot be decoded is handled exactly like a call that failed.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to the daemon or a peripheral.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Operation attempted while the session is not connected.
    #[error("Not connected")]
    NotConnected,

    /// `connect` called while a connection attempt is in flight.
    #[error("Connection attempt already in progress")]
    AlreadyConnecting,

    /// `connect` called on a connected session.
    #[error("Already connected")]
    AlreadyConnected,

    /// `connect` called while the previous connection is being torn down.
    #[error("Disconnect in progress")]
    DisconnectInProgress,

    /// Opening the transport failed.
    #[error("Connection to '{target}' failed: {reason}")]
    ConnectionFailed {
        /// The target that could not be opened.
        target: String,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// A remote call failed.
    #[error("Call '{method}' failed: {reason}")]
    Call {
        /// Remote method name.
        method: String,
        /// Failure reported by the transport or the remote side.
        reason: String,
    },

    /// A remote call succeeded but its payload could not be decoded.
    #[error("Could not parse result of '{method}': {message}")]
    Parse {
        /// Remote method name.
        method: String,
        /// Decoder message.
        message: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The underlying transport went away.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Operation was cancelled, usually by `disconnect`.
    #[error("Operation cancelled")]
    Cancelled,

    /// A command or argument was rejected before being sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON encoding error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Nothing is listening at the endpoint.
    Unreachable,
    /// The endpoint refused the open request.
    Rejected(String),
    /// Connection attempt timed out.
    Timeout,
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable => write!(f, "endpoint unreachable"),
            Self::Rejected(msg) => write!(f, "rejected: {}", msg),
            Self::Timeout => write!(f, "connection timed out"),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a call failure for `method`.
    pub fn call(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Call {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Create a payload decoding failure for `method`.
    pub fn parse(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(target: impl Into<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed {
            target: target.into(),
            reason,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this error came out of a single remote call.
    ///
    /// These are the errors accessors replace with their default value.
    pub fn is_call_error(&self) -> bool {
        matches!(
            self,
            Self::Call { .. } | Self::Parse { .. } | Self::Timeout { .. }
        )
    }

    /// Whether this error means the transport is gone.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

impl From<tcc_types::ParseError> for Error {
    fn from(err: tcc_types::ParseError) -> Self {
        Error::InvalidArgument(err.to_string())
    }
}

/// Result type alias using tcc-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
