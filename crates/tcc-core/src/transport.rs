//! Transport gateway: the request/response boundary to a remote endpoint.
//!
//! A [`Transport`] opens a [`Channel`] to a named target. A channel carries
//! method calls with JSON arguments and results, and may additionally push
//! [`Signal`]s. Every failure is reported as a typed [`Error`]; nothing here
//! panics or leaks a transport-specific exception.
//!
//! The helpers at the bottom of the module convert between raw [`Value`]s and
//! typed results. [`decode_json_str`] covers the daemon's habit of returning
//! JSON documents wrapped in a string; a decoding failure becomes
//! [`Error::Parse`] and is treated by callers exactly like a failed call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use crate::error::{Error, Result};

/// Value type carried by calls, results and signals.
pub type Value = serde_json::Value;

/// A pushed notification from the remote side.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Signal name, e.g. `ModeReapplyPendingChanged`.
    pub name: String,
    /// Signal payload.
    pub args: Vec<Value>,
}

impl Signal {
    /// Create a signal.
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Something that can open channels to a target.
///
/// Implementations must be cheap to share; the session holds one behind an
/// `Arc` for its whole lifetime and calls [`open`](Self::open) on every
/// connect.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a channel to `target`.
    ///
    /// Failures should be reported as [`Error::ConnectionFailed`]; other
    /// errors are wrapped into it by the session.
    async fn open(&self, target: &str) -> Result<Arc<dyn Channel>>;
}

/// An open channel to a remote endpoint.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Invoke `method` with positional `args`.
    ///
    /// Calling on a closed channel fails with [`Error::NotConnected`]. A call
    /// that finds the transport gone fails with [`Error::ConnectionLost`].
    async fn call(&self, method: &str, args: &[Value]) -> Result<Value>;

    /// Close the channel. Further calls fail with [`Error::NotConnected`].
    async fn close(&self) -> Result<()>;

    /// Whether the channel still considers itself open.
    fn is_open(&self) -> bool;

    /// Subscribe to signals pushed over this channel, if it carries any.
    fn signals(&self) -> Option<broadcast::Receiver<Signal>> {
        None
    }
}

/// Interpret the outcome of a liveness probe call.
///
/// `Ok(Bool(b))` yields `b`; any other successful value counts as alive; any
/// error counts as not alive.
pub fn probe_result(result: Result<Value>) -> bool {
    match result {
        Ok(Value::Bool(alive)) => alive,
        Ok(_) => true,
        Err(_) => false,
    }
}

/// Call `method` and fail with [`Error::Timeout`] if no result arrives within
/// `timeout`.
pub async fn call_with_timeout(
    channel: &dyn Channel,
    method: &str,
    args: &[Value],
    timeout: Duration,
) -> Result<Value> {
    match tokio::time::timeout(timeout, channel.call(method, args)).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(method, timeout)),
    }
}

/// Decode a call result into `T`.
pub fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::parse(method, e.to_string()))
}

/// Decode a call result that is a JSON document wrapped in a string.
pub fn decode_json_str<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    match value {
        Value::String(text) => {
            serde_json::from_str(&text).map_err(|e| Error::parse(method, e.to_string()))
        }
        other => Err(Error::parse(
            method,
            format!("expected a JSON string, got {}", kind(&other)),
        )),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
