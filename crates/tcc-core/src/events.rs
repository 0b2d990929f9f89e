//! Session event system for connection and command notifications.
//!
//! Sessions publish [`SessionEvent`]s on a broadcast channel. Events are
//! informational; nothing in the crate depends on them being received.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::session::ConnectionState;

/// Events emitted by a session and the components built on it.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// The connection state machine moved.
    StateChanged {
        state: ConnectionState,
        generation: u64,
    },
    /// A connection was established.
    Connected { target: String, generation: u64 },
    /// A connection attempt failed.
    ConnectFailed { target: String, error: String },
    /// A connection ended.
    Disconnected {
        target: Option<String>,
        reason: DisconnectReason,
    },
    /// A command reached the transport and failed.
    CommandFailed { command: String, error: String },
    /// A poll cycle failed; the previous snapshot was kept.
    PollFailed { consecutive: u32, error: String },
}

/// Reason for disconnection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// `disconnect` was called.
    UserRequested,
    /// The transport reported the connection gone.
    TransportLost(String),
    /// Polling failed too many times in a row.
    PollFailures(u32),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserRequested => write!(f, "requested"),
            Self::TransportLost(reason) => write!(f, "transport lost: {}", reason),
            Self::PollFailures(n) => write!(f, "{} consecutive poll failures", n),
        }
    }
}

/// Sender for session events.
pub type EventSender = broadcast::Sender<SessionEvent>;

/// Receiver for session events.
pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SessionEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(64)
    }
}
