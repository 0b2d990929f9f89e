//! Client core for the TUXEDO Control Center hardware daemon and the Aquaris
//! liquid-cooling unit.
//!
//! This crate manages connections to both endpoints, exposes the daemon's
//! method surface as typed accessors, polls the cooling unit's state, and
//! issues writes to it.
//!
//! # Features
//!
//! - **Connection lifecycle**: One state machine per endpoint, with
//!   cancellation of in-flight calls on disconnect
//! - **Typed daemon accessors**: Every getter degrades to a documented default
//!   instead of failing
//! - **State polling**: A snapshot of the cooling unit refreshed once per
//!   second, never published from a stale connection
//! - **Commands**: LED, fan and pump writes, rejected locally while
//!   disconnected
//! - **Signals**: Callbacks for daemon notifications such as
//!   `ModeReapplyPendingChanged`
//! - **Profiles**: Listing, filtering, validation and conflict-aware import
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`transport`] | Request/response boundary ([`Transport`], [`Channel`]) |
//! | [`session`] | Connection state machine ([`Session`]) |
//! | [`commands`] | Typed writes ([`CommandDispatcher`]) |
//! | [`sync`] | Periodic state polling ([`StateSynchronizer`]) |
//! | [`signals`] | Signal callbacks ([`SignalRegistry`]) |
//! | [`tccd`] | Daemon client ([`TccdClient`]) |
//! | [`aquaris`] | Liquid-cooler client ([`AquarisClient`]) |
//! | [`profiles`] | Profile management ([`ProfileStore`]) |
//! | [`ipc`] | Unix socket transport ([`IpcTransport`]) |
//! | [`mock`] | In-memory transport for tests ([`MockTransport`]) |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tcc_core::{IpcTransport, TccdClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = Arc::new(IpcTransport::new("/run/tccd/tccd.sock"));
//!     let tccd = TccdClient::new(transport);
//!
//!     if tccd.init("com.tuxedocomputers.tccd").await {
//!         println!("tccd {}", tccd.tccd_version().await);
//!         println!("charge type: {}", tccd.charge_type().await);
//!     }
//!     tccd.disconnect().await.ok();
//! }
//! ```

pub mod aquaris;
pub mod commands;
pub mod error;
pub mod events;
pub mod ipc;
pub mod mock;
pub mod profiles;
pub mod session;
pub mod signals;
pub mod sync;
pub mod tccd;
pub mod transport;

// Re-export the shared data model
pub use tcc_types::{
    AquarisState, ChargeType, DisplayFreqRes, FanData, Profile, Rgb, Settings, TdpInfo,
};

// Core exports
pub use aquaris::{AquarisClient, AquarisSource};
pub use commands::{Command, CommandDispatcher, CommandOutcome};
pub use error::{ConnectionFailureReason, Error, Result};
pub use events::{DisconnectReason, EventDispatcher, EventReceiver, SessionEvent};
pub use ipc::{IpcChannel, IpcTransport};
pub use mock::{MemoryProfileStore, MockAquaris, MockTransport};
pub use profiles::{
    ConflictResolution, ConflictResolver, ImportReport, ProfileCatalog, ProfileFilter,
    ProfileStore, import_profiles, validate_profile_name,
};
pub use session::{ConnectionScope, ConnectionState, Session, SessionOptions};
pub use signals::{SignalRegistry, SubscriptionId};
pub use sync::{Snapshot, SnapshotReceiver, StateSource, StateSynchronizer, SyncOptions};
pub use tccd::TccdClient;
pub use transport::{Channel, Signal, Transport, Value};
