//! Client for the Aquaris liquid-cooling unit.
//!
//! [`AquarisClient`] ties a [`Session`], a [`CommandDispatcher`] and a
//! [`StateSynchronizer`] together:
//!
//! - `connect` opens the session, refreshes the state right away, reads the
//!   firmware version once and starts polling (once per second by default).
//! - `disconnect` stops polling, tears the session down and discards the
//!   snapshot and firmware version.
//! - writes go through the dispatcher and are only issued while connected.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tcc_core::{AquarisClient, IpcTransport};
//! use tcc_types::Rgb;
//!
//! # async fn demo() -> tcc_core::Result<()> {
//! let transport = Arc::new(IpcTransport::new("/run/tccd/aquaris.sock"));
//! let client = AquarisClient::new(transport);
//! client.connect("AA:BB:CC:DD:EE:FF").await?;
//! client.set_led(Rgb::new(255, 0, 0), 1).await;
//! if let Some(state) = client.state() {
//!     println!("fan at {}%", state.fan_duty_cycle);
//! }
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use tcc_types::{AquarisState, Rgb};

use crate::commands::{Command, CommandDispatcher, CommandOutcome};
use crate::error::{Error, Result};
use crate::events::EventReceiver;
use crate::session::{ConnectionState, Session, SessionOptions};
use crate::sync::{Snapshot, SnapshotReceiver, StateSource, StateSynchronizer, SyncOptions};
use crate::transport::{Transport, decode};

/// Remote method names of the liquid-cooler protocol.
pub mod methods {
    /// Liveness probe, returns a boolean.
    pub const IS_CONNECTED: &str = "isConnected";
    /// Full state, returns an object.
    pub const GET_STATE: &str = "getState";
    /// Firmware version, returns a string.
    pub const READ_FW_VERSION: &str = "readFwVersion";
    /// `(red, green, blue, mode)`
    pub const UPDATE_LED: &str = "updateLED";
    pub const WRITE_RGB_OFF: &str = "writeRGBOff";
    /// `(duty_cycle)`
    pub const WRITE_FAN_MODE: &str = "writeFanMode";
    pub const WRITE_FAN_OFF: &str = "writeFanOff";
    /// `(duty_cycle, voltage)`
    pub const WRITE_PUMP_MODE: &str = "writePumpMode";
    pub const WRITE_PUMP_OFF: &str = "writePumpOff";
}

/// Reads [`AquarisState`] and the firmware version.
#[derive(Debug, Clone, Copy, Default)]
pub struct AquarisSource;

#[async_trait]
impl StateSource for AquarisSource {
    type State = AquarisState;

    async fn read_state(&self, session: &Session) -> Result<AquarisState> {
        let value = session.call(methods::GET_STATE, &[]).await?;
        decode(methods::GET_STATE, value)
    }

    async fn read_identity(&self, session: &Session) -> Result<String> {
        match session.call(methods::READ_FW_VERSION, &[]).await? {
            Value::String(version) => Ok(version),
            other => Ok(other.to_string()),
        }
    }
}

/// Connection, polling and writes for one liquid-cooling unit.
pub struct AquarisClient {
    session: Arc<Session>,
    dispatcher: CommandDispatcher,
    sync: StateSynchronizer<AquarisSource>,
}

impl AquarisClient {
    /// Create a disconnected client with default options.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let session = Arc::new(Session::new(transport));
        let sync = StateSynchronizer::new(Arc::clone(&session), AquarisSource);
        Self {
            dispatcher: CommandDispatcher::new(Arc::clone(&session)),
            session,
            sync,
        }
    }

    /// Create a disconnected client with custom options.
    pub fn with_options(
        transport: Arc<dyn Transport>,
        session_options: SessionOptions,
        sync_options: SyncOptions,
    ) -> Result<Self> {
        let session = Arc::new(Session::with_options(transport, session_options)?);
        let sync =
            StateSynchronizer::with_options(Arc::clone(&session), AquarisSource, sync_options)?;
        Ok(Self {
            dispatcher: CommandDispatcher::new(Arc::clone(&session)),
            session,
            sync,
        })
    }

    /// The underlying session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Subscribe to session events.
    pub fn events(&self) -> EventReceiver {
        self.session.subscribe()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Connect to the device `target`, refresh and start polling.
    pub async fn connect(&self, target: &str) -> Result<()> {
        self.session.connect(target).await?;
        match self.sync.start().await {
            // Lost the connection before polling could start
            Err(Error::NotConnected) => Err(Error::Cancelled),
            other => {
                info!(
                    "Aquaris {} connected, firmware {}",
                    target,
                    self.sync.identity().as_deref().unwrap_or("unknown")
                );
                other
            }
        }
    }

    /// Stop polling, disconnect and discard the snapshot.
    ///
    /// Idempotent. Always ends disconnected; a failure to close the channel
    /// is returned afterwards.
    pub async fn disconnect(&self) -> Result<()> {
        self.sync.stop();
        let result = self.session.disconnect().await;
        self.sync.clear();
        result
    }

    /// Live probe of the device.
    pub async fn is_connected(&self) -> bool {
        self.session.is_connected().await
    }

    /// Latest device state, if one has been read on this connection.
    pub fn state(&self) -> Option<AquarisState> {
        self.sync.snapshot().map(|snapshot| snapshot.state)
    }

    /// Latest snapshot with its generation and capture time.
    pub fn snapshot(&self) -> Option<Arc<Snapshot<AquarisState>>> {
        self.sync.snapshot()
    }

    /// Watch snapshot replacements.
    pub fn subscribe_state(&self) -> SnapshotReceiver<AquarisState> {
        self.sync.subscribe()
    }

    /// Firmware version read when the connection was established.
    pub fn firmware_version(&self) -> Option<String> {
        self.sync.identity()
    }

    /// Read the state now instead of waiting for the next poll.
    pub async fn refresh(&self) -> Result<bool> {
        self.sync.refresh().await
    }

    /// Apply a command.
    pub async fn dispatch(&self, command: Command) -> CommandOutcome {
        self.dispatcher.dispatch(command).await
    }

    /// Turn the LED on with `color` and `mode`.
    pub async fn set_led(&self, color: Rgb, mode: u8) -> CommandOutcome {
        self.dispatch(Command::SetLed { color, mode }).await
    }

    /// Turn the LED off.
    pub async fn led_off(&self) -> CommandOutcome {
        self.dispatch(Command::LedOff).await
    }

    /// Turn the fan on at `duty_cycle` percent.
    pub async fn set_fan(&self, duty_cycle: u8) -> CommandOutcome {
        self.dispatch(Command::SetFan { duty_cycle }).await
    }

    /// Turn the fan off.
    pub async fn fan_off(&self) -> CommandOutcome {
        self.dispatch(Command::FanOff).await
    }

    /// Turn the pump on at `duty_cycle` percent and `voltage`.
    pub async fn set_pump(&self, duty_cycle: u8, voltage: u8) -> CommandOutcome {
        self.dispatch(Command::SetPump {
            duty_cycle,
            voltage,
        })
        .await
    }

    /// Turn the pump off.
    pub async fn pump_off(&self) -> CommandOutcome {
        self.dispatch(Command::PumpOff).await
    }

    /// Apply the LED controls: on with `color` and `mode`, or off.
    pub async fn led_update(&self, on: bool, color: Rgb, mode: u8) -> CommandOutcome {
        self.dispatch(Command::led(on, color, mode)).await
    }

    /// Apply the fan controls: on at `duty_cycle`, or off.
    pub async fn fan_update(&self, on: bool, duty_cycle: u8) -> CommandOutcome {
        self.dispatch(Command::fan(on, duty_cycle)).await
    }

    /// Apply the pump controls: on at `duty_cycle` and `voltage`, or off.
    pub async fn pump_update(&self, on: bool, duty_cycle: u8, voltage: u8) -> CommandOutcome {
        self.dispatch(Command::pump(on, duty_cycle, voltage)).await
    }
}

impl std::fmt::Debug for AquarisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AquarisClient")
            .field("session", &self.session)
            .field("polling", &self.sync.is_running())
            .finish()
    }
}
