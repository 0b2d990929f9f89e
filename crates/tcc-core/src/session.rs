//! Device session manager: connection lifecycle over a [`Transport`].
//!
//! A [`Session`] owns at most one [`Channel`] and walks the state machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected
//!                 Connecting -> Disconnected   (open failed or cancelled)
//!                              Connected -> Disconnected   (transport lost)
//! ```
//!
//! Transitions are decided under a short synchronous lock that is never held
//! across an `.await`; the state machine itself rejects overlapping
//! operations (`AlreadyConnecting`, `AlreadyConnected`,
//! `DisconnectInProgress`) instead of queueing them.
//!
//! Every connection gets a fresh generation number and cancellation token.
//! `disconnect` cancels the token, which aborts in-flight calls and any task
//! bound to the connection, and bumps the generation so results computed for
//! the old connection can be recognized and discarded
//! (see [`Session::publish_if_current`]).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::events::{DisconnectReason, EventDispatcher, EventReceiver, SessionEvent};
use crate::transport::{self, Channel, Signal, Transport, Value};

/// Default liveness probe method.
pub const DEFAULT_PROBE_METHOD: &str = "isConnected";

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No channel.
    #[default]
    Disconnected,
    /// Opening a channel.
    Connecting,
    /// Channel open and usable.
    Connected,
    /// Closing the channel.
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Options for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound for opening (and closing) a channel.
    /// Default: 10 seconds.
    pub connect_timeout: Duration,
    /// Upper bound for a single remote call, `None` for no limit.
    /// Default: 5 seconds.
    pub call_timeout: Option<Duration>,
    /// Method used by [`Session::is_connected`].
    /// Default: `isConnected`.
    pub probe_method: String,
    /// Capacity of the event broadcast channel.
    /// Default: 64.
    pub event_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            call_timeout: Some(Duration::from_secs(5)),
            probe_method: DEFAULT_PROBE_METHOD.to_string(),
            event_capacity: 64,
        }
    }
}

impl SessionOptions {
    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the liveness probe method.
    #[must_use]
    pub fn probe_method(mut self, method: impl Into<String>) -> Self {
        self.probe_method = method.into();
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::invalid_config("connect_timeout must be > 0"));
        }
        if self.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::invalid_config("call_timeout must be > 0"));
        }
        if self.probe_method.is_empty() {
            return Err(Error::invalid_config("probe_method must not be empty"));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        Ok(())
    }
}

/// Generation and cancellation token of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionScope {
    /// Generation of the connection.
    pub generation: u64,
    /// Cancelled when the connection ends.
    pub token: CancellationToken,
}

struct Inner {
    state: ConnectionState,
    channel: Option<Arc<dyn Channel>>,
    generation: u64,
    token: CancellationToken,
    target: Option<String>,
}

/// What `disconnect` has to do once the lock is released.
enum Teardown {
    Nothing,
    AbortedConnect {
        target: Option<String>,
        generation: u64,
    },
    Close {
        channel: Option<Arc<dyn Channel>>,
        target: Option<String>,
        generation: u64,
    },
}

/// A connection to one remote endpoint.
pub struct Session {
    transport: Arc<dyn Transport>,
    options: SessionOptions,
    inner: Mutex<Inner>,
    events: EventDispatcher,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("target", &inner.target)
            .finish()
    }
}

impl Session {
    /// Create a disconnected session with default options.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::build(transport, SessionOptions::default())
    }

    /// Create a disconnected session with custom options.
    pub fn with_options(transport: Arc<dyn Transport>, options: SessionOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(transport, options))
    }

    pub(crate) fn build(transport: Arc<dyn Transport>, options: SessionOptions) -> Self {
        let events = EventDispatcher::new(options.event_capacity);
        Self {
            transport,
            options,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                channel: None,
                generation: 0,
                token: CancellationToken::new(),
                target: None,
            }),
            events,
        }
    }

    /// The options this session was created with.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Current generation. Changes on every connect and every teardown.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Target of the current or in-flight connection.
    pub fn target(&self) -> Option<String> {
        self.inner.lock().target.clone()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The session's event dispatcher, shared with components built on it.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Scope of the live connection, or `None` unless connected.
    ///
    /// The returned token is a child of the connection token: it is
    /// cancelled when the connection ends, and cancelling it does not affect
    /// the session.
    pub fn current_connection(&self) -> Option<ConnectionScope> {
        let inner = self.inner.lock();
        (inner.state == ConnectionState::Connected).then(|| ConnectionScope {
            generation: inner.generation,
            token: inner.token.child_token(),
        })
    }

    /// Whether `generation` still names the live connection.
    pub fn is_current(&self, generation: u64) -> bool {
        let inner = self.inner.lock();
        inner.generation == generation && inner.state == ConnectionState::Connected
    }

    /// Run `publish` only if `generation` is still the live connection.
    ///
    /// The check and `publish` happen under the session lock, so a
    /// concurrent teardown either happens entirely before (and `publish` is
    /// skipped) or entirely after. `publish` must not block.
    pub fn publish_if_current<F: FnOnce()>(&self, generation: u64, publish: F) -> bool {
        let inner = self.inner.lock();
        if inner.generation == generation && inner.state == ConnectionState::Connected {
            publish();
            true
        } else {
            false
        }
    }

    /// Open a channel to `target`.
    ///
    /// Only valid from `Disconnected`. On failure the session is back in
    /// `Disconnected` and the error is [`Error::ConnectionFailed`]. If
    /// [`disconnect`](Self::disconnect) runs while the channel is being
    /// opened, the fresh channel is closed and [`Error::Cancelled`] returned.
    pub async fn connect(&self, target: &str) -> Result<()> {
        let (generation, token) = {
            let mut inner = self.inner.lock();
            match inner.state {
                ConnectionState::Disconnected => {}
                ConnectionState::Connecting => return Err(Error::AlreadyConnecting),
                ConnectionState::Connected => return Err(Error::AlreadyConnected),
                ConnectionState::Disconnecting => return Err(Error::DisconnectInProgress),
            }
            inner.generation += 1;
            inner.state = ConnectionState::Connecting;
            inner.token = CancellationToken::new();
            inner.target = Some(target.to_string());
            (inner.generation, inner.token.clone())
        };
        self.emit_state(ConnectionState::Connecting, generation);
        debug!("Connecting to {}", target);

        let limit = self.options.connect_timeout;
        let opened = tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(limit, self.transport.open(target)) => match result {
                Ok(Ok(channel)) => Ok(channel),
                Ok(Err(e)) => Err(connect_error(target, e)),
                Err(_) => Err(Error::connection_failed(target, ConnectionFailureReason::Timeout)),
            },
        };

        match opened {
            Ok(channel) => {
                let accepted = {
                    let mut inner = self.inner.lock();
                    if inner.generation == generation && inner.state == ConnectionState::Connecting
                    {
                        inner.state = ConnectionState::Connected;
                        inner.channel = Some(Arc::clone(&channel));
                        true
                    } else {
                        false
                    }
                };
                if !accepted {
                    debug!("Connect to {} superseded by disconnect, closing channel", target);
                    if let Err(e) = channel.close().await {
                        debug!("Closing superseded channel failed: {}", e);
                    }
                    return Err(Error::Cancelled);
                }
                info!("Connected to {}", target);
                self.emit_state(ConnectionState::Connected, generation);
                self.events.send(SessionEvent::Connected {
                    target: target.to_string(),
                    generation,
                });
                Ok(())
            }
            Err(e) => {
                let reverted = {
                    let mut inner = self.inner.lock();
                    if inner.generation == generation && inner.state == ConnectionState::Connecting
                    {
                        inner.state = ConnectionState::Disconnected;
                        inner.target = None;
                        true
                    } else {
                        false
                    }
                };
                if reverted {
                    warn!("Connection to {} failed: {}", target, e);
                    self.emit_state(ConnectionState::Disconnected, generation);
                    self.events.send(SessionEvent::ConnectFailed {
                        target: target.to_string(),
                        error: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Tear down the connection.
    ///
    /// Idempotent: succeeds without doing anything when already
    /// disconnected or disconnecting. Otherwise cancels in-flight calls and
    /// bound tasks, closes the channel and ends in `Disconnected`
    /// unconditionally. A failure to close is returned after the session has
    /// reached `Disconnected`.
    pub async fn disconnect(&self) -> Result<()> {
        let teardown = {
            let mut inner = self.inner.lock();
            match inner.state {
                ConnectionState::Disconnected | ConnectionState::Disconnecting => Teardown::Nothing,
                ConnectionState::Connecting => {
                    inner.token.cancel();
                    inner.generation += 1;
                    inner.state = ConnectionState::Disconnected;
                    Teardown::AbortedConnect {
                        target: inner.target.take(),
                        generation: inner.generation,
                    }
                }
                ConnectionState::Connected => {
                    inner.token.cancel();
                    inner.generation += 1;
                    inner.state = ConnectionState::Disconnecting;
                    Teardown::Close {
                        channel: inner.channel.take(),
                        target: inner.target.clone(),
                        generation: inner.generation,
                    }
                }
            }
        };

        match teardown {
            Teardown::Nothing => Ok(()),
            Teardown::AbortedConnect { target, generation } => {
                info!("Connect to {} aborted", target.as_deref().unwrap_or("?"));
                self.emit_state(ConnectionState::Disconnected, generation);
                self.events.send(SessionEvent::Disconnected {
                    target,
                    reason: DisconnectReason::UserRequested,
                });
                Ok(())
            }
            Teardown::Close {
                channel,
                target,
                generation,
            } => {
                self.emit_state(ConnectionState::Disconnecting, generation);
                let closed = match channel {
                    Some(channel) => self.close_channel(channel.as_ref()).await,
                    None => Ok(()),
                };
                {
                    let mut inner = self.inner.lock();
                    inner.state = ConnectionState::Disconnected;
                    inner.target = None;
                }
                info!("Disconnected from {}", target.as_deref().unwrap_or("?"));
                self.emit_state(ConnectionState::Disconnected, generation);
                self.events.send(SessionEvent::Disconnected {
                    target,
                    reason: DisconnectReason::UserRequested,
                });
                if let Err(e) = &closed {
                    warn!("Closing channel failed: {}", e);
                }
                closed
            }
        }
    }

    /// Live liveness probe.
    ///
    /// Calls the configured probe method on every invocation; this is not a
    /// cached flag. Returns `false` without touching the transport when not
    /// connected.
    pub async fn is_connected(&self) -> bool {
        transport::probe_result(self.call(&self.options.probe_method, &[]).await)
    }

    /// Invoke `method` on the live channel.
    ///
    /// Fails with [`Error::NotConnected`] without touching the transport
    /// unless connected. The call is aborted with [`Error::Cancelled`] if the
    /// connection ends while it is in flight. [`Error::ConnectionLost`]
    /// moves the session to `Disconnected`; any other error leaves the
    /// connection state alone.
    pub async fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        self.call_tagged(method, args).await.map(|(value, _)| value)
    }

    /// Like [`call`](Self::call), also returning the generation the call ran
    /// under.
    pub async fn call_tagged(&self, method: &str, args: &[Value]) -> Result<(Value, u64)> {
        let (channel, token, generation) = self.live_channel()?;

        let call = async {
            match self.options.call_timeout {
                Some(limit) => {
                    transport::call_with_timeout(channel.as_ref(), method, args, limit).await
                }
                None => channel.call(method, args).await,
            }
        };

        let result = tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            result = call => result,
        };

        match result {
            Ok(value) => Ok((value, generation)),
            Err(e) => {
                if e.is_connection_lost() || (!channel.is_open() && !token.is_cancelled()) {
                    self.drop_connection(generation, DisconnectReason::TransportLost(e.to_string()))
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Subscribe to signals pushed over the live channel.
    pub fn signals(&self) -> Option<broadcast::Receiver<Signal>> {
        self.live_channel()
            .ok()
            .and_then(|(channel, _, _)| channel.signals())
    }

    /// End connection `generation` without a user request.
    ///
    /// Used on transport loss and by liveness policies. Returns `false` if
    /// `generation` is no longer the live connection.
    pub async fn drop_connection(&self, generation: u64, reason: DisconnectReason) -> bool {
        let (channel, target, new_generation) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != ConnectionState::Connected {
                return false;
            }
            inner.token.cancel();
            inner.generation += 1;
            inner.state = ConnectionState::Disconnected;
            (inner.channel.take(), inner.target.take(), inner.generation)
        };

        warn!(
            "Connection to {} dropped: {}",
            target.as_deref().unwrap_or("?"),
            reason
        );
        self.emit_state(ConnectionState::Disconnected, new_generation);
        self.events
            .send(SessionEvent::Disconnected { target, reason });

        if let Some(channel) = channel
            && let Err(e) = self.close_channel(channel.as_ref()).await
        {
            debug!("Closing dropped channel failed: {}", e);
        }
        true
    }

    fn live_channel(&self) -> Result<(Arc<dyn Channel>, CancellationToken, u64)> {
        let inner = self.inner.lock();
        match (&inner.state, &inner.channel) {
            (ConnectionState::Connected, Some(channel)) => {
                Ok((Arc::clone(channel), inner.token.clone(), inner.generation))
            }
            _ => Err(Error::NotConnected),
        }
    }

    async fn close_channel(&self, channel: &dyn Channel) -> Result<()> {
        let limit = self.options.connect_timeout;
        match tokio::time::timeout(limit, channel.close()).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("close", limit)),
        }
    }

    fn emit_state(&self, state: ConnectionState, generation: u64) {
        self.events
            .send(SessionEvent::StateChanged { state, generation });
    }
}

fn connect_error(target: &str, err: Error) -> Error {
    match err {
        Error::ConnectionFailed { .. } | Error::Cancelled => err,
        Error::Timeout { .. } => Error::connection_failed(target, ConnectionFailureReason::Timeout),
        other => Error::connection_failed(target, ConnectionFailureReason::Other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use serde_json::json;

    fn session(transport: &MockTransport) -> Session {
        Session::new(Arc::new(transport.clone()))
    }

    fn echo() -> MockTransport {
        MockTransport::with_handler(|method, _| match method {
            "isConnected" => Ok(json!(true)),
            _ => Ok(json!(method)),
        })
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let transport = echo();
        let session = session(&transport);
        assert_eq!(session.state(), ConnectionState::Disconnected);

        session.connect("aquaris-1").await.unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.target().as_deref(), Some("aquaris-1"));
        assert_eq!(transport.open_count(), 1);

        let gen_connected = session.generation();
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.target().is_none());
        assert!(session.generation() > gen_connected);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_when_connected() {
        let transport = echo();
        let session = session(&transport);
        session.connect("a").await.unwrap();

        let err = session.connect("b").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyConnected));
        assert_eq!(session.target().as_deref(), Some("a"));
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_connecting() {
        let transport = echo();
        transport.set_open_latency(Duration::from_millis(500));
        let session = Arc::new(session(&transport));

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.connect("a").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(session.state(), ConnectionState::Connecting);

        let err = session.connect("b").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyConnecting));

        first.await.unwrap().unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_disconnected() {
        let transport = echo();
        transport.set_fail_open(true);
        let session = session(&transport);
        let mut events = session.subscribe();

        let err = session.connect("a").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed { .. }));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.target().is_none());

        // Connecting, then Disconnected, then ConnectFailed
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::StateChanged { state: ConnectionState::Connecting, .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::StateChanged { state: ConnectionState::Disconnected, .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::ConnectFailed { .. }
        ));

        // A later attempt may succeed
        transport.set_fail_open(false);
        session.connect("a").await.unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let transport = echo();
        transport.set_open_latency(Duration::from_secs(60));
        let options = SessionOptions::default().connect_timeout(Duration::from_secs(2));
        let session = Session::with_options(Arc::new(transport.clone()), options).unwrap();

        let err = session.connect("a").await.unwrap_err();
        assert!(matches!(
            err,
            Error::ConnectionFailed {
                reason: ConnectionFailureReason::Timeout,
                ..
            }
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let transport = echo();
        let session = session(&transport);
        let generation = session.generation();

        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.generation(), generation);
        assert_eq!(transport.close_count(), 0);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_connecting() {
        let transport = echo();
        transport.set_open_latency(Duration::from_millis(500));
        let session = Arc::new(session(&transport));

        let connecting = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.connect("a").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        session.disconnect().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Disconnected);

        let err = connecting.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_failure_still_disconnects() {
        let transport = echo();
        transport.set_fail_close(true);
        let session = session(&transport);
        session.connect("a").await.unwrap();

        assert!(session.disconnect().await.is_err());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        // Already disconnected: nothing left to close
        session.disconnect().await.unwrap();
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_call_requires_connection() {
        let transport = echo();
        let session = session(&transport);

        let err = session.call("getState", &[]).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(!session.is_connected().await);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_is_connected_checks_every_time() {
        let transport = echo();
        let session = session(&transport);
        session.connect("a").await.unwrap();

        assert!(session.is_connected().await);
        assert!(session.is_connected().await);
        assert_eq!(transport.calls_to("isConnected"), 2);

        transport.set_should_fail(true);
        assert!(!session.is_connected().await);
        // An ordinary call failure does not end the connection
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_is_connected_reports_device_side_state() {
        let transport = MockTransport::with_handler(|_, _| Ok(json!(false)));
        let session = session(&transport);
        session.connect("a").await.unwrap();
        assert!(!session.is_connected().await);
    }

    #[tokio::test]
    async fn test_transport_loss_disconnects() {
        let transport = echo();
        let session = session(&transport);
        let mut events = session.subscribe();
        session.connect("a").await.unwrap();
        let generation = session.generation();

        transport.sever();
        let err = session.call("getState", &[]).await.unwrap_err();
        assert!(err.is_connection_lost());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.generation() > generation);

        let mut saw_lost = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Disconnected {
                reason: DisconnectReason::TransportLost(_),
                ..
            } = event
            {
                saw_lost = true;
            }
        }
        assert!(saw_lost);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_aborts_in_flight_call() {
        let transport = echo();
        transport.set_latency(Duration::from_secs(3));
        let session = Arc::new(session(&transport));
        session.connect("a").await.unwrap();

        let call = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.call("getState", &[]).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        session.disconnect().await.unwrap();
        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout() {
        let transport = echo();
        transport.set_latency(Duration::from_secs(30));
        let options = SessionOptions::default().call_timeout(Some(Duration::from_secs(1)));
        let session = Session::with_options(Arc::new(transport.clone()), options).unwrap();
        session.connect("a").await.unwrap();

        let err = session.call("getState", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_publish_if_current() {
        let transport = echo();
        let session = session(&transport);
        assert!(!session.publish_if_current(session.generation(), || {}));

        session.connect("a").await.unwrap();
        let generation = session.generation();
        let mut published = false;
        assert!(session.publish_if_current(generation, || published = true));
        assert!(published);

        session.disconnect().await.unwrap();
        session.connect("a").await.unwrap();
        assert!(!session.is_current(generation));
        assert!(!session.publish_if_current(generation, || panic!("stale publish")));
    }

    #[tokio::test]
    async fn test_connection_scope_cancelled_on_disconnect() {
        let transport = echo();
        let session = session(&transport);
        assert!(session.current_connection().is_none());

        session.connect("a").await.unwrap();
        let scope = session.current_connection().unwrap();
        assert_eq!(scope.generation, session.generation());
        assert!(!scope.token.is_cancelled());

        session.disconnect().await.unwrap();
        assert!(scope.token.is_cancelled());
    }

    #[test]
    fn test_options_validation() {
        assert!(SessionOptions::default().validate().is_ok());
        assert!(
            SessionOptions::default()
                .connect_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            SessionOptions::default()
                .call_timeout(Some(Duration::ZERO))
                .validate()
                .is_err()
        );
        assert!(SessionOptions::default().probe_method("").validate().is_err());
        assert!(
            SessionOptions::default()
                .call_timeout(None)
                .validate()
                .is_ok()
        );
    }
}
