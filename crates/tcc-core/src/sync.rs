//! State synchronizer: periodic polling of a connected device.
//!
//! A [`StateSynchronizer`] keeps the latest device state as an immutable
//! [`Snapshot`] published through a `tokio::sync::watch` channel. On
//! [`start`](StateSynchronizer::start) it refreshes immediately, fetches the
//! device identity exactly once, and then spawns a polling task that on every
//! tick probes the device and, if it answers, reads the full state.
//!
//! The polling task is bound to the connection it was started for: it runs
//! on a child of the session's connection token and stops as soon as the
//! connection ends. Every publish is checked against the connection
//! generation, so a read that completes after `disconnect` is discarded.
//! A failed poll leaves the previous snapshot untouched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{DisconnectReason, SessionEvent};
use crate::session::Session;

/// Reads state and identity from a device over a session.
#[async_trait]
pub trait StateSource: Send + Sync + 'static {
    /// The state type being synchronized.
    type State: Clone + Send + Sync + 'static;

    /// Read the full device state.
    async fn read_state(&self, session: &Session) -> Result<Self::State>;

    /// Read the device identity (e.g. firmware version).
    async fn read_identity(&self, session: &Session) -> Result<String>;
}

/// One published device state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    /// The state as read from the device.
    pub state: T,
    /// Connection generation the state was read under.
    pub generation: u64,
    /// When the state was read.
    pub captured_at: OffsetDateTime,
}

/// Receiver side of the snapshot channel.
pub type SnapshotReceiver<T> = watch::Receiver<Option<Arc<Snapshot<T>>>>;

/// Options for a [`StateSynchronizer`].
///
/// ```ignore
/// let options = SyncOptions::builder()
///     .poll_interval(Duration::from_secs(2))
///     .max_consecutive_failures(5)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Time between polls.
    /// Default: 1 second.
    pub poll_interval: Duration,
    /// Consecutive failed polls after which the connection is dropped.
    ///
    /// When `None` (default), polling failures are advisory: they are logged
    /// and reported as events, but never end the connection.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_consecutive_failures: None,
        }
    }
}

impl SyncOptions {
    /// Create a new builder for SyncOptions.
    pub fn builder() -> SyncOptionsBuilder {
        SyncOptionsBuilder::default()
    }

    /// Create options with a specific poll interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            poll_interval: interval,
            ..Default::default()
        }
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_config("poll_interval must be > 0"));
        }
        if self.max_consecutive_failures == Some(0) {
            return Err(Error::invalid_config("max_consecutive_failures must be > 0"));
        }
        Ok(())
    }
}

/// Builder for SyncOptions.
#[derive(Debug, Clone, Default)]
pub struct SyncOptionsBuilder {
    options: SyncOptions,
}

impl SyncOptionsBuilder {
    /// Set the polling interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    /// Set the maximum consecutive failures before the connection is dropped.
    #[must_use]
    pub fn max_consecutive_failures(mut self, max: u32) -> Self {
        self.options.max_consecutive_failures = Some(max);
        self
    }

    /// Build the SyncOptions.
    #[must_use]
    pub fn build(self) -> SyncOptions {
        self.options
    }
}

struct Shared<S: StateSource> {
    session: Arc<Session>,
    source: S,
    snapshot: watch::Sender<Option<Arc<Snapshot<S::State>>>>,
    identity: Mutex<Option<(u64, String)>>,
}

struct PollTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps a snapshot of a device's state in sync with the device.
pub struct StateSynchronizer<S: StateSource> {
    shared: Arc<Shared<S>>,
    options: SyncOptions,
    task: Mutex<Option<PollTask>>,
}

impl<S: StateSource> StateSynchronizer<S> {
    /// Create a stopped synchronizer with default options.
    pub fn new(session: Arc<Session>, source: S) -> Self {
        Self::build(session, source, SyncOptions::default())
    }

    /// Create a stopped synchronizer with custom options.
    pub fn with_options(session: Arc<Session>, source: S, options: SyncOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(session, source, options))
    }

    fn build(session: Arc<Session>, source: S, options: SyncOptions) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                session,
                source,
                snapshot,
                identity: Mutex::new(None),
            }),
            options,
            task: Mutex::new(None),
        }
    }

    /// The options in use.
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Latest snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<Snapshot<S::State>>> {
        self.shared.snapshot.borrow().clone()
    }

    /// Watch snapshot replacements.
    pub fn subscribe(&self) -> SnapshotReceiver<S::State> {
        self.shared.snapshot.subscribe()
    }

    /// Identity fetched for the current connection.
    pub fn identity(&self) -> Option<String> {
        self.shared
            .identity
            .lock()
            .as_ref()
            .map(|(_, identity)| identity.clone())
    }

    /// Whether a polling task is running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Start synchronizing the session's live connection.
    ///
    /// Performs an immediate refresh, fetches the identity once, and spawns
    /// the polling task. A failed initial refresh or identity read is logged
    /// and does not prevent polling. Fails with [`Error::NotConnected`] if
    /// the session has no live connection.
    pub async fn start(&self) -> Result<()> {
        let scope = self
            .shared
            .session
            .current_connection()
            .ok_or(Error::NotConnected)?;
        self.stop();

        if let Err(e) = self.shared.poll_once(scope.generation).await {
            warn!("Initial refresh failed: {}", e);
        }
        self.shared.fetch_identity(scope.generation).await;

        let shared = Arc::clone(&self.shared);
        let token = scope.token.clone();
        let period = self.options.poll_interval;
        let max_failures = self.options.max_consecutive_failures;
        let generation = scope.generation;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut consecutive_failures: u32 = 0;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Polling for generation {} stopped", generation);
                        break;
                    }
                    _ = ticker.tick() => {
                        match shared.poll_once(generation).await {
                            Ok(_) => consecutive_failures = 0,
                            Err(Error::Cancelled) => break,
                            Err(e) => {
                                consecutive_failures = consecutive_failures.saturating_add(1);
                                warn!(
                                    "Poll failed (failure {}/{}): {}",
                                    consecutive_failures,
                                    max_failures.map_or("∞".to_string(), |n| n.to_string()),
                                    e
                                );
                                shared.session.events().send(SessionEvent::PollFailed {
                                    consecutive: consecutive_failures,
                                    error: e.to_string(),
                                });

                                if let Some(max) = max_failures
                                    && consecutive_failures >= max
                                {
                                    warn!(
                                        "Max consecutive poll failures ({}) reached, dropping connection",
                                        max
                                    );
                                    shared
                                        .session
                                        .drop_connection(generation, DisconnectReason::PollFailures(max))
                                        .await;
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            shared.discard(generation);
        });

        *self.task.lock() = Some(PollTask {
            token: scope.token,
            handle,
        });
        Ok(())
    }

    /// Run one poll cycle now.
    ///
    /// Returns `Ok(true)` if a new snapshot was published and `Ok(false)` if
    /// the result was discarded because the connection changed meanwhile.
    pub async fn refresh(&self) -> Result<bool> {
        let generation = self
            .shared
            .session
            .current_connection()
            .ok_or(Error::NotConnected)?
            .generation;
        self.shared.poll_once(generation).await
    }

    /// Stop the polling task.
    ///
    /// The task is cancelled and aborted; no further poll fires afterwards.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.token.cancel();
            task.handle.abort();
        }
    }

    /// Stop polling and drop the snapshot and identity.
    pub fn clear(&self) {
        self.stop();
        self.shared.snapshot.send_replace(None);
        *self.shared.identity.lock() = None;
    }
}

impl<S: StateSource> Drop for StateSynchronizer<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: StateSource> Shared<S> {
    async fn poll_once(&self, generation: u64) -> Result<bool> {
        if !self.session.is_current(generation) {
            return Err(Error::Cancelled);
        }
        if !self.session.is_connected().await {
            if !self.session.is_current(generation) {
                return Err(Error::Cancelled);
            }
            return Err(Error::NotConnected);
        }

        let state = self.source.read_state(&self.session).await?;
        let published = self.session.publish_if_current(generation, || {
            self.snapshot.send_replace(Some(Arc::new(Snapshot {
                state,
                generation,
                captured_at: OffsetDateTime::now_utc(),
            })));
        });
        if !published {
            debug!("Discarding state read for stale generation {}", generation);
        }
        Ok(published)
    }

    async fn fetch_identity(&self, generation: u64) {
        match self.source.read_identity(&self.session).await {
            Ok(identity) => {
                self.session.publish_if_current(generation, || {
                    *self.identity.lock() = Some((generation, identity));
                });
            }
            Err(e) => warn!("Reading device identity failed: {}", e),
        }
    }

    /// Drop data belonging to `generation`, leaving newer data alone.
    fn discard(&self, generation: u64) {
        self.snapshot.send_if_modified(|current| {
            if current.as_ref().is_some_and(|s| s.generation == generation) {
                *current = None;
                true
            } else {
                false
            }
        });
        let mut identity = self.identity.lock();
        if identity.as_ref().is_some_and(|(g, _)| *g == generation) {
            *identity = None;
        }
    }
}
