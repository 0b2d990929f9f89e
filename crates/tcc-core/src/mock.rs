//! Mock transport implementation for testing.
//!
//! This module provides in-memory stand-ins that can be used for unit testing
//! without a running daemon or attached device.
//!
//! - [`MockTransport`] - A [`Transport`] whose calls are answered by a closure
//! - [`MockAquaris`] - A stateful liquid-cooling unit behind a [`MockTransport`]
//! - [`MemoryProfileStore`] - A [`ProfileStore`] kept in memory
//!
//! # Features
//!
//! - **Failure injection**: Fail every call, specific methods, the next N
//!   calls, opening or closing
//! - **Latency simulation**: Add artificial delays to calls and to opening
//! - **Transport loss**: Sever the open channel as if the peer went away
//! - **Signals**: Push signals to every subscriber of the open channel
//! - **Call log**: Every call made on an open channel is recorded

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use tcc_types::{AquarisState, Profile, Settings};

use crate::aquaris::methods;
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::profiles::ProfileStore;
use crate::transport::{Channel, Signal, Transport, Value};

type Handler = Arc<dyn Fn(&str, &[Value]) -> Result<Value> + Send + Sync>;

struct MockShared {
    handler: Handler,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    open_count: AtomicU32,
    close_count: AtomicU32,
    should_fail: AtomicBool,
    failing_methods: Mutex<HashSet<String>>,
    /// Number of calls to fail before succeeding again.
    remaining_failures: AtomicU32,
    /// Simulated call latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    /// Simulated open latency in milliseconds (0 = no delay).
    open_latency_ms: AtomicU64,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
    signals: broadcast::Sender<Signal>,
    current: Mutex<Weak<MockChannel>>,
}

impl MockShared {
    fn check_failure(&self, method: &str) -> Result<()> {
        if self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::call(method, "Mock transient failure"));
        }
        if self.should_fail.load(Ordering::SeqCst) || self.failing_methods.lock().contains(method) {
            return Err(Error::call(method, "Mock failure"));
        }
        Ok(())
    }
}

/// A mock transport for testing.
///
/// Cloning yields a handle to the same mock, so a test can keep one clone for
/// inspection and failure injection while the session owns another.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use serde_json::json;
/// use tcc_core::{MockTransport, Session};
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::with_handler(|_, _| Ok(json!(true)));
///     let session = Session::new(Arc::new(transport.clone()));
///     session.connect("test").await.unwrap();
///
///     assert!(session.is_connected().await);
///     assert_eq!(transport.calls_to("isConnected"), 1);
/// }
/// ```
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<MockShared>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("open_count", &self.open_count())
            .field("call_count", &self.call_count())
            .finish()
    }
}

impl MockTransport {
    /// Create a mock answering every call with `handler`.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let (signals, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(MockShared {
                handler: Arc::new(handler),
                calls: Mutex::new(Vec::new()),
                open_count: AtomicU32::new(0),
                close_count: AtomicU32::new(0),
                should_fail: AtomicBool::new(false),
                failing_methods: Mutex::new(HashSet::new()),
                remaining_failures: AtomicU32::new(0),
                latency_ms: AtomicU64::new(0),
                open_latency_ms: AtomicU64::new(0),
                fail_open: AtomicBool::new(false),
                fail_close: AtomicBool::new(false),
                signals,
                current: Mutex::new(Weak::new()),
            }),
        }
    }

    /// Create a mock that opens fine but fails every call.
    pub fn failing() -> Self {
        Self::with_handler(|method, _| Err(Error::call(method, "Mock failure")))
    }

    // --- Inspection ---

    /// Total number of calls made on open channels.
    pub fn call_count(&self) -> usize {
        self.shared.calls.lock().len()
    }

    /// Number of calls made to `method`.
    pub fn calls_to(&self, method: &str) -> usize {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.shared.calls.lock().clone()
    }

    /// Number of channels opened.
    pub fn open_count(&self) -> u32 {
        self.shared.open_count.load(Ordering::SeqCst)
    }

    /// Number of channel closes requested.
    pub fn close_count(&self) -> u32 {
        self.shared.close_count.load(Ordering::SeqCst)
    }

    // --- Failure injection ---

    /// Make every call fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.shared.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Make calls to `method` fail.
    pub fn fail_method(&self, method: &str) {
        self.shared.failing_methods.lock().insert(method.to_string());
    }

    /// Stop failing individual methods.
    pub fn clear_method_failures(&self) {
        self.shared.failing_methods.lock().clear();
    }

    /// Fail the next `count` calls, then succeed again.
    pub fn set_transient_failures(&self, count: u32) {
        self.shared.remaining_failures.store(count, Ordering::SeqCst);
    }

    /// Set simulated call latency.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.shared
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set simulated open latency.
    pub fn set_open_latency(&self, latency: Duration) {
        self.shared
            .open_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make opening fail as if the target were unreachable.
    pub fn set_fail_open(&self, fail: bool) {
        self.shared.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make closing report an error. The channel closes regardless.
    pub fn set_fail_close(&self, fail: bool) {
        self.shared.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Lose the open channel: later calls on it fail with
    /// [`Error::ConnectionLost`] and it reports itself closed.
    pub fn sever(&self) {
        if let Some(channel) = self.shared.current.lock().upgrade() {
            channel.lost.store(true, Ordering::SeqCst);
            channel.open.store(false, Ordering::SeqCst);
        }
    }

    /// Push a signal to every subscriber. Returns the number of receivers.
    pub fn emit_signal(&self, name: &str, args: Vec<Value>) -> usize {
        self.shared
            .signals
            .send(Signal::new(name, args))
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, target: &str) -> Result<Arc<dyn Channel>> {
        let latency = self.shared.open_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.shared.fail_open.load(Ordering::SeqCst) {
            return Err(Error::connection_failed(
                target,
                ConnectionFailureReason::Unreachable,
            ));
        }

        self.shared.open_count.fetch_add(1, Ordering::SeqCst);
        let channel = Arc::new(MockChannel {
            shared: Arc::clone(&self.shared),
            open: AtomicBool::new(true),
            lost: AtomicBool::new(false),
        });
        *self.shared.current.lock() = Arc::downgrade(&channel);
        Ok(channel as Arc<dyn Channel>)
    }
}

/// A channel opened by [`MockTransport`].
pub struct MockChannel {
    shared: Arc<MockShared>,
    open: AtomicBool,
    lost: AtomicBool,
}

#[async_trait]
impl Channel for MockChannel {
    async fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(Error::ConnectionLost("mock channel severed".to_string()));
        }
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        self.shared
            .calls
            .lock()
            .push((method.to_string(), args.to_vec()));

        let latency = self.shared.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.shared.check_failure(method)?;
        (self.shared.handler)(method, args)
    }

    async fn close(&self) -> Result<()> {
        self.shared.close_count.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        if self.shared.fail_close.load(Ordering::SeqCst) {
            return Err(Error::call("close", "Mock close failure"));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn signals(&self) -> Option<broadcast::Receiver<Signal>> {
        Some(self.shared.signals.subscribe())
    }
}

struct AquarisDevice {
    state: AquarisState,
    firmware: String,
    present: bool,
}

/// A simulated liquid-cooling unit.
///
/// Answers the liquid-cooler protocol from an in-memory [`AquarisState`]:
/// writes change the state, `getState` reports it.
#[derive(Clone)]
pub struct MockAquaris {
    device: Arc<Mutex<AquarisDevice>>,
    transport: MockTransport,
}

impl MockAquaris {
    /// Create a device with everything off and firmware `1.0.0`.
    pub fn new() -> Self {
        let device = Arc::new(Mutex::new(AquarisDevice {
            state: AquarisState::default(),
            firmware: "1.0.0".to_string(),
            present: true,
        }));
        let handler_device = Arc::clone(&device);
        let transport = MockTransport::with_handler(move |method, args| {
            handle_aquaris(&mut handler_device.lock(), method, args)
        });
        Self { device, transport }
    }

    /// The transport reaching this device. Clones share failure injection
    /// and call log.
    pub fn transport(&self) -> MockTransport {
        self.transport.clone()
    }

    /// Current device-side state.
    pub fn state(&self) -> AquarisState {
        self.device.lock().state
    }

    /// Replace the device-side state.
    pub fn set_state(&self, state: AquarisState) {
        self.device.lock().state = state;
    }

    /// Set the firmware version string.
    pub fn set_firmware(&self, firmware: &str) {
        self.device.lock().firmware = firmware.to_string();
    }

    /// Whether the unit reports itself as connected to the host.
    pub fn set_present(&self, present: bool) {
        self.device.lock().present = present;
    }
}

impl Default for MockAquaris {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockAquaris {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let device = self.device.lock();
        f.debug_struct("MockAquaris")
            .field("state", &device.state)
            .field("firmware", &device.firmware)
            .field("present", &device.present)
            .finish()
    }
}

fn handle_aquaris(device: &mut AquarisDevice, method: &str, args: &[Value]) -> Result<Value> {
    let state = &mut device.state;
    match method {
        methods::IS_CONNECTED => return Ok(json!(device.present)),
        methods::GET_STATE => return Ok(serde_json::to_value(*state)?),
        methods::READ_FW_VERSION => return Ok(json!(device.firmware)),
        methods::UPDATE_LED => {
            state.red = arg_u8(method, args, 0)?;
            state.green = arg_u8(method, args, 1)?;
            state.blue = arg_u8(method, args, 2)?;
            state.led_mode = arg_u8(method, args, 3)?;
            state.led_on = true;
        }
        methods::WRITE_RGB_OFF => state.led_on = false,
        methods::WRITE_FAN_MODE => {
            state.fan_duty_cycle = arg_u8(method, args, 0)?;
            state.fan_on = true;
        }
        methods::WRITE_FAN_OFF => state.fan_on = false,
        methods::WRITE_PUMP_MODE => {
            state.pump_duty_cycle = arg_u8(method, args, 0)?;
            state.pump_voltage = arg_u8(method, args, 1)?;
            state.pump_on = true;
        }
        methods::WRITE_PUMP_OFF => state.pump_on = false,
        other => return Err(Error::call(other, "Unknown method")),
    }
    Ok(Value::Null)
}

fn arg_u8(method: &str, args: &[Value], index: usize) -> Result<u8> {
    args.get(index)
        .and_then(Value::as_u64)
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| Error::call(method, format!("argument {} is not a byte", index)))
}

/// An in-memory [`ProfileStore`].
pub struct MemoryProfileStore {
    defaults: Vec<Profile>,
    customs: Mutex<Vec<Profile>>,
    settings: Mutex<Settings>,
    read_only: AtomicBool,
    import_calls: AtomicU32,
}

impl MemoryProfileStore {
    /// Create a store with fixed `defaults` and initial `customs`.
    pub fn new(defaults: Vec<Profile>, customs: Vec<Profile>) -> Self {
        Self {
            defaults,
            customs: Mutex::new(customs),
            settings: Mutex::new(Settings::default()),
            read_only: AtomicBool::new(false),
            import_calls: AtomicU32::new(0),
        }
    }

    /// Reject every write.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of accepted `import_profiles` calls.
    pub fn import_calls(&self) -> u32 {
        self.import_calls.load(Ordering::SeqCst)
    }

    fn writable(&self) -> bool {
        !self.read_only.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProfileStore")
            .field("defaults", &self.defaults.len())
            .field("customs", &self.customs.lock().len())
            .finish()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn all_profiles(&self) -> Vec<Profile> {
        let mut all = self.defaults.clone();
        all.extend(self.customs.lock().iter().cloned());
        all
    }

    async fn default_profiles(&self) -> Vec<Profile> {
        self.defaults.clone()
    }

    async fn custom_profiles(&self) -> Vec<Profile> {
        self.customs.lock().clone()
    }

    async fn settings(&self) -> Option<Settings> {
        Some(self.settings.lock().clone())
    }

    async fn copy_profile(&self, source_id: Option<&str>, name: &str) -> Option<String> {
        if !self.writable() {
            return None;
        }
        let mut copy = match source_id {
            Some(id) => self.profile_by_id(id).await?,
            None => Profile::default(),
        };
        copy.id = Uuid::new_v4().to_string();
        copy.name = name.to_string();
        let id = copy.id.clone();
        self.customs.lock().push(copy);
        Some(id)
    }

    async fn delete_custom_profile(&self, id: &str) -> bool {
        if !self.writable() {
            return false;
        }
        let mut customs = self.customs.lock();
        let before = customs.len();
        customs.retain(|p| p.id != id);
        customs.len() != before
    }

    async fn import_profiles(&self, profiles: Vec<Profile>) -> bool {
        if !self.writable() {
            return false;
        }
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        let mut customs = self.customs.lock();
        for profile in profiles {
            match customs.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => *existing = profile,
                None => customs.push(profile),
            }
        }
        true
    }

    async fn set_active_profile(&self, profile_id: &str, state_id: &str) -> bool {
        if !self.writable() || self.profile_by_id(profile_id).await.is_none() {
            return false;
        }
        self.settings
            .lock()
            .state_map
            .insert(state_id.to_string(), profile_id.to_string());
        true
    }
}
