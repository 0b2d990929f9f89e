//! Client for the hardware-control daemon (tccd).
//!
//! [`TccdClient`] exposes the daemon's flat method surface as typed async
//! accessors. Accessors never fail: any error, including a payload that
//! cannot be decoded, is logged at debug level and replaced by the typed
//! default listed below. Setters report success as `bool`.
//!
//! # Defaults on failure
//!
//! | Accessor | Remote method | Default |
//! |----------|---------------|---------|
//! | `dbus_available` | `TuxedoWmiAvailable` (any answer) | `false` |
//! | `tuxedo_wmi_available` | `TuxedoWmiAvailable` | `false` |
//! | `fan_hwmon_available` | `FanHwmonAvailable` | `false` |
//! | `tccd_version` | `TccdVersion` | `""` |
//! | `device_json` | `GetDevice` | `None` |
//! | `fan_data_cpu`, `fan_data_gpu1`, `fan_data_gpu2` | `GetFanDataCPU`, `GetFanDataGPU1`, `GetFanDataGPU2` | `FanData::default()` |
//! | `display_modes_json` | `GetDisplayModesJSON` | `None` |
//! | `display_modes` | `GetDisplayModesJSON` | `[]` |
//! | `refresh_rate_supported` | `GetRefreshRateSupported` | `false` |
//! | `webcam_sw_available` | `WebcamSWAvailable` | `false` |
//! | `webcam_sw_status` | `GetWebcamSWStatus` | `false` |
//! | `force_yuv420_output_switch_available` | `GetForceYUV420OutputSwitchAvailable` | `false` |
//! | `dgpu_info_values_json` | `GetDGpuInfoValuesJSON` | `None` |
//! | `igpu_info_values_json` | `GetIGpuInfoValuesJSON` | `None` |
//! | `cpu_power_values_json` | `GetCpuPowerValuesJSON` | `None` |
//! | `prime_state` | `GetPrimeState` | `None` |
//! | `consume_mode_reapply_pending` | `ConsumeModeReapplyPending` | `false` |
//! | `active_profile_json` / `active_profile` | `GetActiveProfileJSON` | `None` |
//! | `set_temp_profile_name` | `SetTempProfile` | `false` |
//! | `set_temp_profile_by_id` | `SetTempProfileById` | `false` |
//! | `profiles_json` / `profiles` | `GetProfilesJSON` | `None` / `[]` |
//! | `custom_profiles_json` / `custom_profiles` | `GetCustomProfilesJSON` | `None` / `[]` |
//! | `default_profiles_json` / `default_profiles` | `GetDefaultProfilesJSON` | `None` / `[]` |
//! | `default_values_profile_json` / `default_values_profile` | `GetDefaultValuesProfileJSON` | `None` |
//! | `settings_json` / `settings` | `GetSettingsJSON` | `None` |
//! | `odm_profiles_available` | `ODMProfilesAvailable` | `[]` |
//! | `odm_power_limits` | `ODMPowerLimitsJSON` | `[]` |
//! | `keyboard_backlight_capabilities_json` | `GetKeyboardBacklightCapabilitiesJSON` | `None` |
//! | `keyboard_backlight_states_json` | `GetKeyboardBacklightStatesJSON` | `None` |
//! | `set_keyboard_backlight_states_json` | `SetKeyboardBacklightStatesJSON` | `false` |
//! | `fans_min_speed` | `GetFansMinSpeed` | `None` |
//! | `fans_off_available` | `GetFansOffAvailable` | `false` |
//! | `charging_profiles_available` | `GetChargingProfilesAvailable` | `[]` |
//! | `current_charging_profile` | `GetCurrentChargingProfile` | `""` |
//! | `set_charging_profile` | `SetChargingProfile` | `false` |
//! | `charging_priorities_available` | `GetChargingPrioritiesAvailable` | `[]` |
//! | `current_charging_priority` | `GetCurrentChargingPriority` | `""` |
//! | `set_charging_priority` | `SetChargingPriority` | `false` |
//! | `charge_start_available_thresholds` | `GetChargeStartAvailableThresholds` | `[]` |
//! | `charge_end_available_thresholds` | `GetChargeEndAvailableThresholds` | `[]` |
//! | `charge_start_threshold` | `GetChargeStartThreshold` | `None` |
//! | `charge_end_threshold` | `GetChargeEndThreshold` | `None` |
//! | `set_charge_start_threshold` | `SetChargeStartThreshold` | `false` |
//! | `set_charge_end_threshold` | `SetChargeEndThreshold` | `false` |
//! | `charge_type` | `GetChargeType` | `ChargeType::Unknown` |
//! | `set_charge_type` | `SetChargeType` | `false` |
//! | `fn_lock_supported` | `GetFnLockSupported` | `false` |
//! | `fn_lock_status` | `GetFnLockStatus` | `false` |
//! | `set_fn_lock_status` | `SetFnLockStatus` | `false` |
//! | `sensor_data_collection_status` | `GetSensorDataCollectionStatus` | `false` |
//! | `set_sensor_data_collection_status` | `SetSensorDataCollectionStatus` | `false` |
//! | `set_dgpu_d0_metrics` | `SetDGpuD0Metrics` | `false` |
//!
//! The `*_json` accessors return the raw document; their typed counterparts
//! decode it, and a document that does not decode yields the same default
//! as a failed call.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tcc_types::{ChargeType, DisplayFreqRes, FanData, Profile, Settings, TdpInfo};

use crate::error::{Error, Result};
use crate::events::EventReceiver;
use crate::profiles::ProfileCatalog;
use crate::session::{ConnectionState, Session, SessionOptions};
use crate::signals::{SignalRegistry, SubscriptionId};
use crate::transport::{Transport, Value, decode, decode_json_str};

/// Remote method names of the daemon interface.
pub mod methods {
    pub const TUXEDO_WMI_AVAILABLE: &str = "TuxedoWmiAvailable";
    pub const FAN_HWMON_AVAILABLE: &str = "FanHwmonAvailable";
    pub const TCCD_VERSION: &str = "TccdVersion";
    pub const GET_DEVICE: &str = "GetDevice";
    pub const GET_FAN_DATA_CPU: &str = "GetFanDataCPU";
    pub const GET_FAN_DATA_GPU1: &str = "GetFanDataGPU1";
    pub const GET_FAN_DATA_GPU2: &str = "GetFanDataGPU2";
    pub const GET_DISPLAY_MODES_JSON: &str = "GetDisplayModesJSON";
    pub const GET_REFRESH_RATE_SUPPORTED: &str = "GetRefreshRateSupported";
    pub const WEBCAM_SW_AVAILABLE: &str = "WebcamSWAvailable";
    pub const GET_WEBCAM_SW_STATUS: &str = "GetWebcamSWStatus";
    pub const GET_FORCE_YUV420_OUTPUT_SWITCH_AVAILABLE: &str =
        "GetForceYUV420OutputSwitchAvailable";
    pub const GET_DGPU_INFO_VALUES_JSON: &str = "GetDGpuInfoValuesJSON";
    pub const GET_IGPU_INFO_VALUES_JSON: &str = "GetIGpuInfoValuesJSON";
    pub const GET_CPU_POWER_VALUES_JSON: &str = "GetCpuPowerValuesJSON";
    pub const GET_PRIME_STATE: &str = "GetPrimeState";
    pub const CONSUME_MODE_REAPPLY_PENDING: &str = "ConsumeModeReapplyPending";
    pub const GET_ACTIVE_PROFILE_JSON: &str = "GetActiveProfileJSON";
    pub const SET_TEMP_PROFILE: &str = "SetTempProfile";
    pub const SET_TEMP_PROFILE_BY_ID: &str = "SetTempProfileById";
    pub const GET_PROFILES_JSON: &str = "GetProfilesJSON";
    pub const GET_CUSTOM_PROFILES_JSON: &str = "GetCustomProfilesJSON";
    pub const GET_DEFAULT_PROFILES_JSON: &str = "GetDefaultProfilesJSON";
    pub const GET_DEFAULT_VALUES_PROFILE_JSON: &str = "GetDefaultValuesProfileJSON";
    pub const GET_SETTINGS_JSON: &str = "GetSettingsJSON";
    pub const ODM_PROFILES_AVAILABLE: &str = "ODMProfilesAvailable";
    pub const ODM_POWER_LIMITS_JSON: &str = "ODMPowerLimitsJSON";
    pub const GET_KEYBOARD_BACKLIGHT_CAPABILITIES_JSON: &str =
        "GetKeyboardBacklightCapabilitiesJSON";
    pub const GET_KEYBOARD_BACKLIGHT_STATES_JSON: &str = "GetKeyboardBacklightStatesJSON";
    pub const SET_KEYBOARD_BACKLIGHT_STATES_JSON: &str = "SetKeyboardBacklightStatesJSON";
    pub const GET_FANS_MIN_SPEED: &str = "GetFansMinSpeed";
    pub const GET_FANS_OFF_AVAILABLE: &str = "GetFansOffAvailable";
    pub const GET_CHARGING_PROFILES_AVAILABLE: &str = "GetChargingProfilesAvailable";
    pub const GET_CURRENT_CHARGING_PROFILE: &str = "GetCurrentChargingProfile";
    pub const SET_CHARGING_PROFILE: &str = "SetChargingProfile";
    pub const GET_CHARGING_PRIORITIES_AVAILABLE: &str = "GetChargingPrioritiesAvailable";
    pub const GET_CURRENT_CHARGING_PRIORITY: &str = "GetCurrentChargingPriority";
    pub const SET_CHARGING_PRIORITY: &str = "SetChargingPriority";
    pub const GET_CHARGE_START_AVAILABLE_THRESHOLDS: &str = "GetChargeStartAvailableThresholds";
    pub const GET_CHARGE_END_AVAILABLE_THRESHOLDS: &str = "GetChargeEndAvailableThresholds";
    pub const GET_CHARGE_START_THRESHOLD: &str = "GetChargeStartThreshold";
    pub const SET_CHARGE_START_THRESHOLD: &str = "SetChargeStartThreshold";
    pub const GET_CHARGE_END_THRESHOLD: &str = "GetChargeEndThreshold";
    pub const SET_CHARGE_END_THRESHOLD: &str = "SetChargeEndThreshold";
    pub const GET_CHARGE_TYPE: &str = "GetChargeType";
    pub const SET_CHARGE_TYPE: &str = "SetChargeType";
    pub const GET_FN_LOCK_SUPPORTED: &str = "GetFnLockSupported";
    pub const GET_FN_LOCK_STATUS: &str = "GetFnLockStatus";
    pub const SET_FN_LOCK_STATUS: &str = "SetFnLockStatus";
    pub const SET_SENSOR_DATA_COLLECTION_STATUS: &str = "SetSensorDataCollectionStatus";
    pub const GET_SENSOR_DATA_COLLECTION_STATUS: &str = "GetSensorDataCollectionStatus";
    pub const SET_DGPU_D0_METRICS: &str = "SetDGpuD0Metrics";
}

/// Signal raised when a power mode needs to be re-applied, or no longer does.
pub const MODE_REAPPLY_PENDING_CHANGED: &str = "ModeReapplyPendingChanged";

/// Typed, failure-absorbing client for the daemon.
pub struct TccdClient {
    session: Arc<Session>,
    signals: Arc<SignalRegistry>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl TccdClient {
    /// Create a disconnected client with default options.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let options = SessionOptions::default().probe_method(methods::TUXEDO_WMI_AVAILABLE);
        Self::from_session(Session::build(transport, options))
    }

    /// Create a disconnected client with custom session options.
    pub fn with_options(transport: Arc<dyn Transport>, options: SessionOptions) -> Result<Self> {
        Ok(Self::from_session(Session::with_options(transport, options)?))
    }

    fn from_session(session: Session) -> Self {
        Self {
            session: Arc::new(session),
            signals: Arc::new(SignalRegistry::new()),
            pump: Mutex::new(None),
        }
    }

    /// The underlying session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Subscribe to session events.
    pub fn events(&self) -> EventReceiver {
        self.session.subscribe()
    }

    /// Connect to the daemon at `target`.
    ///
    /// Returns `true` if connected afterwards (including when already
    /// connected).
    pub async fn init(&self, target: &str) -> bool {
        match self.session.connect(target).await {
            Ok(()) => {
                self.start_signal_pump();
                true
            }
            Err(Error::AlreadyConnected) => true,
            Err(e) => {
                debug!("Daemon init failed: {}", e);
                false
            }
        }
    }

    /// Disconnect and drop all signal subscriptions. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.signals.clear();
        self.session.disconnect().await
    }

    /// Whether the daemon answers at all.
    pub async fn dbus_available(&self) -> bool {
        if self.session.state() != ConnectionState::Connected {
            return false;
        }
        self.session
            .call(methods::TUXEDO_WMI_AVAILABLE, &[])
            .await
            .is_ok()
    }

    /// Register `callback` for [`MODE_REAPPLY_PENDING_CHANGED`].
    ///
    /// Every registered callback receives every signal. Subscriptions are
    /// dropped on [`disconnect`](Self::disconnect).
    pub fn on_mode_reapply_pending_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.signals.on(MODE_REAPPLY_PENDING_CHANGED, move |args| {
            callback(args.first().and_then(Value::as_bool).unwrap_or(false))
        })
    }

    /// Remove a signal subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.signals.off(id)
    }

    /// The signal registry, for signals without a dedicated helper.
    pub fn signals(&self) -> &Arc<SignalRegistry> {
        &self.signals
    }

    // =========================================================================
    // Hardware availability
    // =========================================================================

    pub async fn tuxedo_wmi_available(&self) -> bool {
        self.get(methods::TUXEDO_WMI_AVAILABLE).await
    }

    pub async fn fan_hwmon_available(&self) -> bool {
        self.get(methods::FAN_HWMON_AVAILABLE).await
    }

    pub async fn tccd_version(&self) -> String {
        self.get(methods::TCCD_VERSION).await
    }

    pub async fn device_json(&self) -> Option<String> {
        self.get(methods::GET_DEVICE).await
    }

    // =========================================================================
    // Fans
    // =========================================================================

    pub async fn fan_data_cpu(&self) -> FanData {
        self.get(methods::GET_FAN_DATA_CPU).await
    }

    pub async fn fan_data_gpu1(&self) -> FanData {
        self.get(methods::GET_FAN_DATA_GPU1).await
    }

    pub async fn fan_data_gpu2(&self) -> FanData {
        self.get(methods::GET_FAN_DATA_GPU2).await
    }

    /// Lowest fan speed the firmware allows, in percent.
    pub async fn fans_min_speed(&self) -> Option<u32> {
        self.get(methods::GET_FANS_MIN_SPEED).await
    }

    pub async fn fans_off_available(&self) -> bool {
        self.get(methods::GET_FANS_OFF_AVAILABLE).await
    }

    // =========================================================================
    // Display and webcam
    // =========================================================================

    pub async fn display_modes_json(&self) -> Option<String> {
        self.get(methods::GET_DISPLAY_MODES_JSON).await
    }

    pub async fn display_modes(&self) -> Vec<DisplayFreqRes> {
        self.get_json(methods::GET_DISPLAY_MODES_JSON).await
    }

    pub async fn refresh_rate_supported(&self) -> bool {
        self.get(methods::GET_REFRESH_RATE_SUPPORTED).await
    }

    pub async fn webcam_sw_available(&self) -> bool {
        self.get(methods::WEBCAM_SW_AVAILABLE).await
    }

    pub async fn webcam_sw_status(&self) -> bool {
        self.get(methods::GET_WEBCAM_SW_STATUS).await
    }

    pub async fn force_yuv420_output_switch_available(&self) -> bool {
        self.get(methods::GET_FORCE_YUV420_OUTPUT_SWITCH_AVAILABLE)
            .await
    }

    // =========================================================================
    // GPU and CPU power
    // =========================================================================

    pub async fn dgpu_info_values_json(&self) -> Option<String> {
        self.get(methods::GET_DGPU_INFO_VALUES_JSON).await
    }

    pub async fn igpu_info_values_json(&self) -> Option<String> {
        self.get(methods::GET_IGPU_INFO_VALUES_JSON).await
    }

    pub async fn cpu_power_values_json(&self) -> Option<String> {
        self.get(methods::GET_CPU_POWER_VALUES_JSON).await
    }

    /// Current PRIME (hybrid graphics) mode, e.g. `iGPU`, `dGPU`, `on-demand`.
    pub async fn prime_state(&self) -> Option<String> {
        self.get(methods::GET_PRIME_STATE).await
    }

    pub async fn set_dgpu_d0_metrics(&self, enabled: bool) -> bool {
        self.set(methods::SET_DGPU_D0_METRICS, &[json!(enabled)])
            .await
    }

    // =========================================================================
    // Profiles and settings
    // =========================================================================

    /// Read and reset the daemon's "mode re-apply pending" flag.
    pub async fn consume_mode_reapply_pending(&self) -> bool {
        self.get(methods::CONSUME_MODE_REAPPLY_PENDING).await
    }

    pub async fn active_profile_json(&self) -> Option<String> {
        self.get(methods::GET_ACTIVE_PROFILE_JSON).await
    }

    pub async fn active_profile(&self) -> Option<Profile> {
        self.get_json(methods::GET_ACTIVE_PROFILE_JSON).await
    }

    /// Temporarily activate the profile named `name`.
    pub async fn set_temp_profile_name(&self, name: &str) -> bool {
        self.set(methods::SET_TEMP_PROFILE, &[json!(name)]).await
    }

    /// Temporarily activate the profile with id `id`.
    pub async fn set_temp_profile_by_id(&self, id: &str) -> bool {
        self.set(methods::SET_TEMP_PROFILE_BY_ID, &[json!(id)])
            .await
    }

    pub async fn profiles_json(&self) -> Option<String> {
        self.get(methods::GET_PROFILES_JSON).await
    }

    pub async fn profiles(&self) -> Vec<Profile> {
        self.get_json(methods::GET_PROFILES_JSON).await
    }

    pub async fn custom_profiles_json(&self) -> Option<String> {
        self.get(methods::GET_CUSTOM_PROFILES_JSON).await
    }

    pub async fn custom_profiles(&self) -> Vec<Profile> {
        self.get_json(methods::GET_CUSTOM_PROFILES_JSON).await
    }

    pub async fn default_profiles_json(&self) -> Option<String> {
        self.get(methods::GET_DEFAULT_PROFILES_JSON).await
    }

    pub async fn default_profiles(&self) -> Vec<Profile> {
        self.get_json(methods::GET_DEFAULT_PROFILES_JSON).await
    }

    pub async fn default_values_profile_json(&self) -> Option<String> {
        self.get(methods::GET_DEFAULT_VALUES_PROFILE_JSON).await
    }

    pub async fn default_values_profile(&self) -> Option<Profile> {
        self.get_json(methods::GET_DEFAULT_VALUES_PROFILE_JSON)
            .await
    }

    pub async fn settings_json(&self) -> Option<String> {
        self.get(methods::GET_SETTINGS_JSON).await
    }

    pub async fn settings(&self) -> Option<Settings> {
        self.get_json(methods::GET_SETTINGS_JSON).await
    }

    /// All profiles, split into defaults and customs, with the settings
    /// that map power states to them.
    pub async fn profile_catalog(&self) -> ProfileCatalog {
        ProfileCatalog {
            all: self.profiles().await,
            defaults: self.default_profiles().await,
            customs: self.custom_profiles().await,
            settings: self.settings().await.unwrap_or_default(),
        }
    }

    pub async fn odm_profiles_available(&self) -> Vec<String> {
        self.get(methods::ODM_PROFILES_AVAILABLE).await
    }

    pub async fn odm_power_limits(&self) -> Vec<TdpInfo> {
        self.get_json(methods::ODM_POWER_LIMITS_JSON).await
    }

    // =========================================================================
    // Keyboard backlight
    // =========================================================================

    pub async fn keyboard_backlight_capabilities_json(&self) -> Option<String> {
        self.get(methods::GET_KEYBOARD_BACKLIGHT_CAPABILITIES_JSON)
            .await
    }

    pub async fn keyboard_backlight_states_json(&self) -> Option<String> {
        self.get(methods::GET_KEYBOARD_BACKLIGHT_STATES_JSON).await
    }

    pub async fn set_keyboard_backlight_states_json(&self, states_json: &str) -> bool {
        self.set(
            methods::SET_KEYBOARD_BACKLIGHT_STATES_JSON,
            &[json!(states_json)],
        )
        .await
    }

    // =========================================================================
    // Charging
    // =========================================================================

    pub async fn charging_profiles_available(&self) -> Vec<String> {
        self.get_json(methods::GET_CHARGING_PROFILES_AVAILABLE)
            .await
    }

    pub async fn current_charging_profile(&self) -> String {
        self.get(methods::GET_CURRENT_CHARGING_PROFILE).await
    }

    pub async fn set_charging_profile(&self, descriptor: &str) -> bool {
        self.set(methods::SET_CHARGING_PROFILE, &[json!(descriptor)])
            .await
    }

    pub async fn charging_priorities_available(&self) -> Vec<String> {
        self.get_json(methods::GET_CHARGING_PRIORITIES_AVAILABLE)
            .await
    }

    pub async fn current_charging_priority(&self) -> String {
        self.get(methods::GET_CURRENT_CHARGING_PRIORITY).await
    }

    pub async fn set_charging_priority(&self, descriptor: &str) -> bool {
        self.set(methods::SET_CHARGING_PRIORITY, &[json!(descriptor)])
            .await
    }

    pub async fn charge_start_available_thresholds(&self) -> Vec<u32> {
        self.get_json(methods::GET_CHARGE_START_AVAILABLE_THRESHOLDS)
            .await
    }

    pub async fn charge_end_available_thresholds(&self) -> Vec<u32> {
        self.get_json(methods::GET_CHARGE_END_AVAILABLE_THRESHOLDS)
            .await
    }

    pub async fn charge_start_threshold(&self) -> Option<u32> {
        self.get(methods::GET_CHARGE_START_THRESHOLD).await
    }

    pub async fn set_charge_start_threshold(&self, value: u32) -> bool {
        self.set(methods::SET_CHARGE_START_THRESHOLD, &[json!(value)])
            .await
    }

    pub async fn charge_end_threshold(&self) -> Option<u32> {
        self.get(methods::GET_CHARGE_END_THRESHOLD).await
    }

    pub async fn set_charge_end_threshold(&self, value: u32) -> bool {
        self.set(methods::SET_CHARGE_END_THRESHOLD, &[json!(value)])
            .await
    }

    /// Current charge type. Unrecognized strings map to `Unknown`.
    pub async fn charge_type(&self) -> ChargeType {
        let raw: String = self.get(methods::GET_CHARGE_TYPE).await;
        raw.parse().unwrap_or_else(|e| {
            debug!("{}: {}", methods::GET_CHARGE_TYPE, e);
            ChargeType::Unknown
        })
    }

    pub async fn set_charge_type(&self, charge_type: ChargeType) -> bool {
        self.set(methods::SET_CHARGE_TYPE, &[json!(charge_type.as_str())])
            .await
    }

    // =========================================================================
    // Fn lock and telemetry
    // =========================================================================

    pub async fn fn_lock_supported(&self) -> bool {
        self.get(methods::GET_FN_LOCK_SUPPORTED).await
    }

    pub async fn fn_lock_status(&self) -> bool {
        self.get(methods::GET_FN_LOCK_STATUS).await
    }

    pub async fn set_fn_lock_status(&self, enabled: bool) -> bool {
        self.set(methods::SET_FN_LOCK_STATUS, &[json!(enabled)])
            .await
    }

    pub async fn sensor_data_collection_status(&self) -> bool {
        self.get(methods::GET_SENSOR_DATA_COLLECTION_STATUS).await
    }

    pub async fn set_sensor_data_collection_status(&self, enabled: bool) -> bool {
        self.set(
            methods::SET_SENSOR_DATA_COLLECTION_STATUS,
            &[json!(enabled)],
        )
        .await
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    /// Call a getter and decode its result, or fall back to the default.
    async fn get<T: DeserializeOwned + Default>(&self, method: &str) -> T {
        let result = match self.session.call(method, &[]).await {
            Ok(value) => decode(method, value),
            Err(e) => Err(e),
        };
        absorb(method, result)
    }

    /// Call a getter returning a JSON document in a string and decode the
    /// document, or fall back to the default.
    async fn get_json<T: DeserializeOwned + Default>(&self, method: &str) -> T {
        let result = match self.session.call(method, &[]).await {
            Ok(value) => decode_json_str(method, value),
            Err(e) => Err(e),
        };
        absorb(method, result)
    }

    /// Call a setter; `true` only if the daemon answered `true`.
    async fn set(&self, method: &str, args: &[Value]) -> bool {
        let result = match self.session.call(method, args).await {
            Ok(value) => decode::<bool>(method, value),
            Err(e) => Err(e),
        };
        absorb(method, result)
    }

    fn start_signal_pump(&self) {
        let (Some(scope), Some(mut signals)) =
            (self.session.current_connection(), self.session.signals())
        else {
            return;
        };
        let registry = Arc::clone(&self.signals);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = scope.token.cancelled() => break,
                    received = signals.recv() => match received {
                        Ok(signal) => {
                            let delivered = registry.emit(&signal.name, &signal.args);
                            debug!("Signal {} delivered to {} handlers", signal.name, delivered);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Signal receiver lagged, {} signals dropped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        if let Some(previous) = self.pump.lock().replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for TccdClient {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for TccdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TccdClient")
            .field("session", &self.session)
            .field("signals", &self.signals)
            .finish()
    }
}

fn absorb<T: Default>(method: &str, result: Result<T>) -> T {
    result.unwrap_or_else(|e| {
        debug!("{} unavailable, using default: {}", method, e);
        T::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn daemon() -> MockTransport {
        MockTransport::with_handler(|method, args| match method {
            methods::TUXEDO_WMI_AVAILABLE => Ok(json!(false)),
            methods::TCCD_VERSION => Ok(json!("2.1.0")),
            methods::GET_CHARGING_PROFILES_AVAILABLE => {
                Ok(json!(r#"["high_capacity","balanced","stationary"]"#))
            }
            methods::GET_CHARGE_START_AVAILABLE_THRESHOLDS => Ok(json!("[40, 50, 60]")),
            methods::GET_CHARGE_TYPE => Ok(json!("Long Life")),
            methods::GET_FANS_MIN_SPEED => Ok(json!(20)),
            methods::GET_FAN_DATA_CPU => Ok(json!({
                "speed": {"timestamp": 1, "data": 35},
                "temp": {"timestamp": 1, "data": 58.5}
            })),
            methods::ODM_POWER_LIMITS_JSON => Ok(json!(
                r#"[{"min":5,"max":60,"current":45,"descriptor":"pl1"}]"#
            )),
            methods::GET_SETTINGS_JSON => Ok(json!("{not json")),
            methods::SET_FN_LOCK_STATUS => Ok(Value::Bool(args[0] == json!(true))),
            methods::SET_CHARGE_TYPE => Ok(Value::Bool(args[0] == json!("Long Life"))),
            other => Err(Error::call(other, "not implemented")),
        })
    }

    async fn connected(transport: &MockTransport) -> TccdClient {
        let client = TccdClient::new(Arc::new(transport.clone()));
        assert!(client.init("tccd").await);
        client
    }

    #[tokio::test]
    async fn test_typed_accessors() {
        let transport = daemon();
        let client = connected(&transport).await;

        assert_eq!(client.tccd_version().await, "2.1.0");
        assert_eq!(
            client.charging_profiles_available().await,
            vec!["high_capacity", "balanced", "stationary"]
        );
        assert_eq!(client.charge_start_available_thresholds().await, vec![40, 50, 60]);
        assert_eq!(client.charge_type().await, ChargeType::LongLife);
        assert_eq!(client.fans_min_speed().await, Some(20));
        assert_eq!(client.fan_data_cpu().await.temp.data, 58.5);
        assert_eq!(client.odm_power_limits().await[0].max, 60);
    }

    #[tokio::test]
    async fn test_unparseable_document_uses_default() {
        let transport = daemon();
        let client = connected(&transport).await;

        assert!(client.settings().await.is_none());
        // The raw document is still available
        assert_eq!(client.settings_json().await.as_deref(), Some("{not json"));
    }

    #[tokio::test]
    async fn test_setters_report_daemon_answer() {
        let transport = daemon();
        let client = connected(&transport).await;

        assert!(client.set_fn_lock_status(true).await);
        assert!(!client.set_fn_lock_status(false).await);
        assert!(client.set_charge_type(ChargeType::LongLife).await);
        assert!(!client.set_charging_profile("balanced").await);
    }

    #[tokio::test]
    async fn test_dbus_available_counts_any_answer() {
        let transport = daemon();
        let client = TccdClient::new(Arc::new(transport.clone()));
        assert!(!client.dbus_available().await);

        client.init("tccd").await;
        // TuxedoWmiAvailable answers false, but it answered
        assert!(client.dbus_available().await);
        assert!(!client.tuxedo_wmi_available().await);

        transport.set_should_fail(true);
        assert!(!client.dbus_available().await);
    }

    #[tokio::test]
    async fn test_init_failure() {
        let transport = daemon();
        transport.set_fail_open(true);
        let client = TccdClient::new(Arc::new(transport.clone()));
        assert!(!client.init("tccd").await);
        assert_eq!(client.tccd_version().await, "");
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_init_twice() {
        let transport = daemon();
        let client = connected(&transport).await;
        assert!(client.init("tccd").await);
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test]
    async fn test_mode_reapply_signal_reaches_every_handler() {
        let transport = daemon();
        let client = connected(&transport).await;

        let hits = Arc::new(AtomicU32::new(0));
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            client.on_mode_reapply_pending_changed(move |pending| {
                if pending {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        transport.emit_signal(MODE_REAPPLY_PENDING_CHANGED, vec![json!(true)]);
        tokio::time::timeout(Duration::from_secs(1), async {
            while hits.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_clears_subscriptions() {
        let transport = daemon();
        let client = connected(&transport).await;
        client.on_mode_reapply_pending_changed(|_| {});
        assert_eq!(client.signals().handler_count(MODE_REAPPLY_PENDING_CHANGED), 1);

        client.disconnect().await.unwrap();
        assert_eq!(client.signals().handler_count(MODE_REAPPLY_PENDING_CHANGED), 0);
        client.disconnect().await.unwrap();
    }
}
