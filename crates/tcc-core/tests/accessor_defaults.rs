//! Every daemon accessor falls back to its documented default when the
//! daemon cannot answer, whether the call fails or was never possible.

use std::sync::Arc;

use tcc_core::{ChargeType, FanData, MockTransport, TccdClient};

async fn assert_defaults(tccd: &TccdClient) {
    // Availability flags
    assert!(!tccd.dbus_available().await);
    assert!(!tccd.tuxedo_wmi_available().await);
    assert!(!tccd.fan_hwmon_available().await);
    assert!(!tccd.refresh_rate_supported().await);
    assert!(!tccd.webcam_sw_available().await);
    assert!(!tccd.webcam_sw_status().await);
    assert!(!tccd.force_yuv420_output_switch_available().await);
    assert!(!tccd.consume_mode_reapply_pending().await);
    assert!(!tccd.fans_off_available().await);
    assert!(!tccd.fn_lock_supported().await);
    assert!(!tccd.fn_lock_status().await);
    assert!(!tccd.sensor_data_collection_status().await);

    // Strings
    assert_eq!(tccd.tccd_version().await, "");
    assert_eq!(tccd.current_charging_profile().await, "");
    assert_eq!(tccd.current_charging_priority().await, "");

    // Raw JSON documents
    assert!(tccd.device_json().await.is_none());
    assert!(tccd.display_modes_json().await.is_none());
    assert!(tccd.dgpu_info_values_json().await.is_none());
    assert!(tccd.igpu_info_values_json().await.is_none());
    assert!(tccd.cpu_power_values_json().await.is_none());
    assert!(tccd.active_profile_json().await.is_none());
    assert!(tccd.profiles_json().await.is_none());
    assert!(tccd.custom_profiles_json().await.is_none());
    assert!(tccd.default_profiles_json().await.is_none());
    assert!(tccd.default_values_profile_json().await.is_none());
    assert!(tccd.settings_json().await.is_none());
    assert!(tccd.keyboard_backlight_capabilities_json().await.is_none());
    assert!(tccd.keyboard_backlight_states_json().await.is_none());
    assert!(tccd.prime_state().await.is_none());

    // Decoded documents
    assert!(tccd.display_modes().await.is_empty());
    assert!(tccd.active_profile().await.is_none());
    assert!(tccd.profiles().await.is_empty());
    assert!(tccd.custom_profiles().await.is_empty());
    assert!(tccd.default_profiles().await.is_empty());
    assert!(tccd.default_values_profile().await.is_none());
    assert!(tccd.settings().await.is_none());
    assert!(tccd.odm_power_limits().await.is_empty());
    let catalog = tccd.profile_catalog().await;
    assert!(catalog.all.is_empty());
    assert!(catalog.settings.state_map.is_empty());

    // Fans
    assert_eq!(tccd.fan_data_cpu().await, FanData::default());
    assert_eq!(tccd.fan_data_gpu1().await, FanData::default());
    assert_eq!(tccd.fan_data_gpu2().await, FanData::default());
    assert!(tccd.fans_min_speed().await.is_none());

    // Lists and numbers
    assert!(tccd.odm_profiles_available().await.is_empty());
    assert!(tccd.charging_profiles_available().await.is_empty());
    assert!(tccd.charging_priorities_available().await.is_empty());
    assert!(tccd.charge_start_available_thresholds().await.is_empty());
    assert!(tccd.charge_end_available_thresholds().await.is_empty());
    assert!(tccd.charge_start_threshold().await.is_none());
    assert!(tccd.charge_end_threshold().await.is_none());
    assert_eq!(tccd.charge_type().await, ChargeType::Unknown);

    // Setters report failure
    assert!(!tccd.set_temp_profile_name("Quiet").await);
    assert!(!tccd.set_temp_profile_by_id("quiet").await);
    assert!(!tccd.set_keyboard_backlight_states_json("[]").await);
    assert!(!tccd.set_charging_profile("balanced").await);
    assert!(!tccd.set_charging_priority("charge_battery").await);
    assert!(!tccd.set_charge_start_threshold(40).await);
    assert!(!tccd.set_charge_end_threshold(80).await);
    assert!(!tccd.set_charge_type(ChargeType::Standard).await);
    assert!(!tccd.set_fn_lock_status(true).await);
    assert!(!tccd.set_sensor_data_collection_status(true).await);
    assert!(!tccd.set_dgpu_d0_metrics(true).await);
}

#[tokio::test]
async fn test_defaults_when_every_call_fails() {
    let transport = MockTransport::failing();
    let tccd = TccdClient::new(Arc::new(transport.clone()));
    assert!(tccd.init("tccd").await);

    assert_defaults(&tccd).await;
    assert!(transport.call_count() > 0);
}

#[tokio::test]
async fn test_defaults_when_never_connected() {
    let transport = MockTransport::failing();
    let tccd = TccdClient::new(Arc::new(transport.clone()));

    assert_defaults(&tccd).await;
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_defaults_when_payloads_have_the_wrong_shape() {
    // Answers every call, always with the wrong type
    let transport = MockTransport::with_handler(|_, _| Ok(serde_json::json!({"unexpected": []})));
    let tccd = TccdClient::new(Arc::new(transport));
    assert!(tccd.init("tccd").await);

    // Any answer at all counts as available
    assert!(tccd.dbus_available().await);
    assert!(!tccd.tuxedo_wmi_available().await);
    assert_eq!(tccd.tccd_version().await, "");
    assert!(tccd.profiles().await.is_empty());
    assert!(tccd.charge_start_threshold().await.is_none());
    assert_eq!(tccd.charge_type().await, ChargeType::Unknown);
    assert!(!tccd.set_fn_lock_status(true).await);
}
