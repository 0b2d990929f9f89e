//! Status command implementation.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tcc_core::TccdClient;
use tcc_types::{ChargeType, FanData};

use crate::cli::OutputFormat;
use crate::format::{format_fan, format_flag, label, to_pretty_json};
use crate::util::write_output;

/// Everything `tccctl status` reports.
#[derive(Debug, Serialize)]
pub struct DaemonStatus {
    pub version: String,
    pub tuxedo_wmi: bool,
    pub fan_hwmon: bool,
    pub active_profile: Option<String>,
    pub fan_cpu: FanData,
    pub fan_gpu1: FanData,
    pub fan_gpu2: FanData,
    pub fans_min_speed: Option<u32>,
    pub fans_off_available: bool,
    pub charge_type: ChargeType,
    pub charging_profile: String,
    pub fn_lock_supported: bool,
    pub fn_lock: bool,
    pub webcam_switch: Option<bool>,
    pub prime_state: Option<String>,
    pub displays: usize,
}

impl DaemonStatus {
    /// Read every status value. Unreadable values come back as their
    /// defaults.
    pub async fn read(tccd: &TccdClient) -> Self {
        let webcam_switch = if tccd.webcam_sw_available().await {
            Some(tccd.webcam_sw_status().await)
        } else {
            None
        };

        Self {
            version: tccd.tccd_version().await,
            tuxedo_wmi: tccd.tuxedo_wmi_available().await,
            fan_hwmon: tccd.fan_hwmon_available().await,
            active_profile: tccd.active_profile().await.map(|p| p.name),
            fan_cpu: tccd.fan_data_cpu().await,
            fan_gpu1: tccd.fan_data_gpu1().await,
            fan_gpu2: tccd.fan_data_gpu2().await,
            fans_min_speed: tccd.fans_min_speed().await,
            fans_off_available: tccd.fans_off_available().await,
            charge_type: tccd.charge_type().await,
            charging_profile: tccd.current_charging_profile().await,
            fn_lock_supported: tccd.fn_lock_supported().await,
            fn_lock: tccd.fn_lock_status().await,
            webcam_switch,
            prime_state: tccd.prime_state().await,
            displays: tccd.display_modes().await.len(),
        }
    }
}

pub async fn cmd_status(
    tccd: &TccdClient,
    format: OutputFormat,
    output: Option<&PathBuf>,
    no_color: bool,
) -> Result<()> {
    let status = DaemonStatus::read(tccd).await;

    let content = match format {
        OutputFormat::Json => to_pretty_json(&status)?,
        OutputFormat::Text => format_status_text(&status, no_color),
    };
    write_output(output, &content)
}

fn format_status_text(status: &DaemonStatus, no_color: bool) -> String {
    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
    let mut out = String::new();
    let mut line = |name: &str, value: String| {
        out.push_str(&format!("{}{}\n", label(name, no_color), value));
    };

    line("Daemon version", or_dash(&status.version));
    line("TUXEDO WMI", format_flag(status.tuxedo_wmi, no_color));
    line("Fan hwmon", format_flag(status.fan_hwmon, no_color));
    line(
        "Active profile",
        or_dash(status.active_profile.as_deref().unwrap_or_default()),
    );
    line("CPU fan", format_fan(&status.fan_cpu));
    line("GPU1 fan", format_fan(&status.fan_gpu1));
    line("GPU2 fan", format_fan(&status.fan_gpu2));
    line(
        "Fans minimum speed",
        status
            .fans_min_speed
            .map(|s| format!("{}%", s))
            .unwrap_or_else(|| "-".to_string()),
    );
    line("Fans can stop", format_flag(status.fans_off_available, no_color));
    line("Charge type", status.charge_type.to_string());
    line("Charging profile", or_dash(&status.charging_profile));
    let fn_lock = if status.fn_lock_supported {
        format_flag(status.fn_lock, no_color)
    } else {
        "unsupported".to_string()
    };
    line("Fn lock", fn_lock);
    let webcam = match status.webcam_switch {
        Some(on) => format_flag(on, no_color),
        None => "unsupported".to_string(),
    };
    line("Webcam", webcam);
    line(
        "Prime state",
        or_dash(status.prime_state.as_deref().unwrap_or_default()),
    );
    line("Displays", status.displays.to_string());
    out
}
