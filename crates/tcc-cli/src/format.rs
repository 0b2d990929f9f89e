//! Text and JSON formatting for command output.

use owo_colors::OwoColorize;
use serde::Serialize;
use tcc_core::Snapshot;
use tcc_types::{AquarisState, FanData, Profile};
use time::format_description::well_known::Rfc3339;

/// `on`/`off` label, green when on.
pub fn format_switch(on: bool, no_color: bool) -> String {
    match (on, no_color) {
        (true, true) => "on".to_string(),
        (false, true) => "off".to_string(),
        (true, false) => "on".green().to_string(),
        (false, false) => "off".dimmed().to_string(),
    }
}

/// `yes`/`no` label for capability flags.
pub fn format_flag(available: bool, no_color: bool) -> String {
    match (available, no_color) {
        (true, true) => "yes".to_string(),
        (false, true) => "no".to_string(),
        (true, false) => "yes".green().to_string(),
        (false, false) => "no".yellow().to_string(),
    }
}

/// One fan's speed and temperature, or `-` when nothing was reported.
pub fn format_fan(fan: &FanData) -> String {
    if *fan == FanData::default() {
        return "-".to_string();
    }
    format!("{:.0}% at {:.1}°C", fan.speed.data, fan.temp.data)
}

/// Label padded to the width used by the text reports.
pub fn label(name: &str, no_color: bool) -> String {
    let padded = format!("{:<22}", format!("{}:", name));
    if no_color {
        padded
    } else {
        padded.bold().to_string()
    }
}

/// Multi-line cooler state.
pub fn format_aquaris_text(state: &AquarisState, firmware: Option<&str>, no_color: bool) -> String {
    let mut out = String::new();
    if let Some(firmware) = firmware {
        out.push_str(&format!("{}{}\n", label("Firmware", no_color), firmware));
    }
    out.push_str(&format!(
        "{}{} {} mode {}\n",
        label("LED", no_color),
        format_switch(state.led_on, no_color),
        state.color(),
        state.led_mode
    ));
    out.push_str(&format!(
        "{}{} {}%\n",
        label("Fan", no_color),
        format_switch(state.fan_on, no_color),
        state.fan_duty_cycle
    ));
    out.push_str(&format!(
        "{}{} {}% voltage {}\n",
        label("Pump", no_color),
        format_switch(state.pump_on, no_color),
        state.pump_duty_cycle,
        state.pump_voltage
    ));
    out
}

/// One line per polled snapshot for `aquaris watch`.
pub fn format_snapshot_line(snapshot: &Snapshot<AquarisState>) -> String {
    let at = snapshot
        .captured_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| snapshot.captured_at.to_string());
    format!("{}  {}\n", at, snapshot.state)
}

#[derive(Serialize)]
struct AquarisJson<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    firmware: Option<&'a str>,
    #[serde(flatten)]
    state: &'a AquarisState,
}

/// Cooler state as one JSON document.
pub fn format_aquaris_json(
    state: &AquarisState,
    firmware: Option<&str>,
) -> serde_json::Result<String> {
    let mut json = serde_json::to_string(&AquarisJson { firmware, state })?;
    json.push('\n');
    Ok(json)
}

/// Profile listing row: id, name and the power states using it.
pub fn format_profile_row(profile: &Profile, states: &[&str], custom: bool) -> String {
    let kind = if custom { "custom" } else { "default" };
    let mut row = format!("{:<38} {:<7} {}", profile.id, kind, profile.name);
    if !states.is_empty() {
        row.push_str(&format!(" [{}]", states.join(", ")));
    }
    row.push('\n');
    row
}

/// Pretty JSON followed by a newline.
pub fn to_pretty_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}
