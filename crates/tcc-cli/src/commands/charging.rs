//! Charging command implementation.

use std::path::PathBuf;

use anyhow::{Result, bail};
use serde::Serialize;
use tcc_core::TccdClient;
use tcc_types::ChargeType;

use crate::cli::{ChargingAction, OutputFormat};
use crate::format::{label, to_pretty_json};
use crate::util::{require_applied, write_output};

#[derive(Debug, Serialize)]
struct ChargingReport {
    profile: String,
    profiles_available: Vec<String>,
    priority: String,
    priorities_available: Vec<String>,
    charge_type: ChargeType,
    start_threshold: Option<u32>,
    start_thresholds_available: Vec<u32>,
    end_threshold: Option<u32>,
    end_thresholds_available: Vec<u32>,
}

impl ChargingReport {
    async fn read(tccd: &TccdClient) -> Self {
        Self {
            profile: tccd.current_charging_profile().await,
            profiles_available: tccd.charging_profiles_available().await,
            priority: tccd.current_charging_priority().await,
            priorities_available: tccd.charging_priorities_available().await,
            charge_type: tccd.charge_type().await,
            start_threshold: tccd.charge_start_threshold().await,
            start_thresholds_available: tccd.charge_start_available_thresholds().await,
            end_threshold: tccd.charge_end_threshold().await,
            end_thresholds_available: tccd.charge_end_available_thresholds().await,
        }
    }

    fn to_text(&self, no_color: bool) -> String {
        let choice = |current: &str, available: &[String]| {
            let current = if current.is_empty() { "-" } else { current };
            if available.is_empty() {
                current.to_string()
            } else {
                format!("{} (available: {})", current, available.join(", "))
            }
        };
        let threshold = |current: Option<u32>, available: &[u32]| {
            let current = current.map_or_else(|| "-".to_string(), |v| format!("{}%", v));
            if available.is_empty() {
                current
            } else {
                let available: Vec<String> = available.iter().map(u32::to_string).collect();
                format!("{} (available: {})", current, available.join(", "))
            }
        };

        format!(
            "{}{}\n{}{}\n{}{}\n{}{}\n{}{}\n",
            label("Charging profile", no_color),
            choice(&self.profile, &self.profiles_available),
            label("Charging priority", no_color),
            choice(&self.priority, &self.priorities_available),
            label("Charge type", no_color),
            self.charge_type,
            label("Start threshold", no_color),
            threshold(self.start_threshold, &self.start_thresholds_available),
            label("End threshold", no_color),
            threshold(self.end_threshold, &self.end_thresholds_available),
        )
    }
}

pub async fn cmd_charging(
    tccd: &TccdClient,
    action: ChargingAction,
    output: Option<&PathBuf>,
    quiet: bool,
    no_color: bool,
) -> Result<()> {
    match action {
        ChargingAction::Show { format } => {
            let report = ChargingReport::read(tccd).await;
            let content = match format {
                OutputFormat::Json => to_pretty_json(&report)?,
                OutputFormat::Text => report.to_text(no_color),
            };
            write_output(output, &content)?;
        }
        ChargingAction::Profile { name } => {
            require_listed(&name, &tccd.charging_profiles_available().await, "charging profile")?;
            require_applied(tccd.set_charging_profile(&name).await, "charging profile")?;
            confirm(quiet, &format!("Charging profile set to {}", name));
        }
        ChargingAction::Priority { name } => {
            require_listed(
                &name,
                &tccd.charging_priorities_available().await,
                "charging priority",
            )?;
            require_applied(tccd.set_charging_priority(&name).await, "charging priority")?;
            confirm(quiet, &format!("Charging priority set to {}", name));
        }
        ChargingAction::Thresholds { start, end } => {
            if start.is_none() && end.is_none() {
                bail!("Nothing to change. Pass --start and/or --end.");
            }
            if let (Some(start), Some(end)) = (start, end)
                && start >= end
            {
                bail!("Start threshold ({}%) must be below end threshold ({}%)", start, end);
            }
            if let Some(start) = start {
                require_applied(
                    tccd.set_charge_start_threshold(start).await,
                    "start threshold",
                )?;
                confirm(quiet, &format!("Charge start threshold set to {}%", start));
            }
            if let Some(end) = end {
                require_applied(tccd.set_charge_end_threshold(end).await, "end threshold")?;
                confirm(quiet, &format!("Charge end threshold set to {}%", end));
            }
        }
        ChargingAction::Type { charge_type } => {
            require_applied(tccd.set_charge_type(charge_type).await, "charge type")?;
            confirm(quiet, &format!("Charge type set to {}", charge_type));
        }
    }
    Ok(())
}

/// Reject a descriptor the daemon does not offer. An empty list means the
/// daemon could not say, so anything goes.
fn require_listed(name: &str, available: &[String], what: &str) -> Result<()> {
    if available.is_empty() || available.iter().any(|a| a == name) {
        Ok(())
    } else {
        bail!(
            "Unknown {} '{}'. Available: {}",
            what,
            name,
            available.join(", ")
        )
    }
}

fn confirm(quiet: bool, message: &str) {
    if !quiet {
        eprintln!("{}", message);
    }
}
