//! Profiles command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tcc_core::profiles::{ImportPlan, export_profiles_json, parse_profiles_json, plan_import};
use tcc_core::{ConflictResolution, ImportReport, ProfileCatalog, ProfileFilter, TccdClient};
use tcc_core::validate_profile_name;

use crate::cli::{ConflictPolicy, OutputFormat, ProfileAction};
use crate::format::{format_profile_row, label, to_pretty_json};
use crate::util::{require_applied, write_output};

#[derive(Debug, Serialize)]
struct ProfileEntry<'a> {
    id: &'a str,
    name: &'a str,
    custom: bool,
    states: Vec<&'a str>,
}

pub async fn cmd_profiles(
    tccd: &TccdClient,
    action: ProfileAction,
    output: Option<&PathBuf>,
    quiet: bool,
    no_color: bool,
) -> Result<()> {
    match action {
        ProfileAction::List { filter, format } => {
            let catalog = tccd.profile_catalog().await;
            let content = format_listing(&catalog, filter, format)?;
            write_output(output, &content)?;
        }
        ProfileAction::Active { format } => {
            let Some(profile) = tccd.active_profile().await else {
                bail!("The daemon did not report an active profile");
            };
            let content = match format {
                OutputFormat::Json => to_pretty_json(&profile)?,
                OutputFormat::Text => format!(
                    "{}{}\n{}{}\n",
                    label("Active profile", no_color),
                    profile.name,
                    label("Id", no_color),
                    profile.id
                ),
            };
            write_output(output, &content)?;
        }
        ProfileAction::Export => {
            let customs = tccd.custom_profiles().await;
            if customs.is_empty() && !quiet {
                eprintln!("No custom profiles to export.");
            }
            let mut content = export_profiles_json(&customs)?;
            content.push('\n');
            write_output(output, &content)?;
        }
        ProfileAction::CheckImport { file, on_conflict } => {
            let incoming = read_profile_file(&file)?;
            let customs = tccd.custom_profiles().await;
            let plan = plan_import(&customs, incoming, &resolution(on_conflict)).await?;
            write_output(output, &format_plan(&plan))?;
        }
        ProfileAction::Use { id, name } => {
            if let Some(name) = name {
                let name = validate_profile_name(&name)?;
                require_applied(tccd.set_temp_profile_name(&name).await, "profile")?;
                if !quiet {
                    eprintln!("Switched to profile {}", name);
                }
            } else if let Some(id) = id {
                let catalog = tccd.profile_catalog().await;
                if !catalog.all.is_empty() && catalog.by_id(&id).is_none() {
                    bail!("No profile with id '{}'. Run `tccctl profiles list`.", id);
                }
                require_applied(tccd.set_temp_profile_by_id(&id).await, "profile")?;
                if !quiet {
                    let name = catalog.by_id(&id).map_or(id.as_str(), |p| p.name.as_str());
                    eprintln!("Switched to profile {}", name);
                }
            }
        }
    }
    Ok(())
}

fn resolution(policy: ConflictPolicy) -> ConflictResolution {
    match policy {
        ConflictPolicy::KeepNew => ConflictResolution::KeepNew,
        ConflictPolicy::KeepOld => ConflictResolution::KeepOld,
        ConflictPolicy::KeepBoth => ConflictResolution::KeepBoth,
    }
}

fn read_profile_file(path: &Path) -> Result<Vec<tcc_types::Profile>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_profiles_json(&content).with_context(|| format!("{} is not a profile export", path.display()))
}

fn format_listing(
    catalog: &ProfileCatalog,
    filter: ProfileFilter,
    format: OutputFormat,
) -> Result<String> {
    let profiles = catalog.for_list(filter);
    match format {
        OutputFormat::Json => {
            let entries: Vec<ProfileEntry<'_>> = profiles
                .iter()
                .map(|p| ProfileEntry {
                    id: &p.id,
                    name: &p.name,
                    custom: catalog.is_custom(&p.id),
                    states: catalog.states_using(&p.id),
                })
                .collect();
            Ok(to_pretty_json(&entries)?)
        }
        OutputFormat::Text => {
            if profiles.is_empty() {
                return Ok(format!("No {} profiles.\n", filter));
            }
            Ok(profiles
                .iter()
                .map(|p| format_profile_row(p, &catalog.states_using(&p.id), catalog.is_custom(&p.id)))
                .collect())
        }
    }
}

fn format_plan(plan: &ImportPlan) -> String {
    let mut out = format!("{}\n", ImportReport::from(plan));
    for id in &plan.replaced {
        out.push_str(&format!("  replace  {}\n", id));
    }
    for (old, new) in &plan.reassigned {
        out.push_str(&format!("  new id   {} -> {}\n", old, new));
    }
    for id in &plan.skipped {
        out.push_str(&format!("  skip     {}\n", id));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use serde_json::{Value, json};
    use tcc_core::MockTransport;
    use tcc_core::tccd::methods;
    use tcc_types::{Profile, Settings};

    use super::*;

    fn catalog() -> ProfileCatalog {
        let defaults = vec![Profile::new("__default__", "Default")];
        let customs = vec![Profile::new("quiet", "Quiet")];
        let mut state_map = BTreeMap::new();
        state_map.insert("power_ac".to_string(), "__default__".to_string());
        state_map.insert("power_bat".to_string(), "quiet".to_string());
        ProfileCatalog {
            all: defaults.iter().chain(&customs).cloned().collect(),
            defaults,
            customs,
            settings: Settings {
                state_map,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_listing_text() {
        let text = format_listing(&catalog(), ProfileFilter::All, OutputFormat::Text).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("default") && lines[0].ends_with("[power_ac]"));
        assert!(lines[1].contains("custom") && lines[1].ends_with("Quiet [power_bat]"));
    }

    #[test]
    fn test_listing_json_custom_only() {
        let json = format_listing(&catalog(), ProfileFilter::Custom, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            json!([{"id": "quiet", "name": "Quiet", "custom": true, "states": ["power_bat"]}])
        );
    }

    #[test]
    fn test_listing_empty() {
        let empty = ProfileCatalog::default();
        let text = format_listing(&empty, ProfileFilter::Used, OutputFormat::Text).unwrap();
        assert_eq!(text, "No used profiles.\n");
    }

    #[tokio::test]
    async fn test_plan_output() {
        let existing = vec![Profile::new("quiet", "Quiet"), Profile::new("loud", "Loud")];
        let incoming = vec![
            Profile::new("quiet", "Quiet v2"),
            Profile::new("fresh", "Fresh"),
        ];
        let plan = plan_import(&existing, incoming, &resolution(ConflictPolicy::KeepOld))
            .await
            .unwrap();
        let text = format_plan(&plan);
        assert!(text.starts_with("1 imported (0 replaced, 0 under a new id), 1 skipped\n"));
        assert!(text.contains("  skip     quiet\n"));
    }

    #[test]
    fn test_read_profile_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("profiles.json");
        std::fs::write(&path, r#"[{"id":"a","name":"A","fan":{"minimumFanspeed":0}}]"#).unwrap();
        let profiles = read_profile_file(&path).unwrap();
        assert_eq!(profiles.len(), 1);
        assert!(profiles[0].extra.contains_key("fan"));

        std::fs::write(&path, "{}").unwrap();
        assert!(read_profile_file(&path).is_err());
    }

    #[tokio::test]
    async fn test_use_unknown_id_is_not_sent() {
        let transport = MockTransport::with_handler(|method, _| {
            Ok(match method {
                methods::GET_PROFILES_JSON => json!(r#"[{"id":"quiet","name":"Quiet"}]"#),
                _ => json!(true),
            })
        });
        let tccd = TccdClient::new(Arc::new(transport.clone()));
        assert!(tccd.init("tccd").await);

        let action = ProfileAction::Use {
            id: Some("turbo".to_string()),
            name: None,
        };
        assert!(cmd_profiles(&tccd, action, None, true, true).await.is_err());
        assert_eq!(transport.calls_to(methods::SET_TEMP_PROFILE_BY_ID), 0);

        let action = ProfileAction::Use {
            id: Some("quiet".to_string()),
            name: None,
        };
        cmd_profiles(&tccd, action, None, true, true).await.unwrap();
        assert_eq!(transport.calls_to(methods::SET_TEMP_PROFILE_BY_ID), 1);
    }

    #[tokio::test]
    async fn test_export_writes_custom_profiles() {
        let transport = MockTransport::with_handler(|method, _| {
            Ok(match method {
                methods::GET_CUSTOM_PROFILES_JSON => json!(r#"[{"id":"quiet","name":"Quiet"}]"#),
                _ => Value::Null,
            })
        });
        let tccd = TccdClient::new(Arc::new(transport));
        assert!(tccd.init("tccd").await);

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("export.json");
        cmd_profiles(&tccd, ProfileAction::Export, Some(&path), true, true)
            .await
            .unwrap();

        let exported = read_profile_file(&path).unwrap();
        assert_eq!(exported, vec![Profile::new("quiet", "Quiet")]);
    }
}
