//! Power profile and settings documents.
//!
//! The daemon owns the full profile schema (CPU, display, fan, ODM and GPU
//! sections). The client only interprets identity fields and keeps the rest
//! verbatim so that exports and imports round-trip unchanged.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum length of a profile name, in characters.
pub const MAX_PROFILE_NAME_LEN: usize = 50;

/// A power profile.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Profile {
    /// Unique profile id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    /// Every other profile section, kept as received.
    #[cfg(feature = "serde")]
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Profile {
    /// Create a profile with only identity fields set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Global daemon settings.
///
/// Only the power-state to profile mapping is interpreted client side.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Settings {
    /// Power state id (e.g. `power_ac`) to profile id.
    #[cfg_attr(feature = "serde", serde(default))]
    pub state_map: BTreeMap<String, String>,
    /// Remaining settings, kept as received.
    #[cfg(feature = "serde")]
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Settings {
    /// Whether any power state maps to `profile_id`.
    pub fn uses_profile(&self, profile_id: &str) -> bool {
        self.state_map.values().any(|id| id == profile_id)
    }

    /// Power states that map to `profile_id`, in state id order.
    pub fn states_for_profile(&self, profile_id: &str) -> Vec<&str> {
        self.state_map
            .iter()
            .filter(|(_, id)| id.as_str() == profile_id)
            .map(|(state, _)| state.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings
            .state_map
            .insert("power_ac".to_string(), "__default_custom_profile__".to_string());
        settings
            .state_map
            .insert("power_bat".to_string(), "quiet".to_string());
        settings
            .state_map
            .insert("power_wc".to_string(), "quiet".to_string());
        settings
    }

    #[test]
    fn test_profile_usage() {
        let settings = settings();
        assert!(settings.uses_profile("quiet"));
        assert!(!settings.uses_profile("gaming"));
        assert_eq!(
            settings.states_for_profile("quiet"),
            vec!["power_bat", "power_wc"]
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_profile_keeps_unknown_sections() {
        let json = r#"{"id":"abc","name":"Office","description":"quiet",
            "fan":{"fanProfile":"Silent","minimumFanspeed":0},"odmProfile":{"name":"power_save"}}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.name, "Office");
        assert_eq!(profile.extra["fan"]["fanProfile"], "Silent");

        let back = serde_json::to_value(&profile).unwrap();
        assert_eq!(back["odmProfile"]["name"], "power_save");
        assert_eq!(back["id"], "abc");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_settings_wire_format() {
        let json = r#"{"stateMap":{"power_ac":"a","power_bat":"b"},"fahrenheit":false}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.state_map.len(), 2);
        assert_eq!(settings.extra["fahrenheit"], false);
    }
}
