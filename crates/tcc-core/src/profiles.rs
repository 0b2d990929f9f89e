//! Profile management on top of a [`ProfileStore`].
//!
//! Profiles are identified by `id`; names are for display only and may
//! repeat. Importing compares incoming profiles against the custom profiles
//! (defaults cannot be overwritten) and asks a [`ConflictResolver`] what to do
//! about each id collision. The accepted profiles are collected into one list
//! and handed to the store in a single call.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tcc_types::{MAX_PROFILE_NAME_LEN, Profile, Settings};

use crate::error::{Error, Result};

/// Method name reported when the store refuses an import.
const IMPORT_PROFILES: &str = "importProfiles";

/// Backing store for profiles and settings.
///
/// [`TccdClient`](crate::TccdClient) reads profiles from the daemon; write
/// operations live behind this trait so they can be provided by whatever
/// owns the profile files.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Default and custom profiles together.
    async fn all_profiles(&self) -> Vec<Profile>;

    /// Built-in profiles. Read-only.
    async fn default_profiles(&self) -> Vec<Profile>;

    /// User-created profiles.
    async fn custom_profiles(&self) -> Vec<Profile>;

    /// Look up a profile by id among all profiles.
    async fn profile_by_id(&self, id: &str) -> Option<Profile> {
        self.all_profiles().await.into_iter().find(|p| p.id == id)
    }

    /// Current settings, including the power-state to profile map.
    async fn settings(&self) -> Option<Settings>;

    /// Create a custom profile named `name`, copied from `source_id` or from
    /// the default values when `None`. Returns the new id.
    async fn copy_profile(&self, source_id: Option<&str>, name: &str) -> Option<String>;

    /// Delete a custom profile.
    async fn delete_custom_profile(&self, id: &str) -> bool;

    /// Store `profiles` as custom profiles, replacing any with the same id.
    async fn import_profiles(&self, profiles: Vec<Profile>) -> bool;

    /// Assign `profile_id` to power state `state_id`.
    async fn set_active_profile(&self, profile_id: &str, state_id: &str) -> bool;
}

/// What to do with an incoming profile whose id is already taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Replace the existing profile with the incoming one.
    KeepNew,
    /// Skip the incoming profile.
    KeepOld,
    /// Import the incoming profile under a fresh id.
    KeepBoth,
    /// Import the incoming profile under a fresh id and this name.
    NewName(String),
}

/// Decides id collisions during import.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    async fn resolve(&self, existing: &Profile, incoming: &Profile) -> ConflictResolution;
}

/// A fixed answer for every conflict.
#[async_trait]
impl ConflictResolver for ConflictResolution {
    async fn resolve(&self, _existing: &Profile, _incoming: &Profile) -> ConflictResolution {
        self.clone()
    }
}

/// Outcome of planning an import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportPlan {
    /// Profiles to hand to the store, in input order.
    pub accepted: Vec<Profile>,
    /// Ids of incoming profiles that replace an existing custom profile.
    pub replaced: Vec<String>,
    /// Ids of incoming profiles that were skipped.
    pub skipped: Vec<String>,
    /// `(original id, new id)` for profiles imported under a fresh id.
    pub reassigned: Vec<(String, String)>,
}

/// Summary of a completed import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub replaced: usize,
    pub skipped: usize,
    pub reassigned: usize,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} imported ({} replaced, {} under a new id), {} skipped",
            self.imported, self.replaced, self.reassigned, self.skipped
        )
    }
}

impl From<&ImportPlan> for ImportReport {
    fn from(plan: &ImportPlan) -> Self {
        Self {
            imported: plan.accepted.len(),
            replaced: plan.replaced.len(),
            skipped: plan.skipped.len(),
            reassigned: plan.reassigned.len(),
        }
    }
}

/// Decide which incoming profiles to import and under which id.
///
/// Only custom profiles are checked for collisions. An incoming profile whose
/// id repeats an earlier one in the same batch conflicts with that earlier
/// profile, so the accepted list never holds an id twice. Fails with
/// [`Error::InvalidArgument`] if the resolver picks an invalid new name.
pub async fn plan_import(
    existing_custom: &[Profile],
    incoming: Vec<Profile>,
    resolver: &dyn ConflictResolver,
) -> Result<ImportPlan> {
    let mut plan = ImportPlan::default();

    for mut profile in incoming {
        let earlier = plan.accepted.iter().position(|p| p.id == profile.id);
        let existing = match earlier {
            Some(index) => plan.accepted[index].clone(),
            None => match existing_custom.iter().find(|p| p.id == profile.id) {
                Some(existing) => existing.clone(),
                None => {
                    plan.accepted.push(profile);
                    continue;
                }
            },
        };

        match resolver.resolve(&existing, &profile).await {
            ConflictResolution::KeepNew => match earlier {
                Some(index) => plan.accepted[index] = profile,
                None => {
                    plan.replaced.push(profile.id.clone());
                    plan.accepted.push(profile);
                }
            },
            ConflictResolution::KeepOld => plan.skipped.push(profile.id),
            ConflictResolution::KeepBoth => {
                let new_id = fresh_id();
                plan.reassigned.push((profile.id, new_id.clone()));
                profile.id = new_id;
                plan.accepted.push(profile);
            }
            ConflictResolution::NewName(name) => {
                profile.name = validate_profile_name(&name)?;
                let new_id = fresh_id();
                plan.reassigned.push((profile.id, new_id.clone()));
                profile.id = new_id;
                plan.accepted.push(profile);
            }
        }
    }

    Ok(plan)
}

/// Import `incoming` into `store`, resolving id collisions with `resolver`.
///
/// Nothing is written when every incoming profile is skipped.
pub async fn import_profiles(
    store: &dyn ProfileStore,
    incoming: Vec<Profile>,
    resolver: &dyn ConflictResolver,
) -> Result<ImportReport> {
    let existing = store.custom_profiles().await;
    let plan = plan_import(&existing, incoming, resolver).await?;
    let report = ImportReport::from(&plan);

    if plan.accepted.is_empty() {
        debug!("Nothing to import, {} skipped", report.skipped);
        return Ok(report);
    }
    if !store.import_profiles(plan.accepted).await {
        warn!("Profile store rejected the import");
        return Err(Error::call(IMPORT_PROFILES, "rejected by profile store"));
    }

    info!("Profile import: {}", report);
    Ok(report)
}

/// Parse an exported profile file: a JSON array of profiles.
pub fn parse_profiles_json(json: &str) -> Result<Vec<Profile>> {
    serde_json::from_str(json).map_err(|e| Error::parse(IMPORT_PROFILES, e.to_string()))
}

/// Serialize profiles for export. Pretty-printed.
pub fn export_profiles_json(profiles: &[Profile]) -> Result<String> {
    Ok(serde_json::to_string_pretty(profiles)?)
}

/// Check a user-supplied profile name and return it trimmed.
pub fn validate_profile_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument(
            "a name for the profile is required".to_string(),
        ));
    }
    let len = trimmed.chars().count();
    if len > MAX_PROFILE_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "profile name is {} characters, at most {} allowed",
            len, MAX_PROFILE_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

/// Which profiles a listing shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileFilter {
    #[default]
    All,
    Default,
    Custom,
    /// Profiles assigned to at least one power state.
    Used,
}

impl FromStr for ProfileFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "default" => Ok(Self::Default),
            "custom" => Ok(Self::Custom),
            "used" => Ok(Self::Used),
            other => Err(Error::InvalidArgument(format!(
                "unknown profile filter '{}', expected all, default, custom or used",
                other
            ))),
        }
    }
}

impl fmt::Display for ProfileFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Default => write!(f, "default"),
            Self::Custom => write!(f, "custom"),
            Self::Used => write!(f, "used"),
        }
    }
}

/// A consistent view of all profiles and the settings referring to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileCatalog {
    pub all: Vec<Profile>,
    pub defaults: Vec<Profile>,
    pub customs: Vec<Profile>,
    pub settings: Settings,
}

impl ProfileCatalog {
    /// Read everything from `store`.
    pub async fn load(store: &dyn ProfileStore) -> Self {
        Self {
            all: store.all_profiles().await,
            defaults: store.default_profiles().await,
            customs: store.custom_profiles().await,
            settings: store.settings().await.unwrap_or_default(),
        }
    }

    /// Profiles matching `filter`.
    pub fn for_list(&self, filter: ProfileFilter) -> Vec<&Profile> {
        match filter {
            ProfileFilter::All => self.all.iter().collect(),
            ProfileFilter::Default => self.defaults.iter().collect(),
            ProfileFilter::Custom => self.customs.iter().collect(),
            ProfileFilter::Used => self.all.iter().filter(|p| self.is_used(&p.id)).collect(),
        }
    }

    pub fn by_id(&self, id: &str) -> Option<&Profile> {
        self.all.iter().find(|p| p.id == id)
    }

    pub fn is_custom(&self, id: &str) -> bool {
        self.customs.iter().any(|p| p.id == id)
    }

    /// Whether any power state uses the profile.
    pub fn is_used(&self, id: &str) -> bool {
        self.settings.uses_profile(id)
    }

    /// Power states using the profile.
    pub fn states_using(&self, id: &str) -> Vec<&str> {
        self.settings.states_for_profile(id)
    }

    /// Whether a profile with exactly this name exists.
    pub fn name_exists(&self, name: &str) -> bool {
        self.all.iter().any(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryProfileStore;

    fn custom(id: &str, name: &str) -> Profile {
        Profile::new(id, name)
    }

    #[tokio::test]
    async fn test_plan_without_conflicts_accepts_everything() {
        let incoming = vec![custom("a", "One"), custom("b", "Two")];
        let plan = plan_import(&[], incoming.clone(), &ConflictResolution::KeepOld)
            .await
            .unwrap();
        assert_eq!(plan.accepted, incoming);
        assert!(plan.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_plan_keep_old_skips() {
        let existing = vec![custom("a", "Mine")];
        let plan = plan_import(
            &existing,
            vec![custom("a", "Theirs"), custom("b", "Other")],
            &ConflictResolution::KeepOld,
        )
        .await
        .unwrap();
        assert_eq!(plan.skipped, vec!["a"]);
        assert_eq!(plan.accepted, vec![custom("b", "Other")]);
    }

    #[tokio::test]
    async fn test_plan_keep_new_replaces() {
        let existing = vec![custom("a", "Mine")];
        let plan = plan_import(&existing, vec![custom("a", "Theirs")], &ConflictResolution::KeepNew)
            .await
            .unwrap();
        assert_eq!(plan.accepted, vec![custom("a", "Theirs")]);
        assert_eq!(plan.replaced, vec!["a"]);
    }

    #[tokio::test]
    async fn test_plan_keep_both_assigns_fresh_id() {
        let existing = vec![custom("a", "Mine")];
        let plan = plan_import(&existing, vec![custom("a", "Theirs")], &ConflictResolution::KeepBoth)
            .await
            .unwrap();
        let imported = &plan.accepted[0];
        assert_ne!(imported.id, "a");
        assert!(Uuid::parse_str(&imported.id).is_ok());
        assert_eq!(imported.name, "Theirs");
        assert_eq!(plan.reassigned, vec![("a".to_string(), imported.id.clone())]);
    }

    #[tokio::test]
    async fn test_plan_new_name() {
        let existing = vec![custom("a", "Mine")];
        let resolver = ConflictResolution::NewName("  Imported  ".to_string());
        let plan = plan_import(&existing, vec![custom("a", "Theirs")], &resolver)
            .await
            .unwrap();
        assert_eq!(plan.accepted[0].name, "Imported");
        assert_ne!(plan.accepted[0].id, "a");

        let bad = ConflictResolution::NewName(" ".to_string());
        assert!(
            plan_import(&existing, vec![custom("a", "Theirs")], &bad)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_plan_duplicate_ids_in_one_batch() {
        let batch = vec![custom("a", "First"), custom("a", "Second")];

        let plan = plan_import(&[], batch.clone(), &ConflictResolution::KeepOld)
            .await
            .unwrap();
        assert_eq!(plan.accepted, vec![custom("a", "First")]);
        assert_eq!(plan.skipped, vec!["a"]);

        let plan = plan_import(&[], batch.clone(), &ConflictResolution::KeepNew)
            .await
            .unwrap();
        assert_eq!(plan.accepted, vec![custom("a", "Second")]);
        assert!(plan.replaced.is_empty());

        let plan = plan_import(&[], batch, &ConflictResolution::KeepBoth)
            .await
            .unwrap();
        assert_eq!(plan.accepted.len(), 2);
        assert_eq!(plan.accepted[0], custom("a", "First"));
        assert_ne!(plan.accepted[1].id, "a");
    }

    #[tokio::test]
    async fn test_plan_duplicate_of_existing_counts_one_replacement() {
        let existing = vec![custom("a", "Mine")];
        let batch = vec![custom("a", "First"), custom("a", "Second")];
        let plan = plan_import(&existing, batch, &ConflictResolution::KeepNew)
            .await
            .unwrap();
        assert_eq!(plan.accepted, vec![custom("a", "Second")]);
        assert_eq!(plan.replaced, vec!["a"]);
    }

    #[tokio::test]
    async fn test_defaults_are_not_conflicts() {
        let store = MemoryProfileStore::new(vec![custom("__default__", "Default")], Vec::new());
        let report = import_profiles(
            &store,
            vec![custom("__default__", "Imported")],
            &ConflictResolution::KeepOld,
        )
        .await
        .unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(store.custom_profiles().await.len(), 1);
    }

    #[tokio::test]
    async fn test_import_hands_accepted_list_to_store() {
        let store = MemoryProfileStore::new(Vec::new(), vec![custom("a", "Mine")]);
        let report = import_profiles(
            &store,
            vec![custom("a", "Theirs"), custom("b", "New")],
            &ConflictResolution::KeepOld,
        )
        .await
        .unwrap();

        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 1);
        let customs = store.custom_profiles().await;
        assert_eq!(customs.len(), 2);
        assert_eq!(store.profile_by_id("a").await.unwrap().name, "Mine");
        assert_eq!(store.import_calls(), 1);
    }

    #[tokio::test]
    async fn test_import_nothing_accepted_skips_store() {
        let store = MemoryProfileStore::new(Vec::new(), vec![custom("a", "Mine")]);
        let report = import_profiles(&store, vec![custom("a", "x")], &ConflictResolution::KeepOld)
            .await
            .unwrap();
        assert_eq!(report.imported, 0);
        assert_eq!(store.import_calls(), 0);
    }

    #[tokio::test]
    async fn test_import_rejected_by_store() {
        let store = MemoryProfileStore::new(Vec::new(), Vec::new());
        store.set_read_only(true);
        let err = import_profiles(&store, vec![custom("a", "x")], &ConflictResolution::KeepNew)
            .await
            .unwrap_err();
        assert!(err.is_call_error());
    }

    #[test]
    fn test_profiles_json_roundtrip_keeps_unknown_fields() {
        let json = r#"[{"id":"a","name":"Quiet","description":"","fan":{"minimumFanspeed":0}}]"#;
        let profiles = parse_profiles_json(json).unwrap();
        assert_eq!(profiles[0].name, "Quiet");

        let exported = export_profiles_json(&profiles).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&exported).unwrap();
        assert_eq!(reparsed[0]["fan"]["minimumFanspeed"], 0);
    }

    #[test]
    fn test_parse_profiles_json_rejects_garbage() {
        assert!(matches!(
            parse_profiles_json("not json"),
            Err(Error::Parse { .. })
        ));
        assert!(parse_profiles_json(r#"{"id":"a"}"#).is_err());
    }

    #[test]
    fn test_validate_profile_name() {
        assert_eq!(validate_profile_name(" Quiet ").unwrap(), "Quiet");
        assert!(validate_profile_name("").is_err());
        assert!(validate_profile_name("   ").is_err());
        assert!(validate_profile_name(&"x".repeat(50)).is_ok());
        assert!(validate_profile_name(&"x".repeat(51)).is_err());
        // Characters, not bytes
        assert!(validate_profile_name(&"ü".repeat(50)).is_ok());
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("Used".parse::<ProfileFilter>().unwrap(), ProfileFilter::Used);
        assert_eq!("custom".parse::<ProfileFilter>().unwrap(), ProfileFilter::Custom);
        assert!("mine".parse::<ProfileFilter>().is_err());
    }

    #[test]
    fn test_catalog_listing() {
        let defaults = vec![custom("d1", "Powerful"), custom("d2", "Quiet")];
        let customs = vec![custom("c1", "Gaming")];
        let mut settings = Settings::default();
        settings.state_map.insert("power_ac".into(), "c1".into());
        settings.state_map.insert("power_bat".into(), "d2".into());
        settings.state_map.insert("power_wc".into(), "c1".into());

        let catalog = ProfileCatalog {
            all: defaults.iter().chain(&customs).cloned().collect(),
            defaults,
            customs,
            settings,
        };

        let used: Vec<&str> = catalog
            .for_list(ProfileFilter::Used)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(used, vec!["d2", "c1"]);
        assert_eq!(catalog.for_list(ProfileFilter::All).len(), 3);
        assert_eq!(catalog.for_list(ProfileFilter::Custom).len(), 1);
        assert_eq!(catalog.states_using("c1"), vec!["power_ac", "power_wc"]);
        assert!(!catalog.is_used("d1"));
        assert!(catalog.is_custom("c1"));
        assert!(catalog.name_exists("Quiet"));
        assert!(!catalog.name_exists("quiet"));
        assert_eq!(catalog.by_id("d1").unwrap().name, "Powerful");
    }

    #[tokio::test]
    async fn test_catalog_load() {
        let store = MemoryProfileStore::new(vec![custom("d1", "Default")], vec![custom("c1", "Mine")]);
        store.set_active_profile("c1", "power_ac").await;

        let catalog = ProfileCatalog::load(&store).await;
        assert_eq!(catalog.all.len(), 2);
        assert!(catalog.is_used("c1"));
    }
}
