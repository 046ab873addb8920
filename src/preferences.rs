//! String-keyed UI preferences persisted as one JSON document.
//!
//! Each key holds a small JSON value (filter or sort state). Entries are
//! read at construction and written through on every change. Absent or
//! corrupt entries fall back to the caller's default.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::collection::{SortConfig, SortDirection};
use crate::types::{LeadField, LeadStatus, OpportunityField, OpportunityStage};

pub const LEAD_FILTERS_KEY: &str = "leadFilters";
pub const LEAD_SORT_KEY: &str = "leadSort";
pub const OPPORTUNITY_FILTERS_KEY: &str = "opportunityFilters";
pub const USER_PREFERENCES_KEY: &str = "userPreferences";
pub const THEME_KEY: &str = "theme";

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to write preferences to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize preference {key}: {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },
}

/// `"all"` or a specific value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice<T> {
    All,
    Only(T),
}

impl<T> Default for Choice<T> {
    fn default() -> Self {
        Choice::All
    }
}

impl<T: PartialEq> Choice<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Choice::All => true,
            Choice::Only(expected) => expected == value,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Choice::All)
    }
}

impl<T: Serialize> Serialize for Choice<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Choice::All => serializer.serialize_str("all"),
            Choice::Only(value) => value.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Choice<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "all" {
            return Ok(Choice::All);
        }
        let inner: serde::de::value::StringDeserializer<D::Error> = raw.into_deserializer();
        T::deserialize(inner).map(Choice::Only)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFilters {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub status: Choice<LeadStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityFilters {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub stage: Choice<OpportunityStage>,
}

pub fn default_lead_sort() -> SortConfig<LeadField> {
    SortConfig {
        field: LeadField::Score,
        direction: SortDirection::Desc,
    }
}

pub fn default_opportunity_sort() -> SortConfig<OpportunityField> {
    SortConfig {
        field: OpportunityField::Amount,
        direction: SortDirection::Desc,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_search_debounce_ms() -> u64 {
    DEFAULT_SEARCH_DEBOUNCE_MS
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }
}

/// Preference entries, optionally backed by a file.
pub struct PreferenceStore {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, Value>>,
}

impl PreferenceStore {
    /// Default location (~/.seller-console/preferences.json)
    pub fn default_path() -> Result<PathBuf, PreferenceError> {
        let home = dirs::home_dir().ok_or(PreferenceError::HomeDirNotFound)?;
        Ok(home.join(".seller-console").join("preferences.json"))
    }

    /// Load entries from `path`. A missing or unreadable document starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        Self {
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    /// Entries that live only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Stored value for `key`, or `default` when absent or unparseable.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.entries.read().get(key).cloned() else {
            return default;
        };
        match serde_json::from_value(raw) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Ignoring corrupt preference {}: {}", key, e);
                default
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PreferenceError> {
        let json = serde_json::to_value(value).map_err(|source| PreferenceError::Serialize {
            key: key.to_string(),
            source,
        })?;
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), json);
        self.write_file(&entries)
    }

    pub fn remove(&self, key: &str) -> Result<(), PreferenceError> {
        let mut entries = self.entries.write();
        entries.remove(key);
        self.write_file(&entries)
    }

    /// Callers hold the write guard so file writes land in mutation order.
    fn write_file(&self, entries: &BTreeMap<String, Value>) -> Result<(), PreferenceError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(entries).map_err(|source| {
            PreferenceError::Serialize {
                key: "*".to_string(),
                source,
            }
        })?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| PreferenceError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        fs::write(path, content).map_err(|source| PreferenceError::Write {
            path: path.clone(),
            source,
        })
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, Value> {
    if !path.exists() {
        return BTreeMap::new();
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("Failed to read preferences {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };
    match serde_json::from_str(&content) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Failed to parse preferences {}: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_absent_keys_use_defaults() {
        let prefs = PreferenceStore::in_memory();
        assert_eq!(prefs.get(LEAD_FILTERS_KEY, LeadFilters::default()).status, Choice::All);
        assert_eq!(prefs.get(LEAD_SORT_KEY, default_lead_sort()), default_lead_sort());
        assert_eq!(prefs.get(THEME_KEY, Theme::default()), Theme::System);
        assert_eq!(
            prefs.get(USER_PREFERENCES_KEY, UserPreferences::default()).page_size,
            20
        );
    }

    #[test]
    fn test_written_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("preferences.json");

        let prefs = PreferenceStore::open(&path);
        let filters = LeadFilters {
            search: String::new(),
            status: Choice::Only(LeadStatus::Contacted),
        };
        prefs.set(LEAD_FILTERS_KEY, &filters).unwrap();
        prefs.set(THEME_KEY, &Theme::Dark).unwrap();

        let reopened = PreferenceStore::open(&path);
        assert_eq!(reopened.get(LEAD_FILTERS_KEY, LeadFilters::default()), filters);
        assert_eq!(reopened.get(THEME_KEY, Theme::System), Theme::Dark);

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[LEAD_FILTERS_KEY]["status"], "contacted");
        assert_eq!(raw[THEME_KEY], Theme::Dark.as_str());
    }

    #[test]
    fn test_corrupt_entry_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(
            &path,
            r#"{"leadSort":{"field":"nonsense","direction":"sideways"},"theme":"light"}"#,
        )
        .unwrap();

        let prefs = PreferenceStore::open(&path);
        assert_eq!(prefs.get(LEAD_SORT_KEY, default_lead_sort()), default_lead_sort());
        assert_eq!(prefs.get(THEME_KEY, Theme::System), Theme::Light);
    }

    #[test]
    fn test_corrupt_document_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, "{not json").unwrap();
        let prefs = PreferenceStore::open(&path);
        assert_eq!(prefs.get(THEME_KEY, Theme::System), Theme::System);
    }

    #[test]
    fn test_choice_wire_format() {
        let all: Choice<OpportunityStage> = serde_json::from_str(r#""all""#).unwrap();
        assert!(all.is_all());
        let won: Choice<OpportunityStage> = serde_json::from_str(r#""closed_won""#).unwrap();
        assert_eq!(won, Choice::Only(OpportunityStage::ClosedWon));
        assert!(won.matches(&OpportunityStage::ClosedWon));
        assert!(!won.matches(&OpportunityStage::Proposal));
        assert_eq!(serde_json::to_string(&won).unwrap(), r#""closed_won""#);
        assert!(serde_json::from_str::<Choice<OpportunityStage>>(r#""bogus""#).is_err());
    }

    #[test]
    fn test_sort_preference_wire_format() {
        let json = serde_json::to_value(default_opportunity_sort()).unwrap();
        assert_eq!(json["field"], "amount");
        assert_eq!(json["direction"], "desc");
    }

    #[test]
    fn test_remove_restores_default() {
        let prefs = PreferenceStore::in_memory();
        prefs.set(THEME_KEY, &Theme::Dark).unwrap();
        prefs.remove(THEME_KEY).unwrap();
        assert_eq!(prefs.get(THEME_KEY, Theme::System), Theme::System);
    }

    #[test]
    fn test_concurrent_writes_all_reach_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        let prefs = PreferenceStore::open(&path);

        std::thread::scope(|scope| {
            for i in 0..16 {
                let prefs = &prefs;
                scope.spawn(move || {
                    for j in 0..8 {
                        prefs.set(&format!("key-{}-{}", i, j), &(i * 8 + j)).unwrap();
                    }
                });
            }
        });

        let reopened = PreferenceStore::open(&path);
        for i in 0..16 {
            for j in 0..8 {
                assert_eq!(reopened.get(&format!("key-{}-{}", i, j), -1), i * 8 + j);
            }
        }
    }
}
