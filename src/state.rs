use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::leads::LeadsView;
use crate::opportunities::OpportunitiesView;
use crate::preferences::{
    PreferenceError, PreferenceStore, Theme, UserPreferences, DEFAULT_PAGE_SIZE,
    DEFAULT_SEARCH_DEBOUNCE_MS, THEME_KEY, USER_PREFERENCES_KEY,
};
use crate::store::{CrmStore, DirectorySource, HttpSource, ResourceSource, SimulationConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not find home directory")]
    HomeDirNotFound,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid base URL {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
}

/// Where the static lead and opportunity resources are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DataSourceConfig {
    /// Resources are files under `path` (e.g. `<path>/data/leads.json`).
    Directory { path: PathBuf },
    #[serde(rename_all = "camelCase")]
    Http { base_url: String },
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        DataSourceConfig::Directory {
            path: PathBuf::from("."),
        }
    }
}

/// Console configuration (~/.seller-console/config.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub data_source: DataSourceConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Overrides ~/.seller-console/preferences.json
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences_path: Option<PathBuf>,
}

fn default_search_debounce_ms() -> u64 {
    DEFAULT_SEARCH_DEBOUNCE_MS
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_source: DataSourceConfig::default(),
            simulation: SimulationConfig::default(),
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
            page_size: DEFAULT_PAGE_SIZE,
            preferences_path: None,
        }
    }
}

impl AppConfig {
    pub fn build_source(&self) -> Result<Arc<dyn ResourceSource>, ConfigError> {
        match self.data_source {
            DataSourceConfig::Directory { ref path } => Ok(Arc::new(DirectorySource::new(path))),
            DataSourceConfig::Http { ref base_url } => {
                // Url::join replaces the last segment unless the base ends in '/'.
                let normalized = if base_url.ends_with('/') {
                    base_url.clone()
                } else {
                    format!("{}/", base_url)
                };
                let base = Url::parse(&normalized).map_err(|source| ConfigError::InvalidUrl {
                    url: base_url.clone(),
                    source,
                })?;
                Ok(Arc::new(HttpSource::new(base)))
            }
        }
    }
}

/// Get the canonical config file path (~/.seller-console/config.json)
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(".seller-console").join("config.json"))
}

/// Load configuration from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Shared handles for one console session.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<CrmStore>,
    pub preferences: Arc<PreferenceStore>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        let source = config.build_source()?;
        let store = Arc::new(CrmStore::new(source, config.simulation.clone()));

        let preferences = match config.preferences_path {
            Some(ref path) => PreferenceStore::open(path),
            None => match PreferenceStore::default_path() {
                Ok(path) => PreferenceStore::open(path),
                Err(e) => {
                    log::warn!("{}. Preferences will not be saved.", e);
                    PreferenceStore::in_memory()
                }
            },
        };

        Ok(Self {
            config,
            store,
            preferences: Arc::new(preferences),
        })
    }

    /// Saved user preferences, falling back to the configured values.
    pub fn user_preferences(&self) -> UserPreferences {
        let defaults = UserPreferences {
            page_size: self.config.page_size,
            search_debounce_ms: self.config.search_debounce_ms,
        };
        self.preferences.get(USER_PREFERENCES_KEY, defaults)
    }

    pub fn theme(&self) -> Theme {
        self.preferences.get(THEME_KEY, Theme::default())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), PreferenceError> {
        self.preferences.set(THEME_KEY, &theme)
    }

    pub fn leads_view(&self) -> LeadsView {
        LeadsView::new(
            self.store.clone(),
            self.preferences.clone(),
            Duration::from_millis(self.user_preferences().search_debounce_ms),
        )
    }

    pub fn opportunities_view(&self) -> OpportunitiesView {
        OpportunitiesView::new(
            self.store.clone(),
            self.preferences.clone(),
            self.user_preferences(),
        )
    }
}
