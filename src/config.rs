use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Time-related constants
// =============================================================================

/// How long a cached identity lookup stays fresh (5 minutes)
pub const IDENTITY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// How many times the release flow checks that a created tag is visible
pub const SETTLE_POLL_ATTEMPTS: u32 = 4;

/// Delay between visibility checks
pub const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// API constants
// =============================================================================

/// Page size for single-page reads
pub const PAGE_SIZE: u32 = 50;

/// Page size while draining a paginated listing
pub const PAGE_SIZE_ALL: u32 = 100;

/// Instance used when the preferences name none
pub const DEFAULT_INSTANCE: &str = "https://gitlab.com";

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("could not read preferences: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed preferences file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no API token configured (set GITLAB_TOKEN or the `token` preference)")]
    MissingToken,
}

/// One CI variable submitted alongside a pipeline trigger
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PipelineVariable {
    pub key: String,
    pub value: String,
}

/// Host-provided settings: instance base URL, API token, and the session
/// credentials the pipeline trigger needs.
///
/// Loaded from `preferences.json` under the data directory; every field can
/// be overridden through `GITLAB_*` environment variables.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub instance: Option<String>,
    pub token: Option<String>,
    pub cookie: Option<String>,
    pub csrf_token: Option<String>,
    pub pipeline_variables: Vec<PipelineVariable>,
}

impl Preferences {
    pub fn load() -> Result<Self, PreferencesError> {
        let mut prefs = match std::fs::read_to_string(preferences_path()) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        prefs.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(prefs)
    }

    fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(instance) = var("GITLAB_INSTANCE") {
            self.instance = Some(instance);
        }
        if let Some(token) = var("GITLAB_TOKEN") {
            self.token = Some(token);
        }
        if let Some(cookie) = var("GITLAB_COOKIE") {
            self.cookie = Some(cookie);
        }
        if let Some(csrf_token) = var("GITLAB_CSRF_TOKEN") {
            self.csrf_token = Some(csrf_token);
        }
    }

    pub fn instance(&self) -> &str {
        self.instance
            .as_deref()
            .filter(|i| !i.is_empty())
            .unwrap_or(DEFAULT_INSTANCE)
    }

    pub fn token(&self) -> Result<&str, PreferencesError> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(PreferencesError::MissingToken)
    }
}

/// Returns the path to the data directory for gitlab-release.
/// Uses $XDG_DATA_HOME/gitlab-release if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/gitlab-release,
/// or ./gitlab-release if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the directory holding per-key cache files.
pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("gitlab-release.log")
}

/// Returns the path to the preferences file.
pub fn preferences_path() -> PathBuf {
    data_dir().join("preferences.json")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("gitlab-release")
}
