//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TILESYNC_*)
//! 2. TOML config file (if TILESYNC_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TILESYNC_*)
/// 2. TOML config file (if TILESYNC_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite tile cache database.
    ///
    /// Set via TILESYNC_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes accepted for a single tile or document.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Per-request timeout in milliseconds.
    ///
    /// Set via TILESYNC_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Access token appended as `accesstoken` to overlay requests.
    ///
    /// Set via TILESYNC_ACCESS_TOKEN environment variable.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Origin used to resolve relative layer URL templates.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Tiles fetched per download batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause between download batches in milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Vector style document used for basemap pre-fetching.
    #[serde(default)]
    pub style_url: Option<String>,

    /// Highest zoom level for which vector tiles are pre-fetched.
    #[serde(default = "default_vector_max_zoom")]
    pub vector_max_zoom: u32,

    /// Query parameters removed from URLs before they are used as cache keys.
    #[serde(default = "default_ephemeral_params")]
    pub ephemeral_params: Vec<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tilesync-cache.sqlite")
}

fn default_user_agent() -> String {
    "tilesync/0.1".into()
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_origin() -> String {
    "http://localhost".into()
}

fn default_concurrency() -> usize {
    10
}

fn default_batch_delay_ms() -> u64 {
    50
}

fn default_vector_max_zoom() -> u32 {
    14
}

fn default_ephemeral_params() -> Vec<String> {
    vec!["accesstoken".into()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            access_token: None,
            origin: default_origin(),
            concurrency: default_concurrency(),
            batch_delay_ms: default_batch_delay_ms(),
            style_url: None,
            vector_max_zoom: default_vector_max_zoom(),
            ephemeral_params: default_ephemeral_params(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Batch delay as Duration.
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TILESYNC_`
    /// 2. TOML file from `TILESYNC_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TILESYNC_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TILESYNC_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Style URL for vector pre-fetching, required only by `vector_cache`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no style URL is configured.
    pub fn require_style_url(&self) -> Result<&str, ConfigError> {
        self.style_url.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "style_url".into(),
            hint: "Set TILESYNC_STYLE_URL environment variable".into(),
        })
    }
}
