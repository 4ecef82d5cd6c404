//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `HYPERCRUD_`, sections separated by `__`,
//!    e.g. `HYPERCRUD_PAGING__DEFAULT_LIMIT=50`)
//! 2. Current working directory: ./hypercrud.toml
//! 3. XDG config directory: ~/.config/hypercrud/config.toml
//! 4. Default values

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::history::DEFAULT_EDIT_SEGMENT;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CrudConfig {
    /// Paging defaults
    #[serde(default)]
    pub paging: PagingConfig,

    /// Deep-link / history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Schema discovery settings
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Paging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Page size used until a caller picks one
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Upper bound for caller-supplied page sizes
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
}

/// History configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// First in-page path segment marking an edit route (matched case-insensitively)
    #[serde(default = "default_edit_segment")]
    pub edit_segment: String,
}

/// Schema discovery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchemaConfig {
    /// How long schema queries wait for the first successful page load.
    ///
    /// `None` waits indefinitely.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_limit() -> u64 {
    20
}

fn default_max_limit() -> u64 {
    100
}

fn default_edit_segment() -> String {
    DEFAULT_EDIT_SEGMENT.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            edit_segment: default_edit_segment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SchemaConfig {
    /// Wait timeout as a `Duration`, if one is configured
    #[must_use]
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

impl CrudConfig {
    /// Load configuration from the standard locations
    pub fn load() -> Result<Self> {
        let config_paths = Self::find_config_paths();

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(CrudConfig::default()));

        // Lowest priority first so later merges override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("HYPERCRUD_").split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the XDG lookup. Environment variables still apply.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(CrudConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("HYPERCRUD_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Candidate config files, highest priority first
    fn find_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("hypercrud.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("hypercrud");
        if let Some(path) = xdg_dirs.find_config_file("config.toml") {
            paths.push(path);
        }

        paths
    }

    /// Clamp a caller-supplied page size to `[1, max_limit]`
    #[must_use]
    pub fn clamp_limit(&self, limit: u64) -> u64 {
        limit.clamp(1, self.paging.max_limit.max(1))
    }
}
