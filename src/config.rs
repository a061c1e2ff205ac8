//! Layered configuration for the staleness tracker.
//!
//! Sources, lowest precedence first:
//! - Default values
//! - `.stalewatch/settings.toml` (searched from the current directory upward)
//! - Environment variables
//!
//! # Environment Variables
//!
//! Environment variables are prefixed with `SW_` and use double underscores
//! to separate nested levels:
//! - `SW_STALENESS__MAX_INDIRECTION_HOPS=16` sets `staleness.max_indirection_hops`
//! - `SW_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::types::Severity;

const CONFIG_DIR: &str = ".stalewatch";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "SW_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub staleness: StalenessConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `"stalewatch::watcher" = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StalenessConfig {
    /// Longest indirection chain followed before giving up
    #[serde(default = "default_max_indirection_hops")]
    pub max_indirection_hops: usize,

    /// Error identifier carried by every staleness diagnostic
    #[serde(default = "default_diagnostic_id")]
    pub diagnostic_id: String,

    #[serde(default)]
    pub severity: Severity,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct WatcherConfig {
    /// Poll for changes at this interval instead of using native OS events.
    /// Needed on network shares and some container mounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
}

fn default_version() -> u32 {
    1
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_max_indirection_hops() -> usize {
    64
}
fn default_diagnostic_id() -> String {
    "IDE1004".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            logging: LoggingConfig::default(),
            staleness: StalenessConfig::default(),
            watcher: WatcherConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            max_indirection_hops: default_max_indirection_hops(),
            diagnostic_id: default_diagnostic_id(),
            severity: Severity::default(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path).extract().map_err(Box::new)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nesting, single underscore stays
            // part of the field name
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
    }

    /// Find `.stalewatch/settings.toml` from the current directory upward
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `.stalewatch/`
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
