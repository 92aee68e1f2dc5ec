//! Application configuration management.
//!
//! Configuration is stored at `~/.config/nogisched/config.json`. Every field
//! has a default, so a missing or partial file is fine. A few environment
//! variables (usually set through `.env`) override the file:
//!
//! - `NOGISCHED_SCHEDULE_URL`
//! - `NOGISCHED_MEMBER_URL`
//! - `NOGISCHED_CACHE_DIR`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{CallbackMode, JsonpOptions, DEFAULT_CALLBACK_PARAM};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "nogisched";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_SCHEDULE_URL: &str = "https://www.nogizaka46.com/s/n46/api/list/schedule";
pub const DEFAULT_MEMBER_URL: &str = "https://www.nogizaka46.com/s/n46/api/list/member";

const DEFAULT_SCHEDULE_TIMEOUT_SECS: u64 = 10;
/// The member list is large and slow to generate.
const DEFAULT_MEMBER_TIMEOUT_SECS: u64 = 20;

pub const ENV_SCHEDULE_URL: &str = "NOGISCHED_SCHEDULE_URL";
pub const ENV_MEMBER_URL: &str = "NOGISCHED_MEMBER_URL";
pub const ENV_CACHE_DIR: &str = "NOGISCHED_CACHE_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schedule_url: String,
    pub member_url: String,
    pub callback_param: String,
    pub callback_mode: CallbackMode,
    pub schedule_timeout_secs: u64,
    pub member_timeout_secs: u64,
    /// Overrides the platform cache directory
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule_url: DEFAULT_SCHEDULE_URL.to_string(),
            member_url: DEFAULT_MEMBER_URL.to_string(),
            callback_param: DEFAULT_CALLBACK_PARAM.to_string(),
            callback_mode: CallbackMode::default(),
            schedule_timeout_secs: DEFAULT_SCHEDULE_TIMEOUT_SECS,
            member_timeout_secs: DEFAULT_MEMBER_TIMEOUT_SECS,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Load the config file and apply environment overrides.
    ///
    /// An unreadable or invalid file is logged and replaced by defaults.
    pub fn load() -> Self {
        let mut config = match Self::config_path().and_then(|path| Self::load_from(&path)) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config in {}", path.display()))?;
            debug!(path = %path.display(), "Loaded config");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_SCHEDULE_URL) {
            self.schedule_url = url;
        }
        if let Some(url) = non_empty(ENV_MEMBER_URL) {
            self.member_url = url;
        }
        if let Some(dir) = non_empty(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::settings_dir()?.join(CONFIG_FILE))
    }

    /// Directory holding the config file and persisted settings.
    pub fn settings_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn jsonp_options(&self) -> JsonpOptions {
        JsonpOptions {
            callback_param: self.callback_param.clone(),
            mode: self.callback_mode.clone(),
        }
    }

    pub fn schedule_timeout(&self) -> Duration {
        Duration::from_secs(self.schedule_timeout_secs)
    }

    pub fn member_timeout(&self) -> Duration {
        Duration::from_secs(self.member_timeout_secs)
    }
}
