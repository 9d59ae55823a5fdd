//! Configuration file support for Recall.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/recall/config.toml`.

use crate::scheduler::SchedulerConfig;
use crate::{Error, Result, MAX_INTERVAL_DAYS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub review: ReviewConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_decks_dir")]
    pub decks_dir: PathBuf,

    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            decks_dir: default_decks_dir(),
            log_path: default_log_path(),
        }
    }
}

/// Review behaviour configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ReviewConfig {
    /// Reject grades outside 0..=5 instead of clamping them
    #[serde(default)]
    pub strict_grades: bool,
}

// Default value functions
fn data_home() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("recall")
}

fn default_decks_dir() -> PathBuf {
    data_home().join("decks")
}

fn default_log_path() -> PathBuf {
    data_home().join("sessions.jsonl")
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("recall").join("config.toml")
    }

    /// Check scheduler parameters are usable
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if !s.easy_bonus.is_finite() || s.easy_bonus <= 0.0 {
            return Err(Error::Config(format!(
                "easy_bonus must be a positive number, got {}",
                s.easy_bonus
            )));
        }
        if !s.interval_modifier.is_finite() || s.interval_modifier <= 0.0 {
            return Err(Error::Config(format!(
                "interval_modifier must be a positive number, got {}",
                s.interval_modifier
            )));
        }
        if s.max_interval_days == 0 || s.max_interval_days > MAX_INTERVAL_DAYS {
            return Err(Error::Config(format!(
                "max_interval_days must be within 1..={}, got {}",
                MAX_INTERVAL_DAYS, s.max_interval_days
            )));
        }
        Ok(())
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
