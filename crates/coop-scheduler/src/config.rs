use std::{fs, path::Path, path::PathBuf, time::Duration};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::clock::{StepPolicy, WakeBoundary};

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Could not determine a config directory for this platform")]
    NoConfigDir,
}

/// Scheduler behavior knobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether a sleeper wakes when the clock reaches its wake time or only once past it
    #[serde(default)]
    pub wake_boundary: WakeBoundary,

    /// Handling of negative steps passed to `advance_secs`
    #[serde(default)]
    pub negative_step: StepPolicy,
}

/// Frame driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Interval between ticks in milliseconds (default: 50ms, 20Hz)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Multiplier applied to measured wall-clock time before advancing
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,

    /// Stop after this many ticks (default: run until shut down)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ticks: Option<u64>,
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_time_scale() -> f64 {
    1.0
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            time_scale: default_time_scale(),
            max_ticks: None,
        }
    }
}

impl DriverConfig {
    /// Tick interval as a duration, never zero
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Time scale with nonsensical values replaced by 1.0
    pub fn effective_time_scale(&self) -> f64 {
        if self.time_scale.is_finite() && self.time_scale >= 0.0 {
            self.time_scale
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoopConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub driver: DriverConfig,
}

impl CoopConfig {
    /// Default config location, e.g. `~/.config/coop-scheduler/config.toml`
    pub fn config_path() -> Result<PathBuf, ConfigLoadError> {
        let dirs =
            ProjectDirs::from("", "", "coop-scheduler").ok_or(ConfigLoadError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Load from the default location
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(target: "config", "Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigLoadError> {
        Ok(toml::from_str(content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigLoadError> {
        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        info!(target: "config", "Saved config to {}", path.display());
        Ok(())
    }
}
