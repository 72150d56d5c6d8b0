//! Settings file for padpilot
//!
//! Every field has a default, so an empty or partial TOML file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::controller::axis::DEFAULT_DEADZONE;
use crate::controller::axis_poller::PollerSettings;
use crate::controller::device_locator::{DEFAULT_DEVICE_PATH, DEFAULT_FALLBACK_PATHS};

const CONFIG_DIR: &str = "padpilot";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub device: DeviceSettings,
    pub axis: AxisSettings,
    pub buttons: ButtonSettings,
    pub supervisor: SupervisorSettings,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DeviceSettings {
    /// Preferred raw event device
    pub path: PathBuf,
    /// Tried in order when `path` cannot be opened
    pub fallback_paths: Vec<PathBuf>,
    /// Best-effort exclusive grab
    pub grab: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DEVICE_PATH),
            fallback_paths: DEFAULT_FALLBACK_PATHS.iter().map(PathBuf::from).collect(),
            grab: true,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AxisSettings {
    pub poll_interval_ms: u64,
    pub deadzone: f32,
}

impl Default for AxisSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50, // 20 Hz
            deadzone: DEFAULT_DEADZONE,
        }
    }
}

impl AxisSettings {
    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            deadzone: self.deadzone,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ButtonSettings {
    pub channel_capacity: usize,
}

impl Default for ButtonSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Upper bound for joining each worker during shutdown
    pub shutdown_timeout_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 2000,
        }
    }
}

impl SupervisorSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Settings {
    /// `<config_dir>/padpilot/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads `explicit` if given (it must exist), else the default file if it
    /// exists, else the built-in defaults.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path)
                    if tokio::fs::try_exists(&path).await.unwrap_or(false) =>
                {
                    path
                }
                _ => {
                    debug!("No settings file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        info!("Loading settings from {}", path.display());
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axis.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "axis.poll_interval_ms must be greater than 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.axis.deadzone) {
            return Err(ConfigError::Invalid(format!(
                "axis.deadzone must be in [0.0, 1.0), got {}",
                self.axis.deadzone
            )));
        }
        if self.buttons.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "buttons.channel_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
