//! Configuration for the C0 window host.

use crate::core::codec;
use crate::device::transport::DeviceLayout;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default number of samples per sliding window.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Main configuration for the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Samples per sliding window
    pub window_size: usize,

    /// Device protocol timing
    pub session: SessionConfig,

    /// Register and buffer offsets on the device node
    pub layout: DeviceLayout,

    /// Names of the auxiliary output columns (auto-detected when unset)
    pub auxiliary_columns: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            session: SessionConfig::default(),
            layout: DeviceLayout::default(),
            auxiliary_columns: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is absent.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let config_path = Self::config_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("c0-window-host")
            .join("config.json")
    }

    /// Reject values the protocol cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be at least 1".into()));
        }
        if self.session.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be non-zero".into()));
        }
        if self.layout.mosi_size < codec::encoded_len(1) {
            return Err(ConfigError::Invalid(format!(
                "mosi_size must hold at least one value ({} bytes)",
                codec::encoded_len(1)
            )));
        }
        let result_end = self.session.result_offset + codec::FLOAT_SIZE;
        if self.layout.miso_size < result_end {
            return Err(ConfigError::Invalid(format!(
                "miso_size must cover the result at offset {} ({result_end} bytes)",
                self.session.result_offset
            )));
        }
        if self.session.max_poll_interval < self.session.poll_interval {
            return Err(ConfigError::Invalid(
                "max_poll_interval must not be shorter than poll_interval".into(),
            ));
        }
        Ok(())
    }
}

/// Timing of the device status poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// First sleep between status reads; doubles after every busy read
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Upper bound for the backoff
    #[serde(with = "duration_millis")]
    pub max_poll_interval: Duration,

    /// How long a single command may stay in flight
    #[serde(with = "duration_millis")]
    pub poll_timeout: Duration,

    /// How long to wait for a stale command to clear on connect
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Byte offset of the returned float within the result buffer
    pub result_offset: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            max_poll_interval: Duration::from_millis(50),
            poll_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            result_offset: 0,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as whole milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
