//! Configuration file parsing and structures.
//!
//! planterd reads a single TOML file. Every section is optional; the defaults
//! match the planter firmware's store layout.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

use crate::command::Actuator;
use crate::panel::Labels;
use crate::panel::ids;
use crate::store::tree;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub panel: PanelConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"planterd::store" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

fn default_timeout_secs() -> u64 {
    10
}

/// Realtime store connection
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Database base URL. Required unless the in-memory store is used.
    #[serde(default)]
    pub url: Option<String>,

    /// Timeout for reads and writes. Subscription streams are not bounded.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Store locations shared with the firmware
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Command slot the firmware polls for actuator codes
    pub command: String,

    /// Sensor snapshot record `{A, B, C}`
    pub sensors: String,

    pub temperature: String,

    pub humidity: String,

    /// Camera host/IP reported by the device
    pub camera: String,

    /// Advisory record of the last commanded actuator states
    pub memory: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            command: "toAltera".to_string(),
            sensors: "fromAltera".to_string(),
            temperature: "TEMP".to_string(),
            humidity: "HUMIDITY".to_string(),
            camera: "camIp".to_string(),
            memory: "smart_planter/controls".to_string(),
        }
    }
}

/// Camera stream address template
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub port: u16,
    pub path: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            port: 81,
            path: "stream".to_string(),
        }
    }
}

impl CameraConfig {
    /// Stream URL for a device-reported address.
    pub fn stream_url(&self, address: &str) -> String {
        format!(
            "http://{}:{}/{}",
            address,
            self.port,
            self.path.trim_start_matches('/')
        )
    }
}

/// Panel markup and wording
#[derive(Debug, Clone, Deserialize)]
pub struct PanelConfig {
    /// Element ids present in the page. Defaults to every known element.
    #[serde(default = "default_elements")]
    pub elements: Vec<String>,

    #[serde(default)]
    pub labels: Labels,
}

fn default_elements() -> Vec<String> {
    ids::ALL.iter().map(|id| id.to_string()).collect()
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            elements: default_elements(),
            labels: Labels::default(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8565
}

fn default_enabled() -> bool {
    true
}

/// HTTP API serving the panel
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listen: default_listen(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let paths = [
            ("paths.command", &self.paths.command),
            ("paths.sensors", &self.paths.sensors),
            ("paths.temperature", &self.paths.temperature),
            ("paths.humidity", &self.paths.humidity),
            ("paths.camera", &self.paths.camera),
            ("paths.memory", &self.paths.memory),
        ];
        for (field, path) in paths {
            match crate::store::segments(path) {
                Ok(segments) if !segments.is_empty() => {}
                _ => return Err(ConfigError::InvalidPath(field, path.clone())),
            }
        }

        // Each toggle writes the command slot and a memory field in one update,
        // which the store rejects if one path contains the other.
        let command = crate::store::segments(&self.paths.command).unwrap_or_default();
        for actuator in [Actuator::Pump, Actuator::Fan] {
            let field = crate::store::child(&self.paths.memory, actuator.memory_field());
            if tree::overlaps(&command, &crate::store::segments(&field).unwrap_or_default()) {
                return Err(ConfigError::OverlappingPaths(self.paths.command.clone(), field));
            }
        }

        if let Some(url) = &self.store.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid store path for {0}: '{1}'")]
    InvalidPath(&'static str, String),

    #[error("Store URL must be http(s): '{0}'")]
    InvalidUrl(String),

    #[error("paths.command '{0}' overlaps actuator memory field '{1}'")]
    OverlappingPaths(String, String),
}
