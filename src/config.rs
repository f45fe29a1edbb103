use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use facesync_core::OriginPath;

/// Default relay address used by both the relay and the device commands.
pub const DEFAULT_RELAY_BIND: &str = "127.0.0.1:8787";

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding one preference folder per device role
    pub data_dir: ConfigValue<PathBuf>,
    /// Relay URL the devices connect to (e.g. "ws://127.0.0.1:8787")
    pub relay_url: ConfigValue<String>,
    /// Address the relay listens on
    pub relay_bind: ConfigValue<SocketAddr>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Relay section of the config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RelayFile {
    url: Option<String>,
    bind: Option<SocketAddr>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    relay: RelayFile,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |name| std::env::var(name).ok())
    }

    /// Load configuration reading environment variables through `env`.
    pub fn load_with_env<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_bind: SocketAddr = DEFAULT_RELAY_BIND
            .parse()
            .map_err(|_| ConfigError::InvalidValue("relay.bind", DEFAULT_RELAY_BIND.to_string()))?;

        // Start with defaults
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut relay_url =
            ConfigValue::new(format!("ws://{}", DEFAULT_RELAY_BIND), ConfigSource::Default);
        let mut relay_bind = ConfigValue::new(default_bind, ConfigSource::Default);
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(url) = file_config.relay.url {
                relay_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(bind) = file_config.relay.bind {
                relay_bind = ConfigValue::new(bind, ConfigSource::File);
            }
        }

        // Apply environment variable overrides
        if let Some(dir) = env("FACESYNC_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Some(url) = env("FACESYNC_RELAY_URL") {
            relay_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Some(bind) = env("FACESYNC_RELAY_BIND") {
            let addr = bind
                .parse()
                .map_err(|_| ConfigError::InvalidValue("FACESYNC_RELAY_BIND", bind.clone()))?;
            relay_bind = ConfigValue::new(addr, ConfigSource::Environment);
        }

        Ok(Self {
            data_dir,
            relay_url,
            relay_bind,
            config_file,
        })
    }

    /// Preference directory for one device role.
    pub fn device_dir(&self, role: OriginPath) -> PathBuf {
        self.data_dir.value.join(role.to_string())
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/facesync/
    /// - macOS: ~/Library/Application Support/facesync/
    /// - Windows: %APPDATA%/facesync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facesync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/facesync/
    /// - macOS: ~/Library/Application Support/facesync/
    /// - Windows: %APPDATA%/facesync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facesync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
