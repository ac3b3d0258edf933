//! Tool configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via BINRPC_CONFIG or --config)
//! 3. Environment variables

use binrpc_protocol::{Charset, DecodeOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "BINRPC_CONFIG";

/// Tool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default tracing filter when RUST_LOG is not set.
    pub log_level: String,
    /// Text encoding of strings on the wire.
    pub charset: CharsetSetting,
    /// Take a value following a zero-count array as its element.
    pub multicall_recovery: bool,
    /// How decoded values are printed.
    pub output: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            charset: CharsetSetting::Utf8,
            multicall_recovery: false,
            output: OutputFormat::Pretty,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or BINRPC_CONFIG), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("BINRPC_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(charset) = std::env::var("BINRPC_CHARSET") {
            match charset.to_lowercase().as_str() {
                "utf8" | "utf-8" => self.charset = CharsetSetting::Utf8,
                "latin1" | "iso-8859-1" => self.charset = CharsetSetting::Latin1,
                other => tracing::warn!(value = other, "ignoring unknown BINRPC_CHARSET"),
            }
        }
        if let Ok(enabled) = std::env::var("BINRPC_MULTICALL_RECOVERY") {
            self.multicall_recovery = matches!(enabled.as_str(), "1" | "true" | "yes");
        }
        if let Ok(output) = std::env::var("BINRPC_OUTPUT") {
            match output.to_lowercase().as_str() {
                "pretty" => self.output = OutputFormat::Pretty,
                "compact" => self.output = OutputFormat::Compact,
                other => tracing::warn!(value = other, "ignoring unknown BINRPC_OUTPUT"),
            }
        }
    }

    pub fn charset(&self) -> Charset {
        match self.charset {
            CharsetSetting::Utf8 => Charset::Utf8,
            CharsetSetting::Latin1 => Charset::Latin1,
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions::new()
            .with_charset(self.charset())
            .with_multicall_recovery(self.multicall_recovery)
    }

    /// Serializes the effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<effective>"), e.to_string()))
    }
}

/// Charset as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharsetSetting {
    Utf8,
    Latin1,
}

/// Output style for decoded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Pretty,
    Compact,
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
