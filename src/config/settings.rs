//! Equipment configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration load/save errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("Config I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML parse error
    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("Could not serialize config: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// YAML parse or serialization error
    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Values parsed but are unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Platform has no config directory
    #[error("Could not determine config directory")]
    NoConfigDir,
}

fn default_port() -> String {
    if cfg!(windows) {
        "COM1".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

/// Equipment configuration, supplied once at initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquipmentConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub device_port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Measurement tolerance. Reserved: validated and carried, never
    /// consulted; the instrument's verdict decides pass/fail.
    pub measurement_tolerance: f64,
    /// Extra attempts for a command send that fails
    pub max_retry_attempts: u32,
    /// Write the application log to `log_file_path`
    pub enable_logging: bool,
    /// Application log file
    pub log_file_path: PathBuf,
    /// Transport selection key ("serial", "simulated")
    pub interface: String,
}

impl Default for EquipmentConfig {
    fn default() -> Self {
        Self {
            device_port: default_port(),
            baud_rate: 115200,
            measurement_tolerance: 0.1,
            max_retry_attempts: 3,
            enable_logging: true,
            log_file_path: PathBuf::from("mechatest.log"),
            interface: "serial".to_string(),
        }
    }
}

impl EquipmentConfig {
    /// Create a configuration for a port with default settings
    pub fn new(device_port: &str, baud_rate: u32) -> Self {
        Self {
            device_port: device_port.to_string(),
            baud_rate,
            ..Self::default()
        }
    }

    /// Set port
    #[must_use]
    pub fn with_port(mut self, port: &str) -> Self {
        self.device_port = port.to_string();
        self
    }

    /// Set baud rate
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set transport selection key
    #[must_use]
    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interface = interface.to_string();
        self
    }

    /// Set send retry count
    #[must_use]
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Enable or disable the log file
    #[must_use]
    pub fn with_logging(mut self, enabled: bool, path: impl Into<PathBuf>) -> Self {
        self.enable_logging = enabled;
        self.log_file_path = path.into();
        self
    }

    /// Check values the controller depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_port.trim().is_empty() {
            return Err(ConfigError::Invalid("device_port is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".into()));
        }
        if self.measurement_tolerance.is_nan() || self.measurement_tolerance < 0.0 {
            return Err(ConfigError::Invalid(
                "measurement_tolerance must be a non-negative number".into(),
            ));
        }
        if self.interface.trim().is_empty() {
            return Err(ConfigError::Invalid("interface is empty".into()));
        }
        Ok(())
    }

    /// Load and validate a config file. `.yaml`/`.yml` files are read as
    /// YAML, anything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        config.validate()?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the config, format chosen by extension as in [`Self::load_from`]
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `config.toml` from the user config directory, or defaults when
    /// the file does not exist
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = super::config_file().ok_or(ConfigError::NoConfigDir)?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save to `config.toml` in the user config directory
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        self.save_to(&config_path)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}
