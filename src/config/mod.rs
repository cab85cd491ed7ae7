//! Configuration module for destra-rs
//!
//! Settings live in a TOML file (by convention `destra.toml` in the working
//! directory). Every field has a default, so a partial or missing file is
//! fine.
//!
//! # Example
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::{DestraError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Conventional config file name
pub const CONFIG_FILE: &str = "destra.toml";

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default per-read/per-write timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default wait after opening the port, while the target resets
pub const DEFAULT_SETTLE_MS: u64 = 2000;

/// Default time allowed for the ready banner to arrive
pub const DEFAULT_BANNER_TIMEOUT_MS: u64 = 100;

/// Banner the firmware prints once it is ready for requests
pub const DEFAULT_READY_BANNER: &str = "ECHO_TEST_READY";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DestraConfig {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DestraConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DestraError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            DestraError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load configuration, returning defaults if the file is missing or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DestraError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DestraError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        std::fs::write(path, self.to_toml_string()?).map_err(|e| {
            DestraError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

/// Serial link settings; framing is fixed at 8N1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port to open; auto-detected when absent
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Delay after opening the port before the first exchange
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_banner_timeout_ms")]
    pub banner_timeout_ms: u64,

    #[serde(default = "default_ready_banner")]
    pub ready_banner: String,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

fn default_banner_timeout_ms() -> u64 {
    DEFAULT_BANNER_TIMEOUT_MS
}

fn default_ready_banner() -> String {
    DEFAULT_READY_BANNER.to_string()
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_TIMEOUT_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            banner_timeout_ms: DEFAULT_BANNER_TIMEOUT_MS,
            ready_banner: DEFAULT_READY_BANNER.to_string(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn banner_timeout(&self) -> Duration {
        Duration::from_millis(self.banner_timeout_ms)
    }
}

/// Diagnostic log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for the log file; no file log when absent
    #[serde(default = "default_log_dir")]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_file_name")]
    pub file_name: String,

    #[serde(default = "default_true")]
    pub console: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}

fn default_file_name() -> String {
    "destra.log".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_dir: default_log_dir(),
            file_name: default_file_name(),
            console: true,
        }
    }
}
