//! Configuration loading
//!
//! Supports TOML and YAML files (chosen by extension), environment variable
//! overrides and validation. Every field has a default, so an empty file is
//! a valid configuration.

use crate::buffer::DEFAULT_MAX_ENTRIES;
use crate::logcat::LogcatStream;
use crate::{AdbExecutor, BridgeError, LogFilter, LogLevel, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const ENV_ADB_PATH: &str = "DROIDCAT_ADB_PATH";
const ENV_COMMAND_TIMEOUT_MS: &str = "DROIDCAT_COMMAND_TIMEOUT_MS";
const ENV_MAX_ENTRIES: &str = "DROIDCAT_MAX_ENTRIES";
const ENV_LOG_LEVEL: &str = "DROIDCAT_LOG_LEVEL";
const SDK_ENV_VARS: [&str; 2] = ["ANDROID_HOME", "ANDROID_SDK_ROOT"];

/// Bridge binary section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    pub adb_path: Option<String>,
    pub command_timeout_ms: u64,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            adb_path: None,
            command_timeout_ms: 30_000,
        }
    }
}

/// Logcat streaming section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogcatConfig {
    pub max_entries: usize,
    pub default_filter: Option<String>,
    pub default_min_level: LogLevel,
    pub default_tags: Vec<String>,
}

impl Default for LogcatConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            default_filter: None,
            default_min_level: LogLevel::Verbose,
            default_tags: Vec::new(),
        }
    }
}

/// Diagnostics section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub adb: AdbConfig,
    pub logcat: LogcatConfig,
    pub logging: LoggingConfig,
}

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        }
    }
}

impl AppConfig {
    /// Load, apply env overrides and validate
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            BridgeError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut config = Self::parse(&content, ConfigFormat::from_path(path))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text without touching the environment
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        };
        Ok(config)
    }

    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match ConfigFormat::from_path(path) {
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
        };

        tokio::fs::write(path, content).await.map_err(|e| {
            BridgeError::config(format!("Failed to write config file {}: {}", path.display(), e))
        })?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.adb.command_timeout_ms == 0 {
            return Err(BridgeError::config("Command timeout must be greater than 0"));
        }

        if self.logcat.max_entries == 0 {
            return Err(BridgeError::config("max_entries must be greater than 0"));
        }

        if let Some(path) = &self.adb.adb_path {
            if path.trim().is_empty() {
                return Err(BridgeError::config("adb_path must not be empty"));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(BridgeError::config(format!(
                    "Invalid logging level: {}",
                    self.logging.level
                )))
            }
        }

        Ok(())
    }

    /// Apply `DROIDCAT_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup; unparsable values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_ADB_PATH) {
            self.adb.adb_path = Some(path);
        }

        if let Some(timeout) = lookup(ENV_COMMAND_TIMEOUT_MS).and_then(|v| v.parse().ok()) {
            self.adb.command_timeout_ms = timeout;
        }

        if let Some(max) = lookup(ENV_MAX_ENTRIES).and_then(|v| v.parse().ok()) {
            self.logcat.max_entries = max;
        }

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
    }

    /// Configured path, then the SDK's platform-tools, then bare `adb`
    pub fn resolve_adb_path(&self) -> String {
        self.resolve_adb_path_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_adb_path_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = &self.adb.adb_path {
            return path.clone();
        }

        let binary = if cfg!(windows) { "adb.exe" } else { "adb" };
        for var in SDK_ENV_VARS {
            if let Some(sdk) = lookup(var) {
                let candidate: PathBuf = [sdk.as_str(), "platform-tools", binary].iter().collect();
                if candidate.is_file() {
                    debug!("Using adb from {}: {}", var, candidate.display());
                    return candidate.to_string_lossy().into_owned();
                }
            }
        }

        "adb".to_string()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.adb.command_timeout_ms)
    }

    /// Executor using the resolved bridge path and timeout
    pub fn executor(&self) -> AdbExecutor {
        AdbExecutor::with_path(self.resolve_adb_path()).with_timeout(self.command_timeout())
    }

    /// Initial filter from the logcat defaults
    pub fn default_filter(&self) -> LogFilter {
        let filter = LogFilter::new().with_min_level(self.logcat.default_min_level);
        match &self.logcat.default_filter {
            Some(text) => filter.with_text(text),
            None => filter,
        }
    }

    /// Stopped stream engine sized and filtered per this configuration
    pub fn logcat_stream(&self) -> LogcatStream {
        LogcatStream::new(self.executor(), self.logcat.max_entries)
            .with_filter(self.default_filter())
    }
}
