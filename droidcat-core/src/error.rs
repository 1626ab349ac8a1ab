//! Error handling for the droidcat core
//!
//! Only genuine failures live here. Lines that do not match the logcat
//! grammar and property queries that come back empty are not errors: the
//! former are dropped as `None`, the latter degrade to fallback values.

use thiserror::Error;

/// Result type alias for the droidcat core
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for bridge commands and the logcat engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Command timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Logcat session {session_id} is already running")]
    AlreadyRunning { session_id: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl BridgeError {
    /// Create a new spawn error
    pub fn spawn<P: Into<String>, R: ToString>(program: P, reason: R) -> Self {
        Self::Spawn {
            program: program.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new timeout error
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new lock error
    pub fn lock<S: Into<String>>(what: S) -> Self {
        Self::Lock(what.into())
    }

    /// Create a new invalid request error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Check if retrying the same operation could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::AlreadyRunning { .. } => true, // after a stop
            Self::Io(_) => true,
            Self::Spawn { .. } => false, // binary missing or not executable
            Self::Config(_) | Self::Serialization(_) => false,
            Self::Lock(_) | Self::InvalidRequest(_) => false,
        }
    }

    /// Get suggested recovery action
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Spawn { program, .. } => Some(format!(
                "Check that {} exists and is executable, or set adb_path / DROIDCAT_ADB_PATH",
                program
            )),
            Self::Timeout { .. } => {
                Some("Check the device connection or raise command_timeout_ms".to_string())
            }
            Self::AlreadyRunning { .. } => {
                Some("Stop the running logcat session before starting a new one".to_string())
            }
            Self::Config(_) => Some("Review and correct configuration settings".to_string()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("Failed to parse TOML config: {}", err))
    }
}

impl From<toml::ser::Error> for BridgeError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(format!("Failed to serialize config to TOML: {}", err))
    }
}

impl From<serde_yaml::Error> for BridgeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(format!("YAML config error: {}", err))
    }
}
