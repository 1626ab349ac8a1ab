//! droidcat core library
//!
//! Command execution against the Android debug bridge, device discovery,
//! property lookups, and a logcat stream engine that turns the bridge's
//! threadtime output into filtered, bounded, typed log entries.

pub mod adb;
pub mod buffer;
pub mod config;
pub mod devices;
pub mod error;
pub mod filter;
pub mod logcat;
pub mod logging;
pub mod properties;
pub mod types;

pub use adb::{AdbExecutor, ConnectOutcome, ExecOptions, ToolVersion, DEFAULT_COMMAND_TIMEOUT};
pub use buffer::{BufferStats, EntryBuffer, DEFAULT_MAX_ENTRIES};
pub use config::{AdbConfig, AppConfig, ConfigFormat, LogcatConfig, LoggingConfig};
pub use devices::{parse_device_line, parse_device_list};
pub use error::{BridgeError, Result};
pub use filter::LogFilter;
pub use logcat::{parse_line, LogcatEvent, LogcatStream, LogcatSubscription};
pub use logging::{init_logging, init_logging_from_config, init_logging_with_level};
pub use properties::{extract_property, parse_getprop, resolve_device_info};
pub use types::*;
