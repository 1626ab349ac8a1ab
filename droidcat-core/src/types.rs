//! Common types for the droidcat core

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Serial prefix the emulator uses for its console-port serials
pub const EMULATOR_SERIAL_PREFIX: &str = "emulator-";

/// Default TCP port for wireless debugging
pub const DEFAULT_WIRELESS_PORT: u16 = 5555;

/// Connection state reported by `adb devices`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceState {
    Ready,
    Offline,
    Unauthorized,
    Authorizing,
    NoPermission,
    Bootloader,
    Recovery,
    Sideload,
    Unknown,
}

impl DeviceState {
    /// Map the state token of a device listing line.
    ///
    /// adb prints `no permissions (...)` for udev problems, so the first
    /// word `no` is enough to identify it.
    pub fn from_token(token: &str) -> Self {
        match token {
            "device" => Self::Ready,
            "offline" => Self::Offline,
            "unauthorized" => Self::Unauthorized,
            "authorizing" => Self::Authorizing,
            "no" | "no-permissions" => Self::NoPermission,
            "bootloader" => Self::Bootloader,
            "recovery" => Self::Recovery,
            "sideload" => Self::Sideload,
            _ => Self::Unknown,
        }
    }

    /// Only ready devices answer shell commands
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Offline => "offline",
            Self::Unauthorized => "unauthorized",
            Self::Authorizing => "authorizing",
            Self::NoPermission => "no-permission",
            Self::Bootloader => "bootloader",
            Self::Recovery => "recovery",
            Self::Sideload => "sideload",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One device as reported by a single registry query.
///
/// Devices are immutable snapshots: every listing produces fresh values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub serial: String,
    pub state: DeviceState,
    pub model: Option<String>,
    pub product: Option<String>,
    pub device_name: Option<String>,
    pub transport_id: Option<String>,
    pub is_emulator: bool,
}

impl Device {
    /// Create a device with no descriptive fields
    pub fn new<S: Into<String>>(serial: S, state: DeviceState) -> Self {
        let serial = serial.into();
        let is_emulator = is_emulator_serial(&serial);
        Self {
            serial,
            state,
            model: None,
            product: None,
            device_name: None,
            transport_id: None,
            is_emulator,
        }
    }

    /// Console port of an `emulator-NNNN` serial
    pub fn emulator_port(&self) -> Option<u16> {
        self.serial
            .strip_prefix(EMULATOR_SERIAL_PREFIX)
            .and_then(|port| port.parse().ok())
    }
}

/// Emulators either use the `emulator-` prefix or are reached through the
/// default wireless port.
pub fn is_emulator_serial(serial: &str) -> bool {
    serial.starts_with(EMULATOR_SERIAL_PREFIX)
        || serial
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse::<u16>().ok())
            == Some(DEFAULT_WIRELESS_PORT)
}

/// A device together with its resolved properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(flatten)]
    pub device: Device,
    pub name: String,
    /// 0 when unresolved
    pub api_level: u32,
    /// "Unknown" when unresolved
    pub android_version: String,
}

impl DeviceInfo {
    pub const UNKNOWN_VERSION: &'static str = "Unknown";

    /// Basic info without any property lookups
    pub fn basic(device: Device) -> Self {
        let name = device
            .model
            .as_deref()
            .map(|model| model.replace('_', " "))
            .unwrap_or_else(|| device.serial.clone());
        Self {
            device,
            name,
            api_level: 0,
            android_version: Self::UNKNOWN_VERSION.to_string(),
        }
    }

    /// Human readable one-line description
    pub fn display_label(&self) -> String {
        if self.api_level > 0 {
            format!(
                "{} (Android {}, API {})",
                self.name, self.android_version, self.api_level
            )
        } else {
            format!("{} [{}]", self.name, self.device.state)
        }
    }
}

/// Android log priorities in severity order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
#[repr(u8)]
pub enum LogLevel {
    Verbose = 2,
    Debug = 3,
    Info = 4,
    Warning = 5,
    Error = 6,
    Fatal = 7,
    Silent = 8,
}

impl LogLevel {
    pub const ALL: [LogLevel; 7] = [
        Self::Verbose,
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
        Self::Fatal,
        Self::Silent,
    ];

    /// Parse the single-letter code used on the wire
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'V' => Some(Self::Verbose),
            'D' => Some(Self::Debug),
            'I' => Some(Self::Info),
            'W' => Some(Self::Warning),
            'E' => Some(Self::Error),
            'F' => Some(Self::Fatal),
            'S' => Some(Self::Silent),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            Self::Verbose => 'V',
            Self::Debug => 'D',
            Self::Info => 'I',
            Self::Warning => 'W',
            Self::Error => 'E',
            Self::Fatal => 'F',
            Self::Silent => 'S',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Verbose => "verbose",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Silent => "silent",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Verbose
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    /// Accepts the wire code (`W`) or a name (`warning`, `warn`)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(level) = Self::from_code(c.to_ascii_uppercase()) {
                return Ok(level);
            }
        }
        match s.to_ascii_lowercase().as_str() {
            "verbose" => Ok(Self::Verbose),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "fatal" | "assert" => Ok(Self::Fatal),
            "silent" => Ok(Self::Silent),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, String> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.code().to_string()
    }
}

/// One parsed logcat line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogcatEntry {
    /// Device-local time; the year is taken from the host clock at parse time
    pub timestamp: NaiveDateTime,
    pub pid: u32,
    pub tid: u32,
    pub level: LogLevel,
    pub tag: String,
    pub message: String,
}

/// Outcome of one bridge invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Verbose < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
        assert!(LogLevel::Fatal < LogLevel::Silent);
        assert_eq!(LogLevel::ALL.iter().max(), Some(&LogLevel::Silent));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("W".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!("e".parse::<LogLevel>(), Ok(LogLevel::Error));
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!("Verbose".parse::<LogLevel>(), Ok(LogLevel::Verbose));
        assert!("X".parse::<LogLevel>().is_err());
        for level in LogLevel::ALL {
            assert_eq!(LogLevel::from_code(level.code()), Some(level));
        }
    }

    #[test]
    fn test_log_level_serialization() {
        let json = serde_json::to_string(&LogLevel::Fatal).unwrap();
        assert_eq!(json, "\"F\"");
        let level: LogLevel = serde_json::from_str("\"debug\"").unwrap();
        assert_eq!(level, LogLevel::Debug);
    }

    #[test]
    fn test_log_level_try_from_string() {
        assert_eq!(LogLevel::try_from("E".to_string()), Ok(LogLevel::Error));
        assert_eq!(LogLevel::try_from("warning".to_string()), Ok(LogLevel::Warning));
        assert!(LogLevel::try_from("loud".to_string()).is_err());
        assert!(serde_json::from_str::<LogLevel>("\"loud\"").is_err());
    }

    #[test]
    fn test_emulator_detection() {
        assert!(Device::new("emulator-5554", DeviceState::Ready).is_emulator);
        assert!(Device::new("127.0.0.1:5555", DeviceState::Ready).is_emulator);
        assert!(!Device::new("192.168.1.20:40123", DeviceState::Ready).is_emulator);
        assert!(!Device::new("R58M12ABCDE", DeviceState::Ready).is_emulator);
    }

    #[test]
    fn test_emulator_port() {
        let device = Device::new("emulator-5556", DeviceState::Offline);
        assert_eq!(device.emulator_port(), Some(5556));
        assert_eq!(Device::new("abc", DeviceState::Ready).emulator_port(), None);
    }

    #[test]
    fn test_device_state_tokens() {
        assert_eq!(DeviceState::from_token("device"), DeviceState::Ready);
        assert_eq!(DeviceState::from_token("no"), DeviceState::NoPermission);
        assert_eq!(DeviceState::from_token("sideload"), DeviceState::Sideload);
        assert_eq!(DeviceState::from_token("host"), DeviceState::Unknown);
        assert!(DeviceState::Ready.is_ready());
        assert!(!DeviceState::Offline.is_ready());
    }

    #[test]
    fn test_device_info_basic_fallbacks() {
        let mut device = Device::new("R58M12ABCDE", DeviceState::Unauthorized);
        let info = DeviceInfo::basic(device.clone());
        assert_eq!(info.name, "R58M12ABCDE");
        assert_eq!(info.api_level, 0);
        assert_eq!(info.android_version, "Unknown");

        device.model = Some("Pixel_7".to_string());
        let info = DeviceInfo::basic(device);
        assert_eq!(info.name, "Pixel 7");
        assert_eq!(info.display_label(), "Pixel 7 [unauthorized]");
    }

    #[test]
    fn test_device_info_serialization() {
        let mut device = Device::new("emulator-5554", DeviceState::Ready);
        device.model = Some("sdk_gphone64_arm64".to_string());
        let info = DeviceInfo {
            device,
            name: "sdk gphone64 arm64".to_string(),
            api_level: 34,
            android_version: "14".to_string(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["serial"], "emulator-5554");
        assert_eq!(json["state"], "ready");
        assert_eq!(json["isEmulator"], true);
        assert_eq!(json["apiLevel"], 34);

        let back: DeviceInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn test_command_result_success() {
        let ok = CommandResult {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(ok.success());
        assert!(!CommandResult::default().success());
    }
}
