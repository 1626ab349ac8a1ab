//! Device property lookups
//!
//! Resolves a [`Device`] into a [`DeviceInfo`] by querying `getprop` on the
//! device. Failed lookups fall back to listing fields and never fail the
//! overall call.

use crate::{AdbExecutor, Device, DeviceInfo, ExecOptions, Result};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const PROP_MODEL: &str = "ro.product.model";
pub const PROP_SDK: &str = "ro.build.version.sdk";
pub const PROP_RELEASE: &str = "ro.build.version.release";

static PROP_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[(?P<key>[^\]]+)\]\s*:\s*\[(?P<value>.*)\]\s*$")
        .expect("property pattern is valid")
});

/// Parse full `getprop` output (`[key]: [value]` per line)
pub fn parse_getprop(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| PROP_LINE_RE.captures(line))
        .map(|caps| (caps["key"].to_string(), caps["value"].to_string()))
        .collect()
}

/// Extract one property value from `getprop` output.
///
/// Accepts both the bracketed listing form and the bare value printed by
/// `getprop <key>`. Empty values count as missing.
pub fn extract_property(output: &str, key: &str) -> Option<String> {
    let props = parse_getprop(output);
    if !props.is_empty() {
        return props
            .get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
    }

    let value = output.trim();
    if value.is_empty() || value.contains('\n') {
        None
    } else {
        Some(value.to_string())
    }
}

async fn query_property(executor: &AdbExecutor, serial: &str, key: &str) -> Option<String> {
    let command = format!("getprop {}", key);
    match executor.shell(&command, &ExecOptions::for_serial(serial)).await {
        Ok(result) if result.success() => {
            let value = extract_property(&result.stdout, key);
            if value.is_none() {
                debug!("Property {} is empty on {}", key, serial);
            }
            value
        }
        Ok(result) => {
            warn!(
                "getprop {} on {} exited with {:?}: {}",
                key,
                serial,
                result.exit_code,
                result.stderr.trim()
            );
            None
        }
        Err(e) => {
            warn!("Failed to query {} on {}: {}", key, serial, e);
            None
        }
    }
}

/// Resolve name, API level and Android version for one device.
///
/// Non-ready devices are returned with basic fields without touching the
/// bridge. For ready devices the three lookups run concurrently and all of
/// them settle before the result is assembled.
pub async fn resolve_device_info(executor: &AdbExecutor, device: Device) -> DeviceInfo {
    if !device.state.is_ready() {
        return DeviceInfo::basic(device);
    }

    let serial = device.serial.clone();
    let (model, sdk, release) = tokio::join!(
        query_property(executor, &serial, PROP_MODEL),
        query_property(executor, &serial, PROP_SDK),
        query_property(executor, &serial, PROP_RELEASE),
    );

    let mut info = DeviceInfo::basic(device);
    if let Some(model) = model {
        info.name = model;
    }
    match sdk.as_deref().map(str::parse::<u32>) {
        Some(Ok(level)) => info.api_level = level,
        Some(Err(_)) => warn!("Unparsable API level {:?} on {}", sdk, serial),
        None => {}
    }
    if let Some(release) = release {
        info.android_version = release;
    }
    info
}

impl AdbExecutor {
    /// List devices and resolve each of them concurrently
    pub async fn list_device_infos(&self) -> Result<Vec<DeviceInfo>> {
        let devices = self.list_devices().await?;
        Ok(join_all(
            devices
                .into_iter()
                .map(|device| resolve_device_info(self, device)),
        )
        .await)
    }

    /// Resolve one device
    pub async fn device_info(&self, device: Device) -> DeviceInfo {
        resolve_device_info(self, device).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceState;

    #[test]
    fn test_parse_getprop_listing() {
        let output = "[ro.product.model]: [Pixel 7]\n\
[ro.build.version.sdk]: [34]\n\
[ro.build.version.release]: [14]\n\
[persist.sys.empty]: []\n\
not a property line\n";
        let props = parse_getprop(output);
        assert_eq!(props.len(), 4);
        assert_eq!(props["ro.product.model"], "Pixel 7");
        assert_eq!(props["ro.build.version.sdk"], "34");
        assert_eq!(props["persist.sys.empty"], "");
    }

    #[test]
    fn test_extract_property_bracketed() {
        assert_eq!(
            extract_property("[ro.product.model]: [Pixel 7]", PROP_MODEL).as_deref(),
            Some("Pixel 7")
        );
        assert_eq!(extract_property("[ro.product.model]: [Pixel 7]", PROP_SDK), None);
        assert_eq!(extract_property("[persist.sys.empty]: []", "persist.sys.empty"), None);
    }

    #[test]
    fn test_extract_property_bare_value() {
        assert_eq!(extract_property("34\n", PROP_SDK).as_deref(), Some("34"));
        assert_eq!(extract_property("\r\n", PROP_SDK), None);
        assert_eq!(extract_property("a\nb\n", PROP_SDK), None);
    }

    #[tokio::test]
    async fn test_non_ready_device_skips_queries() {
        // a missing binary would surface as warnings, not as a failure
        let executor = AdbExecutor::with_path("/nonexistent/droidcat/adb");
        let mut device = Device::new("R58M12ABCDE", DeviceState::Unauthorized);
        device.model = Some("SM_G991B".to_string());

        let info = resolve_device_info(&executor, device).await;
        assert_eq!(info.name, "SM G991B");
        assert_eq!(info.api_level, 0);
        assert_eq!(info.android_version, "Unknown");
    }

    #[tokio::test]
    async fn test_ready_device_degrades_when_queries_fail() {
        let executor = AdbExecutor::with_path("/nonexistent/droidcat/adb");
        let device = Device::new("emulator-5554", DeviceState::Ready);

        let info = resolve_device_info(&executor, device).await;
        assert_eq!(info.name, "emulator-5554");
        assert_eq!(info.api_level, 0);
        assert_eq!(info.android_version, DeviceInfo::UNKNOWN_VERSION);
    }
}
