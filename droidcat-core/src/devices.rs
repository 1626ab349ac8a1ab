//! Device discovery from `adb devices -l`

use crate::{AdbExecutor, BridgeError, Device, DeviceState, ExecOptions, Result};
use tracing::{debug, info};

/// Parse the text of `adb devices -l`.
///
/// The header and daemon banner lines (`* daemon started ...`) are
/// discarded, as are blank lines and lines with fewer than two tokens.
/// Unknown `key:value` pairs are ignored so newer bridge versions keep
/// parsing.
pub fn parse_device_list(output: &str) -> Vec<Device> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(parse_device_line)
        .collect()
}

/// Parse one device line: `SERIAL STATE [key:value]*`
pub fn parse_device_line(line: &str) -> Option<Device> {
    let mut tokens = line.split_whitespace();
    let serial = tokens.next()?;
    let state = tokens.next()?;

    let mut device = Device::new(serial, DeviceState::from_token(state));
    for token in tokens {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        if key.is_empty() || value.is_empty() {
            continue;
        }
        match key {
            "model" => device.model = Some(value.to_string()),
            "product" => device.product = Some(value.to_string()),
            "device" => device.device_name = Some(value.to_string()),
            "transport_id" => device.transport_id = Some(value.to_string()),
            _ => debug!("Ignoring device attribute {}:{} for {}", key, value, serial),
        }
    }
    Some(device)
}

impl AdbExecutor {
    /// List attached devices
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        info!("Discovering ADB devices");
        let result = self
            .execute(&["devices", "-l"], &ExecOptions::default())
            .await?;
        if !result.success() {
            return Err(BridgeError::invalid_request(format!(
                "adb devices exited with {:?}: {}",
                result.exit_code,
                result.stderr.trim()
            )));
        }

        let devices = parse_device_list(&result.stdout);
        info!("Found {} devices", devices.len());
        Ok(devices)
    }
}
