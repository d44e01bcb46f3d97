//! Input device enumeration

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::error::AudioError;

/// Description of an input device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Device name as reported by the host, also used to select it
    pub name: String,

    /// Whether this is the host's default input
    pub is_default: bool,

    /// Supported sample rate bounds (min and max of every range)
    pub sample_rates: Vec<u32>,

    /// Supported channel counts
    pub channels: Vec<u16>,
}

/// List the input devices of the default host
///
/// Devices whose name cannot be read are skipped.
pub fn list_input_devices() -> Vec<AudioDevice> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("Failed to enumerate input devices: {}", e);
            return Vec::new();
        }
    };

    devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            let mut sample_rates = Vec::new();
            let mut channels = Vec::new();

            if let Ok(configs) = device.supported_input_configs() {
                for range in configs {
                    sample_rates.push(range.min_sample_rate().0);
                    sample_rates.push(range.max_sample_rate().0);
                    channels.push(range.channels());
                }
            }

            sample_rates.sort_unstable();
            sample_rates.dedup();
            channels.sort_unstable();
            channels.dedup();

            Some(AudioDevice {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                sample_rates,
                channels,
            })
        })
        .collect()
}

/// Find an input device by name, or the default input when `name` is `None`
pub fn find_input_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    match name {
        Some(wanted) => {
            let mut devices = host.input_devices().map_err(|e| AudioError::from_backend(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceUnavailable(format!("input device '{}' not found", wanted)))
        }
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default input device available".into())),
    }
}
