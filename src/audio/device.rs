//! Audio input enumeration

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::errors::DeviceError;

/// Audio input device information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInputInfo {
    /// Synthetic identifier, `audio_{index}_{name hash}`
    pub id: String,
    pub name: String,
    /// Default sample rate in Hz
    pub sample_rate: u32,
    pub channels: u16,
    pub is_default: bool,
}

// cpal has no stable device ids on every host
fn synthetic_id(index: usize, name: &str) -> String {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    format!("audio_{}_{:08x}", index, hasher.finish() & 0xFFFF_FFFF)
}

/// List input devices, default first, then by name
pub fn list_audio_inputs() -> Result<Vec<AudioInputInfo>, DeviceError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices: Vec<AudioInputInfo> = host
        .input_devices()
        .map_err(|e| DeviceError::Unavailable(format!("Failed to enumerate audio devices: {}", e)))?
        .enumerate()
        .filter_map(|(index, device)| {
            let name = device.name().ok()?;
            let config = device.default_input_config().ok()?;
            Some(AudioInputInfo {
                id: synthetic_id(index, &name),
                is_default: default_name.as_ref() == Some(&name),
                name,
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
            })
        })
        .collect();

    devices.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
    Ok(devices)
}

/// Resolve a device by id or name; `None`, `""` and `"default"` pick the system default
pub(crate) fn resolve_input_device(device_id: Option<&str>) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();

    match device_id {
        None | Some("") | Some("default") => host
            .default_input_device()
            .ok_or_else(|| DeviceError::Unavailable("No default audio input device".to_string())),
        Some(wanted) => {
            let devices = host
                .input_devices()
                .map_err(|e| DeviceError::Unavailable(format!("Failed to enumerate audio devices: {}", e)))?;
            for (index, device) in devices.enumerate() {
                let Ok(name) = device.name() else { continue };
                if name == wanted || synthetic_id(index, &name) == wanted {
                    return Ok(device);
                }
            }
            Err(DeviceError::Unavailable(format!("Audio device not found: {}", wanted)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_id_is_stable() {
        assert_eq!(synthetic_id(1, "USB Mic"), synthetic_id(1, "USB Mic"));
        assert_ne!(synthetic_id(1, "USB Mic"), synthetic_id(2, "USB Mic"));
        assert!(synthetic_id(0, "x").starts_with("audio_0_"));
    }

    #[test]
    fn test_list_audio_inputs_default_first() {
        // Hosts without audio hardware may fail to enumerate
        if let Ok(devices) = list_audio_inputs() {
            if devices.iter().any(|d| d.is_default) {
                assert!(devices[0].is_default);
            }
        }
    }

    #[test]
    fn test_unknown_device_is_unavailable() {
        let result = resolve_input_device(Some("definitely-not-a-real-input"));
        assert!(result.is_err());
    }
}
