//! Audio device enumeration
//!
//! Devices are listed from ALL available CPAL hosts (ALSA, PulseAudio, JACK,
//! WASAPI...) in host order, then in the order each host reports them. A
//! device id is its position in that list plus one; id 0 means "the default
//! device of the default host" for the direction.
//!
//! Ids are stable only while the set of devices does not change.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use crate::error::{OboeError, OboeResult};
use crate::types::{DeviceId, Direction, UNSPECIFIED};

/// Common sample rates reported for a device
const PROBE_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Id to pass to the stream builder
    pub id: DeviceId,
    pub name: String,
    /// Host backend name (e.g., "ALSA", "JACK")
    pub host: String,
    pub direction: Direction,
    /// Whether this is the default device of its host
    pub is_default: bool,
    /// Common sample rates the device supports
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} [{}] {}", self.id, self.host, self.name)
    }
}

fn devices_of(host: &Host, direction: Direction) -> Option<Vec<cpal::Device>> {
    let result = match direction {
        Direction::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
        Direction::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
    };
    match result {
        Ok(devices) => Some(devices),
        Err(e) => {
            log::debug!("Could not enumerate {} devices: {}", direction, e);
            None
        }
    }
}

fn default_of(host: &Host, direction: Direction) -> Option<cpal::Device> {
    match direction {
        Direction::Output => host.default_output_device(),
        Direction::Input => host.default_input_device(),
    }
}

/// Walk every host's devices for a direction, in id order
fn for_each_device(
    direction: Direction,
    mut visit: impl FnMut(DeviceId, &str, &Host, cpal::Device) -> bool,
) {
    let mut next_id: DeviceId = 1;
    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let name = host_name(host_id);
        let Some(devices) = devices_of(&host, direction) else {
            continue;
        };
        for device in devices {
            let id = next_id;
            next_id += 1;
            if !visit(id, &name, &host, device) {
                return;
            }
        }
    }
}

/// List every device for a direction across all hosts
pub fn list_devices(direction: Direction) -> OboeResult<Vec<AudioDevice>> {
    let mut all_devices = Vec::new();

    for_each_device(direction, |id, host_label, host, device| {
        let Ok(name) = device.name() else {
            return true;
        };
        let is_default = default_of(host, direction)
            .and_then(|d| d.name().ok())
            .as_deref()
            == Some(name.as_str());

        let configs: Vec<_> = match direction {
            Direction::Output => device.supported_output_configs().map(|c| c.collect()),
            Direction::Input => device.supported_input_configs().map(|c| c.collect()),
        }
        .unwrap_or_default();

        let mut sample_rates: Vec<u32> = Vec::new();
        let mut max_channels: u16 = 0;
        for config in &configs {
            max_channels = max_channels.max(config.channels());
            for rate in PROBE_RATES {
                if rate >= config.min_sample_rate().0
                    && rate <= config.max_sample_rate().0
                    && !sample_rates.contains(&rate)
                {
                    sample_rates.push(rate);
                }
            }
        }
        sample_rates.sort();

        all_devices.push(AudioDevice {
            id,
            name,
            host: host_label.to_string(),
            direction,
            is_default,
            sample_rates,
            max_channels,
        });
        true
    });

    if all_devices.is_empty() {
        return Err(OboeError::Unavailable(format!("no {} devices found", direction)));
    }

    log::info!("Enumerated {} {} devices", all_devices.len(), direction);
    Ok(all_devices)
}

/// Resolve a device id to a CPAL device
pub fn find_device(direction: Direction, id: DeviceId) -> OboeResult<cpal::Device> {
    if id < UNSPECIFIED {
        return Err(OboeError::illegal(format!("device id {}", id)));
    }

    if id == UNSPECIFIED {
        let host = cpal::default_host();
        return default_of(&host, direction)
            .ok_or_else(|| OboeError::NoService(format!("no default {} device", direction)));
    }

    let mut found = None;
    for_each_device(direction, |candidate, _, _, device| {
        if candidate == id {
            found = Some(device);
            false
        } else {
            true
        }
    });
    found.ok_or_else(|| OboeError::Unavailable(format!("{} device #{} not found", direction, id)))
}
