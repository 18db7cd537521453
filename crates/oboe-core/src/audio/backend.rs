//! Backend selection and the endpoint handle
//!
//! Three backends can carry a stream:
//! - **JACK** (Linux, `jack-backend` feature): native pro-audio server
//! - **CPAL**: ALSA/PulseAudio/PipeWire, WASAPI, CoreAudio
//! - **Null**: clock-driven virtual device, no hardware needed
//!
//! `Auto` tries JACK first (when compiled in) and falls back to CPAL.
//! Whatever backend wins, the stream sees the same lock-free FIFO and the
//! same callback core.

use std::str::FromStr;

use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};

use crate::config::OboeConfig;
use crate::error::{OboeError, OboeResult};
use crate::stream::{ControlMessage, StreamBinding};
use crate::types::{AudioFormat, DeviceId, Direction, SharingMode};

/// Backend preference for a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JACK when available, else CPAL
    #[default]
    Auto,
    Jack,
    Cpal,
    /// Virtual device driven by a timer thread
    Null,
}

impl BackendKind {
    /// Backends to try, in order
    pub fn candidates(self) -> Vec<BackendKind> {
        match self {
            BackendKind::Auto => {
                let mut list = Vec::with_capacity(2);
                if jack_compiled_in() {
                    list.push(BackendKind::Jack);
                }
                list.push(BackendKind::Cpal);
                list
            }
            other => vec![other],
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "jack" => Ok(BackendKind::Jack),
            "cpal" => Ok(BackendKind::Cpal),
            "null" => Ok(BackendKind::Null),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Auto => "auto",
            BackendKind::Jack => "jack",
            BackendKind::Cpal => "cpal",
            BackendKind::Null => "null",
        };
        write!(f, "{}", name)
    }
}

fn jack_compiled_in() -> bool {
    cfg!(all(target_os = "linux", feature = "jack-backend"))
}

/// What the application asked for, after builder validation
///
/// `None` means "let the backend choose".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub direction: Direction,
    pub device_id: DeviceId,
    pub sample_rate: Option<i32>,
    pub channels: Option<i32>,
    /// Always a transferable format (PCM16 or PCM_FLOAT)
    pub format: AudioFormat,
    pub sharing_mode: SharingMode,
    pub frames_per_burst: Option<u32>,
}

impl StreamRequest {
    /// Channel count when the request leaves it open
    pub fn channels_or(&self, output_default: i32, input_default: i32) -> i32 {
        self.channels.unwrap_or(match self.direction {
            Direction::Output => output_default,
            Direction::Input => input_default,
        })
    }

    /// Burst size: builder hint, else configuration
    pub fn burst_frames(&self, config: &OboeConfig) -> u32 {
        let probe = OboeConfig {
            frames_per_burst: self.frames_per_burst.unwrap_or(config.frames_per_burst),
            ..OboeConfig::default()
        };
        probe.burst_frames()
    }
}

/// Parameters the stream actually got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamGeometry {
    pub direction: Direction,
    pub device_id: DeviceId,
    pub sample_rate: i32,
    pub channels: i32,
    pub format: AudioFormat,
    pub sharing_mode: SharingMode,
    pub frames_per_burst: i32,
    pub capacity_frames: i32,
}

impl StreamGeometry {
    /// Initial buffer size: double buffering, within capacity
    pub fn initial_buffer_size(&self) -> i32 {
        (self.frames_per_burst * 2).min(self.capacity_frames)
    }

    /// Latency of one burst in milliseconds
    pub fn burst_ms(&self) -> f32 {
        (self.frames_per_burst as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Handle to an open device
///
/// Owned by the stream's control thread (CPAL streams are not `Send`).
/// Dropping it stops the device.
pub enum EndpointHandle {
    Cpal(super::cpal_backend::CpalEndpoint),

    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    Jack(super::jack_backend::JackEndpoint),

    Null(super::null_backend::NullEndpoint),
}

impl EndpointHandle {
    /// Let the device call back (again)
    pub fn resume(&mut self) -> OboeResult<()> {
        match self {
            EndpointHandle::Cpal(e) => e.resume(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            EndpointHandle::Jack(e) => e.resume(),
            EndpointHandle::Null(e) => e.resume(),
        }
    }

    /// Stop callbacks while the stream rests
    pub fn pause(&mut self) -> OboeResult<()> {
        match self {
            EndpointHandle::Cpal(e) => e.pause(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            EndpointHandle::Jack(e) => e.pause(),
            EndpointHandle::Null(e) => e.pause(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            EndpointHandle::Cpal(_) => BackendKind::Cpal,
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            EndpointHandle::Jack(_) => BackendKind::Jack,
            EndpointHandle::Null(_) => BackendKind::Null,
        }
    }
}

/// Open a device for the request, falling back between backends
///
/// Each failure is logged and the next candidate is tried; the last error
/// is returned when every candidate fails.
pub fn open_endpoint(
    preference: BackendKind,
    request: &StreamRequest,
    config: &OboeConfig,
    control: &Sender<ControlMessage>,
) -> OboeResult<(EndpointHandle, StreamBinding)> {
    let candidates = preference.candidates();
    let mut last_error = OboeError::NoService("no audio backend compiled in".to_string());

    for kind in candidates {
        let opened = open_with(kind, request, config, control.clone());
        match opened {
            Ok(result) => {
                log::info!("Opened {} stream on {} backend", request.direction, kind);
                return Ok(result);
            }
            Err(e) => {
                log::warn!("{} backend could not open {} stream: {}", kind, request.direction, e);
                last_error = e;
            }
        }
    }

    Err(last_error)
}

fn open_with(
    kind: BackendKind,
    request: &StreamRequest,
    config: &OboeConfig,
    control: Sender<ControlMessage>,
) -> OboeResult<(EndpointHandle, StreamBinding)> {
    match kind {
        BackendKind::Cpal => super::cpal_backend::open(request, config, control)
            .map(|(e, b)| (EndpointHandle::Cpal(e), b)),

        #[cfg(all(target_os = "linux", feature = "jack-backend"))]
        BackendKind::Jack => super::jack_backend::open(request, config, control)
            .map(|(e, b)| (EndpointHandle::Jack(e), b)),

        #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
        BackendKind::Jack => Err(OboeError::Unavailable(
            "JACK support not compiled in".to_string(),
        )),

        BackendKind::Null => super::null_backend::open(request, config, control)
            .map(|(e, b)| (EndpointHandle::Null(e), b)),

        BackendKind::Auto => Err(OboeError::Internal("Auto is not a concrete backend".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates() {
        let auto = BackendKind::Auto.candidates();
        assert_eq!(auto.last(), Some(&BackendKind::Cpal));
        if jack_compiled_in() {
            assert_eq!(auto[0], BackendKind::Jack);
        } else {
            assert_eq!(auto.len(), 1);
        }
        assert_eq!(BackendKind::Null.candidates(), vec![BackendKind::Null]);
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!("JACK".parse::<BackendKind>(), Ok(BackendKind::Jack));
        assert_eq!(" null ".parse::<BackendKind>(), Ok(BackendKind::Null));
        assert!("wasapi".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Cpal.to_string(), "cpal");
    }

    #[test]
    fn test_request_defaults() {
        let request = StreamRequest {
            direction: Direction::Input,
            device_id: 0,
            sample_rate: None,
            channels: None,
            format: AudioFormat::PcmFloat,
            sharing_mode: SharingMode::Legacy,
            frames_per_burst: Some(1),
        };
        assert_eq!(request.channels_or(2, 1), 1);
        assert_eq!(
            request.burst_frames(&OboeConfig::default()),
            crate::config::MIN_FRAMES_PER_BURST
        );
    }

    #[test]
    fn test_geometry_buffer_size() {
        let geometry = StreamGeometry {
            direction: Direction::Output,
            device_id: 0,
            sample_rate: 48_000,
            channels: 2,
            format: AudioFormat::PcmFloat,
            sharing_mode: SharingMode::Legacy,
            frames_per_burst: 192,
            capacity_frames: 768,
        };
        assert_eq!(geometry.initial_buffer_size(), 384);
        assert!((geometry.burst_ms() - 4.0).abs() < 0.001);
    }
}
