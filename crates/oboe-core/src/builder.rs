//! Stream builder
//!
//! Collects the requested stream parameters, validates each on set, and
//! opens streams. A builder can open any number of streams and is not
//! consumed by doing so.

use crate::audio::{BackendKind, StreamRequest};
use crate::config::{global_config, OboeConfig};
use crate::error::{OboeError, OboeResult};
use crate::stream::Stream;
use crate::types::{
    AudioFormat, DeviceId, Direction, SharingMode, MAX_SAMPLES_PER_FRAME, MAX_SAMPLE_RATE,
    MIN_SAMPLES_PER_FRAME, MIN_SAMPLE_RATE, UNSPECIFIED,
};

/// Requested stream parameters
///
/// Zero means unspecified for the device id, sample rate and samples per
/// frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamBuilder {
    device_id: DeviceId,
    sample_rate: i32,
    samples_per_frame: i32,
    format: AudioFormat,
    sharing_mode: SharingMode,
    direction: Direction,
    backend: Option<BackendKind>,
    frames_per_burst: Option<u32>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_device_id(&mut self, device_id: DeviceId) -> OboeResult<()> {
        if device_id < UNSPECIFIED {
            return Err(OboeError::illegal(format!("device id {}", device_id)));
        }
        self.device_id = device_id;
        Ok(())
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn set_sample_rate(&mut self, sample_rate: i32) -> OboeResult<()> {
        let in_range = (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate);
        if sample_rate != UNSPECIFIED && !in_range {
            return Err(OboeError::illegal(format!("sample rate {}", sample_rate)));
        }
        self.sample_rate = sample_rate;
        Ok(())
    }

    pub fn sample_rate(&self) -> i32 {
        self.sample_rate
    }

    pub fn set_samples_per_frame(&mut self, samples_per_frame: i32) -> OboeResult<()> {
        let in_range = (MIN_SAMPLES_PER_FRAME..=MAX_SAMPLES_PER_FRAME).contains(&samples_per_frame);
        if samples_per_frame != UNSPECIFIED && !in_range {
            return Err(OboeError::illegal(format!("samples per frame {}", samples_per_frame)));
        }
        self.samples_per_frame = samples_per_frame;
        Ok(())
    }

    pub fn samples_per_frame(&self) -> i32 {
        self.samples_per_frame
    }

    pub fn set_format(&mut self, format: AudioFormat) -> OboeResult<()> {
        if format == AudioFormat::Invalid {
            return Err(OboeError::illegal("invalid format"));
        }
        self.format = format;
        Ok(())
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn set_sharing_mode(&mut self, sharing_mode: SharingMode) -> OboeResult<()> {
        self.sharing_mode = sharing_mode;
        Ok(())
    }

    pub fn sharing_mode(&self) -> SharingMode {
        self.sharing_mode
    }

    pub fn set_direction(&mut self, direction: Direction) -> OboeResult<()> {
        self.direction = direction;
        Ok(())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Prefer a backend for streams from this builder (default: configuration)
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Ask for a callback size, where the backend lets us choose
    pub fn with_frames_per_burst(mut self, frames: u32) -> Self {
        self.frames_per_burst = Some(frames);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.backend
    }

    /// Turn the stored parameters into a backend request
    pub fn request(&self) -> OboeResult<StreamRequest> {
        let format = match self.format {
            AudioFormat::Unspecified => AudioFormat::PcmFloat,
            AudioFormat::Pcm16 | AudioFormat::PcmFloat => self.format,
            AudioFormat::Pcm824 | AudioFormat::Pcm32 => {
                return Err(OboeError::Unimplemented(
                    "only PCM16 and PCM_FLOAT streams are supported",
                ));
            }
            AudioFormat::Invalid => return Err(OboeError::illegal("invalid format")),
        };

        Ok(StreamRequest {
            direction: self.direction,
            device_id: self.device_id,
            sample_rate: (self.sample_rate != UNSPECIFIED).then_some(self.sample_rate),
            channels: (self.samples_per_frame != UNSPECIFIED).then_some(self.samples_per_frame),
            format,
            sharing_mode: self.sharing_mode,
            frames_per_burst: self.frames_per_burst,
        })
    }

    /// Open a stream with the process-wide configuration
    pub fn open_stream(&self) -> OboeResult<Stream> {
        self.open_stream_with(global_config())
    }

    /// Open a stream with an explicit configuration
    pub fn open_stream_with(&self, config: &OboeConfig) -> OboeResult<Stream> {
        let request = self.request()?;
        let backend = self.backend.unwrap_or(config.backend);
        log::debug!("Opening {} stream on {} backend: {:?}", request.direction, backend, request);
        Stream::open(backend, request, config)
    }
}
