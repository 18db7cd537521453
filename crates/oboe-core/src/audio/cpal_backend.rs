//! CPAL audio backend
//!
//! Opens one CPAL input or output stream per Oboe stream. The data callback
//! owns the stream's [`CallbackCore`]; the `cpal::Stream` itself stays on
//! the control thread.
//!
//! ```text
//! ┌──────────────────┐   write()    ┌──────────────┐   render()   ┌──────────────┐
//! │ Application      │─────────────►│ Transfer     │─────────────►│ CPAL callback│
//! │ thread           │◄─────────────│ FIFO (rtrb)  │◄─────────────│ thread       │
//! └──────────────────┘    read()    └──────────────┘   capture()  └──────────────┘
//! ```

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, SampleFormat, SupportedBufferSize, SupportedStreamConfigRange,
};
use crossbeam::channel::Sender;

use super::backend::{StreamGeometry, StreamRequest};
use super::device::find_device;
use crate::config::OboeConfig;
use crate::error::{OboeError, OboeResult};
use crate::stream::{bind, mark_disconnected, CallbackCore, ControlMessage, StreamBinding};
use crate::types::{Direction, Sample, SharingMode};

/// Channel count for output streams that leave it unspecified
const DEFAULT_OUTPUT_CHANNELS: i32 = 2;

/// Keeps a CPAL stream alive. Drop this to stop audio.
pub struct CpalEndpoint {
    stream: cpal::Stream,
}

impl CpalEndpoint {
    pub fn resume(&mut self) -> OboeResult<()> {
        self.stream
            .play()
            .map_err(|e| OboeError::Unavailable(format!("play failed: {}", e)))
    }

    pub fn pause(&mut self) -> OboeResult<()> {
        self.stream
            .pause()
            .map_err(|e| OboeError::Unavailable(format!("pause failed: {}", e)))
    }
}

/// Negotiated CPAL configuration
struct Negotiated {
    stream_config: cpal::StreamConfig,
    sample_format: SampleFormat,
    geometry: StreamGeometry,
}

/// Open a CPAL stream for the request
pub fn open(
    request: &StreamRequest,
    config: &OboeConfig,
    control: Sender<ControlMessage>,
) -> OboeResult<(CpalEndpoint, StreamBinding)> {
    let device = find_device(request.direction, request.device_id)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using {} device: {}", request.direction, device_name);

    let negotiated = negotiate(&device, request, config)?;
    let geometry = negotiated.geometry;
    log::info!(
        "CPAL config: {} channels, {}Hz, {:?}, {} frames (~{:.1}ms latency)",
        negotiated.stream_config.channels,
        geometry.sample_rate,
        negotiated.sample_format,
        geometry.frames_per_burst,
        geometry.burst_ms()
    );

    let (binding, core) = bind(geometry, control);
    let stream = match negotiated.sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &negotiated.stream_config, core)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &negotiated.stream_config, core)?,
        other => {
            return Err(OboeError::Incompatible(format!("sample format {:?}", other)));
        }
    };

    Ok((CpalEndpoint { stream }, binding))
}

fn supported_ranges(
    device: &cpal::Device,
    direction: Direction,
) -> OboeResult<Vec<SupportedStreamConfigRange>> {
    let ranges: Vec<_> = match direction {
        Direction::Output => device.supported_output_configs().map(|c| c.collect()),
        Direction::Input => device.supported_input_configs().map(|c| c.collect()),
    }
    .map_err(|e| OboeError::Unavailable(e.to_string()))?;

    if ranges.is_empty() {
        return Err(OboeError::Incompatible(format!(
            "no supported {} configurations",
            direction
        )));
    }
    Ok(ranges)
}

fn default_config(
    device: &cpal::Device,
    direction: Direction,
) -> OboeResult<cpal::SupportedStreamConfig> {
    match direction {
        Direction::Output => device.default_output_config(),
        Direction::Input => device.default_input_config(),
    }
    .map_err(|e| OboeError::Unavailable(e.to_string()))
}

fn in_range(range: &SupportedStreamConfigRange, rate: u32) -> bool {
    rate >= range.min_sample_rate().0 && rate <= range.max_sample_rate().0
}

/// Pick channels, rate, sample format and buffer size for the request
fn negotiate(
    device: &cpal::Device,
    request: &StreamRequest,
    config: &OboeConfig,
) -> OboeResult<Negotiated> {
    let ranges = supported_ranges(device, request.direction)?;
    let default = default_config(device, request.direction)?;

    let target_rate = request
        .sample_rate
        .map(|r| r as u32)
        .unwrap_or(default.sample_rate().0);
    let target_channels =
        request.channels_or(DEFAULT_OUTPUT_CHANNELS, default.channels() as i32) as u16;

    // Prefer exact channels, then the target rate, then f32
    let best = ranges
        .iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16))
        .max_by_key(|c| {
            (
                c.channels() == target_channels,
                in_range(c, target_rate),
                c.sample_format() == SampleFormat::F32,
                c.channels() >= target_channels,
            )
        })
        .ok_or_else(|| {
            OboeError::Incompatible("device offers neither f32 nor i16 samples".to_string())
        })?;

    let sample_rate = if in_range(best, target_rate) {
        target_rate
    } else {
        let nearest = target_rate.clamp(best.min_sample_rate().0, best.max_sample_rate().0);
        log::info!("Device doesn't support {}Hz, using {}Hz", target_rate, nearest);
        nearest
    };

    if best.channels() != target_channels {
        log::info!(
            "Device doesn't support {} channels, using {}",
            target_channels,
            best.channels()
        );
    }

    let mut burst = request.burst_frames(config);
    let buffer_size = match best.buffer_size() {
        SupportedBufferSize::Range { min, max } => {
            let clamped = burst.clamp(*min, (*max).max(*min));
            if clamped != burst {
                log::info!("Burst {} frames out of device range, using {}", burst, clamped);
                burst = clamped;
            }
            CpalBufferSize::Fixed(burst)
        }
        SupportedBufferSize::Unknown => CpalBufferSize::Default,
    };

    if request.sharing_mode == SharingMode::Exclusive {
        log::info!("CPAL streams are shared, EXCLUSIVE downgraded to LEGACY");
    }

    let stream_config = cpal::StreamConfig {
        channels: best.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size,
    };

    let geometry = StreamGeometry {
        direction: request.direction,
        device_id: request.device_id,
        sample_rate: sample_rate as i32,
        channels: best.channels() as i32,
        format: request.format,
        sharing_mode: SharingMode::Legacy,
        frames_per_burst: burst as i32,
        capacity_frames: (burst * config.capacity_bursts()) as i32,
    };

    Ok(Negotiated {
        stream_config,
        sample_format: best.sample_format(),
        geometry,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut core: CallbackCore,
) -> OboeResult<cpal::Stream>
where
    T: Sample + cpal::SizedSample,
{
    let shared = core.shared().clone();
    let direction = shared.geometry.direction;
    let on_error = move |err: cpal::StreamError| {
        log::error!("{} audio stream error: {}", direction, err);
        if let cpal::StreamError::DeviceNotAvailable = err {
            mark_disconnected(&shared);
        }
    };

    let built = match direction {
        Direction::Output => device.build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| core.render(data),
            on_error,
            None,
        ),
        Direction::Input => device.build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| core.capture(data),
            on_error,
            None,
        ),
    };

    built.map_err(|e| match e {
        cpal::BuildStreamError::StreamConfigNotSupported => {
            OboeError::Incompatible(format!("{:?} not supported", config))
        }
        cpal::BuildStreamError::DeviceNotAvailable => {
            OboeError::Unavailable("device not available".to_string())
        }
        other => OboeError::Unavailable(other.to_string()),
    })
}
