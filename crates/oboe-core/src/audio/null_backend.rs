//! Null audio backend
//!
//! A virtual device driven by a real-time timer thread. Once per burst
//! period the ticker renders (output, samples discarded) or captures
//! silence (input) at the nominal rate. No hardware or audio server is
//! needed, which makes it the backend used by the test suite.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;

use super::backend::{StreamGeometry, StreamRequest};
use crate::clock::frames_to_duration;
use crate::config::OboeConfig;
use crate::error::{OboeError, OboeResult};
use crate::stream::{bind, CallbackCore, ControlMessage, StreamBinding};
use crate::thread::spawn_realtime;
use crate::types::Direction;

/// Nominal rate when none is requested
pub const NULL_SAMPLE_RATE: i32 = 48_000;

const NULL_OUTPUT_CHANNELS: i32 = 2;
const NULL_INPUT_CHANNELS: i32 = 1;

/// A running virtual device. Drop this to stop the ticker.
pub struct NullEndpoint {
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
}

impl NullEndpoint {
    pub fn resume(&mut self) -> OboeResult<()> {
        self.running.store(true, Ordering::Release);
        if let Some(ticker) = &self.ticker {
            ticker.thread().unpark();
        }
        Ok(())
    }

    pub fn pause(&mut self) -> OboeResult<()> {
        self.running.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for NullEndpoint {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(ticker) = self.ticker.take() {
            ticker.thread().unpark();
            if ticker.join().is_err() {
                log::error!("Null device ticker panicked");
            }
        }
    }
}

/// Open a virtual device for the request
pub fn open(
    request: &StreamRequest,
    config: &OboeConfig,
    control: Sender<ControlMessage>,
) -> OboeResult<(NullEndpoint, StreamBinding)> {
    let burst = request.burst_frames(config);
    let geometry = StreamGeometry {
        direction: request.direction,
        device_id: request.device_id,
        sample_rate: request.sample_rate.unwrap_or(NULL_SAMPLE_RATE),
        channels: request.channels_or(NULL_OUTPUT_CHANNELS, NULL_INPUT_CHANNELS),
        format: request.format,
        // Nobody else shares a virtual device
        sharing_mode: request.sharing_mode,
        frames_per_burst: burst as i32,
        capacity_frames: (burst * config.capacity_bursts()) as i32,
    };

    let (binding, core) = bind(geometry, control);
    let running = Arc::new(AtomicBool::new(false));
    let shutdown = Arc::new(AtomicBool::new(false));

    let ticker = {
        let running = running.clone();
        let shutdown = shutdown.clone();
        spawn_realtime("oboe-null", config.realtime_priority, move || {
            tick(core, geometry, &running, &shutdown)
        })
        .map_err(|e| OboeError::Unavailable(format!("failed to spawn null device: {}", e)))?
    };

    log::debug!(
        "Null {} device: {}Hz, {} ch, burst {} frames",
        geometry.direction,
        geometry.sample_rate,
        geometry.channels,
        geometry.frames_per_burst
    );

    Ok((
        NullEndpoint {
            running,
            shutdown,
            ticker: Some(ticker),
        },
        binding,
    ))
}

/// Ticker loop: one callback per burst period while running
fn tick(
    mut core: CallbackCore,
    geometry: StreamGeometry,
    running: &AtomicBool,
    shutdown: &AtomicBool,
) {
    let period = frames_to_duration(geometry.frames_per_burst as i64, geometry.sample_rate)
        .max(Duration::from_micros(100));
    let mut buffer = vec![0.0f32; geometry.frames_per_burst as usize * geometry.channels as usize];
    let mut next = Instant::now();

    while !shutdown.load(Ordering::Acquire) {
        if !running.load(Ordering::Acquire) {
            // Parked until resumed or shut down
            std::thread::park_timeout(Duration::from_millis(50));
            next = Instant::now();
            continue;
        }

        match geometry.direction {
            Direction::Output => core.render(&mut buffer),
            Direction::Input => {
                buffer.fill(0.0);
                core.capture(&buffer);
            }
        }

        next += period;
        let now = Instant::now();
        if next > now {
            std::thread::sleep(next - now);
        } else {
            // Fell behind; don't try to catch up in a burst
            next = now;
        }
    }
}
