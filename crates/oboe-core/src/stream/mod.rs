//! Audio streams
//!
//! A [`Stream`] is an open device plus the transfer FIFO between the
//! application and the audio callback:
//!
//! ```text
//! application ── write() ──▶ [ FIFO ] ──▶ callback ──▶ device   (output)
//! application ◀── read() ─── [ FIFO ] ◀── callback ◀── device   (input)
//! ```
//!
//! Control requests (start, pause, flush, stop) are asynchronous: they move
//! the stream into a transitional state and return. The callback finishes
//! the transition; use [`Stream::wait_for_state_change`] to observe it.
//!
//! All methods take `&self`, so a stream can be shared between threads.

mod callback;
mod control;
mod fifo;
mod shared;
mod state;

pub use callback::{bind, mark_disconnected, CallbackCore, StreamBinding};
pub use control::ControlMessage;
pub use shared::{StreamShared, TimestampCell};
pub use state::{validate_request, RequestOutcome, StateCell, StateRequest};

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::Sender;

use crate::audio::{BackendKind, StreamGeometry, StreamRequest};
use crate::clock::{self, Deadline};
use crate::config::OboeConfig;
use crate::error::{OboeError, OboeResult};
use crate::types::{
    AudioFormat, ClockId, DeviceId, Direction, Sample, SharingMode, StreamState,
    NANOS_PER_MILLISECOND,
};

use fifo::AppEnd;

/// Shortest sleep while waiting for FIFO room or data
const MIN_POLL: Duration = Duration::from_nanos(NANOS_PER_MILLISECOND as u64);

/// An open audio stream
pub struct Stream {
    shared: Arc<StreamShared>,
    /// Application end of the FIFO; one reader or writer at a time
    app_end: Mutex<AppEnd>,
    control: Sender<ControlMessage>,
    control_thread: Mutex<Option<JoinHandle<()>>>,
    backend: BackendKind,
}

impl Stream {
    /// Open a device for a validated request
    pub fn open(
        preference: BackendKind,
        request: StreamRequest,
        config: &OboeConfig,
    ) -> OboeResult<Self> {
        let (thread, binding) = control::spawn(preference, request, config.clone())?;
        let geometry = binding.shared.geometry;
        log::info!(
            "{} stream open: backend {}, {} Hz, {} ch, {:?}, burst {} ({:.1}ms), capacity {}",
            geometry.direction,
            thread.backend,
            geometry.sample_rate,
            geometry.channels,
            geometry.format,
            geometry.frames_per_burst,
            geometry.burst_ms(),
            geometry.capacity_frames
        );

        Ok(Self {
            shared: binding.shared,
            app_end: Mutex::new(binding.app_end),
            control: thread.sender,
            control_thread: Mutex::new(Some(thread.handle)),
            backend: thread.backend,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    pub fn request_start(&self) -> OboeResult<()> {
        self.request(StateRequest::Start)
    }

    pub fn request_pause(&self) -> OboeResult<()> {
        self.request(StateRequest::Pause)
    }

    /// Discard queued output; only valid while pausing or paused
    pub fn request_flush(&self) -> OboeResult<()> {
        self.request(StateRequest::Flush)
    }

    pub fn request_stop(&self) -> OboeResult<()> {
        self.request(StateRequest::Stop)
    }

    fn request(&self, request: StateRequest) -> OboeResult<()> {
        let next = self.shared.state.request(request, self.direction())?;
        let transitional = matches!(
            next,
            StreamState::Starting
                | StreamState::Pausing
                | StreamState::Flushing
                | StreamState::Stopping
        );
        if transitional {
            self.control
                .send(ControlMessage::Wake)
                .map_err(|_| OboeError::Internal("stream control thread is gone".to_string()))?;
        }
        Ok(())
    }

    /// Release the device. Safe to call more than once.
    pub fn close(&self) -> OboeResult<()> {
        let handle = lock(&self.control_thread).take();
        let Some(handle) = handle else {
            return Ok(());
        };

        self.shared.state.force(StreamState::Closing);
        // Ignore send failure: the thread may already have exited
        let _ = self.control.send(ControlMessage::Close);
        if handle.join().is_err() {
            log::error!("{} control thread panicked", self.direction());
        }
        self.shared.state.force(StreamState::Closed);
        log::info!("{} stream closed", self.direction());
        Ok(())
    }

    pub fn state(&self) -> StreamState {
        self.shared.state.load()
    }

    /// Wait until the state is no longer `input`
    ///
    /// Returns the new state, or `Timeout` if it did not change in time.
    pub fn wait_for_state_change(
        &self,
        input: StreamState,
        timeout_nanos: i64,
    ) -> OboeResult<StreamState> {
        self.shared.state.wait_for_change(input, timeout_nanos)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Data transfer
    // ─────────────────────────────────────────────────────────────────────

    /// Queue `num_frames` frames for playback
    ///
    /// Waits up to `timeout_nanos` for room below the buffer size. Returns
    /// the number of frames queued, which may be less than requested (zero
    /// with a zero timeout and a full buffer, or while another caller is
    /// transferring). Concurrent writers may interleave between bursts.
    pub fn write<S: Sample>(
        &self,
        buffer: &[S],
        num_frames: i32,
        timeout_nanos: i64,
    ) -> OboeResult<i32> {
        if self.direction() != Direction::Output {
            return Err(OboeError::Unimplemented("write on an input stream"));
        }
        let frames = self.check_transfer::<S>(buffer.len(), num_frames, timeout_nanos)?;
        let channels = self.shared.channels();

        let deadline = Deadline::after_nanos(timeout_nanos);
        let mut done = 0usize;
        loop {
            // The app end is held only while moving samples, never across a sleep
            let Some(mut end) = self.lock_app_end(timeout_nanos) else {
                break;
            };
            let producer = match &mut *end {
                AppEnd::Writer(producer) => producer,
                AppEnd::Reader(_) => {
                    return Err(OboeError::Internal("output stream without writer".to_string()))
                }
            };
            let queued = fifo::queued_frames_producer(producer, channels);
            let room = (self.shared.buffer_size().max(0) as usize).saturating_sub(queued);
            if room > 0 {
                let wanted = (frames - done).min(room);
                let pushed =
                    fifo::push_frames(producer, &buffer[done * channels..], wanted, channels);
                self.shared.add_frames_written(pushed);
                done += pushed;
            }
            drop(end);

            if done == frames || !self.keep_waiting(done, &deadline)? {
                break;
            }
            self.pause_for(frames - done, &deadline);
        }
        Ok(done as i32)
    }

    /// Take up to `num_frames` captured frames
    ///
    /// Waits up to `timeout_nanos` for data. Returns the number of frames
    /// read, which may be less than requested.
    pub fn read<S: Sample>(
        &self,
        buffer: &mut [S],
        num_frames: i32,
        timeout_nanos: i64,
    ) -> OboeResult<i32> {
        if self.direction() != Direction::Input {
            return Err(OboeError::Unimplemented("read on an output stream"));
        }
        let frames = self.check_transfer::<S>(buffer.len(), num_frames, timeout_nanos)?;
        let channels = self.shared.channels();

        let deadline = Deadline::after_nanos(timeout_nanos);
        let mut done = 0usize;
        loop {
            let Some(mut end) = self.lock_app_end(timeout_nanos) else {
                break;
            };
            let consumer = match &mut *end {
                AppEnd::Reader(consumer) => consumer,
                AppEnd::Writer(_) => {
                    return Err(OboeError::Internal("input stream without reader".to_string()))
                }
            };
            let popped =
                fifo::pop_frames(consumer, &mut buffer[done * channels..], frames - done, channels);
            self.shared.add_frames_read(popped);
            done += popped;
            drop(end);

            if done == frames || !self.keep_waiting(done, &deadline)? {
                break;
            }
            self.pause_for(frames - done, &deadline);
        }
        Ok(done as i32)
    }

    /// Lock the application end of the FIFO
    ///
    /// A zero timeout never waits: `None` if another caller holds it.
    fn lock_app_end(&self, timeout_nanos: i64) -> Option<MutexGuard<'_, AppEnd>> {
        if timeout_nanos > 0 {
            return Some(lock(&self.app_end));
        }
        match self.app_end.try_lock() {
            Ok(end) => Some(end),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Validate a read/write call, returning the frame count
    fn check_transfer<S: Sample>(
        &self,
        buffer_len: usize,
        num_frames: i32,
        timeout_nanos: i64,
    ) -> OboeResult<usize> {
        if S::FORMAT != self.format() {
            return Err(OboeError::illegal(format!(
                "{:?} samples on a {:?} stream",
                S::FORMAT,
                self.format()
            )));
        }
        if num_frames < 0 {
            return Err(OboeError::illegal("negative frame count"));
        }
        if timeout_nanos < 0 {
            return Err(OboeError::illegal("negative timeout"));
        }
        let frames = num_frames as usize;
        if buffer_len < frames * self.shared.channels() {
            return Err(OboeError::illegal("buffer shorter than num_frames"));
        }
        self.check_transfer_state()?;
        Ok(frames)
    }

    fn check_transfer_state(&self) -> OboeResult<()> {
        match self.state() {
            StreamState::Disconnected => Err(OboeError::Disconnected),
            state @ (StreamState::Closing | StreamState::Closed | StreamState::Flushing) => {
                Err(OboeError::InvalidState(state))
            }
            // Stop plays out what is queued at the request; nothing more joins it
            StreamState::Stopping if self.direction() == Direction::Output => {
                Err(OboeError::InvalidState(StreamState::Stopping))
            }
            _ => Ok(()),
        }
    }

    /// Whether a partial transfer should keep waiting
    ///
    /// Only a running callback frees room or delivers data, so other states
    /// return what was transferred. A state that forbids transfers is an
    /// error only when nothing was transferred yet.
    fn keep_waiting(&self, done: usize, deadline: &Deadline) -> OboeResult<bool> {
        if let Err(e) = self.check_transfer_state() {
            return if done == 0 { Err(e) } else { Ok(false) };
        }
        let running = matches!(self.state(), StreamState::Starting | StreamState::Started);
        Ok(running && !deadline.expired())
    }

    /// Sleep roughly until `missing` frames could move, at most one burst
    fn pause_for(&self, missing: usize, deadline: &Deadline) {
        let geometry = &self.shared.geometry;
        let burst_frames = geometry.frames_per_burst as i64;
        let burst = clock::frames_to_duration(burst_frames, geometry.sample_rate).max(MIN_POLL);
        let needed = clock::frames_to_duration(missing as i64, geometry.sample_rate);
        let nap = needed.clamp(MIN_POLL, burst).min(deadline.remaining());
        if !nap.is_zero() {
            std::thread::sleep(nap);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Buffer and queries
    // ─────────────────────────────────────────────────────────────────────

    /// Set the FIFO fill level; returns the clamped value actually used
    pub fn set_buffer_size(&self, requested: i32) -> OboeResult<i32> {
        if requested < 0 {
            return Err(OboeError::illegal("negative buffer size"));
        }
        Ok(self.shared.set_buffer_size(requested))
    }

    pub fn buffer_size(&self) -> i32 {
        self.shared.buffer_size()
    }

    pub fn frames_per_burst(&self) -> i32 {
        self.shared.geometry.frames_per_burst
    }

    pub fn buffer_capacity(&self) -> i32 {
        self.shared.geometry.capacity_frames
    }

    /// Underruns (output) or overruns (input) since open
    pub fn xrun_count(&self) -> i32 {
        self.shared.xrun_count()
    }

    pub fn sample_rate(&self) -> i32 {
        self.shared.geometry.sample_rate
    }

    pub fn samples_per_frame(&self) -> i32 {
        self.shared.geometry.channels
    }

    pub fn format(&self) -> AudioFormat {
        self.shared.geometry.format
    }

    pub fn sharing_mode(&self) -> SharingMode {
        self.shared.geometry.sharing_mode
    }

    pub fn direction(&self) -> Direction {
        self.shared.geometry.direction
    }

    pub fn device_id(&self) -> DeviceId {
        self.shared.geometry.device_id
    }

    pub fn geometry(&self) -> StreamGeometry {
        self.shared.geometry
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Frames written into the stream so far
    ///
    /// Output: by the application. Input: by the device.
    pub fn frames_written(&self) -> i64 {
        self.shared.frames_written()
    }

    /// Frames read from the stream so far
    ///
    /// Output: by the device. Input: by the application.
    pub fn frames_read(&self) -> i64 {
        self.shared.frames_read()
    }

    /// Frame position and the time it was presented or captured
    ///
    /// Only available while the stream is started.
    pub fn timestamp(&self, clock_id: ClockId) -> OboeResult<(i64, i64)> {
        let state = self.state();
        if state != StreamState::Started {
            return Err(OboeError::InvalidState(state));
        }
        let (position, monotonic) =
            self.shared.timestamp.read().ok_or(OboeError::InvalidState(state))?;
        Ok((position, clock::monotonic_to(clock_id, monotonic)))
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close stream on drop: {}", e);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
