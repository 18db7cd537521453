//! State shared between a stream, its control thread and its audio callback
//!
//! Everything here is atomics or the state cell, so the callback can read
//! and update it without locking.

use std::sync::atomic::{fence, AtomicI32, AtomicI64, AtomicU64, Ordering};

use crate::audio::StreamGeometry;
use crate::types::StreamState;

use super::state::StateCell;

/// Last presentation/capture point reported by the callback
///
/// Single writer (the callback), any number of readers. A sequence counter
/// lets readers detect a torn read and retry.
pub struct TimestampCell {
    sequence: AtomicU64,
    position: AtomicI64,
    monotonic_nanos: AtomicI64,
}

impl TimestampCell {
    pub fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
            position: AtomicI64::new(0),
            monotonic_nanos: AtomicI64::new(0),
        }
    }

    /// Publish a new frame position and its monotonic time
    pub fn publish(&self, position: i64, monotonic_nanos: i64) {
        let seq = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.position.store(position, Ordering::Relaxed);
        self.monotonic_nanos.store(monotonic_nanos, Ordering::Relaxed);
        self.sequence.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Latest `(position, monotonic_nanos)`, or None if nothing was published
    pub fn read(&self) -> Option<(i64, i64)> {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before == 0 {
                return None;
            }
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let position = self.position.load(Ordering::Relaxed);
            let time = self.monotonic_nanos.load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                return Some((position, time));
            }
        }
    }
}

impl Default for TimestampCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared stream state
pub struct StreamShared {
    pub state: StateCell,
    pub geometry: StreamGeometry,
    /// Fill level the FIFO is kept at, in frames
    buffer_size: AtomicI32,
    frames_written: AtomicI64,
    frames_read: AtomicI64,
    xrun_count: AtomicI32,
    pub timestamp: TimestampCell,
}

impl StreamShared {
    pub fn new(geometry: StreamGeometry) -> Self {
        Self {
            state: StateCell::new(StreamState::Open),
            geometry,
            buffer_size: AtomicI32::new(geometry.initial_buffer_size()),
            frames_written: AtomicI64::new(0),
            frames_read: AtomicI64::new(0),
            xrun_count: AtomicI32::new(0),
            timestamp: TimestampCell::new(),
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.geometry.channels as usize
    }

    #[inline]
    pub fn buffer_size(&self) -> i32 {
        self.buffer_size.load(Ordering::Acquire)
    }

    /// Clamp to [one burst, capacity] and store, returning the value stored
    pub fn set_buffer_size(&self, requested: i32) -> i32 {
        let clamped =
            requested.clamp(self.geometry.frames_per_burst, self.geometry.capacity_frames);
        self.buffer_size.store(clamped, Ordering::Release);
        clamped
    }

    #[inline]
    pub fn frames_written(&self) -> i64 {
        self.frames_written.load(Ordering::Acquire)
    }

    #[inline]
    pub fn frames_read(&self) -> i64 {
        self.frames_read.load(Ordering::Acquire)
    }

    #[inline]
    pub fn add_frames_written(&self, frames: usize) -> i64 {
        self.frames_written.fetch_add(frames as i64, Ordering::AcqRel) + frames as i64
    }

    #[inline]
    pub fn add_frames_read(&self, frames: usize) -> i64 {
        self.frames_read.fetch_add(frames as i64, Ordering::AcqRel) + frames as i64
    }

    #[inline]
    pub fn xrun_count(&self) -> i32 {
        self.xrun_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn count_xrun(&self) {
        self.xrun_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioFormat, Direction, SharingMode};

    fn geometry() -> StreamGeometry {
        StreamGeometry {
            direction: Direction::Output,
            device_id: 0,
            sample_rate: 48_000,
            channels: 2,
            format: AudioFormat::PcmFloat,
            sharing_mode: SharingMode::Legacy,
            frames_per_burst: 64,
            capacity_frames: 256,
        }
    }

    #[test]
    fn test_new_shared_state() {
        let shared = StreamShared::new(geometry());
        assert_eq!(shared.state.load(), StreamState::Open);
        assert_eq!(shared.buffer_size(), 128);
        assert_eq!(shared.frames_written(), 0);
        assert_eq!(shared.xrun_count(), 0);
        assert!(shared.timestamp.read().is_none());
    }

    #[test]
    fn test_buffer_size_clamped() {
        let shared = StreamShared::new(geometry());
        assert_eq!(shared.set_buffer_size(1), 64);
        assert_eq!(shared.set_buffer_size(10_000), 256);
        assert_eq!(shared.set_buffer_size(100), 100);
        assert_eq!(shared.buffer_size(), 100);
    }

    #[test]
    fn test_counters() {
        let shared = StreamShared::new(geometry());
        assert_eq!(shared.add_frames_written(10), 10);
        assert_eq!(shared.add_frames_written(5), 15);
        assert_eq!(shared.add_frames_read(7), 7);
        shared.count_xrun();
        assert_eq!(shared.xrun_count(), 1);
    }

    #[test]
    fn test_timestamp_publish() {
        let cell = TimestampCell::new();
        cell.publish(480, 1_000_000);
        assert_eq!(cell.read(), Some((480, 1_000_000)));
        cell.publish(960, 2_000_000);
        assert_eq!(cell.read(), Some((960, 2_000_000)));
    }
}
