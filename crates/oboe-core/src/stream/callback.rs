//! Audio callback core
//!
//! Every backend hands its device buffers to a [`CallbackCore`]. The core
//! moves samples through the transfer FIFO, completes pending state
//! transitions, counts xruns and publishes timestamps.
//!
//! # Real-time Safety
//!
//! `render` and `capture` never allocate and never block on application
//! locks. State completions take the state cell's mutex, which is only
//! held for a store and a notify.

use std::sync::Arc;

use crossbeam::channel::Sender;

use crate::audio::StreamGeometry;
use crate::clock;
use crate::types::{ClockId, Direction, Sample, StreamState};

use super::control::ControlMessage;
use super::fifo::{self, AppEnd, DeviceEnd};
use super::shared::StreamShared;

/// What a freshly opened stream keeps: shared state and the app end of the FIFO
pub struct StreamBinding {
    pub shared: Arc<StreamShared>,
    pub app_end: AppEnd,
}

/// Create the FIFO and shared state for negotiated geometry
///
/// The returned core goes to the backend's callback, the binding to the
/// stream object.
pub fn bind(
    geometry: StreamGeometry,
    control: Sender<ControlMessage>,
) -> (StreamBinding, CallbackCore) {
    let channels = geometry.channels.max(1) as usize;
    let (producer, consumer) =
        fifo::transfer_ring(geometry.capacity_frames.max(1) as usize, channels);
    let shared = Arc::new(StreamShared::new(geometry));

    let (app_end, device_end) = match geometry.direction {
        Direction::Output => (AppEnd::Writer(producer), DeviceEnd::Reader(consumer)),
        Direction::Input => (AppEnd::Reader(consumer), DeviceEnd::Writer(producer)),
    };

    let core = CallbackCore {
        shared: shared.clone(),
        end: device_end,
        channels,
        control,
    };
    (StreamBinding { shared, app_end }, core)
}

/// Callback-side state of one stream
pub struct CallbackCore {
    shared: Arc<StreamShared>,
    end: DeviceEnd,
    channels: usize,
    control: Sender<ControlMessage>,
}

impl CallbackCore {
    pub fn shared(&self) -> &Arc<StreamShared> {
        &self.shared
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Fill an interleaved device buffer (output streams)
    pub fn render<T: Sample>(&mut self, data: &mut [T]) {
        let channels = self.channels;
        let frames = data.len() / channels;
        let consumer = match &mut self.end {
            DeviceEnd::Reader(consumer) => consumer,
            DeviceEnd::Writer(_) => {
                data.fill(T::SILENCE);
                return;
            }
        };

        let mut state = self.shared.state.load();
        if state == StreamState::Starting {
            self.shared
                .timestamp
                .publish(self.shared.frames_read(), clock::get_nanoseconds(ClockId::Monotonic));
            if self.shared.state.complete(StreamState::Starting, StreamState::Started) {
                state = StreamState::Started;
            }
        }

        match state {
            StreamState::Started => {
                let popped = fifo::pop_frames(consumer, data, frames, channels);
                // Also clears a trailing partial frame
                data[popped * channels..].fill(T::SILENCE);
                if popped < frames {
                    self.shared.count_xrun();
                }
                let position = self.shared.add_frames_read(popped);
                self.shared
                    .timestamp
                    .publish(position, clock::get_nanoseconds(ClockId::Monotonic));
            }
            StreamState::Stopping => {
                // Play out what is queued, then stop
                let popped = fifo::pop_frames(consumer, data, frames, channels);
                data[popped * channels..].fill(T::SILENCE);
                self.shared.add_frames_read(popped);
                if fifo::queued_frames_consumer(consumer, channels) == 0 {
                    self.settle(StreamState::Stopping, StreamState::Stopped);
                }
            }
            StreamState::Pausing => {
                data.fill(T::SILENCE);
                self.settle(StreamState::Pausing, StreamState::Paused);
            }
            StreamState::Flushing => {
                data.fill(T::SILENCE);
                let discarded = fifo::discard_all(consumer, channels);
                self.shared.add_frames_read(discarded);
                self.settle(StreamState::Flushing, StreamState::Flushed);
            }
            _ => data.fill(T::SILENCE),
        }
    }

    /// Take an interleaved device buffer (input streams)
    pub fn capture<T: Sample>(&mut self, data: &[T]) {
        let channels = self.channels;
        let frames = data.len() / channels;
        let producer = match &mut self.end {
            DeviceEnd::Writer(producer) => producer,
            DeviceEnd::Reader(_) => return,
        };

        let mut state = self.shared.state.load();
        if state == StreamState::Starting {
            self.shared
                .timestamp
                .publish(self.shared.frames_written(), clock::get_nanoseconds(ClockId::Monotonic));
            if self.shared.state.complete(StreamState::Starting, StreamState::Started) {
                state = StreamState::Started;
            }
        }

        match state {
            StreamState::Started => {
                // Keep at most buffer_size frames queued; the rest is an overrun
                let queued = fifo::queued_frames_producer(producer, channels);
                let room = (self.shared.buffer_size().max(0) as usize).saturating_sub(queued);
                let pushed = fifo::push_frames(producer, data, frames.min(room), channels);
                if pushed < frames {
                    self.shared.count_xrun();
                }
                let position = self.shared.add_frames_written(pushed);
                self.shared
                    .timestamp
                    .publish(position, clock::get_nanoseconds(ClockId::Monotonic));
            }
            StreamState::Pausing => self.settle(StreamState::Pausing, StreamState::Paused),
            StreamState::Stopping => self.settle(StreamState::Stopping, StreamState::Stopped),
            _ => {}
        }
    }

    /// Report that the device is gone
    pub fn device_lost(&self) {
        mark_disconnected(&self.shared);
    }

    fn settle(&self, from: StreamState, to: StreamState) {
        if self.shared.state.complete(from, to) {
            // The control thread pauses the device; a full queue means it already has work
            let _ = self.control.try_send(ControlMessage::Quiesced);
        }
    }
}

/// Mark a stream disconnected from a backend error path
pub fn mark_disconnected(shared: &StreamShared) {
    if shared.state.disconnect() {
        log::warn!(
            "{} stream disconnected (device {})",
            shared.geometry.direction,
            shared.geometry.device_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{bounded, Receiver};

    use crate::stream::state::StateRequest;
    use crate::types::{AudioFormat, SharingMode};

    fn geometry(direction: Direction) -> StreamGeometry {
        StreamGeometry {
            direction,
            device_id: 0,
            sample_rate: 48_000,
            channels: 2,
            format: AudioFormat::PcmFloat,
            sharing_mode: SharingMode::Legacy,
            frames_per_burst: 4,
            capacity_frames: 16,
        }
    }

    fn setup(direction: Direction) -> (StreamBinding, CallbackCore, Receiver<ControlMessage>) {
        let (tx, rx) = bounded(8);
        let (binding, core) = bind(geometry(direction), tx);
        (binding, core, rx)
    }

    fn writer(binding: &mut StreamBinding) -> &mut rtrb::Producer<f32> {
        match &mut binding.app_end {
            AppEnd::Writer(p) => p,
            AppEnd::Reader(_) => panic!("expected writer"),
        }
    }

    fn reader(binding: &mut StreamBinding) -> &mut rtrb::Consumer<f32> {
        match &mut binding.app_end {
            AppEnd::Reader(c) => c,
            AppEnd::Writer(_) => panic!("expected reader"),
        }
    }

    #[test]
    fn test_open_stream_renders_silence() {
        let (_binding, mut core, _rx) = setup(Direction::Output);
        let mut buf = [1.0f32; 8];
        core.render(&mut buf);
        assert_eq!(buf, [0.0; 8]);
        assert_eq!(core.shared().xrun_count(), 0);
    }

    #[test]
    fn test_start_completes_in_callback() {
        let (mut binding, mut core, _rx) = setup(Direction::Output);
        let shared = binding.shared.clone();
        fifo::push_frames(writer(&mut binding), &[0.5f32; 8], 4, 2);
        shared.state.request(StateRequest::Start, Direction::Output).unwrap();

        let mut buf = [0.0f32; 8];
        core.render(&mut buf);
        assert_eq!(shared.state.load(), StreamState::Started);
        assert_eq!(buf, [0.5; 8]);
        assert_eq!(shared.frames_read(), 4);
        assert_eq!(shared.xrun_count(), 0);
        assert_eq!(shared.timestamp.read().map(|(pos, _)| pos), Some(4));
    }

    #[test]
    fn test_underrun_pads_and_counts() {
        let (mut binding, mut core, _rx) = setup(Direction::Output);
        let shared = binding.shared.clone();
        fifo::push_frames(writer(&mut binding), &[0.5f32; 2], 1, 2);
        shared.state.request(StateRequest::Start, Direction::Output).unwrap();

        let mut buf = [1.0f32; 8];
        core.render(&mut buf);
        assert_eq!(&buf[..2], &[0.5, 0.5]);
        assert_eq!(&buf[2..], &[0.0; 6]);
        assert_eq!(shared.xrun_count(), 1);
        assert_eq!(shared.frames_read(), 1);
    }

    #[test]
    fn test_partial_frame_is_silenced() {
        let (mut binding, mut core, _rx) = setup(Direction::Output);
        let shared = binding.shared.clone();
        fifo::push_frames(writer(&mut binding), &[0.5f32; 8], 4, 2);
        shared.state.request(StateRequest::Start, Direction::Output).unwrap();

        // Two whole stereo frames and one stray sample
        let mut buf = [1.0f32; 5];
        core.render(&mut buf);
        assert_eq!(buf, [0.5, 0.5, 0.5, 0.5, 0.0]);
        assert_eq!(shared.frames_read(), 2);
        assert_eq!(shared.xrun_count(), 0);
    }

    #[test]
    fn test_pause_then_flush_discards_queue() {
        let (mut binding, mut core, rx) = setup(Direction::Output);
        let shared = binding.shared.clone();
        shared.state.request(StateRequest::Start, Direction::Output).unwrap();
        let mut buf = [0.0f32; 8];
        core.render(&mut buf);

        fifo::push_frames(writer(&mut binding), &[0.5f32; 12], 6, 2);
        shared.state.request(StateRequest::Pause, Direction::Output).unwrap();
        core.render(&mut buf);
        assert_eq!(shared.state.load(), StreamState::Paused);
        assert!(matches!(rx.try_recv(), Ok(ControlMessage::Quiesced)));

        let read_before = shared.frames_read();
        shared.state.request(StateRequest::Flush, Direction::Output).unwrap();
        core.render(&mut buf);
        assert_eq!(shared.state.load(), StreamState::Flushed);
        assert_eq!(shared.frames_read(), read_before + 6);
        assert_eq!(fifo::queued_frames_producer(writer(&mut binding), 2), 0);
    }

    #[test]
    fn test_output_stop_drains_first() {
        let (mut binding, mut core, _rx) = setup(Direction::Output);
        let shared = binding.shared.clone();
        shared.state.request(StateRequest::Start, Direction::Output).unwrap();
        let mut buf = [0.0f32; 8];
        core.render(&mut buf);

        fifo::push_frames(writer(&mut binding), &[0.5f32; 12], 6, 2);
        shared.state.request(StateRequest::Stop, Direction::Output).unwrap();

        core.render(&mut buf);
        assert_eq!(shared.state.load(), StreamState::Stopping);
        core.render(&mut buf);
        assert_eq!(shared.state.load(), StreamState::Stopped);
        assert_eq!(&buf[..4], &[0.5; 4]);
        assert_eq!(&buf[4..], &[0.0; 4]);
    }

    #[test]
    fn test_capture_respects_buffer_size() {
        let (mut binding, mut core, _rx) = setup(Direction::Input);
        let shared = binding.shared.clone();
        assert_eq!(shared.buffer_size(), 8);
        shared.state.request(StateRequest::Start, Direction::Input).unwrap();

        let block = [0.25f32; 12];
        core.capture(&block);
        assert_eq!(shared.frames_written(), 6);
        assert_eq!(shared.xrun_count(), 0);

        // Only two more frames fit below the buffer size
        core.capture(&block);
        assert_eq!(shared.frames_written(), 8);
        assert_eq!(shared.xrun_count(), 1);

        let mut out = [0.0f32; 16];
        assert_eq!(fifo::pop_frames(reader(&mut binding), &mut out, 8, 2), 8);
        assert_eq!(out, [0.25; 16]);
    }

    #[test]
    fn test_input_stop_is_immediate() {
        let (binding, mut core, rx) = setup(Direction::Input);
        let shared = binding.shared.clone();
        shared.state.request(StateRequest::Start, Direction::Input).unwrap();
        core.capture(&[0.0f32; 4]);
        shared.state.request(StateRequest::Stop, Direction::Input).unwrap();
        core.capture(&[0.0f32; 4]);
        assert_eq!(shared.state.load(), StreamState::Stopped);
        assert!(matches!(rx.try_recv(), Ok(ControlMessage::Quiesced)));
    }

    #[test]
    fn test_device_lost_disconnects() {
        let (binding, core, _rx) = setup(Direction::Output);
        core.device_lost();
        assert_eq!(binding.shared.state.load(), StreamState::Disconnected);
    }
}
