//! Transfer FIFO between the application and the audio callback
//!
//! A single-producer single-consumer ring of interleaved `f32` samples
//! (rtrb). All counts in this module are frames; the ring itself counts
//! samples. Neither side allocates or locks once the ring exists.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::types::Sample;

/// Create a ring holding `capacity_frames` frames of `channels` samples
pub fn transfer_ring(capacity_frames: usize, channels: usize) -> (Producer<f32>, Consumer<f32>) {
    RingBuffer::new(capacity_frames * channels)
}

/// The application's end of the ring
pub enum AppEnd {
    /// Output stream: the application writes
    Writer(Producer<f32>),
    /// Input stream: the application reads
    Reader(Consumer<f32>),
}

/// The callback's end of the ring
pub enum DeviceEnd {
    /// Output stream: the callback drains into the device
    Reader(Consumer<f32>),
    /// Input stream: the callback fills from the device
    Writer(Producer<f32>),
}

/// Frames currently queued, seen from the producer
#[inline]
pub fn queued_frames_producer(producer: &Producer<f32>, channels: usize) -> usize {
    (producer.buffer().capacity() - producer.slots()) / channels
}

/// Frames currently queued, seen from the consumer
#[inline]
pub fn queued_frames_consumer(consumer: &Consumer<f32>, channels: usize) -> usize {
    consumer.slots() / channels
}

/// Push up to `frames` frames from `src`, converting to `f32`
///
/// Returns the number of frames pushed (limited by free space).
pub fn push_frames<S: Sample>(
    producer: &mut Producer<f32>,
    src: &[S],
    frames: usize,
    channels: usize,
) -> usize {
    let free_frames = producer.slots() / channels;
    let frames = frames.min(free_frames).min(src.len() / channels);
    if frames == 0 {
        return 0;
    }
    let samples = frames * channels;
    match producer.write_chunk_uninit(samples) {
        Ok(chunk) => {
            let written = chunk.fill_from_iter(src[..samples].iter().map(|s| s.to_f32()));
            written / channels
        }
        Err(_) => 0,
    }
}

/// Pop up to `frames` frames into `dst`, converting from `f32`
///
/// Returns the number of frames popped (limited by queued data).
pub fn pop_frames<S: Sample>(
    consumer: &mut Consumer<f32>,
    dst: &mut [S],
    frames: usize,
    channels: usize,
) -> usize {
    let queued = consumer.slots() / channels;
    let frames = frames.min(queued).min(dst.len() / channels);
    if frames == 0 {
        return 0;
    }
    let samples = frames * channels;
    match consumer.read_chunk(samples) {
        Ok(chunk) => {
            let (first, second) = chunk.as_slices();
            for (out, value) in dst[..samples].iter_mut().zip(first.iter().chain(second.iter())) {
                *out = S::from_f32(*value);
            }
            chunk.commit_all();
            frames
        }
        Err(_) => 0,
    }
}

/// Drop everything queued, returning the number of frames discarded
pub fn discard_all(consumer: &mut Consumer<f32>, channels: usize) -> usize {
    let samples = consumer.slots();
    match consumer.read_chunk(samples) {
        Ok(chunk) => {
            chunk.commit_all();
            samples / channels
        }
        Err(_) => 0,
    }
}
