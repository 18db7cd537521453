//! `OboeStream_*` functions

use std::ffi::c_void;
use std::sync::Arc;

use oboe_core::{AudioFormat, ClockId, OboeError, OboeResult, Stream, StreamState};

use crate::guard::{guard, write_out};
use crate::handles::{HandleKind, HandleTable};
use crate::{
    oboe_audio_format_t, oboe_clockid_t, oboe_nanoseconds_t, oboe_position_frames_t, oboe_result_t,
    oboe_sharing_mode_t, oboe_size_frames_t, oboe_state_t, OboeStream,
};

pub(crate) static STREAMS: HandleTable<Stream> = HandleTable::new(HandleKind::Stream);

fn stream(handle: OboeStream) -> OboeResult<Arc<Stream>> {
    STREAMS.get(handle)
}

/// Read one value from the stream and store it through `out`
///
/// # Safety
/// `out` must be null or valid for a write.
unsafe fn query<T>(
    handle: OboeStream,
    out: *mut T,
    f: impl FnOnce(&Stream) -> T,
) -> OboeResult<i32> {
    if out.is_null() {
        return Err(OboeError::Null);
    }
    let value = f(&*stream(handle)?);
    unsafe { write_out(out, value) }?;
    Ok(0)
}

/// Stop and release a stream; the handle becomes invalid
#[no_mangle]
pub extern "C" fn OboeStream_close(stream: OboeStream) -> oboe_result_t {
    guard("OboeStream_close", || {
        let stream = STREAMS.remove(stream)?;
        stream.close()?;
        Ok(0)
    })
}

/// Ask the stream to start; the state becomes STARTING and the callback
/// completes the move to STARTED.
#[no_mangle]
pub extern "C" fn OboeStream_requestStart(stream: OboeStream) -> oboe_result_t {
    guard("OboeStream_requestStart", || self::stream(stream)?.request_start().map(|_| 0))
}

#[no_mangle]
pub extern "C" fn OboeStream_requestPause(stream: OboeStream) -> oboe_result_t {
    guard("OboeStream_requestPause", || self::stream(stream)?.request_pause().map(|_| 0))
}

/// Discard queued output; only valid on a paused output stream
#[no_mangle]
pub extern "C" fn OboeStream_requestFlush(stream: OboeStream) -> oboe_result_t {
    guard("OboeStream_requestFlush", || self::stream(stream)?.request_flush().map(|_| 0))
}

#[no_mangle]
pub extern "C" fn OboeStream_requestStop(stream: OboeStream) -> oboe_result_t {
    guard("OboeStream_requestStop", || self::stream(stream)?.request_stop().map(|_| 0))
}

/// # Safety
/// `state` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getState(
    stream: OboeStream,
    state: *mut oboe_state_t,
) -> oboe_result_t {
    guard("OboeStream_getState", || unsafe { query(stream, state, |s| s.state().as_raw()) })
}

/// Wait until the state differs from `inputState`
///
/// Stores the new state in `nextState` and returns it. Fails with
/// `OBOE_ERROR_TIMEOUT` if the state has not changed in time.
///
/// # Safety
/// `nextState` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_waitForStateChange(
    stream: OboeStream,
    inputState: oboe_state_t,
    nextState: *mut oboe_state_t,
    timeoutNanoseconds: oboe_nanoseconds_t,
) -> oboe_result_t {
    guard("OboeStream_waitForStateChange", || {
        if nextState.is_null() {
            return Err(OboeError::Null);
        }
        let input = StreamState::from_raw(inputState)
            .ok_or_else(|| OboeError::IllegalArgument(format!("unknown state {}", inputState)))?;
        let next = self::stream(stream)?.wait_for_state_change(input, timeoutNanoseconds)?;
        unsafe { write_out(nextState, next.as_raw()) }?;
        Ok(next.as_raw())
    })
}

/// Read captured frames into `buffer`, laid out per the stream format
///
/// Returns the number of frames read.
///
/// # Safety
/// `buffer` must be null or valid for writes of `numFrames` frames.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_read(
    stream: OboeStream,
    buffer: *mut c_void,
    numFrames: i32,
    timeoutNanoseconds: oboe_nanoseconds_t,
) -> oboe_result_t {
    guard("OboeStream_read", || {
        if buffer.is_null() {
            return Err(OboeError::Null);
        }
        let stream = self::stream(stream)?;
        let len = numFrames.max(0) as usize * stream.samples_per_frame() as usize;
        // SAFETY: caller guarantees room for numFrames frames of the stream format
        match stream.format() {
            AudioFormat::Pcm16 => {
                let samples = unsafe { std::slice::from_raw_parts_mut(buffer.cast::<i16>(), len) };
                stream.read(samples, numFrames, timeoutNanoseconds)
            }
            AudioFormat::PcmFloat => {
                let samples = unsafe { std::slice::from_raw_parts_mut(buffer.cast::<f32>(), len) };
                stream.read(samples, numFrames, timeoutNanoseconds)
            }
            _ => Err(OboeError::Unimplemented("transfer format")),
        }
    })
}

/// Queue frames from `buffer`, laid out per the stream format
///
/// Returns the number of frames written.
///
/// # Safety
/// `buffer` must be null or valid for reads of `numFrames` frames.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_write(
    stream: OboeStream,
    buffer: *const c_void,
    numFrames: i32,
    timeoutNanoseconds: oboe_nanoseconds_t,
) -> oboe_result_t {
    guard("OboeStream_write", || {
        if buffer.is_null() {
            return Err(OboeError::Null);
        }
        let stream = self::stream(stream)?;
        let len = numFrames.max(0) as usize * stream.samples_per_frame() as usize;
        // SAFETY: caller guarantees numFrames frames of the stream format
        match stream.format() {
            AudioFormat::Pcm16 => {
                let samples = unsafe { std::slice::from_raw_parts(buffer.cast::<i16>(), len) };
                stream.write(samples, numFrames, timeoutNanoseconds)
            }
            AudioFormat::PcmFloat => {
                let samples = unsafe { std::slice::from_raw_parts(buffer.cast::<f32>(), len) };
                stream.write(samples, numFrames, timeoutNanoseconds)
            }
            _ => Err(OboeError::Unimplemented("transfer format")),
        }
    })
}

/// Set the fill level used for latency tuning; returns the size granted
#[no_mangle]
pub extern "C" fn OboeStream_setBufferSize(
    stream: OboeStream,
    frames: oboe_size_frames_t,
) -> oboe_result_t {
    guard("OboeStream_setBufferSize", || self::stream(stream)?.set_buffer_size(frames))
}

/// # Safety
/// `frames` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getBufferSize(
    stream: OboeStream,
    frames: *mut oboe_size_frames_t,
) -> oboe_result_t {
    guard("OboeStream_getBufferSize", || unsafe { query(stream, frames, Stream::buffer_size) })
}

/// # Safety
/// `frames` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getFramesPerBurst(
    stream: OboeStream,
    frames: *mut oboe_size_frames_t,
) -> oboe_result_t {
    guard("OboeStream_getFramesPerBurst", || unsafe {
        query(stream, frames, Stream::frames_per_burst)
    })
}

/// # Safety
/// `frames` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getBufferCapacity(
    stream: OboeStream,
    frames: *mut oboe_size_frames_t,
) -> oboe_result_t {
    guard("OboeStream_getBufferCapacity", || unsafe {
        query(stream, frames, Stream::buffer_capacity)
    })
}

/// # Safety
/// `xRunCount` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getXRunCount(
    stream: OboeStream,
    xRunCount: *mut i32,
) -> oboe_result_t {
    guard("OboeStream_getXRunCount", || unsafe { query(stream, xRunCount, Stream::xrun_count) })
}

/// # Safety
/// `sampleRate` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getSampleRate(
    stream: OboeStream,
    sampleRate: *mut i32,
) -> oboe_result_t {
    guard("OboeStream_getSampleRate", || unsafe { query(stream, sampleRate, Stream::sample_rate) })
}

/// # Safety
/// `samplesPerFrame` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getSamplesPerFrame(
    stream: OboeStream,
    samplesPerFrame: *mut i32,
) -> oboe_result_t {
    guard("OboeStream_getSamplesPerFrame", || unsafe {
        query(stream, samplesPerFrame, Stream::samples_per_frame)
    })
}

/// # Safety
/// `format` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getFormat(
    stream: OboeStream,
    format: *mut oboe_audio_format_t,
) -> oboe_result_t {
    guard("OboeStream_getFormat", || unsafe { query(stream, format, |s| s.format().as_raw()) })
}

/// # Safety
/// `sharingMode` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getSharingMode(
    stream: OboeStream,
    sharingMode: *mut oboe_sharing_mode_t,
) -> oboe_result_t {
    guard("OboeStream_getSharingMode", || unsafe {
        query(stream, sharingMode, |s| s.sharing_mode().as_raw())
    })
}

/// # Safety
/// `direction` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getDirection(
    stream: OboeStream,
    direction: *mut u32,
) -> oboe_result_t {
    guard("OboeStream_getDirection", || unsafe {
        query(stream, direction, |s| s.direction().as_raw() as u32)
    })
}

/// # Safety
/// `frames` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getFramesWritten(
    stream: OboeStream,
    frames: *mut oboe_position_frames_t,
) -> oboe_result_t {
    guard("OboeStream_getFramesWritten", || unsafe {
        query(stream, frames, Stream::frames_written)
    })
}

/// # Safety
/// `frames` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getFramesRead(
    stream: OboeStream,
    frames: *mut oboe_position_frames_t,
) -> oboe_result_t {
    guard("OboeStream_getFramesRead", || unsafe { query(stream, frames, Stream::frames_read) })
}

/// Position and time of the most recent frame at the device
///
/// Only valid while STARTED. Right after `OboeStream_requestStart` this
/// fails with `OBOE_ERROR_INVALID_STATE` until the first callback; retry
/// later. The outputs are untouched on error.
///
/// # Safety
/// `framePosition` and `timeNanoseconds` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn OboeStream_getTimestamp(
    stream: OboeStream,
    clockid: oboe_clockid_t,
    framePosition: *mut oboe_position_frames_t,
    timeNanoseconds: *mut oboe_nanoseconds_t,
) -> oboe_result_t {
    guard("OboeStream_getTimestamp", || {
        if framePosition.is_null() || timeNanoseconds.is_null() {
            return Err(OboeError::Null);
        }
        let clock = ClockId::from_raw(clockid)
            .ok_or_else(|| OboeError::IllegalArgument(format!("unknown clock {}", clockid)))?;
        let (position, time) = match self::stream(stream)?.timestamp(clock) {
            Ok(timestamp) => timestamp,
            Err(e @ OboeError::InvalidState(_)) => {
                log::trace!("getTimestamp not ready: {}", e);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        unsafe {
            write_out(framePosition, position)?;
            write_out(timeNanoseconds, time)?;
        }
        Ok(0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{
        Oboe_createStreamBuilder, OboeStreamBuilder_delete, OboeStreamBuilder_openStream,
        OboeStreamBuilder_setDirection, OboeStreamBuilder_setFormat,
    };
    use crate::test_support::use_null_backend;
    use oboe_core::{
        Direction, SharingMode, ERROR_ILLEGAL_ARGUMENT, ERROR_INVALID_HANDLE, ERROR_INVALID_STATE,
        ERROR_NULL, ERROR_TIMEOUT, ERROR_UNIMPLEMENTED, NANOS_PER_SECOND, OK,
    };

    fn open(direction: Direction, format: AudioFormat) -> OboeStream {
        use_null_backend();
        let mut builder = crate::OBOE_STREAM_BUILDER_NONE;
        let mut stream = crate::OBOE_STREAM_NONE;
        unsafe {
            assert_eq!(Oboe_createStreamBuilder(&mut builder), OK);
            assert_eq!(OboeStreamBuilder_setDirection(builder, direction.as_raw()), OK);
            assert_eq!(OboeStreamBuilder_setFormat(builder, format.as_raw()), OK);
            assert_eq!(OboeStreamBuilder_openStream(builder, &mut stream), OK);
        }
        assert_eq!(OboeStreamBuilder_delete(builder), OK);
        stream
    }

    fn state(stream: OboeStream) -> StreamState {
        let mut raw = -1;
        assert_eq!(unsafe { OboeStream_getState(stream, &mut raw) }, OK);
        StreamState::from_raw(raw).expect("known state")
    }

    fn settle(stream: OboeStream, from: StreamState) -> StreamState {
        let mut next = -1;
        let code = unsafe {
            OboeStream_waitForStateChange(stream, from.as_raw(), &mut next, NANOS_PER_SECOND)
        };
        assert!(code >= 0, "wait failed: {}", code);
        assert_eq!(code, next);
        StreamState::from_raw(next).expect("known state")
    }

    #[test]
    fn test_queries() {
        let stream = open(Direction::Output, AudioFormat::Unspecified);
        let mut value = -1;
        unsafe {
            assert_eq!(OboeStream_getSampleRate(stream, &mut value), OK);
            assert_eq!(value, oboe_core::audio::NULL_SAMPLE_RATE);
            assert_eq!(OboeStream_getSamplesPerFrame(stream, &mut value), OK);
            assert_eq!(value, 2);
            assert_eq!(OboeStream_getFormat(stream, &mut value), OK);
            assert_eq!(value, AudioFormat::PcmFloat.as_raw());
            assert_eq!(OboeStream_getSharingMode(stream, &mut value), OK);
            assert_eq!(value, SharingMode::Legacy.as_raw());
            assert_eq!(OboeStream_getXRunCount(stream, &mut value), OK);
            assert_eq!(value, 0);

            let mut direction = u32::MAX;
            assert_eq!(OboeStream_getDirection(stream, &mut direction), OK);
            assert_eq!(direction, Direction::Output.as_raw() as u32);

            let mut burst = 0;
            let mut capacity = 0;
            let mut size = 0;
            assert_eq!(OboeStream_getFramesPerBurst(stream, &mut burst), OK);
            assert_eq!(OboeStream_getBufferCapacity(stream, &mut capacity), OK);
            assert_eq!(OboeStream_getBufferSize(stream, &mut size), OK);
            assert!(burst > 0);
            assert!(size >= burst && size <= capacity);

            assert_eq!(OboeStream_setBufferSize(stream, 1), burst);
            assert_eq!(OboeStream_setBufferSize(stream, i32::MAX), capacity);
            assert_eq!(OboeStream_setBufferSize(stream, -5), ERROR_ILLEGAL_ARGUMENT);

            let mut frames = -1i64;
            assert_eq!(OboeStream_getFramesWritten(stream, &mut frames), OK);
            assert_eq!(frames, 0);
            assert_eq!(OboeStream_getFramesRead(stream, &mut frames), OK);
            assert_eq!(frames, 0);

            assert_eq!(OboeStream_getBufferSize(stream, std::ptr::null_mut()), ERROR_NULL);
        }
        assert_eq!(OboeStream_close(stream), OK);
    }

    #[test]
    fn test_output_lifecycle() {
        let stream = open(Direction::Output, AudioFormat::PcmFloat);
        assert_eq!(state(stream), StreamState::Open);

        let mut burst = 0;
        unsafe { OboeStream_getFramesPerBurst(stream, &mut burst) };
        let samples = vec![0.25f32; burst as usize * 2];

        // Priming while OPEN never blocks
        let written = unsafe { OboeStream_write(stream, samples.as_ptr().cast(), burst, 0) };
        assert_eq!(written, burst);

        assert_eq!(OboeStream_requestStart(stream), OK);
        let mut current = state(stream);
        if current == StreamState::Starting {
            current = settle(stream, StreamState::Starting);
        }
        assert_eq!(current, StreamState::Started);

        let written =
            unsafe { OboeStream_write(stream, samples.as_ptr().cast(), burst, NANOS_PER_SECOND) };
        assert_eq!(written, burst);

        let mut position = 0i64;
        let mut time = 0i64;
        let mut ok = false;
        for _ in 0..100 {
            let clock = ClockId::Monotonic.as_raw();
            let code = unsafe { OboeStream_getTimestamp(stream, clock, &mut position, &mut time) };
            if code == OK {
                ok = true;
                break;
            }
            assert_eq!(code, ERROR_INVALID_STATE);
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(ok);
        assert!(position >= 0);
        assert!(time > 0);

        assert_eq!(OboeStream_requestPause(stream), OK);
        let mut current = state(stream);
        if current == StreamState::Pausing {
            current = settle(stream, StreamState::Pausing);
        }
        assert_eq!(current, StreamState::Paused);

        assert_eq!(OboeStream_requestFlush(stream), OK);
        let mut current = state(stream);
        if current == StreamState::Flushing {
            current = settle(stream, StreamState::Flushing);
        }
        assert_eq!(current, StreamState::Flushed);

        let mut written = 0i64;
        let mut read = 0i64;
        unsafe {
            OboeStream_getFramesWritten(stream, &mut written);
            OboeStream_getFramesRead(stream, &mut read);
        }
        assert_eq!(written, 2 * burst as i64);
        assert_eq!(read, written);

        assert_eq!(OboeStream_requestStop(stream), OK);
        assert_eq!(OboeStream_close(stream), OK);
        assert_eq!(OboeStream_close(stream), ERROR_INVALID_HANDLE);
        assert_eq!(OboeStream_requestStart(stream), ERROR_INVALID_HANDLE);
    }

    #[test]
    fn test_timestamp_requires_started() {
        let stream = open(Direction::Output, AudioFormat::PcmFloat);
        let mut position = -7i64;
        let mut time = -7i64;
        let clock = ClockId::Monotonic.as_raw();
        let code = unsafe { OboeStream_getTimestamp(stream, clock, &mut position, &mut time) };
        assert_eq!(code, ERROR_INVALID_STATE);
        assert_eq!((position, time), (-7, -7));

        let code = unsafe { OboeStream_getTimestamp(stream, 3, &mut position, &mut time) };
        assert_eq!(code, ERROR_ILLEGAL_ARGUMENT);
        let code = unsafe { OboeStream_getTimestamp(stream, 1, std::ptr::null_mut(), &mut time) };
        assert_eq!(code, ERROR_NULL);
        OboeStream_close(stream);
    }

    #[test]
    fn test_wait_times_out() {
        let stream = open(Direction::Output, AudioFormat::PcmFloat);
        let mut next = -1;
        let open_state = StreamState::Open.as_raw();
        let code = unsafe { OboeStream_waitForStateChange(stream, open_state, &mut next, 0) };
        assert_eq!(code, ERROR_TIMEOUT);
        assert_eq!(next, -1);

        let started = StreamState::Started.as_raw();
        let code = unsafe { OboeStream_waitForStateChange(stream, started, &mut next, 0) };
        assert_eq!(code, StreamState::Open.as_raw());
        assert_eq!(next, StreamState::Open.as_raw());

        let code = unsafe { OboeStream_waitForStateChange(stream, 42, &mut next, 0) };
        assert_eq!(code, ERROR_ILLEGAL_ARGUMENT);
        let code = unsafe { OboeStream_waitForStateChange(stream, 2, std::ptr::null_mut(), 0) };
        assert_eq!(code, ERROR_NULL);
        OboeStream_close(stream);
    }

    #[test]
    fn test_transfer_direction_and_arguments() {
        let stream = open(Direction::Output, AudioFormat::Pcm16);
        let mut samples = [0i16; 64];
        unsafe {
            let out = samples.as_mut_ptr().cast();
            assert_eq!(OboeStream_read(stream, out, 4, 0), ERROR_UNIMPLEMENTED);
            assert_eq!(OboeStream_write(stream, std::ptr::null(), 4, 0), ERROR_NULL);
            let data = samples.as_ptr().cast();
            assert_eq!(OboeStream_write(stream, data, -1, 0), ERROR_ILLEGAL_ARGUMENT);
            assert_eq!(OboeStream_write(stream, data, 4, -1), ERROR_ILLEGAL_ARGUMENT);
            assert_eq!(OboeStream_write(stream, samples.as_ptr().cast(), 0, 0), 0);
            assert_eq!(OboeStream_write(stream, samples.as_ptr().cast(), 8, 0), 8);
        }
        assert_eq!(OboeStream_requestFlush(stream), ERROR_INVALID_STATE);
        OboeStream_close(stream);

        let input = open(Direction::Input, AudioFormat::PcmFloat);
        let mut frames = [0.0f32; 16];
        unsafe {
            assert_eq!(OboeStream_write(input, frames.as_ptr().cast(), 1, 0), ERROR_UNIMPLEMENTED);
            assert_eq!(OboeStream_read(input, frames.as_mut_ptr().cast(), 4, 0), 0);
        }
        assert_eq!(OboeStream_requestFlush(input), ERROR_UNIMPLEMENTED);
        OboeStream_close(input);
    }

    #[test]
    fn test_input_reads_after_start() {
        let stream = open(Direction::Input, AudioFormat::Pcm16);
        let mut channels = 0;
        unsafe { OboeStream_getSamplesPerFrame(stream, &mut channels) };
        assert_eq!(OboeStream_requestStart(stream), OK);

        let mut samples = vec![1i16; 32 * channels as usize];
        let read =
            unsafe { OboeStream_read(stream, samples.as_mut_ptr().cast(), 32, NANOS_PER_SECOND) };
        assert_eq!(read, 32);
        assert!(samples.iter().all(|s| *s == 0));

        let mut frames = 0i64;
        unsafe { OboeStream_getFramesRead(stream, &mut frames) };
        assert_eq!(frames, 32);
        OboeStream_close(stream);
    }

    #[test]
    fn test_invalid_handles() {
        let mut value = 0;
        unsafe {
            assert_eq!(OboeStream_getState(-1, &mut value), ERROR_INVALID_HANDLE);
            assert_eq!(OboeStream_getSampleRate(12345, &mut value), ERROR_INVALID_HANDLE);
        }
        assert_eq!(OboeStream_requestStop(0), ERROR_INVALID_HANDLE);

        // A builder handle is not a stream handle
        let mut builder = crate::OBOE_STREAM_BUILDER_NONE;
        unsafe { Oboe_createStreamBuilder(&mut builder) };
        assert_eq!(OboeStream_close(builder), ERROR_INVALID_HANDLE);
        OboeStreamBuilder_delete(builder);
    }
}
