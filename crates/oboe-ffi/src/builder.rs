//! `Oboe_createStreamBuilder` and the `OboeStreamBuilder_*` functions

use std::sync::{Mutex, MutexGuard};

use oboe_core::{AudioFormat, Direction, OboeError, OboeResult, SharingMode, StreamBuilder};

use crate::guard::{guard, write_out};
use crate::handles::{HandleKind, HandleTable};
use crate::stream::STREAMS;
use crate::{
    oboe_audio_format_t, oboe_direction_t, oboe_result_t, oboe_sample_rate_t, oboe_sharing_mode_t,
    OboeDeviceId, OboeStream, OboeStreamBuilder,
};

static BUILDERS: HandleTable<Mutex<StreamBuilder>> = HandleTable::new(HandleKind::Builder);

fn lock(builder: &Mutex<StreamBuilder>) -> MutexGuard<'_, StreamBuilder> {
    builder.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run `f` on the builder behind `handle`
fn with_builder<T>(
    handle: OboeStreamBuilder,
    f: impl FnOnce(&mut StreamBuilder) -> OboeResult<T>,
) -> OboeResult<T> {
    let builder = BUILDERS.get(handle)?;
    let mut builder = lock(&builder);
    f(&mut builder)
}

fn unknown(what: &str, raw: i32) -> OboeError {
    OboeError::IllegalArgument(format!("unknown {} {}", what, raw))
}

/// Create a builder with every parameter unspecified
///
/// # Safety
/// `builder` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn Oboe_createStreamBuilder(
    builder: *mut OboeStreamBuilder,
) -> oboe_result_t {
    guard("Oboe_createStreamBuilder", || {
        if builder.is_null() {
            return Err(OboeError::Null);
        }
        let handle = BUILDERS.insert(Mutex::new(StreamBuilder::new()))?;
        unsafe { write_out(builder, handle) }?;
        Ok(0)
    })
}

/// Request a device; 0 selects the default device for the direction
#[no_mangle]
pub extern "C" fn OboeStreamBuilder_setDeviceId(
    builder: OboeStreamBuilder,
    deviceId: OboeDeviceId,
) -> oboe_result_t {
    guard("OboeStreamBuilder_setDeviceId", || {
        with_builder(builder, |b| b.set_device_id(deviceId)).map(|_| 0)
    })
}

#[no_mangle]
pub extern "C" fn OboeStreamBuilder_setSampleRate(
    builder: OboeStreamBuilder,
    sampleRate: oboe_sample_rate_t,
) -> oboe_result_t {
    guard("OboeStreamBuilder_setSampleRate", || {
        with_builder(builder, |b| b.set_sample_rate(sampleRate)).map(|_| 0)
    })
}

/// # Safety
/// `sampleRate` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStreamBuilder_getSampleRate(
    builder: OboeStreamBuilder,
    sampleRate: *mut oboe_sample_rate_t,
) -> oboe_result_t {
    guard("OboeStreamBuilder_getSampleRate", || {
        let value = with_builder(builder, |b| Ok(b.sample_rate()))?;
        unsafe { write_out(sampleRate, value) }.map(|_| 0)
    })
}

#[no_mangle]
pub extern "C" fn OboeStreamBuilder_setSamplesPerFrame(
    builder: OboeStreamBuilder,
    samplesPerFrame: i32,
) -> oboe_result_t {
    guard("OboeStreamBuilder_setSamplesPerFrame", || {
        with_builder(builder, |b| b.set_samples_per_frame(samplesPerFrame)).map(|_| 0)
    })
}

/// # Safety
/// `samplesPerFrame` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStreamBuilder_getSamplesPerFrame(
    builder: OboeStreamBuilder,
    samplesPerFrame: *mut i32,
) -> oboe_result_t {
    guard("OboeStreamBuilder_getSamplesPerFrame", || {
        let value = with_builder(builder, |b| Ok(b.samples_per_frame()))?;
        unsafe { write_out(samplesPerFrame, value) }.map(|_| 0)
    })
}

#[no_mangle]
pub extern "C" fn OboeStreamBuilder_setFormat(
    builder: OboeStreamBuilder,
    format: oboe_audio_format_t,
) -> oboe_result_t {
    guard("OboeStreamBuilder_setFormat", || {
        let format = AudioFormat::from_raw(format).ok_or_else(|| unknown("format", format))?;
        with_builder(builder, |b| b.set_format(format)).map(|_| 0)
    })
}

/// # Safety
/// `format` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStreamBuilder_getFormat(
    builder: OboeStreamBuilder,
    format: *mut oboe_audio_format_t,
) -> oboe_result_t {
    guard("OboeStreamBuilder_getFormat", || {
        let value = with_builder(builder, |b| Ok(b.format()))?;
        unsafe { write_out(format, value.as_raw()) }.map(|_| 0)
    })
}

#[no_mangle]
pub extern "C" fn OboeStreamBuilder_setSharingMode(
    builder: OboeStreamBuilder,
    sharingMode: oboe_sharing_mode_t,
) -> oboe_result_t {
    guard("OboeStreamBuilder_setSharingMode", || {
        let mode = SharingMode::from_raw(sharingMode)
            .ok_or_else(|| unknown("sharing mode", sharingMode))?;
        with_builder(builder, |b| b.set_sharing_mode(mode)).map(|_| 0)
    })
}

/// # Safety
/// `sharingMode` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStreamBuilder_getSharingMode(
    builder: OboeStreamBuilder,
    sharingMode: *mut oboe_sharing_mode_t,
) -> oboe_result_t {
    guard("OboeStreamBuilder_getSharingMode", || {
        let value = with_builder(builder, |b| Ok(b.sharing_mode()))?;
        unsafe { write_out(sharingMode, value.as_raw()) }.map(|_| 0)
    })
}

#[no_mangle]
pub extern "C" fn OboeStreamBuilder_setDirection(
    builder: OboeStreamBuilder,
    direction: oboe_direction_t,
) -> oboe_result_t {
    guard("OboeStreamBuilder_setDirection", || {
        let direction =
            Direction::from_raw(direction).ok_or_else(|| unknown("direction", direction))?;
        with_builder(builder, |b| b.set_direction(direction)).map(|_| 0)
    })
}

/// # Safety
/// `direction` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStreamBuilder_getDirection(
    builder: OboeStreamBuilder,
    direction: *mut oboe_direction_t,
) -> oboe_result_t {
    guard("OboeStreamBuilder_getDirection", || {
        let value = with_builder(builder, |b| Ok(b.direction()))?;
        unsafe { write_out(direction, value.as_raw()) }.map(|_| 0)
    })
}

/// Open a stream from the builder's current parameters
///
/// The builder is left untouched and may open further streams.
///
/// # Safety
/// `stream` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn OboeStreamBuilder_openStream(
    builder: OboeStreamBuilder,
    stream: *mut OboeStream,
) -> oboe_result_t {
    guard("OboeStreamBuilder_openStream", || {
        if stream.is_null() {
            return Err(OboeError::Null);
        }
        // Snapshot so a slow device open does not hold the builder lock
        let request = with_builder(builder, |b| Ok(b.clone()))?;
        let opened = request.open_stream()?;
        // On a full table the stream is dropped here, which closes it
        let handle = STREAMS.insert(opened)?;
        unsafe { write_out(stream, handle) }?;
        log::info!("Opened stream handle {}", handle);
        Ok(0)
    })
}

/// Release a builder; streams it opened stay open
#[no_mangle]
pub extern "C" fn OboeStreamBuilder_delete(builder: OboeStreamBuilder) -> oboe_result_t {
    guard("OboeStreamBuilder_delete", || BUILDERS.remove(builder).map(|_| 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::OboeStream_close;
    use crate::test_support::use_null_backend;
    use oboe_core::{
        ERROR_ILLEGAL_ARGUMENT, ERROR_INVALID_HANDLE, ERROR_NULL, ERROR_UNIMPLEMENTED, OK,
        UNSPECIFIED,
    };

    fn create() -> OboeStreamBuilder {
        let mut builder = crate::OBOE_STREAM_BUILDER_NONE;
        assert_eq!(unsafe { Oboe_createStreamBuilder(&mut builder) }, OK);
        assert!(builder >= 0);
        builder
    }

    #[test]
    fn test_defaults_through_getters() {
        let builder = create();
        let mut value = -1;
        unsafe {
            assert_eq!(OboeStreamBuilder_getSampleRate(builder, &mut value), OK);
            assert_eq!(value, UNSPECIFIED);
            assert_eq!(OboeStreamBuilder_getSamplesPerFrame(builder, &mut value), OK);
            assert_eq!(value, UNSPECIFIED);
            assert_eq!(OboeStreamBuilder_getFormat(builder, &mut value), OK);
            assert_eq!(value, AudioFormat::Unspecified.as_raw());
            assert_eq!(OboeStreamBuilder_getSharingMode(builder, &mut value), OK);
            assert_eq!(value, SharingMode::Legacy.as_raw());
            assert_eq!(OboeStreamBuilder_getDirection(builder, &mut value), OK);
            assert_eq!(value, Direction::Output.as_raw());
        }
        assert_eq!(OboeStreamBuilder_delete(builder), OK);
    }

    #[test]
    fn test_set_and_get() {
        let builder = create();
        assert_eq!(OboeStreamBuilder_setDeviceId(builder, 2), OK);
        assert_eq!(OboeStreamBuilder_setSampleRate(builder, 44_100), OK);
        assert_eq!(OboeStreamBuilder_setSamplesPerFrame(builder, 1), OK);
        assert_eq!(OboeStreamBuilder_setFormat(builder, AudioFormat::Pcm16.as_raw()), OK);
        assert_eq!(OboeStreamBuilder_setSharingMode(builder, SharingMode::Exclusive.as_raw()), OK);
        assert_eq!(OboeStreamBuilder_setDirection(builder, Direction::Input.as_raw()), OK);

        let mut value = 0;
        unsafe {
            OboeStreamBuilder_getSampleRate(builder, &mut value);
            assert_eq!(value, 44_100);
            OboeStreamBuilder_getSamplesPerFrame(builder, &mut value);
            assert_eq!(value, 1);
            OboeStreamBuilder_getFormat(builder, &mut value);
            assert_eq!(value, AudioFormat::Pcm16.as_raw());
            OboeStreamBuilder_getSharingMode(builder, &mut value);
            assert_eq!(value, SharingMode::Exclusive.as_raw());
            OboeStreamBuilder_getDirection(builder, &mut value);
            assert_eq!(value, Direction::Input.as_raw());
        }
        OboeStreamBuilder_delete(builder);
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let builder = create();
        assert_eq!(OboeStreamBuilder_setDeviceId(builder, -3), ERROR_ILLEGAL_ARGUMENT);
        assert_eq!(OboeStreamBuilder_setSampleRate(builder, -1), ERROR_ILLEGAL_ARGUMENT);
        assert_eq!(OboeStreamBuilder_setSamplesPerFrame(builder, 64), ERROR_ILLEGAL_ARGUMENT);
        assert_eq!(OboeStreamBuilder_setFormat(builder, 17), ERROR_ILLEGAL_ARGUMENT);
        let invalid = AudioFormat::Invalid.as_raw();
        assert_eq!(OboeStreamBuilder_setFormat(builder, invalid), ERROR_ILLEGAL_ARGUMENT);
        assert_eq!(OboeStreamBuilder_setSharingMode(builder, 5), ERROR_ILLEGAL_ARGUMENT);
        assert_eq!(OboeStreamBuilder_setDirection(builder, 2), ERROR_ILLEGAL_ARGUMENT);
        unsafe {
            assert_eq!(OboeStreamBuilder_getSampleRate(builder, std::ptr::null_mut()), ERROR_NULL);
            assert_eq!(Oboe_createStreamBuilder(std::ptr::null_mut()), ERROR_NULL);
        }
        OboeStreamBuilder_delete(builder);
    }

    #[test]
    fn test_deleted_handle_is_invalid() {
        let builder = create();
        assert_eq!(OboeStreamBuilder_delete(builder), OK);
        assert_eq!(OboeStreamBuilder_delete(builder), ERROR_INVALID_HANDLE);
        assert_eq!(OboeStreamBuilder_setSampleRate(builder, 48_000), ERROR_INVALID_HANDLE);
        let mut stream = crate::OBOE_STREAM_NONE;
        let code = unsafe { OboeStreamBuilder_openStream(builder, &mut stream) };
        assert_eq!(code, ERROR_INVALID_HANDLE);
        assert_eq!(stream, crate::OBOE_STREAM_NONE);
    }

    #[test]
    fn test_open_streams_outlive_builder() {
        use_null_backend();
        let builder = create();
        let mut first = crate::OBOE_STREAM_NONE;
        let mut second = crate::OBOE_STREAM_NONE;
        unsafe {
            assert_eq!(OboeStreamBuilder_openStream(builder, &mut first), OK);
            assert_eq!(OboeStreamBuilder_openStream(builder, &mut second), OK);
            assert_eq!(OboeStreamBuilder_openStream(builder, std::ptr::null_mut()), ERROR_NULL);
        }
        assert_ne!(first, second);
        assert_eq!(OboeStreamBuilder_delete(builder), OK);

        assert_eq!(OboeStream_close(first), OK);
        assert_eq!(OboeStream_close(second), OK);
    }

    #[test]
    fn test_open_unsupported_format() {
        use_null_backend();
        let builder = create();
        OboeStreamBuilder_setFormat(builder, AudioFormat::Pcm824.as_raw());
        let mut stream = crate::OBOE_STREAM_NONE;
        let code = unsafe { OboeStreamBuilder_openStream(builder, &mut stream) };
        assert_eq!(code, ERROR_UNIMPLEMENTED);
        assert_eq!(stream, crate::OBOE_STREAM_NONE);
        OboeStreamBuilder_delete(builder);
    }
}
