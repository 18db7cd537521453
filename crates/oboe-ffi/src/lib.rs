//! C ABI for Oboe streams
//!
//! Builders, streams and audio threads are exposed as integer handles.
//! Every function returns `oboe_result_t`: negative values are errors,
//! zero or positive values are success (some calls return a count or a
//! state). Null out-pointers fail with `OBOE_ERROR_NULL`, and a panic
//! inside any entry point is reported as `OBOE_ERROR_INTERNAL`.
//!
//! Logging goes through `env_logger` (`RUST_LOG`, default `warn`), which
//! is installed on the first call into the library.

#![allow(non_camel_case_types, non_snake_case)]

use std::ffi::c_char;

use oboe_core::clock::get_nanoseconds;
use oboe_core::text::{convert_result_to_text, convert_state_to_text};
use oboe_core::{ClockId, ERROR_ILLEGAL_ARGUMENT};

mod builder;
mod guard;
mod handles;
mod stream;
mod thread;

pub use builder::*;
pub use stream::*;
pub use thread::*;

pub type oboe_result_t = i32;
pub type oboe_handle_t = i32;
pub type oboe_state_t = i32;
pub type oboe_audio_format_t = i32;
pub type oboe_sharing_mode_t = i32;
pub type oboe_direction_t = i32;
pub type oboe_clockid_t = i32;
pub type oboe_sample_rate_t = i32;
pub type oboe_size_frames_t = i32;
pub type oboe_position_frames_t = i64;
pub type oboe_nanoseconds_t = i64;

pub type OboeDeviceId = i32;
pub type OboeStream = oboe_handle_t;
pub type OboeStreamBuilder = oboe_handle_t;
pub type OboeThread = oboe_handle_t;

pub const OBOE_HANDLE_INVALID: oboe_handle_t = oboe_core::HANDLE_INVALID;
pub const OBOE_STREAM_NONE: OboeStream = OBOE_HANDLE_INVALID;
pub const OBOE_STREAM_BUILDER_NONE: OboeStreamBuilder = OBOE_HANDLE_INVALID;

/// Current time on `clockid` in nanoseconds, or a negative error code
#[no_mangle]
pub extern "C" fn Oboe_getNanoseconds(clockid: oboe_clockid_t) -> oboe_nanoseconds_t {
    guard::guard_with_default("Oboe_getNanoseconds", oboe_core::ERROR_INTERNAL as i64, || {
        match ClockId::from_raw(clockid) {
            Some(clock) => get_nanoseconds(clock),
            None => ERROR_ILLEGAL_ARGUMENT as i64,
        }
    })
}

/// Static ASCII name of a result code, for logs only
#[no_mangle]
pub extern "C" fn Oboe_convertResultToText(returnCode: oboe_result_t) -> *const c_char {
    convert_result_to_text(returnCode).as_ptr()
}

/// Static ASCII name of a stream state, for logs only
#[no_mangle]
pub extern "C" fn Oboe_convertStateToText(state: oboe_state_t) -> *const c_char {
    convert_state_to_text(state).as_ptr()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Once;

    static NULL_BACKEND: Once = Once::new();

    /// Route every stream in this test process to the Null backend
    ///
    /// Must run before anything reads the process-wide configuration.
    pub fn use_null_backend() {
        NULL_BACKEND.call_once(|| std::env::set_var("OBOE_BACKEND", "null"));
        assert_eq!(oboe_core::config::global_config().backend, oboe_core::BackendKind::Null);
    }
}
