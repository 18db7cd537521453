//! FFI panic guard and logger setup
//!
//! Every `extern "C" fn` in this crate runs its body through one of these
//! helpers so a panic never unwinds into C.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Once;

use oboe_core::error::to_result_code;
use oboe_core::thread::panic_message;
use oboe_core::{OboeError, OboeResult, ResultCode, ERROR_INTERNAL};

static LOGGER: Once = Once::new();

/// Install `env_logger` once per process (`RUST_LOG`, default `warn`)
pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .format_timestamp_millis()
            .try_init();
    });
}

/// Run an entry point that produces a result, mapping errors and panics to codes
pub fn guard<T: Into<i64>>(op: &'static str, f: impl FnOnce() -> OboeResult<T>) -> ResultCode {
    init_logging();
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => {
            if let Err(e) = &result {
                log::debug!("{} failed: {}", op, e);
            }
            to_result_code(result)
        }
        Err(payload) => {
            log::error!("panic in ffi `{}`: {}", op, panic_message(payload.as_ref()));
            ERROR_INTERNAL
        }
    }
}

/// Run an entry point that returns a plain value, using `default` on panic
pub fn guard_with_default<T>(op: &'static str, default: T, f: impl FnOnce() -> T) -> T {
    init_logging();
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            log::error!("panic in ffi `{}`: {}", op, panic_message(payload.as_ref()));
            default
        }
    }
}

/// Store `value` through an out-pointer, or fail with `OBOE_ERROR_NULL`
///
/// # Safety
/// `ptr` must be null or valid for a write of `T`.
pub unsafe fn write_out<T>(ptr: *mut T, value: T) -> OboeResult<()> {
    if ptr.is_null() {
        return Err(OboeError::Null);
    }
    // SAFETY: non-null and valid per the caller's contract
    unsafe { ptr.write(value) };
    Ok(())
}
