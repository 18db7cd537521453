//! Debug text for result codes and states
//!
//! Strings are the ASCII symbol names from the C header. They are meant for
//! logs and debugging, not for display to users.

use std::ffi::CStr;

use crate::types::{self, ResultCode, StreamState};

/// Text for a result code, or a fixed message for unknown codes
pub fn convert_result_to_text(code: ResultCode) -> &'static CStr {
    match code {
        types::OK => c"OBOE_OK",
        types::ERROR_DISCONNECTED => c"OBOE_ERROR_DISCONNECTED",
        types::ERROR_ILLEGAL_ARGUMENT => c"OBOE_ERROR_ILLEGAL_ARGUMENT",
        types::ERROR_INCOMPATIBLE => c"OBOE_ERROR_INCOMPATIBLE",
        types::ERROR_INTERNAL => c"OBOE_ERROR_INTERNAL",
        types::ERROR_INVALID_STATE => c"OBOE_ERROR_INVALID_STATE",
        types::ERROR_UNEXPECTED_STATE => c"OBOE_ERROR_UNEXPECTED_STATE",
        types::ERROR_UNEXPECTED_VALUE => c"OBOE_ERROR_UNEXPECTED_VALUE",
        types::ERROR_INVALID_HANDLE => c"OBOE_ERROR_INVALID_HANDLE",
        types::ERROR_INVALID_QUERY => c"OBOE_ERROR_INVALID_QUERY",
        types::ERROR_UNIMPLEMENTED => c"OBOE_ERROR_UNIMPLEMENTED",
        types::ERROR_UNAVAILABLE => c"OBOE_ERROR_UNAVAILABLE",
        types::ERROR_NO_FREE_HANDLES => c"OBOE_ERROR_NO_FREE_HANDLES",
        types::ERROR_NO_MEMORY => c"OBOE_ERROR_NO_MEMORY",
        types::ERROR_NULL => c"OBOE_ERROR_NULL",
        types::ERROR_TIMEOUT => c"OBOE_ERROR_TIMEOUT",
        types::ERROR_WOULD_BLOCK => c"OBOE_ERROR_WOULD_BLOCK",
        types::ERROR_INVALID_ORDER => c"OBOE_ERROR_INVALID_ORDER",
        types::ERROR_OUT_OF_RANGE => c"OBOE_ERROR_OUT_OF_RANGE",
        types::ERROR_NO_SERVICE => c"OBOE_ERROR_NO_SERVICE",
        _ => c"Unrecognized Oboe error.",
    }
}

/// Text for a raw state value, or a fixed message for unknown states
pub fn convert_state_to_text(state: i32) -> &'static CStr {
    match StreamState::from_raw(state) {
        Some(state) => state_text(state),
        None => c"Unrecognized Oboe state.",
    }
}

fn state_text(state: StreamState) -> &'static CStr {
    match state {
        StreamState::Uninitialized => c"OBOE_STATE_UNINITIALIZED",
        StreamState::Unknown => c"OBOE_STATE_UNKNOWN",
        StreamState::Open => c"OBOE_STATE_OPEN",
        StreamState::Starting => c"OBOE_STATE_STARTING",
        StreamState::Started => c"OBOE_STATE_STARTED",
        StreamState::Pausing => c"OBOE_STATE_PAUSING",
        StreamState::Paused => c"OBOE_STATE_PAUSED",
        StreamState::Flushing => c"OBOE_STATE_FLUSHING",
        StreamState::Flushed => c"OBOE_STATE_FLUSHED",
        StreamState::Stopping => c"OBOE_STATE_STOPPING",
        StreamState::Stopped => c"OBOE_STATE_STOPPED",
        StreamState::Closing => c"OBOE_STATE_CLOSING",
        StreamState::Closed => c"OBOE_STATE_CLOSED",
        StreamState::Disconnected => c"OBOE_STATE_DISCONNECTED",
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Every state name is plain ASCII
        write!(f, "{}", state_text(*self).to_str().unwrap_or("OBOE_STATE_UNKNOWN"))
    }
}
