//! Stream and backend error types
//!
//! Every variant maps to exactly one negative result code so the C ABI can
//! report it without losing the category.

use thiserror::Error;

use crate::types::{self, ResultCode, StreamState};

/// Errors that can occur during stream operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OboeError {
    /// The device went away (unplugged, server shut down)
    #[error("Audio device disconnected")]
    Disconnected,

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Incompatible stream configuration: {0}")]
    Incompatible(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Operation not allowed in the current state
    #[error("Operation not allowed in state {0:?}")]
    InvalidState(StreamState),

    #[error("Unexpected state")]
    UnexpectedState,

    #[error("Unexpected value")]
    UnexpectedValue,

    /// Handle is stale, of the wrong kind, or was never issued
    #[error("Invalid handle")]
    InvalidHandle,

    #[error("Invalid query")]
    InvalidQuery,

    #[error("Not implemented: {0}")]
    Unimplemented(&'static str),

    /// Backend or device could not provide the requested stream
    #[error("Audio backend unavailable: {0}")]
    Unavailable(String),

    #[error("No free handles")]
    NoFreeHandles,

    #[error("Out of memory")]
    NoMemory,

    /// A required pointer argument was null
    #[error("Null argument")]
    Null,

    #[error("Timed out")]
    Timeout,

    #[error("Operation would block")]
    WouldBlock,

    #[error("Invalid call order")]
    InvalidOrder,

    #[error("Value out of range")]
    OutOfRange,

    /// No audio service (server or host) could be reached
    #[error("No audio service: {0}")]
    NoService(String),
}

impl OboeError {
    /// The negative result code for this error
    pub fn code(&self) -> ResultCode {
        match self {
            OboeError::Disconnected => types::ERROR_DISCONNECTED,
            OboeError::IllegalArgument(_) => types::ERROR_ILLEGAL_ARGUMENT,
            OboeError::Incompatible(_) => types::ERROR_INCOMPATIBLE,
            OboeError::Internal(_) => types::ERROR_INTERNAL,
            OboeError::InvalidState(_) => types::ERROR_INVALID_STATE,
            OboeError::UnexpectedState => types::ERROR_UNEXPECTED_STATE,
            OboeError::UnexpectedValue => types::ERROR_UNEXPECTED_VALUE,
            OboeError::InvalidHandle => types::ERROR_INVALID_HANDLE,
            OboeError::InvalidQuery => types::ERROR_INVALID_QUERY,
            OboeError::Unimplemented(_) => types::ERROR_UNIMPLEMENTED,
            OboeError::Unavailable(_) => types::ERROR_UNAVAILABLE,
            OboeError::NoFreeHandles => types::ERROR_NO_FREE_HANDLES,
            OboeError::NoMemory => types::ERROR_NO_MEMORY,
            OboeError::Null => types::ERROR_NULL,
            OboeError::Timeout => types::ERROR_TIMEOUT,
            OboeError::WouldBlock => types::ERROR_WOULD_BLOCK,
            OboeError::InvalidOrder => types::ERROR_INVALID_ORDER,
            OboeError::OutOfRange => types::ERROR_OUT_OF_RANGE,
            OboeError::NoService(_) => types::ERROR_NO_SERVICE,
        }
    }

    /// Rebuild an error from a result code (context strings are lost)
    pub fn from_code(code: ResultCode) -> Option<Self> {
        let err = match code {
            types::ERROR_DISCONNECTED => OboeError::Disconnected,
            types::ERROR_ILLEGAL_ARGUMENT => OboeError::IllegalArgument(String::new()),
            types::ERROR_INCOMPATIBLE => OboeError::Incompatible(String::new()),
            types::ERROR_INTERNAL => OboeError::Internal(String::new()),
            types::ERROR_INVALID_STATE => OboeError::InvalidState(StreamState::Unknown),
            types::ERROR_UNEXPECTED_STATE => OboeError::UnexpectedState,
            types::ERROR_UNEXPECTED_VALUE => OboeError::UnexpectedValue,
            types::ERROR_INVALID_HANDLE => OboeError::InvalidHandle,
            types::ERROR_INVALID_QUERY => OboeError::InvalidQuery,
            types::ERROR_UNIMPLEMENTED => OboeError::Unimplemented(""),
            types::ERROR_UNAVAILABLE => OboeError::Unavailable(String::new()),
            types::ERROR_NO_FREE_HANDLES => OboeError::NoFreeHandles,
            types::ERROR_NO_MEMORY => OboeError::NoMemory,
            types::ERROR_NULL => OboeError::Null,
            types::ERROR_TIMEOUT => OboeError::Timeout,
            types::ERROR_WOULD_BLOCK => OboeError::WouldBlock,
            types::ERROR_INVALID_ORDER => OboeError::InvalidOrder,
            types::ERROR_OUT_OF_RANGE => OboeError::OutOfRange,
            types::ERROR_NO_SERVICE => OboeError::NoService(String::new()),
            _ => return None,
        };
        Some(err)
    }

    pub(crate) fn illegal(msg: impl Into<String>) -> Self {
        OboeError::IllegalArgument(msg.into())
    }
}

/// Result type for stream operations
pub type OboeResult<T> = Result<T, OboeError>;

/// Collapse a result carrying a non-negative count into a result code
pub fn to_result_code<T: Into<i64>>(result: OboeResult<T>) -> ResultCode {
    match result {
        Ok(value) => value.into().clamp(0, i32::MAX as i64) as ResultCode,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative_and_reversible() {
        for code in types::ERROR_DISCONNECTED..=types::ERROR_NO_SERVICE {
            let err = OboeError::from_code(code).expect("every code in range is known");
            assert!(err.code() < 0);
            assert_eq!(err.code(), code);
        }
        assert_eq!(OboeError::from_code(types::OK), None);
        assert_eq!(OboeError::from_code(types::ERROR_BASE), None);
    }

    #[test]
    fn test_to_result_code() {
        assert_eq!(to_result_code::<i32>(Ok(480)), 480);
        assert_eq!(to_result_code::<i32>(Err(OboeError::Timeout)), types::ERROR_TIMEOUT);
        assert_eq!(
            to_result_code::<i32>(Err(OboeError::InvalidState(StreamState::Open))),
            types::ERROR_INVALID_STATE
        );
    }
}
