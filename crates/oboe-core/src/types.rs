//! Shared definitions for streams, builders and the C ABI
//!
//! Raw integer values match the C header so the FFI layer can convert
//! without lookup tables. NO backend-specific imports allowed here.

use serde::{Deserialize, Serialize};

/// Signed result code. Zero or positive is success, negative is an error.
pub type ResultCode = i32;

/// Handle value used by the C ABI for builders, streams and threads
pub type Handle = i32;

/// Platform device identifier (0 = default device for the direction)
pub type DeviceId = i32;

/// Invalid handle marker
pub const HANDLE_INVALID: Handle = -1;

/// "Let the implementation choose" for rates, channel counts and device ids
pub const UNSPECIFIED: i32 = 0;

pub const NANOS_PER_MICROSECOND: i64 = 1_000;
pub const NANOS_PER_MILLISECOND: i64 = NANOS_PER_MICROSECOND * 1_000;
pub const NANOS_PER_SECOND: i64 = NANOS_PER_MILLISECOND * 1_000;

/// Channel count limits for a stream
pub const MIN_SAMPLES_PER_FRAME: i32 = 1;
pub const MAX_SAMPLES_PER_FRAME: i32 = 8;

/// Sample rate limits when a rate is requested explicitly
pub const MIN_SAMPLE_RATE: i32 = 8_000;
pub const MAX_SAMPLE_RATE: i32 = 768_000;

// Result codes ---------------------------------------------------------------

pub const OK: ResultCode = 0;
pub const ERROR_BASE: ResultCode = -900;
pub const ERROR_DISCONNECTED: ResultCode = ERROR_BASE + 1;
pub const ERROR_ILLEGAL_ARGUMENT: ResultCode = ERROR_BASE + 2;
pub const ERROR_INCOMPATIBLE: ResultCode = ERROR_BASE + 3;
pub const ERROR_INTERNAL: ResultCode = ERROR_BASE + 4;
pub const ERROR_INVALID_STATE: ResultCode = ERROR_BASE + 5;
pub const ERROR_UNEXPECTED_STATE: ResultCode = ERROR_BASE + 6;
pub const ERROR_UNEXPECTED_VALUE: ResultCode = ERROR_BASE + 7;
pub const ERROR_INVALID_HANDLE: ResultCode = ERROR_BASE + 8;
pub const ERROR_INVALID_QUERY: ResultCode = ERROR_BASE + 9;
pub const ERROR_UNIMPLEMENTED: ResultCode = ERROR_BASE + 10;
pub const ERROR_UNAVAILABLE: ResultCode = ERROR_BASE + 11;
pub const ERROR_NO_FREE_HANDLES: ResultCode = ERROR_BASE + 12;
pub const ERROR_NO_MEMORY: ResultCode = ERROR_BASE + 13;
pub const ERROR_NULL: ResultCode = ERROR_BASE + 14;
pub const ERROR_TIMEOUT: ResultCode = ERROR_BASE + 15;
pub const ERROR_WOULD_BLOCK: ResultCode = ERROR_BASE + 16;
pub const ERROR_INVALID_ORDER: ResultCode = ERROR_BASE + 17;
pub const ERROR_OUT_OF_RANGE: ResultCode = ERROR_BASE + 18;
pub const ERROR_NO_SERVICE: ResultCode = ERROR_BASE + 19;

/// Stream lifecycle state
///
/// Transitional states (`Starting`, `Pausing`, `Flushing`, `Stopping`,
/// `Closing`) are entered by a request and left by the audio callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StreamState {
    Uninitialized = 0,
    Unknown = 1,
    Open = 2,
    Starting = 3,
    Started = 4,
    Pausing = 5,
    Paused = 6,
    Flushing = 7,
    Flushed = 8,
    Stopping = 9,
    Stopped = 10,
    Closing = 11,
    Closed = 12,
    Disconnected = 13,
}

impl StreamState {
    pub const ALL: [StreamState; 14] = [
        StreamState::Uninitialized,
        StreamState::Unknown,
        StreamState::Open,
        StreamState::Starting,
        StreamState::Started,
        StreamState::Pausing,
        StreamState::Paused,
        StreamState::Flushing,
        StreamState::Flushed,
        StreamState::Stopping,
        StreamState::Stopped,
        StreamState::Closing,
        StreamState::Closed,
        StreamState::Disconnected,
    ];

    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| *s as i32 == raw)
    }

    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Resting states in which the device may be paused
    pub fn is_quiescent(self) -> bool {
        matches!(
            self,
            StreamState::Paused | StreamState::Flushed | StreamState::Stopped
        )
    }
}

/// Sample data format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum AudioFormat {
    Invalid = -1,
    #[default]
    Unspecified = 0,
    Pcm16 = 1,
    PcmFloat = 2,
    /// 8.24 fixed point, recognized but not transferable
    Pcm824 = 3,
    /// 32-bit integer, recognized but not transferable
    Pcm32 = 4,
}

impl AudioFormat {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(Self::Invalid),
            0 => Some(Self::Unspecified),
            1 => Some(Self::Pcm16),
            2 => Some(Self::PcmFloat),
            3 => Some(Self::Pcm824),
            4 => Some(Self::Pcm32),
            _ => None,
        }
    }

    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Device sharing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum SharingMode {
    /// Exclusive access to the device, lowest latency when granted
    Exclusive = 0,
    /// Shared access through the platform mixer
    #[default]
    Legacy = 1,
}

impl SharingMode {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Exclusive),
            1 => Some(Self::Legacy),
            _ => None,
        }
    }

    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum Direction {
    #[default]
    Output = 0,
    Input = 1,
}

impl Direction {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Output),
            1 => Some(Self::Input),
            _ => None,
        }
    }

    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Output => write!(f, "output"),
            Direction::Input => write!(f, "input"),
        }
    }
}

/// Clock domain for timestamps and `get_nanoseconds`
///
/// Raw values are the Linux clock ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ClockId {
    Monotonic = 1,
    /// Like `Monotonic` but keeps counting while the system is suspended
    Boottime = 7,
}

impl ClockId {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Monotonic),
            7 => Some(Self::Boottime),
            _ => None,
        }
    }

    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Sample types that can cross the read/write boundary
///
/// The transfer FIFO always carries `f32`; integer formats are scaled on
/// the way in and out.
pub trait Sample: Copy + Send + 'static {
    const FORMAT: AudioFormat;
    const SILENCE: Self;

    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;
}

impl Sample for f32 {
    const FORMAT: AudioFormat = AudioFormat::PcmFloat;
    const SILENCE: Self = 0.0;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }
}

impl Sample for i16 {
    const FORMAT: AudioFormat = AudioFormat::Pcm16;
    const SILENCE: Self = 0;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / 32768.0
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16
    }
}
