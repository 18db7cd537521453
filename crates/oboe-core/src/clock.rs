//! Clock access and timeout deadlines
//!
//! Timeouts are relative durations in wall-clock time that keep running
//! while the system sleeps, so deadlines are measured on the boot-time clock.

use std::time::Duration;

use crate::types::{ClockId, NANOS_PER_SECOND};

/// Current time in nanoseconds in the given clock domain
pub fn get_nanoseconds(clock: ClockId) -> i64 {
    imp::now(clock)
}

#[cfg(unix)]
mod imp {
    use super::*;

    fn clock_raw(clock: ClockId) -> libc::clockid_t {
        match clock {
            ClockId::Monotonic => libc::CLOCK_MONOTONIC,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            ClockId::Boottime => libc::CLOCK_BOOTTIME,
            // No boot-time clock here; monotonic is the closest domain
            #[cfg(not(any(target_os = "linux", target_os = "android")))]
            ClockId::Boottime => libc::CLOCK_MONOTONIC,
        }
    }

    pub(super) fn now(clock: ClockId) -> i64 {
        // SAFETY: timespec is plain data; zeroed is a valid value
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        // SAFETY: `ts` is a valid, writable timespec for the duration of the call
        let rc = unsafe { libc::clock_gettime(clock_raw(clock), &mut ts) };
        if rc != 0 {
            log::warn!("clock_gettime({:?}) failed", clock);
            return 0;
        }
        ts.tv_sec as i64 * NANOS_PER_SECOND + ts.tv_nsec as i64
    }
}

#[cfg(not(unix))]
mod imp {
    use super::*;
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();

    pub(super) fn now(_clock: ClockId) -> i64 {
        let epoch = *EPOCH.get_or_init(Instant::now);
        // Offset by one second so a valid time is never zero
        epoch.elapsed().as_nanos() as i64 + NANOS_PER_SECOND
    }
}

/// Convert a time taken on the monotonic clock into another domain
pub fn monotonic_to(clock: ClockId, monotonic_nanos: i64) -> i64 {
    match clock {
        ClockId::Monotonic => monotonic_nanos,
        ClockId::Boottime => {
            let offset = get_nanoseconds(ClockId::Boottime) - get_nanoseconds(ClockId::Monotonic);
            monotonic_nanos + offset
        }
    }
}

/// A point in time on the boot-time clock after which an operation gives up
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at_nanos: i64,
}

impl Deadline {
    /// Deadline `timeout_nanos` from now (negative values are treated as zero)
    pub fn after_nanos(timeout_nanos: i64) -> Self {
        let now = get_nanoseconds(ClockId::Boottime);
        Self {
            at_nanos: now.saturating_add(timeout_nanos.max(0)),
        }
    }

    /// Time left before the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        let left = self.at_nanos - get_nanoseconds(ClockId::Boottime);
        if left <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(left as u64)
        }
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// Duration of `frames` at `sample_rate`
pub fn frames_to_duration(frames: i64, sample_rate: i32) -> Duration {
    if frames <= 0 || sample_rate <= 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((frames * NANOS_PER_SECOND / sample_rate as i64) as u64)
}
