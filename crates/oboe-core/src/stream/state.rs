//! Stream state cell and transition rules
//!
//! Requests from the application move the stream into a transitional state;
//! the audio callback completes the transition. Every change happens under
//! one mutex and wakes all waiters. The callback reads the current state
//! through an atomic mirror so the steady-state path never locks.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::clock::Deadline;
use crate::error::{OboeError, OboeResult};
use crate::types::{Direction, StreamState};

/// Control requests an application can make
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRequest {
    Start,
    Pause,
    Flush,
    Stop,
}

/// Outcome of validating a request against the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Move to this transitional state
    Transition(StreamState),
    /// Already there or on the way; nothing to do
    NoChange,
}

/// Validate a control request against the current state
pub fn validate_request(
    current: StreamState,
    request: StateRequest,
    direction: Direction,
) -> OboeResult<RequestOutcome> {
    use StreamState::*;

    if current == Disconnected {
        return Err(OboeError::Disconnected);
    }

    let outcome = match request {
        StateRequest::Start => match current {
            Open | Pausing | Paused | Flushed | Stopped => RequestOutcome::Transition(Starting),
            Starting | Started => RequestOutcome::NoChange,
            _ => return Err(OboeError::InvalidState(current)),
        },
        StateRequest::Pause => match current {
            Starting | Started => RequestOutcome::Transition(Pausing),
            Pausing | Paused => RequestOutcome::NoChange,
            _ => return Err(OboeError::InvalidState(current)),
        },
        StateRequest::Flush => {
            if direction == Direction::Input {
                return Err(OboeError::Unimplemented("flush is only defined for output streams"));
            }
            match current {
                Pausing | Paused => RequestOutcome::Transition(Flushing),
                Flushing | Flushed => RequestOutcome::NoChange,
                _ => return Err(OboeError::InvalidState(current)),
            }
        }
        StateRequest::Stop => match current {
            Starting | Started | Pausing | Paused | Flushing | Flushed => {
                RequestOutcome::Transition(Stopping)
            }
            Stopping | Stopped => RequestOutcome::NoChange,
            _ => return Err(OboeError::InvalidState(current)),
        },
    };
    Ok(outcome)
}

/// Shared state with wake-ups for waiters
pub struct StateCell {
    /// Lock-free mirror for the audio callback
    current: AtomicI32,
    /// Serializes changes so waiters never miss a wake-up
    lock: Mutex<()>,
    changed: Condvar,
}

impl StateCell {
    pub fn new(initial: StreamState) -> Self {
        Self {
            current: AtomicI32::new(initial.as_raw()),
            lock: Mutex::new(()),
            changed: Condvar::new(),
        }
    }

    /// Current state (lock-free)
    #[inline]
    pub fn load(&self) -> StreamState {
        StreamState::from_raw(self.current.load(Ordering::Acquire)).unwrap_or(StreamState::Unknown)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is (), a poisoned lock carries no broken invariant
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn store_and_notify(&self, next: StreamState) {
        self.current.store(next.as_raw(), Ordering::Release);
        self.changed.notify_all();
    }

    /// Apply an application request, returning the state after it
    pub fn request(&self, request: StateRequest, direction: Direction) -> OboeResult<StreamState> {
        let _guard = self.guard();
        let current = self.load();
        match validate_request(current, request, direction)? {
            RequestOutcome::Transition(next) => {
                log::debug!("{:?} stream: {} -> {} ({:?})", direction, current, next, request);
                self.store_and_notify(next);
                Ok(next)
            }
            RequestOutcome::NoChange => Ok(current),
        }
    }

    /// Move from `from` to `to` if the state is still `from`
    ///
    /// Used by the audio callback to complete transitions. Returns false when
    /// the application changed the state in between.
    pub fn complete(&self, from: StreamState, to: StreamState) -> bool {
        let _guard = self.guard();
        if self.load() != from {
            return false;
        }
        self.store_and_notify(to);
        true
    }

    /// Set a state unconditionally (close, disconnect)
    pub fn force(&self, to: StreamState) -> StreamState {
        let _guard = self.guard();
        let previous = self.load();
        self.store_and_notify(to);
        previous
    }

    /// Mark the stream disconnected unless it is already closing or closed
    pub fn disconnect(&self) -> bool {
        let _guard = self.guard();
        match self.load() {
            StreamState::Closing | StreamState::Closed | StreamState::Disconnected => false,
            _ => {
                self.store_and_notify(StreamState::Disconnected);
                true
            }
        }
    }

    /// Wait until the state differs from `input` or the timeout elapses
    ///
    /// A zero timeout checks once without waiting.
    pub fn wait_for_change(
        &self,
        input: StreamState,
        timeout_nanos: i64,
    ) -> OboeResult<StreamState> {
        if timeout_nanos < 0 {
            return Err(OboeError::illegal("negative timeout"));
        }
        let deadline = Deadline::after_nanos(timeout_nanos);
        let mut guard = self.guard();
        loop {
            let current = self.load();
            if current != input {
                return Ok(current);
            }
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return Err(OboeError::Timeout);
            }
            guard = match self.changed.wait_timeout(guard, remaining) {
                Ok((g, _)) => g,
                Err(e) => e.into_inner().0,
            };
        }
    }
}
