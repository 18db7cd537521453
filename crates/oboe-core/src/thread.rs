//! Real-time audio threads
//!
//! Threads are named, ask for SCHED_FIFO on Linux, and report their result
//! over a one-shot channel so a join can time out without losing it.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};

use crate::config::global_config;
use crate::error::{OboeError, OboeResult};

/// Spawn a named thread that asks for real-time priority before running `f`
pub fn spawn_realtime<F, T>(name: &str, priority: i32, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let thread_name = name.to_string();
    thread::Builder::new().name(thread_name.clone()).spawn(move || {
        match promote_current_thread(priority) {
            Ok(()) => {
                log::debug!("[RT] {} running with SCHED_FIFO priority {}", thread_name, priority)
            }
            Err(e) => log::warn!("[RT] {} could not get real-time priority: {}", thread_name, e),
        }
        f()
    })
}

/// Ask the scheduler to run the calling thread as SCHED_FIFO
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn promote_current_thread(priority: i32) -> io::Result<()> {
    // SAFETY: sched_param is plain data; zeroed is a valid value
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = priority;
    // SAFETY: param outlives the call and pthread_self() is the calling thread
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(rc))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn promote_current_thread(_priority: i32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SCHED_FIFO is only requested on Linux",
    ))
}

/// A spawned audio thread whose result can be collected with [`AudioThread::join`]
pub struct AudioThread<T> {
    handle: Option<JoinHandle<()>>,
    done: Receiver<thread::Result<T>>,
}

/// Spawn `oboe-audio` running `entry`
///
/// `period_nanos` is the expected wake-up period of the work loop.
pub fn create_audio_thread<F, T>(period_nanos: i64, entry: F) -> OboeResult<AudioThread<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    if period_nanos <= 0 {
        return Err(OboeError::illegal("audio thread period must be positive"));
    }

    let (tx, done) = bounded(1);
    let priority = global_config().realtime_priority;
    let handle = spawn_realtime("oboe-audio", priority, move || {
        let result = panic::catch_unwind(AssertUnwindSafe(entry));
        // The receiver is gone only if the AudioThread was dropped unjoined
        let _ = tx.send(result);
    })
    .map_err(|e| OboeError::Unavailable(format!("failed to spawn audio thread: {}", e)))?;

    log::debug!("Spawned audio thread, period {} ns", period_nanos);
    Ok(AudioThread {
        handle: Some(handle),
        done,
    })
}

impl<T> AudioThread<T> {
    /// Whether the entry point has returned
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the thread and return what its entry point returned
    ///
    /// `timeout_nanos <= 0` waits indefinitely. On `Timeout` the thread is
    /// still joinable.
    pub fn join(&mut self, timeout_nanos: i64) -> OboeResult<T> {
        if self.handle.is_none() {
            return Err(OboeError::InvalidOrder);
        }

        let outcome = if timeout_nanos <= 0 {
            self.done.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            self.done.recv_timeout(Duration::from_nanos(timeout_nanos as u64))
        };

        let result = match outcome {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => return Err(OboeError::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                self.handle.take();
                return Err(OboeError::Internal("audio thread exited without a result".to_string()));
            }
        };

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        result.map_err(|payload| {
            let message = panic_message(payload.as_ref());
            log::error!("Audio thread panicked: {}", message);
            OboeError::Internal(format!("audio thread panicked: {}", message))
        })
    }
}

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
