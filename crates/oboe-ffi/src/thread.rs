//! `Oboe_createAudioThread` and `Oboe_joinAudioThread`

use std::ffi::c_void;
use std::sync::{Mutex, MutexGuard, TryLockError};

use oboe_core::thread::{create_audio_thread, AudioThread};
use oboe_core::{OboeError, OboeResult};

use crate::guard::{guard, write_out};
use crate::handles::{HandleKind, HandleTable};
use crate::{oboe_nanoseconds_t, oboe_result_t, OboeThread};

/// Entry point signature of `pthread_create`
pub type StartRoutine = unsafe extern "C" fn(*mut c_void) -> *mut c_void;

static THREADS: HandleTable<Mutex<AudioThread<usize>>> = HandleTable::new(HandleKind::Thread);

/// Caller-owned pointer handed to the audio thread
struct SendPtr(*mut c_void);

// SAFETY: the pointer is only passed back to the caller's routine, which
// owns whatever it points to
unsafe impl Send for SendPtr {}

impl SendPtr {
    fn into_inner(self) -> *mut c_void {
        self.0
    }
}

fn try_lock(thread: &Mutex<AudioThread<usize>>) -> Option<MutexGuard<'_, AudioThread<usize>>> {
    match thread.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

/// Run `start_routine(arg)` on a new real-time thread
///
/// `periodNanoseconds` is how often the routine expects to wake up.
///
/// # Safety
/// `threadHandlePtr` must be null or valid for a write. `start_routine`
/// must be safe to call with `arg` on another thread.
#[no_mangle]
pub unsafe extern "C" fn Oboe_createAudioThread(
    threadHandlePtr: *mut OboeThread,
    periodNanoseconds: oboe_nanoseconds_t,
    start_routine: Option<StartRoutine>,
    arg: *mut c_void,
) -> oboe_result_t {
    guard("Oboe_createAudioThread", || {
        if threadHandlePtr.is_null() {
            return Err(OboeError::Null);
        }
        let routine = start_routine.ok_or(OboeError::Null)?;
        let arg = SendPtr(arg);
        let thread = create_audio_thread(periodNanoseconds, move || {
            let arg = arg.into_inner();
            // SAFETY: per the caller's contract for start_routine and arg
            unsafe { routine(arg) as usize }
        })?;
        let handle = THREADS.insert(Mutex::new(thread))?;
        unsafe { write_out(threadHandlePtr, handle) }?;
        Ok(0)
    })
}

/// Wait for an audio thread to return
///
/// A positive `timeoutNanoseconds` bounds the wait; on
/// `OBOE_ERROR_TIMEOUT` the handle stays valid. Zero or negative waits
/// indefinitely. While another join waits on the same handle this returns
/// `OBOE_ERROR_INVALID_ORDER` without waiting. The routine's return value
/// is stored in `returnArg` when it is not null.
///
/// # Safety
/// `returnArg` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn Oboe_joinAudioThread(
    thread: OboeThread,
    returnArg: *mut *mut c_void,
    timeoutNanoseconds: oboe_nanoseconds_t,
) -> oboe_result_t {
    guard("Oboe_joinAudioThread", || {
        let value = join(thread, timeoutNanoseconds)?;
        if !returnArg.is_null() {
            unsafe { write_out(returnArg, value as *mut c_void) }?;
        }
        Ok(0)
    })
}

fn join(handle: OboeThread, timeout_nanos: i64) -> OboeResult<usize> {
    let thread = THREADS.get(handle)?;
    // Another join is already waiting; never queue behind its timeout
    let Some(mut audio_thread) = try_lock(&thread) else {
        return Err(OboeError::InvalidOrder);
    };
    let result = audio_thread.join(timeout_nanos);
    drop(audio_thread);
    match result {
        Err(OboeError::Timeout) => Err(OboeError::Timeout),
        // Joined, or failed in a way that cannot be retried
        other => {
            let _ = THREADS.remove(handle);
            other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::use_null_backend;
    use oboe_core::{
        ERROR_ILLEGAL_ARGUMENT, ERROR_INVALID_HANDLE, ERROR_INVALID_ORDER, ERROR_NULL,
        ERROR_TIMEOUT, NANOS_PER_MILLISECOND, OK,
    };
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    unsafe extern "C" fn add_one(arg: *mut c_void) -> *mut c_void {
        let counter = unsafe { &*(arg as *const AtomicU32) };
        counter.fetch_add(1, Ordering::SeqCst);
        arg
    }

    unsafe extern "C" fn wait_for_flag(arg: *mut c_void) -> *mut c_void {
        let flag = unsafe { &*(arg as *const AtomicBool) };
        while !flag.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(1));
        }
        std::ptr::null_mut()
    }

    fn spawn_waiting(flag: &AtomicBool) -> OboeThread {
        let arg = flag as *const AtomicBool as *mut c_void;
        let mut thread = crate::OBOE_HANDLE_INVALID;
        let code = unsafe {
            Oboe_createAudioThread(&mut thread, NANOS_PER_MILLISECOND, Some(wait_for_flag), arg)
        };
        assert_eq!(code, OK);
        thread
    }

    #[test]
    fn test_create_and_join() {
        use_null_backend();
        let counter = Box::new(AtomicU32::new(0));
        let arg = &*counter as *const AtomicU32 as *mut c_void;

        let mut thread = crate::OBOE_HANDLE_INVALID;
        let period = 10 * NANOS_PER_MILLISECOND;
        let code = unsafe { Oboe_createAudioThread(&mut thread, period, Some(add_one), arg) };
        assert_eq!(code, OK);
        assert!(thread >= 0);

        let mut returned = std::ptr::null_mut();
        assert_eq!(unsafe { Oboe_joinAudioThread(thread, &mut returned, 0) }, OK);
        assert_eq!(returned, arg);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // The handle is consumed by a successful join
        let code = unsafe { Oboe_joinAudioThread(thread, std::ptr::null_mut(), 0) };
        assert_eq!(code, ERROR_INVALID_HANDLE);
    }

    #[test]
    fn test_join_timeout_keeps_handle() {
        use_null_backend();
        let flag = Box::new(AtomicBool::new(false));
        let thread = spawn_waiting(&flag);

        let code =
            unsafe { Oboe_joinAudioThread(thread, std::ptr::null_mut(), NANOS_PER_MILLISECOND) };
        assert_eq!(code, ERROR_TIMEOUT);

        flag.store(true, Ordering::Release);
        assert_eq!(unsafe { Oboe_joinAudioThread(thread, std::ptr::null_mut(), 0) }, OK);
    }

    #[test]
    fn test_second_join_does_not_wait_behind_first() {
        use_null_backend();
        let flag: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));
        let thread = spawn_waiting(flag);

        let first = std::thread::spawn(move || unsafe {
            Oboe_joinAudioThread(thread, std::ptr::null_mut(), 0)
        });
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        let code =
            unsafe { Oboe_joinAudioThread(thread, std::ptr::null_mut(), NANOS_PER_MILLISECOND) };
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(code == ERROR_INVALID_ORDER || code == ERROR_TIMEOUT, "got {}", code);

        flag.store(true, Ordering::Release);
        assert_eq!(first.join().unwrap(), OK);
        let code = unsafe { Oboe_joinAudioThread(thread, std::ptr::null_mut(), 0) };
        assert_eq!(code, ERROR_INVALID_HANDLE);
    }

    #[test]
    fn test_create_rejects_bad_arguments() {
        use_null_backend();
        let mut thread = crate::OBOE_HANDLE_INVALID;
        let null = std::ptr::null_mut();
        unsafe {
            let code = Oboe_createAudioThread(&mut thread, 0, Some(add_one), null);
            assert_eq!(code, ERROR_ILLEGAL_ARGUMENT);
            let code = Oboe_createAudioThread(&mut thread, -5, Some(add_one), null);
            assert_eq!(code, ERROR_ILLEGAL_ARGUMENT);
            assert_eq!(Oboe_createAudioThread(&mut thread, 1_000, None, null), ERROR_NULL);
            let code = Oboe_createAudioThread(std::ptr::null_mut(), 1_000, Some(add_one), null);
            assert_eq!(code, ERROR_NULL);
        }
        assert_eq!(thread, crate::OBOE_HANDLE_INVALID);
        let code = unsafe { Oboe_joinAudioThread(-1, std::ptr::null_mut(), 0) };
        assert_eq!(code, ERROR_INVALID_HANDLE);
    }
}
