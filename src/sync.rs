//! Completion signals
//!
//! Wait/notify pairs between the blocking transaction engine and the
//! interrupt handler. Each hardware event gets its own [`Completion`]; the
//! waiter reinitializes it before arming the hardware so a stale signal
//! from an earlier, already timed-out transaction can never satisfy a new
//! wait.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lock a mutex, continuing through poisoning
///
/// A panicking thread must not wedge the other controller paths; the guarded
/// state is either a plain flag or hardware-shadow data that the recovering
/// caller revalidates anyway.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One-shot wait/notify channel with timeout
pub(crate) struct Completion {
    done: Mutex<bool>,
    cvar: Condvar,
}

impl Completion {
    pub(crate) fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    /// Clear any pending signal; call before arming the hardware event
    pub(crate) fn reinit(&self) {
        *lock_unpoisoned(&self.done) = false;
    }

    /// Signal the completion; wakes the waiter if one is blocked
    pub(crate) fn complete(&self) {
        *lock_unpoisoned(&self.done) = true;
        self.cvar.notify_all();
    }

    /// Block until signaled or until `timeout` elapses
    ///
    /// Returns true if the completion was signaled, false on timeout.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = lock_unpoisoned(&self.done);
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cvar
                .wait_timeout(done, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            done = guard;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_returns_after_signal() {
        let comp = Arc::new(Completion::new());
        comp.reinit();
        let signaller = Arc::clone(&comp);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            signaller.complete();
        });
        assert!(comp.wait_timeout(Duration::from_secs(5)));
        let _ = handle.join();
    }

    #[test]
    fn test_wait_times_out_without_signal() {
        let comp = Completion::new();
        comp.reinit();
        let start = Instant::now();
        assert!(!comp.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_signal_before_wait_is_consumed() {
        let comp = Completion::new();
        comp.reinit();
        comp.complete();
        assert!(comp.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_reinit_clears_stale_signal() {
        let comp = Completion::new();
        comp.complete();
        comp.reinit();
        assert!(!comp.wait_timeout(Duration::from_millis(10)));
    }
}
