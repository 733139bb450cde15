//! Small shared helpers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Holds a boolean "in flight" flag for as long as it is alive.
///
/// Acquisition fails if the flag is already set, which turns a second
/// concurrent run into a no-op. Dropping the guard clears the flag, so an
/// aborted or panicking run can never leave it stuck.
pub(crate) struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    pub(crate) fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
