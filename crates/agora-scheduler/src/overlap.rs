//! Overlap control for scheduled jobs.
//!
//! A batch can outlast its cron interval. The next tick is dropped while a
//! run is still in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tracks whether a job has a run in flight.
#[derive(Default)]
pub struct OverlapGuard {
    running: Arc<AtomicBool>,
}

impl OverlapGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the job for one run; `None` means skip this tick.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                flag: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Releases the claim when dropped, including on panic.
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
