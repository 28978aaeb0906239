//! Worker start line.
//!
//! The driver spawns its workers one at a time and then joins the group
//! itself; no worker may enter the timed loop before the group is
//! complete. One rendezvous per run is all that is needed, so the
//! barrier is a one-shot release gate rather than a reusable
//! generation-counting one: arrivals park until the last worker shows
//! up, and waiters hand the CPU back to the scheduler once their backoff
//! tops out, leaving the cycles to siblings that are still being spawned
//! and pinned.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::backoff::Backoff;

/// Pause ceiling before a waiter starts yielding.
const WAIT_CEILING: u32 = 512;

/// A one-shot start line for a fixed group of workers.
pub struct Barrier {
    arrived: AtomicUsize,
    open: AtomicBool,
    total: usize,
}

impl Barrier {
    /// Create a start line for `total` workers.
    #[inline]
    pub const fn new(total: usize) -> Self {
        Self {
            arrived: AtomicUsize::new(0),
            open: AtomicBool::new(false),
            total,
        }
    }

    /// Park until every worker has arrived.
    ///
    /// The last arrival opens the line and is the only caller that
    /// returns `true`.
    pub fn wait(&self) -> bool {
        if self.arrived.fetch_add(1, Ordering::AcqRel) + 1 == self.total {
            self.open.store(true, Ordering::Release);
            return true;
        }

        let mut backoff = Backoff::with_ceiling(WAIT_CEILING);
        while !self.open.load(Ordering::Acquire) {
            if backoff.is_maxed() {
                std::thread::yield_now();
            } else {
                backoff.spin();
            }
        }

        false
    }

    /// Whether the line has opened.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_worker_opens_the_line() {
        let barrier = Barrier::new(1);
        assert!(!barrier.is_open());
        assert!(barrier.wait());
        assert!(barrier.is_open());
    }

    #[test]
    fn test_exactly_one_opener() {
        use std::sync::atomic::AtomicUsize;

        let barrier = Barrier::new(4);
        let openers = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    if barrier.wait() {
                        openers.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(openers.load(Ordering::Relaxed), 1);
        assert!(barrier.is_open());
    }

    #[test]
    fn test_nobody_passes_early() {
        use std::sync::atomic::AtomicBool;

        let barrier = Barrier::new(2);
        let late = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                // Visible only because the second arrival set it before
                // opening the line.
                assert!(late.load(Ordering::Acquire));
            });
            std::thread::sleep(std::time::Duration::from_millis(10));
            late.store(true, Ordering::Release);
            barrier.wait();
        });
    }
}
