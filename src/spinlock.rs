//! Raw fetch-and-store spinlocks.
//!
//! Unlike `std::sync::Mutex`, a [`RawSpinLock`] guards structure rather
//! than data: list mutation paths acquire several node locks at once,
//! validate that the nodes are still current, and only then commit. The
//! same word doubles as a plain lock *flag* for protocols that acquire it
//! inside a short hardware transaction and release it with a store.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::backoff::Backoff;

/// A fetch-and-store spinlock without an embedded value.
///
/// Unfair but fast; waiters spin on a relaxed read and back off
/// exponentially.
#[repr(C)]
#[derive(Debug, Default)]
pub struct RawSpinLock {
    locked: AtomicBool,
}

impl RawSpinLock {
    /// Create a new unlocked spinlock.
    #[inline]
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquire the lock, spinning if necessary.
    #[inline]
    pub fn lock(&self) -> SpinGuard<'_> {
        let mut backoff = Backoff::new();
        while self.locked.swap(true, Ordering::Acquire) {
            while self.locked.load(Ordering::Relaxed) {
                backoff.spin();
            }
        }
        SpinGuard { lock: self }
    }

    /// Try to acquire the lock without spinning.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinGuard<'_>> {
        if self.locked.swap(true, Ordering::Acquire) {
            None
        } else {
            Some(SpinGuard { lock: self })
        }
    }

    /// Whether the lock (or flag) is currently held.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Raise the flag with a plain store.
    ///
    /// Only meaningful inside a critical section that already provides
    /// atomicity (a hardware transaction); there is no RAII release.
    #[inline]
    pub(crate) fn set_flag(&self) {
        self.locked.store(true, Ordering::Relaxed);
    }

    /// Clear the flag, releasing every write made while it was raised.
    #[inline]
    pub(crate) fn clear_flag(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// RAII guard for [`RawSpinLock`].
#[must_use]
pub struct SpinGuard<'a> {
    lock: &'a RawSpinLock,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_unlock() {
        let lock = RawSpinLock::new();
        assert!(!lock.is_locked());
        {
            let _guard = lock.lock();
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_try_lock() {
        let lock = RawSpinLock::new();

        let guard = lock.try_lock();
        assert!(guard.is_some());
        assert!(lock.try_lock().is_none());

        drop(guard);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_flag_view() {
        let lock = RawSpinLock::new();
        lock.set_flag();
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());
        lock.clear_flag();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_mutual_exclusion() {
        use std::sync::atomic::AtomicUsize;

        let lock = RawSpinLock::new();
        let counter = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        let _g = lock.lock();
                        let v = counter.load(Ordering::Relaxed);
                        counter.store(v + 1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(counter.load(Ordering::Relaxed), 4000);
    }
}
