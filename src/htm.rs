//! Hardware transactional memory facade.
//!
//! [`transaction`] runs a short closure atomically. On `x86_64` built with
//! the `rtm` target feature it maps to the RTM intrinsics; everywhere else
//! a process-global spinlock serializes all transactions, which preserves
//! their mutual atomicity (the only property the protocols rely on) at the
//! cost of concurrency. The closure requests an abort by returning an
//! [`AbortCode`]; the caller receives a [`TxStatus`] word exposing the
//! hardware reason bits and the 8-bit user code.
//!
//! Transactions here are deliberately tiny: a handful of loads, a
//! validation, and one or two stores. No allocation may happen inside.

use cfg_if::cfg_if;

/// Transaction aborted by an explicit user abort.
pub const STATUS_EXPLICIT: u32 = 1 << 0;
/// The hardware suggests the transaction may succeed on retry.
pub const STATUS_RETRY: u32 = 1 << 1;
/// Aborted due to a memory conflict with another thread.
pub const STATUS_CONFLICT: u32 = 1 << 2;
/// Aborted because an internal buffer overflowed.
pub const STATUS_CAPACITY: u32 = 1 << 3;
/// Aborted due to a debug exception.
pub const STATUS_DEBUG: u32 = 1 << 4;
/// Aborted inside a nested transaction.
pub const STATUS_NESTED: u32 = 1 << 5;

/// Application-level abort codes carried in the status word's high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AbortCode {
    /// A node involved in the operation is already unlinked.
    DoubleFree = 6,
    /// A traversed pointer changed between snapshot and commit.
    PointerChanged = 7,
    /// The fallback lock was held while speculating.
    LockHeld = 8,
}

/// Status word of a failed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStatus(pub u32);

impl TxStatus {
    /// Synthesize an explicit-abort status carrying `code`.
    ///
    /// Used both by the software backend and by protocols that detect a
    /// validation failure outside the hardware transaction.
    #[inline]
    pub const fn explicit(code: AbortCode) -> Self {
        Self(STATUS_EXPLICIT | ((code as u32) << 24))
    }

    /// Whether the abort was requested by the application.
    #[inline]
    pub const fn is_explicit(self) -> bool {
        self.0 & STATUS_EXPLICIT != 0
    }

    /// Whether the hardware hints that a retry may succeed.
    #[inline]
    pub const fn retry_hinted(self) -> bool {
        self.0 & STATUS_RETRY != 0
    }

    /// Whether the abort was caused by a memory conflict.
    #[inline]
    pub const fn is_conflict(self) -> bool {
        self.0 & STATUS_CONFLICT != 0
    }

    /// Whether the abort was caused by capacity exhaustion.
    #[inline]
    pub const fn is_capacity(self) -> bool {
        self.0 & STATUS_CAPACITY != 0
    }

    /// Whether the abort was caused by a debug exception.
    #[inline]
    pub const fn is_debug(self) -> bool {
        self.0 & STATUS_DEBUG != 0
    }

    /// Whether the abort happened in a nested transaction.
    #[inline]
    pub const fn is_nested(self) -> bool {
        self.0 & STATUS_NESTED != 0
    }

    /// The 8-bit user code of an explicit abort.
    #[inline]
    pub const fn code(self) -> u8 {
        (self.0 >> 24) as u8
    }
}

/// Whether transactions execute on real hardware in this build.
#[inline]
pub const fn is_hardware() -> bool {
    cfg!(all(target_arch = "x86_64", target_feature = "rtm"))
}

cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_feature = "rtm"))] {
        /// Run `f` inside a hardware transaction.
        ///
        /// `Ok(())` means the transaction committed; `Err` carries the
        /// hardware status word of the abort.
        pub fn transaction<F>(f: F) -> Result<(), TxStatus>
        where
            F: FnOnce() -> Result<(), AbortCode>,
        {
            use core::arch::x86_64::{_xabort, _xbegin, _xend, _XBEGIN_STARTED};

            unsafe {
                let status = _xbegin();
                if status == _XBEGIN_STARTED {
                    match f() {
                        Ok(()) => {
                            _xend();
                            Ok(())
                        }
                        Err(code) => {
                            match code {
                                AbortCode::DoubleFree => _xabort(6),
                                AbortCode::PointerChanged => _xabort(7),
                                AbortCode::LockHeld => _xabort(8),
                            }
                            unreachable!("_xabort does not return")
                        }
                    }
                } else {
                    Err(TxStatus(status))
                }
            }
        }
    } else {
        use crate::spinlock::RawSpinLock;

        static FALLBACK: RawSpinLock = RawSpinLock::new();

        /// Run `f` atomically with respect to every other transaction.
        ///
        /// `Ok(())` means the closure committed; `Err` carries a
        /// synthesized explicit-abort status when the closure bailed out.
        pub fn transaction<F>(f: F) -> Result<(), TxStatus>
        where
            F: FnOnce() -> Result<(), AbortCode>,
        {
            let _serial = FALLBACK.lock();
            match f() {
                Ok(()) => Ok(()),
                Err(code) => Err(TxStatus::explicit(code)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_commit_runs_closure() {
        let hits = AtomicUsize::new(0);
        let res = transaction(|| {
            hits.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        assert_eq!(res, Ok(()));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_explicit_abort_carries_code() {
        let res = transaction(|| Err(AbortCode::PointerChanged));
        let status = res.unwrap_err();
        assert!(status.is_explicit());
        assert_eq!(status.code(), AbortCode::PointerChanged as u8);
    }

    #[test]
    fn test_synthesized_status_bits() {
        let status = TxStatus::explicit(AbortCode::LockHeld);
        assert!(status.is_explicit());
        assert!(!status.retry_hinted());
        assert!(!status.is_conflict());
        assert_eq!(status.code(), 8);
    }

    #[test]
    fn test_transactions_are_atomic() {
        let counter = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..500 {
                        transaction(|| {
                            let v = counter.load(Ordering::Relaxed);
                            counter.store(v + 1, Ordering::Relaxed);
                            Ok(())
                        })
                        .unwrap();
                    }
                });
            }
        });

        assert_eq!(counter.load(Ordering::Relaxed), 2000);
    }
}
