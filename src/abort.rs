//! Abort-reason accounting.
//!
//! Every failed transaction is tallied into a cache-line-aligned slot
//! owned by the recording thread, indexed by reason: six reasons reported
//! by the CPU plus three application-level codes raised through explicit
//! aborts. The slots are summed into a [`Snapshot`] once the workers have
//! joined.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::htm::TxStatus;

/// Why a transaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum AbortReason {
    /// Explicit user abort.
    HtmExplicit = 0,
    /// Hardware retry hint.
    HtmRetry = 1,
    /// Hardware memory conflict.
    HtmConflict = 2,
    /// Transactional buffer capacity exceeded.
    HtmCapacity = 3,
    /// Debug exception.
    HtmDebug = 4,
    /// Abort inside a nested transaction.
    HtmNested = 5,
    /// A node involved in the operation was already unlinked.
    DoubleFree = 6,
    /// A traversed pointer changed before the commit.
    PtrConflict = 7,
    /// The fallback lock was held while speculating.
    LockConflict = 8,
}

/// Number of distinct abort reasons.
pub const NR_ABORT_REASONS: usize = 9;

impl AbortReason {
    /// All reasons, in counter order.
    pub const ALL: [AbortReason; NR_ABORT_REASONS] = [
        AbortReason::HtmExplicit,
        AbortReason::HtmRetry,
        AbortReason::HtmConflict,
        AbortReason::HtmCapacity,
        AbortReason::HtmDebug,
        AbortReason::HtmNested,
        AbortReason::DoubleFree,
        AbortReason::PtrConflict,
        AbortReason::LockConflict,
    ];

    /// Stable label used in the report output.
    pub const fn label(self) -> &'static str {
        match self {
            AbortReason::HtmExplicit => "htm_explicit",
            AbortReason::HtmRetry => "htm_retry",
            AbortReason::HtmConflict => "htm_conflict",
            AbortReason::HtmCapacity => "htm_capacity",
            AbortReason::HtmDebug => "htm_debug",
            AbortReason::HtmNested => "htm_nested",
            AbortReason::DoubleFree => "double_free",
            AbortReason::PtrConflict => "ptr_conflict",
            AbortReason::LockConflict => "lock_conflict",
        }
    }
}

/// Maximum number of concurrently recording threads.
const MAX_SLOTS: usize = 128;

#[repr(align(128))]
struct Slot {
    nr_aborts: AtomicU64,
    counts: [AtomicU64; NR_ABORT_REASONS],
}

impl Slot {
    const fn new() -> Self {
        const ZERO: AtomicU64 = AtomicU64::new(0);
        Self {
            nr_aborts: ZERO,
            counts: [ZERO; NR_ABORT_REASONS],
        }
    }
}

const SLOT_INIT: Slot = Slot::new();
static SLOTS: [Slot; MAX_SLOTS] = [SLOT_INIT; MAX_SLOTS];

static NEXT_SLOT: AtomicUsize = AtomicUsize::new(0);

std::thread_local! {
    static MY_SLOT: usize = NEXT_SLOT.fetch_add(1, Ordering::Relaxed) % MAX_SLOTS;
}

/// Record one aborted transaction.
///
/// Each status bit is tested independently; the explicit-abort code
/// selects exactly one of the application-level counters.
pub fn record(status: TxStatus) {
    MY_SLOT.with(|&idx| {
        let slot = &SLOTS[idx];
        slot.nr_aborts.fetch_add(1, Ordering::Relaxed);

        let mut bump = |reason: AbortReason| {
            slot.counts[reason as usize].fetch_add(1, Ordering::Relaxed);
        };

        if status.is_explicit() {
            bump(AbortReason::HtmExplicit);
        }
        if status.retry_hinted() {
            bump(AbortReason::HtmRetry);
        }
        if status.is_conflict() {
            bump(AbortReason::HtmConflict);
        }
        if status.is_capacity() {
            bump(AbortReason::HtmCapacity);
        }
        if status.is_debug() {
            bump(AbortReason::HtmDebug);
        }
        if status.is_nested() {
            bump(AbortReason::HtmNested);
        }
        match status.code() {
            6 => bump(AbortReason::DoubleFree),
            7 => bump(AbortReason::PtrConflict),
            8 => bump(AbortReason::LockConflict),
            _ => {}
        }
    });
}

/// Zero every slot. Called once at benchmark startup.
pub fn reset() {
    for slot in SLOTS.iter() {
        slot.nr_aborts.store(0, Ordering::Relaxed);
        for c in slot.counts.iter() {
            c.store(0, Ordering::Relaxed);
        }
    }
}

/// Aggregated abort counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Total number of aborted transactions.
    pub total: u64,
    /// Per-reason counts, indexed by [`AbortReason`].
    pub counts: [u64; NR_ABORT_REASONS],
}

impl Snapshot {
    /// Count recorded for one reason.
    #[inline]
    pub fn get(&self, reason: AbortReason) -> u64 {
        self.counts[reason as usize]
    }

    /// Whether nothing was recorded at all.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.total == 0 && self.counts.iter().all(|&c| c == 0)
    }
}

/// Sum all slots.
pub fn snapshot() -> Snapshot {
    let mut out = Snapshot::default();
    for slot in SLOTS.iter() {
        out.total += slot.nr_aborts.load(Ordering::Relaxed);
        for (sum, c) in out.counts.iter_mut().zip(slot.counts.iter()) {
            *sum += c.load(Ordering::Relaxed);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::htm::{AbortCode, STATUS_CONFLICT, STATUS_RETRY};

    #[test]
    fn test_explicit_selects_one_app_counter() {
        let _g = crate::testutil::serial();
        reset();

        record(TxStatus::explicit(AbortCode::DoubleFree));

        let snap = snapshot();
        assert_eq!(snap.total, 1);
        assert_eq!(snap.get(AbortReason::HtmExplicit), 1);
        assert_eq!(snap.get(AbortReason::DoubleFree), 1);
        assert_eq!(snap.get(AbortReason::PtrConflict), 0);
        assert_eq!(snap.get(AbortReason::LockConflict), 0);
    }

    #[test]
    fn test_hardware_bits_counted_independently() {
        let _g = crate::testutil::serial();
        reset();

        record(TxStatus(STATUS_CONFLICT | STATUS_RETRY));

        let snap = snapshot();
        assert_eq!(snap.total, 1);
        assert_eq!(snap.get(AbortReason::HtmConflict), 1);
        assert_eq!(snap.get(AbortReason::HtmRetry), 1);
        assert_eq!(snap.get(AbortReason::HtmExplicit), 0);
    }

    #[test]
    fn test_reset_clears() {
        let _g = crate::testutil::serial();
        record(TxStatus::explicit(AbortCode::LockHeld));
        reset();
        assert!(snapshot().is_zero());
    }
}
