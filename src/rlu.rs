//! Read-Log-Update mechanism.
//!
//! Readers run unsynchronized against a global clock; writers lock
//! individual objects by installing a private copy, log their writes into
//! that copy and commit by advancing the clock, waiting out readers that
//! started on the old clock, and writing the copies back. A reader that
//! encounters a locked object *steals* the copy when its section started
//! at or after the writer's commit clock, so it always observes a
//! consistent snapshot.
//!
//! The objects managed here are the list nodes of [`crate::rlu_list`];
//! copies and freed nodes are reclaimed through the epoch facility, which
//! every section participates in.

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use crossbeam_epoch::{self as epoch, Guard};

use crate::backoff::Backoff;
use crate::list::Key;

/// Maximum number of registered RLU threads.
pub const MAX_THREADS: usize = 128;

/// Write clock value of a thread that is not committing.
const WRITE_CLOCK_IDLE: u64 = u64::MAX;

static GLOBAL_CLOCK: AtomicU64 = AtomicU64::new(0);

#[repr(align(128))]
struct ThreadSlot {
    registered: AtomicBool,
    /// Odd while the thread is inside a section.
    run_cnt: AtomicU64,
    local_clock: AtomicU64,
    write_clock: AtomicU64,
}

impl ThreadSlot {
    const fn new() -> Self {
        Self {
            registered: AtomicBool::new(false),
            run_cnt: AtomicU64::new(0),
            local_clock: AtomicU64::new(0),
            write_clock: AtomicU64::new(WRITE_CLOCK_IDLE),
        }
    }
}

const SLOT_INIT: ThreadSlot = ThreadSlot::new();
static SLOTS: [ThreadSlot; MAX_THREADS] = [SLOT_INIT; MAX_THREADS];

/// An RLU-managed list node.
pub struct RluNode {
    copy: AtomicPtr<WriteCopy>,
    pub(crate) val: Key,
    next: AtomicPtr<RluNode>,
}

impl RluNode {
    pub(crate) fn new(val: Key, next: *mut RluNode) -> Self {
        Self {
            copy: AtomicPtr::new(ptr::null_mut()),
            val,
            next: AtomicPtr::new(next),
        }
    }

    /// Successor as stored on the object itself, bypassing any copy.
    ///
    /// Only valid when no writer can be active (teardown, tests).
    pub(crate) fn raw_next(&self) -> *mut RluNode {
        self.next.load(Ordering::Acquire)
    }

    /// Whether a writer's copy is still installed on this node.
    pub(crate) fn has_copy(&self) -> bool {
        !self.copy.load(Ordering::Acquire).is_null()
    }
}

/// Private, logged copy of a locked node.
struct WriteCopy {
    owner: usize,
    original: *mut RluNode,
    next: AtomicPtr<RluNode>,
}

/// Per-thread RLU context.
///
/// Not `Send`: a context is created and used by one worker thread and
/// released on drop.
pub struct RluThread {
    slot: usize,
    is_writer: bool,
    log: Vec<*mut WriteCopy>,
    free_list: Vec<*mut RluNode>,
    guard: Option<Guard>,
}

impl RluThread {
    /// Register a new thread context.
    ///
    /// # Panics
    ///
    /// If all [`MAX_THREADS`] slots are taken.
    pub fn new() -> Self {
        for (i, slot) in SLOTS.iter().enumerate() {
            if slot
                .registered
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                slot.run_cnt.store(0, Ordering::Relaxed);
                slot.write_clock.store(WRITE_CLOCK_IDLE, Ordering::Relaxed);
                return Self {
                    slot: i,
                    is_writer: false,
                    log: Vec::new(),
                    free_list: Vec::new(),
                    guard: None,
                };
            }
        }
        panic!("all {MAX_THREADS} thread slots are registered");
    }

    /// Enter a section.
    pub fn reader_lock(&mut self) {
        self.guard = Some(epoch::pin());
        let slot = &SLOTS[self.slot];
        slot.run_cnt.fetch_add(1, Ordering::AcqRel);
        slot.local_clock
            .store(GLOBAL_CLOCK.load(Ordering::SeqCst), Ordering::SeqCst);
    }

    /// Leave a section, committing the write log if one exists.
    pub fn reader_unlock(&mut self) {
        SLOTS[self.slot].run_cnt.fetch_add(1, Ordering::AcqRel);
        if self.is_writer {
            self.commit();
            self.is_writer = false;
        }
        self.guard = None;
    }

    /// Abandon the section, dropping every logged copy.
    pub fn abort(&mut self) {
        SLOTS[self.slot].run_cnt.fetch_add(1, Ordering::AcqRel);
        if self.is_writer {
            let guard = self.guard.as_ref().expect("abort outside a section");
            for &cp in &self.log {
                unsafe {
                    (*(*cp).original).copy.store(ptr::null_mut(), Ordering::Release);
                    // Readers may still be inspecting the copy header.
                    guard.defer_unchecked(move || drop(Box::from_raw(cp)));
                }
            }
            self.log.clear();
            self.free_list.clear();
            self.is_writer = false;
        }
        self.guard = None;
    }

    /// Key of `node`. Keys are immutable after publication, so no copy
    /// lookup is needed.
    #[inline]
    pub fn read_val(&self, node: *mut RluNode) -> Key {
        unsafe { (*node).val }
    }

    /// Successor of `node`, observing a locked node's copy when the
    /// section is entitled to steal it.
    pub fn read_next(&self, node: *mut RluNode) -> *mut RluNode {
        unsafe {
            let n = &*node;
            let cp = n.copy.load(Ordering::Acquire);
            if cp.is_null() {
                return n.next.load(Ordering::Acquire);
            }
            let c = &*cp;
            if c.owner == self.slot {
                return c.next.load(Ordering::Relaxed);
            }
            let owner_wc = SLOTS[c.owner].write_clock.load(Ordering::Acquire);
            let my_clock = SLOTS[self.slot].local_clock.load(Ordering::Relaxed);
            if owner_wc <= my_clock {
                c.next.load(Ordering::Acquire)
            } else {
                n.next.load(Ordering::Acquire)
            }
        }
    }

    /// Lock `node` by installing a copy in the write log.
    ///
    /// Returns `false` when another thread holds the node; the caller is
    /// expected to abort and retry its section.
    pub fn try_lock(&mut self, node: *mut RluNode) -> bool {
        unsafe {
            let n = &*node;
            let cur = n.copy.load(Ordering::Acquire);
            if !cur.is_null() {
                return (*cur).owner == self.slot;
            }

            let cp = Box::into_raw(Box::new(WriteCopy {
                owner: self.slot,
                original: node,
                next: AtomicPtr::new(n.next.load(Ordering::Acquire)),
            }));
            match n
                .copy
                .compare_exchange(ptr::null_mut(), cp, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.log.push(cp);
                    self.is_writer = true;
                    true
                }
                Err(_) => {
                    drop(Box::from_raw(cp));
                    false
                }
            }
        }
    }

    /// Successor recorded in the caller's own copy of a locked node.
    pub fn locked_next(&self, node: *mut RluNode) -> *mut RluNode {
        unsafe {
            let cp = (*node).copy.load(Ordering::Acquire);
            debug_assert!(!cp.is_null() && (*cp).owner == self.slot);
            (*cp).next.load(Ordering::Relaxed)
        }
    }

    /// Log a new successor for a node locked by this thread.
    pub fn write_next(&self, node: *mut RluNode, next: *mut RluNode) {
        unsafe {
            let cp = (*node).copy.load(Ordering::Acquire);
            debug_assert!(!cp.is_null() && (*cp).owner == self.slot);
            (*cp).next.store(next, Ordering::Relaxed);
        }
    }

    /// Schedule `node` for reclamation once the commit's grace period has
    /// elapsed. A subsequent [`abort`](Self::abort) cancels the free.
    pub fn defer_free(&mut self, node: *mut RluNode) {
        self.free_list.push(node);
    }

    fn commit(&mut self) {
        let slot = &SLOTS[self.slot];
        let wc = GLOBAL_CLOCK.load(Ordering::SeqCst) + 1;
        slot.write_clock.store(wc, Ordering::SeqCst);
        GLOBAL_CLOCK.fetch_add(1, Ordering::SeqCst);

        self.synchronize(wc);

        let guard = self.guard.as_ref().expect("commit outside a section");
        unsafe {
            for &cp in &self.log {
                let c = &*cp;
                (*c.original)
                    .next
                    .store(c.next.load(Ordering::Relaxed), Ordering::Release);
            }
            for &cp in &self.log {
                (*(*cp).original).copy.store(ptr::null_mut(), Ordering::Release);
                // Late readers may still steal through the stale copy
                // pointer they loaded before the unlock.
                guard.defer_unchecked(move || drop(Box::from_raw(cp)));
            }
            for &node in &self.free_list {
                guard.defer_unchecked(move || drop(Box::from_raw(node)));
            }
        }
        self.log.clear();
        self.free_list.clear();

        slot.write_clock.store(WRITE_CLOCK_IDLE, Ordering::Release);
    }

    /// Wait for every section that started before `wc` to finish.
    fn synchronize(&self, wc: u64) {
        for (i, other) in SLOTS.iter().enumerate() {
            if i == self.slot || !other.registered.load(Ordering::Acquire) {
                continue;
            }
            let observed = other.run_cnt.load(Ordering::Acquire);
            if observed & 1 == 0 {
                continue;
            }
            let mut backoff = Backoff::new();
            while other.run_cnt.load(Ordering::Acquire) == observed
                && other.local_clock.load(Ordering::Acquire) < wc
            {
                backoff.spin();
            }
        }
    }
}

impl Default for RluThread {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RluThread {
    fn drop(&mut self) {
        debug_assert!(!self.is_writer, "context dropped inside a section");
        SLOTS[self.slot].registered.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak_node(val: Key, next: *mut RluNode) -> *mut RluNode {
        Box::into_raw(Box::new(RluNode::new(val, next)))
    }

    #[test]
    fn test_register_and_release_slot() {
        let th = RluThread::new();
        let slot = th.slot;
        assert!(SLOTS[slot].registered.load(Ordering::Relaxed));
        drop(th);
        assert!(!SLOTS[slot].registered.load(Ordering::Relaxed));
    }

    #[test]
    fn test_lock_write_commit() {
        let mut th = RluThread::new();
        let b = leak_node(2, ptr::null_mut());
        let a = leak_node(1, b);

        th.reader_lock();
        assert!(th.try_lock(a));
        let c = leak_node(3, ptr::null_mut());
        th.write_next(a, c);
        th.reader_unlock();

        // After commit the write is visible on the object itself.
        th.reader_lock();
        assert_eq!(th.read_next(a), c);
        th.reader_unlock();

        unsafe {
            drop(Box::from_raw(a));
            drop(Box::from_raw(b));
            drop(Box::from_raw(c));
        }
    }

    #[test]
    fn test_abort_discards_log() {
        let mut th = RluThread::new();
        let b = leak_node(2, ptr::null_mut());
        let a = leak_node(1, b);

        th.reader_lock();
        assert!(th.try_lock(a));
        th.write_next(a, ptr::null_mut());
        th.abort();

        th.reader_lock();
        assert_eq!(th.read_next(a), b);
        th.reader_unlock();

        unsafe {
            drop(Box::from_raw(a));
            drop(Box::from_raw(b));
        }
    }

    #[test]
    fn test_relock_own_node() {
        let mut th = RluThread::new();
        let a = leak_node(1, ptr::null_mut());

        th.reader_lock();
        assert!(th.try_lock(a));
        assert!(th.try_lock(a));
        th.reader_unlock();

        unsafe { drop(Box::from_raw(a)) };
    }

    #[test]
    fn test_contended_lock_fails() {
        let mut t1 = RluThread::new();
        let mut t2 = RluThread::new();
        let a = leak_node(1, ptr::null_mut());

        t1.reader_lock();
        assert!(t1.try_lock(a));

        t2.reader_lock();
        assert!(!t2.try_lock(a));
        t2.abort();

        t1.abort();
        unsafe { drop(Box::from_raw(a)) };
    }
}
