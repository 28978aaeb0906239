//! Spinlock-committed mutation protocols.
//!
//! Four ways to commit the pointer swing after a [`crate::list`]
//! traversal, all reclaiming unlinked nodes through the epoch facility so
//! lock-free readers never observe freed memory:
//!
//! - coarse: one writer spinlock per bucket serializes all mutations;
//! - try: as coarse, but a failed lock attempt surfaces as a conflict;
//! - fine-grained: lock only the nodes around the mutation, validate
//!   they are still current, restart on failure;
//! - NUMA: a per-NUMA-node lock tier in front of the fine-grained locks,
//!   so same-domain contenders serialize on a cache-line-local word.

use core::sync::atomic::Ordering;

use crossbeam_epoch as epoch;

use crate::list::{alloc_node, discard_node, key_in_range, Key, List, UpdateOutcome};
use crate::topology;

impl List {
    /// Insert under the bucket writer lock.
    pub fn coarse_add(&self, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::AlreadyPresent;
        }
        let guard = epoch::pin();
        let _wl = self.writer_lock.lock();

        let (prev, curr) = self.find(key, &guard);
        if unsafe { curr.deref() }.val == key {
            return UpdateOutcome::AlreadyPresent;
        }

        let new = alloc_node(key, curr, &guard);
        unsafe { prev.deref() }.next.store(new, Ordering::Release);
        UpdateOutcome::Inserted
    }

    /// Remove under the bucket writer lock.
    pub fn coarse_remove(&self, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::NotFound;
        }
        let guard = epoch::pin();
        let wl = self.writer_lock.lock();

        let (prev, curr) = self.find(key, &guard);
        let curr_ref = unsafe { curr.deref() };
        if curr_ref.val != key {
            return UpdateOutcome::NotFound;
        }

        let succ = curr_ref.next.load(Ordering::Acquire, &guard);
        curr_ref.removed.store(true, Ordering::Relaxed);
        unsafe { prev.deref() }.next.store(succ, Ordering::Release);
        drop(wl);

        unsafe { guard.defer_destroy(curr) };
        UpdateOutcome::Removed
    }

    /// Insert with a non-blocking attempt on the bucket writer lock.
    pub fn try_add(&self, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::AlreadyPresent;
        }
        let guard = epoch::pin();
        let Some(_wl) = self.writer_lock.try_lock() else {
            return UpdateOutcome::Conflict;
        };

        let (prev, curr) = self.find(key, &guard);
        if unsafe { curr.deref() }.val == key {
            return UpdateOutcome::AlreadyPresent;
        }

        let new = alloc_node(key, curr, &guard);
        unsafe { prev.deref() }.next.store(new, Ordering::Release);
        UpdateOutcome::Inserted
    }

    /// Remove with a non-blocking attempt on the bucket writer lock.
    pub fn try_remove(&self, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::NotFound;
        }
        let guard = epoch::pin();
        let Some(wl) = self.writer_lock.try_lock() else {
            return UpdateOutcome::Conflict;
        };

        let (prev, curr) = self.find(key, &guard);
        let curr_ref = unsafe { curr.deref() };
        if curr_ref.val != key {
            return UpdateOutcome::NotFound;
        }

        let succ = curr_ref.next.load(Ordering::Acquire, &guard);
        curr_ref.removed.store(true, Ordering::Relaxed);
        unsafe { prev.deref() }.next.store(succ, Ordering::Release);
        drop(wl);

        unsafe { guard.defer_destroy(curr) };
        UpdateOutcome::Removed
    }

    /// Insert with fine-grained node locking.
    ///
    /// After traversal the predecessor and successor are locked in
    /// traversal order, then validated: the link must be unchanged and
    /// neither node unlinked. A failed validation releases the locks,
    /// frees the pre-allocated node and restarts the traversal.
    pub fn fg_add(&self, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::AlreadyPresent;
        }
        let guard = epoch::pin();
        loop {
            let (prev, curr) = self.find(key, &guard);
            let prev_ref = unsafe { prev.deref() };
            let curr_ref = unsafe { curr.deref() };
            if curr_ref.val == key {
                return UpdateOutcome::AlreadyPresent;
            }

            let new = alloc_node(key, curr, &guard);
            let linked = {
                let _gp = prev_ref.lock.lock();
                let _gc = curr_ref.lock.lock();

                prev_ref.next.load(Ordering::Acquire, &guard) == curr
                    && !prev_ref.removed.load(Ordering::Relaxed)
                    && !curr_ref.removed.load(Ordering::Relaxed)
                    && {
                        prev_ref.next.store(new, Ordering::Release);
                        true
                    }
            };
            if linked {
                return UpdateOutcome::Inserted;
            }
            unsafe { discard_node(new) };
        }
    }

    /// Remove with fine-grained node locking.
    ///
    /// Locks predecessor, victim and the victim's successor (the node the
    /// link will be swung to), validates both links and all three
    /// `removed` flags, then unlinks, marks the victim and schedules its
    /// reclamation inside the critical section.
    pub fn fg_remove(&self, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::NotFound;
        }
        let guard = epoch::pin();
        loop {
            let (prev, curr) = self.find(key, &guard);
            let prev_ref = unsafe { prev.deref() };
            let curr_ref = unsafe { curr.deref() };
            if curr_ref.val != key {
                return UpdateOutcome::NotFound;
            }

            let succ = curr_ref.next.load(Ordering::Acquire, &guard);
            let succ_ref = unsafe { succ.deref() };

            let unlinked = {
                let _gp = prev_ref.lock.lock();
                let _gc = curr_ref.lock.lock();
                let _gn = succ_ref.lock.lock();

                !prev_ref.removed.load(Ordering::Relaxed)
                    && !curr_ref.removed.load(Ordering::Relaxed)
                    && !succ_ref.removed.load(Ordering::Relaxed)
                    && prev_ref.next.load(Ordering::Acquire, &guard) == curr
                    && curr_ref.next.load(Ordering::Acquire, &guard) == succ
                    && {
                        prev_ref.next.store(succ, Ordering::Release);
                        curr_ref.removed.store(true, Ordering::Relaxed);
                        unsafe { guard.defer_destroy(curr) };
                        true
                    }
            };
            if unlinked {
                return UpdateOutcome::Removed;
            }
        }
    }

    /// Insert with the two-tier NUMA lock hierarchy.
    ///
    /// The per-NUMA tier of the running CPU's domain is taken first, then
    /// the globally shared node locks; validation and restart follow the
    /// fine-grained rules.
    pub fn numa_add(&self, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::AlreadyPresent;
        }
        let guard = epoch::pin();
        loop {
            let (prev, curr) = self.find(key, &guard);
            let prev_ref = unsafe { prev.deref() };
            let curr_ref = unsafe { curr.deref() };
            if curr_ref.val == key {
                return UpdateOutcome::AlreadyPresent;
            }

            let new = alloc_node(key, curr, &guard);
            let nid = topology::current_node();
            let linked = {
                let _np = prev_ref.numa_locks[nid].lock();
                let _nc = curr_ref.numa_locks[nid].lock();
                let _gp = prev_ref.lock.lock();
                let _gc = curr_ref.lock.lock();

                prev_ref.next.load(Ordering::Acquire, &guard) == curr
                    && !prev_ref.removed.load(Ordering::Relaxed)
                    && !curr_ref.removed.load(Ordering::Relaxed)
                    && {
                        prev_ref.next.store(new, Ordering::Release);
                        true
                    }
            };
            if linked {
                return UpdateOutcome::Inserted;
            }
            unsafe { discard_node(new) };
        }
    }

    /// Remove with the two-tier NUMA lock hierarchy.
    pub fn numa_remove(&self, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::NotFound;
        }
        let guard = epoch::pin();
        loop {
            let (prev, curr) = self.find(key, &guard);
            let prev_ref = unsafe { prev.deref() };
            let curr_ref = unsafe { curr.deref() };
            if curr_ref.val != key {
                return UpdateOutcome::NotFound;
            }

            let succ = curr_ref.next.load(Ordering::Acquire, &guard);
            let succ_ref = unsafe { succ.deref() };

            let nid = topology::current_node();
            let unlinked = {
                let _np = prev_ref.numa_locks[nid].lock();
                let _nc = curr_ref.numa_locks[nid].lock();
                let _nn = succ_ref.numa_locks[nid].lock();
                let _gp = prev_ref.lock.lock();
                let _gc = curr_ref.lock.lock();
                let _gn = succ_ref.lock.lock();

                !prev_ref.removed.load(Ordering::Relaxed)
                    && !curr_ref.removed.load(Ordering::Relaxed)
                    && !succ_ref.removed.load(Ordering::Relaxed)
                    && prev_ref.next.load(Ordering::Acquire, &guard) == curr
                    && curr_ref.next.load(Ordering::Acquire, &guard) == succ
                    && {
                        prev_ref.next.store(succ, Ordering::Release);
                        curr_ref.removed.store(true, Ordering::Relaxed);
                        unsafe { guard.defer_destroy(curr) };
                        true
                    }
            };
            if unlinked {
                return UpdateOutcome::Removed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::HashList;

    #[test]
    fn test_coarse_roundtrip() {
        let list = List::new();
        assert_eq!(list.coarse_add(5), UpdateOutcome::Inserted);
        assert_eq!(list.coarse_add(5), UpdateOutcome::AlreadyPresent);
        assert!(list.contains(5));
        assert_eq!(list.coarse_remove(5), UpdateOutcome::Removed);
        assert_eq!(list.coarse_remove(5), UpdateOutcome::NotFound);
        assert!(!list.contains(5));
        list.assert_quiescent();
    }

    #[test]
    fn test_coarse_keeps_order() {
        let list = List::new();
        for key in [7, 1, 9, 3, 5] {
            assert_eq!(list.coarse_add(key), UpdateOutcome::Inserted);
        }
        assert_eq!(list.len(), 5);
        list.assert_quiescent();
    }

    #[test]
    fn test_try_add_conflicts_when_locked() {
        let list = List::new();
        let held = list.writer_lock.lock();
        assert_eq!(list.try_add(1), UpdateOutcome::Conflict);
        assert_eq!(list.try_remove(1), UpdateOutcome::Conflict);
        drop(held);
        assert_eq!(list.try_add(1), UpdateOutcome::Inserted);
        assert_eq!(list.try_remove(1), UpdateOutcome::Removed);
    }

    #[test]
    fn test_fg_roundtrip() {
        let list = List::new();
        assert_eq!(list.fg_add(10), UpdateOutcome::Inserted);
        assert_eq!(list.fg_add(10), UpdateOutcome::AlreadyPresent);
        assert_eq!(list.fg_remove(10), UpdateOutcome::Removed);
        assert_eq!(list.fg_remove(10), UpdateOutcome::NotFound);
        list.assert_quiescent();
    }

    #[test]
    fn test_numa_roundtrip() {
        let list = List::new();
        assert_eq!(list.numa_add(42), UpdateOutcome::Inserted);
        assert!(list.contains(42));
        assert_eq!(list.numa_remove(42), UpdateOutcome::Removed);
        assert!(!list.contains(42));
        list.assert_quiescent();
    }

    #[test]
    fn test_boundary_keys() {
        let list = List::new();
        assert_eq!(list.coarse_add(0), UpdateOutcome::Inserted);
        assert_eq!(list.coarse_add(1023), UpdateOutcome::Inserted);
        assert!(list.contains(0));
        assert!(list.contains(1023));
        assert_eq!(list.coarse_remove(0), UpdateOutcome::Removed);
        assert_eq!(list.coarse_remove(1023), UpdateOutcome::Removed);
        list.assert_quiescent();
    }

    #[test]
    fn test_fill_and_clear_returns_to_sentinels() {
        let list = List::new();
        for key in 0..64 {
            list.fg_add(key);
        }
        assert_eq!(list.len(), 64);
        for key in 0..64 {
            assert_eq!(list.fg_remove(key), UpdateOutcome::Removed);
        }
        assert!(list.is_empty());
        list.assert_quiescent();
    }

    #[test]
    fn test_fg_concurrent_stress() {
        let set = HashList::new(4);
        std::thread::scope(|s| {
            for t in 0..4 {
                let set = &set;
                s.spawn(move || {
                    for i in 0..500 {
                        let key = (t * 31 + i) % 64;
                        let bucket = set.bucket_of(key);
                        if i % 2 == 0 {
                            bucket.fg_add(key);
                        } else {
                            bucket.fg_remove(key);
                        }
                    }
                });
            }
        });
        set.assert_quiescent();
    }

    #[test]
    fn test_numa_concurrent_stress() {
        let set = HashList::new(2);
        std::thread::scope(|s| {
            for t in 0..4 {
                let set = &set;
                s.spawn(move || {
                    for i in 0..300 {
                        let key = (t * 17 + i) % 32;
                        let bucket = set.bucket_of(key);
                        if i % 3 == 0 {
                            bucket.numa_remove(key);
                        } else {
                            bucket.numa_add(key);
                        }
                    }
                });
            }
        });
        set.assert_quiescent();
    }
}
