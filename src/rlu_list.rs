//! Sentinel-bounded sorted list over the RLU mechanism.
//!
//! The same traversal and membership rules as [`crate::list`], but every
//! section runs between `reader_lock` / `reader_unlock` and writers lock
//! the predecessor and victim through the RLU write log instead of node
//! spinlocks. Conflicts abort the section; the forgiving variants report
//! them, the defaults retry.

use crate::list::{key_in_range, Key, UpdateOutcome, KEY_MAX, KEY_MIN, MAX_BUCKETS};
use crate::rlu::{RluNode, RluThread};

/// One RLU-managed bucket.
pub struct RluList {
    head: *mut RluNode,
}

unsafe impl Send for RluList {}
unsafe impl Sync for RluList {}

impl RluList {
    /// Create an empty list holding only the two sentinels.
    pub fn new() -> Self {
        let tail = Box::into_raw(Box::new(RluNode::new(KEY_MAX, core::ptr::null_mut())));
        let head = Box::into_raw(Box::new(RluNode::new(KEY_MIN, tail)));
        Self { head }
    }

    /// Walk to the first node with a value `>= key` inside the caller's
    /// section. Returns `(prev, curr)`.
    fn find(&self, th: &RluThread, key: Key) -> (*mut RluNode, *mut RluNode) {
        let mut prev = self.head;
        let mut curr = th.read_next(prev);
        loop {
            if th.read_val(curr) >= key {
                return (prev, curr);
            }
            prev = curr;
            curr = th.read_next(curr);
        }
    }

    /// Membership test under a read-only section.
    pub fn contains(&self, th: &mut RluThread, key: Key) -> bool {
        if !key_in_range(key) {
            return false;
        }
        th.reader_lock();
        let (_, curr) = self.find(th, key);
        let present = th.read_val(curr) == key;
        th.reader_unlock();
        present
    }

    /// One insert attempt. `None` means the section aborted on a
    /// conflict and may be retried.
    fn add_once(&self, th: &mut RluThread, key: Key) -> Option<UpdateOutcome> {
        th.reader_lock();
        let (prev, curr) = self.find(th, key);
        if th.read_val(curr) == key {
            th.reader_unlock();
            return Some(UpdateOutcome::AlreadyPresent);
        }

        if !th.try_lock(prev) {
            th.abort();
            return None;
        }
        if th.locked_next(prev) != curr {
            th.abort();
            return None;
        }
        if !th.try_lock(curr) {
            th.abort();
            return None;
        }

        let new = Box::into_raw(Box::new(RluNode::new(key, curr)));
        th.write_next(prev, new);
        th.reader_unlock();
        Some(UpdateOutcome::Inserted)
    }

    /// One remove attempt. `None` means the section aborted on a
    /// conflict and may be retried.
    fn remove_once(&self, th: &mut RluThread, key: Key) -> Option<UpdateOutcome> {
        th.reader_lock();
        let (prev, curr) = self.find(th, key);
        if th.read_val(curr) != key {
            th.reader_unlock();
            return Some(UpdateOutcome::NotFound);
        }

        if !th.try_lock(prev) {
            th.abort();
            return None;
        }
        if th.locked_next(prev) != curr {
            th.abort();
            return None;
        }
        if !th.try_lock(curr) {
            th.abort();
            return None;
        }

        let succ = th.locked_next(curr);
        th.write_next(prev, succ);
        th.defer_free(curr);
        th.reader_unlock();
        Some(UpdateOutcome::Removed)
    }

    /// Insert, retrying aborted sections until a decision is reached.
    pub fn add(&self, th: &mut RluThread, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::AlreadyPresent;
        }
        loop {
            if let Some(out) = self.add_once(th, key) {
                return out;
            }
        }
    }

    /// Insert with a single attempt; a conflict is reported, not retried.
    pub fn try_add(&self, th: &mut RluThread, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::AlreadyPresent;
        }
        self.add_once(th, key).unwrap_or(UpdateOutcome::Conflict)
    }

    /// Remove, retrying aborted sections until a decision is reached.
    pub fn remove(&self, th: &mut RluThread, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::NotFound;
        }
        loop {
            if let Some(out) = self.remove_once(th, key) {
                return out;
            }
        }
    }

    /// Remove with a single attempt; a conflict is reported, not retried.
    pub fn try_remove(&self, th: &mut RluThread, key: Key) -> UpdateOutcome {
        if !key_in_range(key) {
            return UpdateOutcome::NotFound;
        }
        self.remove_once(th, key).unwrap_or(UpdateOutcome::Conflict)
    }

    /// Number of keys between the sentinels, observed quiescently.
    pub fn len(&self) -> usize {
        let mut size = 0;
        unsafe {
            let mut curr = (*self.head).raw_next();
            while (*curr).val != KEY_MAX {
                size += 1;
                curr = (*curr).raw_next();
            }
        }
        size
    }

    /// Whether the list holds no keys besides the sentinels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Panic unless the quiescent invariants hold: sentinel bounds,
    /// strictly ascending values, null only at the tail, and no node
    /// still carrying a writer's copy.
    pub fn assert_quiescent(&self) {
        unsafe {
            let head = &*self.head;
            assert_eq!(head.val, KEY_MIN, "head sentinel value");
            assert!(!head.has_copy(), "head sentinel still locked by a writer");

            let mut prev_val = KEY_MIN;
            let mut curr = head.raw_next();
            loop {
                assert!(!curr.is_null(), "null link before the tail sentinel");
                let node = &*curr;
                assert!(node.val > prev_val, "values not strictly ascending");
                assert!(!node.has_copy(), "reachable node still locked by a writer");
                if node.val == KEY_MAX {
                    assert!(node.raw_next().is_null(), "tail sentinel has a successor");
                    return;
                }
                prev_val = node.val;
                curr = node.raw_next();
            }
        }
    }
}

impl Default for RluList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RluList {
    fn drop(&mut self) {
        // Exclusive access: free the chain directly.
        unsafe {
            let mut curr = self.head;
            while !curr.is_null() {
                let next = (*curr).raw_next();
                drop(Box::from_raw(curr));
                curr = next;
            }
        }
    }
}

/// Bucket array of RLU lists keyed by `key mod n_buckets`.
pub struct RluHashList {
    buckets: Box<[RluList]>,
}

impl RluHashList {
    /// Build a hash list with `n_buckets` buckets.
    ///
    /// # Panics
    ///
    /// If `n_buckets` is outside `[1, MAX_BUCKETS]`.
    pub fn new(n_buckets: usize) -> Self {
        assert!(
            (1..=MAX_BUCKETS).contains(&n_buckets),
            "bucket count {n_buckets} outside [1, {MAX_BUCKETS}]"
        );
        Self {
            buckets: (0..n_buckets).map(|_| RluList::new()).collect(),
        }
    }

    fn bucket_of(&self, key: Key) -> &RluList {
        let idx = key.rem_euclid(self.buckets.len() as Key) as usize;
        &self.buckets[idx]
    }

    /// Membership test.
    pub fn contains(&self, th: &mut RluThread, key: Key) -> bool {
        key_in_range(key) && self.bucket_of(key).contains(th, key)
    }

    /// Insert, retrying conflicts.
    pub fn add(&self, th: &mut RluThread, key: Key) -> UpdateOutcome {
        self.bucket_of(key).add(th, key)
    }

    /// Single-attempt insert.
    pub fn try_add(&self, th: &mut RluThread, key: Key) -> UpdateOutcome {
        self.bucket_of(key).try_add(th, key)
    }

    /// Remove, retrying conflicts.
    pub fn remove(&self, th: &mut RluThread, key: Key) -> UpdateOutcome {
        self.bucket_of(key).remove(th, key)
    }

    /// Single-attempt remove.
    pub fn try_remove(&self, th: &mut RluThread, key: Key) -> UpdateOutcome {
        self.bucket_of(key).try_remove(th, key)
    }

    /// Total number of keys, observed quiescently.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(RluList::len).sum()
    }

    /// Whether no bucket holds a key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check every bucket's quiescent invariants.
    pub fn assert_quiescent(&self) {
        for bucket in self.buckets.iter() {
            bucket.assert_quiescent();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let list = RluList::new();
        let mut th = RluThread::new();

        assert_eq!(list.add(&mut th, 5), UpdateOutcome::Inserted);
        assert_eq!(list.add(&mut th, 5), UpdateOutcome::AlreadyPresent);
        assert!(list.contains(&mut th, 5));
        assert_eq!(list.remove(&mut th, 5), UpdateOutcome::Removed);
        assert_eq!(list.remove(&mut th, 5), UpdateOutcome::NotFound);
        assert!(!list.contains(&mut th, 5));
    }

    #[test]
    fn test_keeps_order() {
        let list = RluList::new();
        let mut th = RluThread::new();

        for key in [9, 2, 7, 4] {
            assert_eq!(list.add(&mut th, key), UpdateOutcome::Inserted);
        }
        assert_eq!(list.len(), 4);

        let mut prev = KEY_MIN;
        unsafe {
            let mut curr = (*list.head).raw_next();
            while (*curr).val != KEY_MAX {
                assert!((*curr).val > prev);
                prev = (*curr).val;
                curr = (*curr).raw_next();
            }
        }
    }

    #[test]
    fn test_hash_list_spreads() {
        let set = RluHashList::new(4);
        let mut th = RluThread::new();

        for key in 0..32 {
            assert_eq!(set.add(&mut th, key), UpdateOutcome::Inserted);
        }
        assert_eq!(set.len(), 32);
        for key in 0..32 {
            assert!(set.contains(&mut th, key));
        }
        for key in 0..32 {
            assert_eq!(set.remove(&mut th, key), UpdateOutcome::Removed);
        }
        assert!(set.is_empty());
    }

    #[test]
    fn test_concurrent_disjoint_writers() {
        let set = RluHashList::new(2);

        std::thread::scope(|s| {
            for t in 0..2i32 {
                let set = &set;
                s.spawn(move || {
                    let mut th = RluThread::new();
                    for i in 0..200 {
                        let key = t * 1000 + i;
                        set.add(&mut th, key);
                    }
                    for i in 0..200 {
                        let key = t * 1000 + i;
                        assert!(set.contains(&mut th, key));
                    }
                });
            }
        });

        assert_eq!(set.len(), 400);
    }

    #[test]
    fn test_concurrent_contended_stress() {
        let set = RluHashList::new(1);

        std::thread::scope(|s| {
            for t in 0..4i32 {
                let set = &set;
                s.spawn(move || {
                    let mut th = RluThread::new();
                    for i in 0..300 {
                        let key = (t * 11 + i) % 24;
                        if i % 2 == 0 {
                            set.add(&mut th, key);
                        } else {
                            set.remove(&mut th, key);
                        }
                    }
                });
            }
        });

        // Every key is either present once or absent.
        let mut th = RluThread::new();
        for key in 0..24 {
            let _ = set.contains(&mut th, key);
        }
        assert!(set.len() <= 24);
    }
}
