//! Sentinel-bounded sorted list and the hash-list bucket array.
//!
//! Every bucket is a singly-linked list of integer keys in strictly
//! ascending order, bookended by `i32::MIN` and `i32::MAX` sentinels that
//! are never unlinked. All synchronization protocols share the same
//! traversal; they differ only in how they commit the pointer swing, so
//! the mutation paths live in the protocol modules and this one owns the
//! node layout, the traversal, the lock-free lookup and the quiescent
//! inspection helpers.

use core::sync::atomic::{AtomicBool, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::CachePadded;

use crate::spinlock::RawSpinLock;
use crate::topology::MAX_NUMA_NODES;

/// Key type stored by the set.
pub type Key = i32;

/// Head sentinel value.
pub const KEY_MIN: Key = Key::MIN;
/// Tail sentinel value.
pub const KEY_MAX: Key = Key::MAX;

/// Maximum number of buckets in a hash list.
pub const MAX_BUCKETS: usize = 1000;

/// Whether `key` may be stored (sentinel values are reserved).
#[inline]
pub(crate) fn key_in_range(key: Key) -> bool {
    key > KEY_MIN && key < KEY_MAX
}

/// Outcome of an add or remove attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The key was absent and has been inserted.
    Inserted,
    /// The key was already present; nothing changed.
    AlreadyPresent,
    /// The key was present and has been unlinked.
    Removed,
    /// The key was absent; nothing changed.
    NotFound,
    /// The protocol hit a conflict it does not recover from locally.
    Conflict,
    /// The retry policy gave up at the benchmark deadline.
    DeadlineExpired,
}

impl UpdateOutcome {
    /// Whether the attempt ended without deciding membership.
    #[inline]
    pub fn is_abort(self) -> bool {
        matches!(self, UpdateOutcome::Conflict | UpdateOutcome::DeadlineExpired)
    }
}

/// A list element.
///
/// The two lock tiers double as plain flags for the protocols that
/// acquire them inside a short hardware transaction: `numa_locks[n]` is
/// the tier local to NUMA node `n`, `lock` is the globally shared tier.
/// Each sits on its own cache line.
#[repr(C)]
pub struct Node {
    pub(crate) val: Key,
    pub(crate) next: Atomic<Node>,
    pub(crate) removed: AtomicBool,
    pub(crate) numa_locks: [CachePadded<RawSpinLock>; MAX_NUMA_NODES],
    pub(crate) lock: CachePadded<RawSpinLock>,
}

impl Node {
    pub(crate) fn new(val: Key) -> Self {
        Self {
            val,
            next: Atomic::null(),
            removed: AtomicBool::new(false),
            numa_locks: core::array::from_fn(|_| CachePadded::new(RawSpinLock::new())),
            lock: CachePadded::new(RawSpinLock::new()),
        }
    }

    /// Key this node represents.
    #[inline]
    pub fn val(&self) -> Key {
        self.val
    }

    /// Whether the node has been unlinked.
    #[inline]
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Relaxed)
    }
}

/// Allocate a node linked to `next`, without publishing it.
pub(crate) fn alloc_node<'g>(key: Key, next: Shared<'g, Node>, guard: &'g Guard) -> Shared<'g, Node> {
    let node = Node::new(key);
    node.next.store(next, Ordering::Relaxed);
    Owned::new(node).into_shared(guard)
}

/// Reclaim a node that was never published.
///
/// # Safety
///
/// `node` must have come from [`alloc_node`] and must not be reachable
/// from any list.
pub(crate) unsafe fn discard_node(node: Shared<'_, Node>) {
    drop(node.into_owned());
}

/// One sorted bucket: head sentinel, tail sentinel, writer spinlock.
pub struct List {
    pub(crate) head: Atomic<Node>,
    pub(crate) writer_lock: CachePadded<RawSpinLock>,
}

impl List {
    /// Create an empty list holding only the two sentinels.
    pub fn new() -> Self {
        let tail = Owned::new(Node::new(KEY_MAX));
        let mut head = Node::new(KEY_MIN);
        head.next = Atomic::from(tail);

        Self {
            head: Atomic::new(head),
            writer_lock: CachePadded::new(RawSpinLock::new()),
        }
    }

    /// Walk from the head until the first node whose value is `>= key`.
    ///
    /// Returns `(prev, curr)` where `prev` is the last node with a value
    /// below `key`. `curr` is never null: the tail sentinel bounds the
    /// walk.
    pub(crate) fn find<'g>(&self, key: Key, guard: &'g Guard) -> (Shared<'g, Node>, Shared<'g, Node>) {
        let mut prev = self.head.load(Ordering::Acquire, guard);
        let mut curr = unsafe { prev.deref() }.next.load(Ordering::Acquire, guard);
        loop {
            let node = unsafe { curr.deref() };
            if node.val >= key {
                return (prev, curr);
            }
            prev = curr;
            curr = node.next.load(Ordering::Acquire, guard);
        }
    }

    /// Lock-free membership test under a reader guard.
    pub fn contains(&self, key: Key) -> bool {
        if !key_in_range(key) {
            return false;
        }
        let guard = epoch::pin();
        let (_, curr) = self.find(key, &guard);
        unsafe { curr.deref() }.val == key
    }

    /// Number of keys between the sentinels, observed quiescently.
    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        let mut size = 0;
        let head = self.head.load(Ordering::Acquire, &guard);
        let mut curr = unsafe { head.deref() }.next.load(Ordering::Acquire, &guard);
        loop {
            let node = unsafe { curr.deref() };
            if node.val == KEY_MAX {
                return size;
            }
            size += 1;
            curr = node.next.load(Ordering::Acquire, &guard);
        }
    }

    /// Whether the list holds no keys besides the sentinels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Panic unless the quiescent invariants hold: sentinel bounds,
    /// strictly ascending values, null only at the tail, every lock tier
    /// released, `removed` clear on every reachable node.
    pub fn assert_quiescent(&self) {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);
        let head_ref = unsafe { head.deref() };
        assert_eq!(head_ref.val, KEY_MIN, "head sentinel value");

        let mut prev_val = KEY_MIN;
        let mut curr = head_ref.next.load(Ordering::Acquire, &guard);
        loop {
            assert!(!curr.is_null(), "null link before the tail sentinel");
            let node = unsafe { curr.deref() };
            assert!(node.val > prev_val, "values not strictly ascending");
            assert!(!node.is_removed(), "reachable node marked removed");
            assert!(!node.lock.is_locked(), "node lock still held");
            for l in node.numa_locks.iter() {
                assert!(!l.is_locked(), "per-node lock still held");
            }
            if node.val == KEY_MAX {
                assert!(
                    node.next.load(Ordering::Acquire, &guard).is_null(),
                    "tail sentinel has a successor"
                );
                return;
            }
            prev_val = node.val;
            curr = node.next.load(Ordering::Acquire, &guard);
        }
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for List {
    fn drop(&mut self) {
        // Exclusive access: walk and free directly, no deferral needed.
        unsafe {
            let guard = epoch::unprotected();
            let mut curr = self.head.load(Ordering::Relaxed, guard);
            while !curr.is_null() {
                let next = curr.deref().next.load(Ordering::Relaxed, guard);
                drop(curr.into_owned());
                curr = next;
            }
        }
    }
}

/// Fixed-capacity array of bucket lists keyed by `key mod n_buckets`.
pub struct HashList {
    buckets: Box<[List]>,
}

impl HashList {
    /// Build a hash list with `n_buckets` buckets.
    ///
    /// # Panics
    ///
    /// If `n_buckets` is outside `[1, MAX_BUCKETS]`; the driver validates
    /// its configuration before construction.
    pub fn new(n_buckets: usize) -> Self {
        assert!(
            (1..=MAX_BUCKETS).contains(&n_buckets),
            "bucket count {n_buckets} outside [1, {MAX_BUCKETS}]"
        );
        Self {
            buckets: (0..n_buckets).map(|_| List::new()).collect(),
        }
    }

    /// Number of buckets.
    #[inline]
    pub fn n_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// The bucket responsible for `key`.
    #[cfg(not(feature = "static-partition"))]
    #[inline]
    pub fn bucket_of(&self, key: Key) -> &List {
        let idx = key.rem_euclid(self.buckets.len() as Key) as usize;
        &self.buckets[idx]
    }

    /// The bucket for the current CPU under the static partition study
    /// configuration.
    #[cfg(feature = "static-partition")]
    #[inline]
    pub fn bucket_of(&self, _key: Key) -> &List {
        const STATIC_PARTITION: usize = 71;
        let idx = crate::topology::current_cpu() % STATIC_PARTITION % self.buckets.len();
        &self.buckets[idx]
    }

    /// Lock-free membership test.
    #[inline]
    pub fn contains(&self, key: Key) -> bool {
        key_in_range(key) && self.bucket_of(key).contains(key)
    }

    /// Total number of keys, observed quiescently.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(List::len).sum()
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
    fn test_new_list_is_empty() {
        let list = List::new();
        assert!(list.is_empty());
        list.assert_quiescent();
    }

    #[test]
    fn test_contains_on_empty() {
        let list = List::new();
        assert!(!list.contains(10));
    }

    #[test]
    fn test_sentinel_keys_rejected() {
        let list = List::new();
        assert!(!list.contains(KEY_MIN));
        assert!(!list.contains(KEY_MAX));
    }

    #[test]
    fn test_hash_list_bucket_spread() {
        let set = HashList::new(8);
        assert_eq!(set.n_buckets(), 8);
        assert!(set.is_empty());
        set.assert_quiescent();
    }

    #[test]
    #[should_panic]
    fn test_zero_buckets_rejected() {
        let _ = HashList::new(0);
    }

    #[cfg(not(feature = "static-partition"))]
    #[test]
    fn test_negative_keys_map_to_valid_bucket() {
        let set = HashList::new(7);
        // rem_euclid keeps the index in range for any admissible key.
        assert!(!set.contains(-5));
    }
}
