//! Indexed binary min-heap of pending timers.
//!
//! [`TimerHeap`] orders keys by deadline. The objects behind those keys live
//! elsewhere (an [`Arena`](crate::util::Arena), a `Vec`, anything that
//! implements [`EntryStore`]) and each one carries a [`HeapSlot`]
//! back-reference that the heap rewrites on every move.
//!
//! # Layout
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  TimerHeap                          │
//! │  nodes: Vec<(deadline, key)>        │  ← compact backbone
//! │  [ (1,K3) (4,K1) (3,K7) (9,K2) ]    │
//! └─────────────────────────────────────┘
//!          │ every move writes the slot
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  EntryStore                         │
//! │  K1: heap_slot=1, deadline=4        │
//! │  K2: heap_slot=3, deadline=9        │
//! │  K3: heap_slot=0, deadline=1        │
//! │  K7: heap_slot=2, deadline=3        │
//! └─────────────────────────────────────┘
//! ```
//!
//! Each node caches its object's deadline so sifts compare within the
//! backbone and touch the store only to write slots. The cache is refreshed
//! from the store by [`insert`](TimerHeap::insert) and
//! [`adjust`](TimerHeap::adjust); mutating a deadline of an enqueued object
//! without calling `adjust` leaves the heap stale.
//!
//! # Ordering
//!
//! The root holds the smallest deadline. Only `a > b` is ever evaluated;
//! equal deadlines come out in no particular order.
//!
//! # Growth
//!
//! The backbone starts unallocated and doubles from a floor of eight slots,
//! jumping straight to the requested size when doubling falls short. Growth
//! is fallible and bounded by [`TimerHeapConfig::max_capacity`]; a failed
//! growth returns [`ErrorKind::OutOfMemory`](crate::ErrorKind::OutOfMemory)
//! and leaves the heap untouched.
//!
//! # Complexity
//!
//! | Operation   | Time     |
//! |-------------|----------|
//! | insert      | O(log n) |
//! | extract_min | O(log n) |
//! | erase       | O(log n) |
//! | adjust      | O(log n) |
//! | peek        | O(1)     |

use crate::error::{Error, Result};
use crate::record::{EntryStore, HeapEntry, HeapSlot};
use crate::tracing_compat::trace;
use crate::types::Time;
use core::fmt;

/// Smallest non-zero backbone allocation.
const MIN_GROWTH: usize = 8;

/// Largest position a [`HeapSlot`] can record.
const MAX_SLOTS: usize = i32::MAX as usize;

/// Sizing for a [`TimerHeap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerHeapConfig {
    /// Slots reserved at construction. Zero keeps construction allocation-free.
    pub initial_capacity: usize,
    /// Upper bound on backbone slots. `None` means bounded only by `HeapSlot`.
    pub max_capacity: Option<usize>,
}

impl TimerHeapConfig {
    fn effective_max(&self) -> usize {
        self.max_capacity.map_or(MAX_SLOTS, |max| max.min(MAX_SLOTS))
    }
}

/// Structural problems reported by [`TimerHeap::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapViolation {
    /// A child orders strictly before its parent.
    #[error("slot {index} has an earlier deadline than its parent at slot {parent}")]
    OutOfOrder {
        /// Offending child position.
        index: usize,
        /// Its parent position.
        parent: usize,
    },
    /// An object's back-reference does not point at the slot holding it.
    #[error("slot {index} holds an object whose back-reference is {recorded:?}")]
    SlotMismatch {
        /// Position in the backbone.
        index: usize,
        /// The slot the object recorded.
        recorded: HeapSlot,
    },
    /// A key in the backbone no longer resolves in the store.
    #[error("slot {index} holds a key with no live object")]
    MissingEntry {
        /// Position in the backbone.
        index: usize,
    },
    /// The cached deadline differs from the object's current deadline.
    #[error("slot {index} caches a deadline that no longer matches its object")]
    StaleDeadline {
        /// Position in the backbone.
        index: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct Node<K, D> {
    deadline: D,
    key: K,
}

/// An indexed binary min-heap keyed by deadline.
///
/// # Invariants
///
/// - For every position `i > 0`: `deadline(nodes[i]) >= deadline(nodes[(i-1)/2])`
/// - For every position `i`: `store[nodes[i].key].heap_slot() == i`
/// - Objects not in this heap have `heap_slot() == HeapSlot::DETACHED`
///
/// The heap does no locking. Callers that share one across threads wrap it,
/// as [`SharedTimerQueue`](crate::runtime::SharedTimerQueue) does.
pub struct TimerHeap<K, D = Time> {
    nodes: Vec<Node<K, D>>,
    max_capacity: usize,
}

impl<K, D> Default for TimerHeap<K, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, D> fmt::Debug for TimerHeap<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHeap")
            .field("len", &self.nodes.len())
            .field("capacity", &self.nodes.capacity())
            .field("max_capacity", &self.max_capacity)
            .finish()
    }
}

impl<K, D> TimerHeap<K, D> {
    /// Creates an empty heap. Does not allocate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            max_capacity: MAX_SLOTS,
        }
    }

    /// Returns the number of enqueued objects.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nothing is enqueued.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of slots currently allocated.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    /// Returns the growth bound.
    #[must_use]
    pub const fn max_capacity(&self) -> usize {
        self.max_capacity
    }
}

impl<K, D> TimerHeap<K, D>
where
    K: Copy + PartialEq + fmt::Debug,
    D: Ord + Copy,
{
    /// Creates a heap sized by `config`.
    ///
    /// Fails with `OutOfMemory` if the initial reservation cannot be made or
    /// exceeds the configured bound.
    pub fn with_config(config: TimerHeapConfig) -> Result<Self> {
        let mut heap = Self {
            nodes: Vec::new(),
            max_capacity: config.effective_max(),
        };
        if config.initial_capacity > 0 {
            heap.reserve(config.initial_capacity)?;
        }
        Ok(heap)
    }

    /// Returns the key with the smallest deadline.
    #[must_use]
    #[inline]
    pub fn peek(&self) -> Option<K> {
        self.nodes.first().map(|node| node.key)
    }

    /// Returns the smallest deadline.
    #[must_use]
    #[inline]
    pub fn peek_deadline(&self) -> Option<D> {
        self.nodes.first().map(|node| node.deadline)
    }

    /// Returns true if `key` is currently the heap minimum.
    #[must_use]
    pub fn is_top(&self, key: K) -> bool {
        self.peek() == Some(key)
    }

    /// Ensures at least `min_capacity` slots are allocated.
    ///
    /// Growth doubles the current allocation (starting at eight) and uses
    /// `min_capacity` directly when doubling is not enough.
    pub fn reserve(&mut self, min_capacity: usize) -> Result<()> {
        let current = self.nodes.capacity();
        if current >= min_capacity {
            return Ok(());
        }
        if min_capacity > self.max_capacity {
            trace!(
                requested = min_capacity,
                max = self.max_capacity,
                "timer heap growth refused"
            );
            return Err(Error::out_of_memory(min_capacity));
        }

        let mut target = if current == 0 {
            MIN_GROWTH
        } else {
            current.saturating_mul(2)
        };
        if target < min_capacity {
            target = min_capacity;
        }
        target = target.min(self.max_capacity);

        self.nodes
            .try_reserve_exact(target - self.nodes.len())
            .map_err(|e| {
                trace!(requested = target, "timer heap allocation failed");
                Error::out_of_memory(target).with_source(e)
            })?;
        trace!(from = current, to = self.nodes.capacity(), "timer heap grew");
        Ok(())
    }

    /// Enqueues the detached object behind `key`.
    ///
    /// The object must not already be enqueued; this is checked only in debug
    /// builds. On `OutOfMemory` the object stays detached.
    pub fn insert<S>(&mut self, store: &mut S, key: K) -> Result<()>
    where
        S: EntryStore<K> + ?Sized,
        S::Entry: HeapEntry<Deadline = D>,
    {
        let entry = store
            .entry(key)
            .ok_or_else(|| Error::not_in_heap(format_args!("{key:?}")))?;
        debug_assert!(
            entry.heap_slot().is_detached(),
            "inserting {key:?} which is already at {:?}",
            entry.heap_slot()
        );
        let node = Node {
            deadline: entry.deadline(),
            key,
        };

        self.reserve(self.nodes.len() + 1)?;
        let hole = self.nodes.len();
        self.nodes.push(node);
        self.shift_up(store, hole, node);
        Ok(())
    }

    /// Removes and returns the key with the smallest deadline.
    ///
    /// The removed object's slot becomes `DETACHED`.
    pub fn extract_min<S>(&mut self, store: &mut S) -> Option<K>
    where
        S: EntryStore<K> + ?Sized,
        S::Entry: HeapEntry<Deadline = D>,
    {
        let top = *self.nodes.first()?;
        let last = self.nodes.pop()?;
        if !self.nodes.is_empty() {
            self.shift_down(store, 0, last);
        }
        Self::detach(store, top.key);
        Some(top.key)
    }

    /// Removes the object behind `key` from any position.
    ///
    /// Fails with `NotInHeap` if the object is detached.
    pub fn erase<S>(&mut self, store: &mut S, key: K) -> Result<()>
    where
        S: EntryStore<K> + ?Sized,
        S::Entry: HeapEntry<Deadline = D>,
    {
        let Some(pos) = self.locate(store, key)? else {
            return Err(Error::not_in_heap(format_args!("{key:?}")));
        };

        let Some(last) = self.nodes.pop() else {
            return Err(Error::internal("located a slot in an empty timer heap"));
        };
        if pos < self.nodes.len() {
            if pos > 0 && self.nodes[(pos - 1) / 2].deadline > last.deadline {
                self.shift_up_unconditional(store, pos, last);
            } else {
                self.shift_down(store, pos, last);
            }
        }
        Self::detach(store, key);
        Ok(())
    }

    /// Restores order after the deadline of `key` was changed in place.
    ///
    /// A detached object is inserted instead.
    pub fn adjust<S>(&mut self, store: &mut S, key: K) -> Result<()>
    where
        S: EntryStore<K> + ?Sized,
        S::Entry: HeapEntry<Deadline = D>,
    {
        let Some(pos) = self.locate(store, key)? else {
            return self.insert(store, key);
        };
        let deadline = store
            .entry(key)
            .map(HeapEntry::deadline)
            .ok_or_else(|| Error::not_in_heap(format_args!("{key:?}")))?;
        let node = Node { deadline, key };

        if pos > 0 && self.nodes[(pos - 1) / 2].deadline > node.deadline {
            self.shift_up_unconditional(store, pos, node);
        } else {
            self.shift_down(store, pos, node);
        }
        Ok(())
    }

    /// Extracts every object whose deadline is `<= now`, earliest first.
    pub fn pop_expired<S>(&mut self, store: &mut S, now: D) -> Vec<K>
    where
        S: EntryStore<K> + ?Sized,
        S::Entry: HeapEntry<Deadline = D>,
    {
        let mut expired = Vec::new();
        while self.peek_deadline().is_some_and(|deadline| deadline <= now) {
            match self.extract_min(store) {
                Some(key) => expired.push(key),
                None => break,
            }
        }
        expired
    }

    /// Detaches every enqueued object and empties the heap.
    ///
    /// The allocation is kept.
    pub fn clear<S>(&mut self, store: &mut S)
    where
        S: EntryStore<K> + ?Sized,
        S::Entry: HeapEntry<Deadline = D>,
    {
        for node in self.nodes.drain(..) {
            if let Some(entry) = store.entry_mut(node.key) {
                entry.set_heap_slot(HeapSlot::DETACHED);
            }
        }
    }

    /// Verifies heap order, back-references and cached deadlines.
    pub fn check_invariants<S>(&self, store: &S) -> core::result::Result<(), HeapViolation>
    where
        S: EntryStore<K> + ?Sized,
        S::Entry: HeapEntry<Deadline = D>,
    {
        for (index, node) in self.nodes.iter().enumerate() {
            let entry = store
                .entry(node.key)
                .ok_or(HeapViolation::MissingEntry { index })?;
            let recorded = entry.heap_slot();
            if recorded.position() != Some(index) {
                return Err(HeapViolation::SlotMismatch { index, recorded });
            }
            if entry.deadline() != node.deadline {
                return Err(HeapViolation::StaleDeadline { index });
            }
            if index > 0 {
                let parent = (index - 1) / 2;
                if self.nodes[parent].deadline > node.deadline {
                    return Err(HeapViolation::OutOfOrder { index, parent });
                }
            }
        }
        Ok(())
    }

    /// Resolves `key` to its position. `None` means detached.
    fn locate<S>(&self, store: &S, key: K) -> Result<Option<usize>>
    where
        S: EntryStore<K> + ?Sized,
    {
        let entry = store
            .entry(key)
            .ok_or_else(|| Error::not_in_heap(format_args!("{key:?}")))?;
        let Some(pos) = entry.heap_slot().position() else {
            return Ok(None);
        };
        match self.nodes.get(pos) {
            Some(node) if node.key == key => Ok(Some(pos)),
            _ => Err(Error::internal(format!(
                "{key:?} records slot {pos} which it does not occupy"
            ))),
        }
    }

    /// Writes `node` into `hole` and updates its back-reference.
    #[inline]
    fn place<S>(&mut self, store: &mut S, hole: usize, node: Node<K, D>)
    where
        S: EntryStore<K> + ?Sized,
    {
        self.nodes[hole] = node;
        if let Some(entry) = store.entry_mut(node.key) {
            entry.set_heap_slot(HeapSlot::at(hole));
        }
    }

    fn detach<S>(store: &mut S, key: K)
    where
        S: EntryStore<K> + ?Sized,
    {
        if let Some(entry) = store.entry_mut(key) {
            entry.set_heap_slot(HeapSlot::DETACHED);
        }
    }

    /// Moves `node` up from `hole` while its parent is later.
    fn shift_up<S>(&mut self, store: &mut S, mut hole: usize, node: Node<K, D>)
    where
        S: EntryStore<K> + ?Sized,
    {
        while hole > 0 {
            let parent = (hole - 1) / 2;
            let above = self.nodes[parent];
            if above.deadline <= node.deadline {
                break;
            }
            self.place(store, hole, above);
            hole = parent;
        }
        self.place(store, hole, node);
    }

    /// Like [`shift_up`](Self::shift_up) but always moves at least one level.
    ///
    /// Callers have already established that the parent of `hole` is later
    /// than `node`, so `hole` must be non-zero.
    fn shift_up_unconditional<S>(&mut self, store: &mut S, mut hole: usize, node: Node<K, D>)
    where
        S: EntryStore<K> + ?Sized,
    {
        debug_assert!(hole > 0);
        loop {
            let parent = (hole - 1) / 2;
            let above = self.nodes[parent];
            self.place(store, hole, above);
            hole = parent;
            if hole == 0 || self.nodes[(hole - 1) / 2].deadline <= node.deadline {
                break;
            }
        }
        self.place(store, hole, node);
    }

    /// Moves `node` down from `hole`, swapping with the smaller child while
    /// that child is earlier.
    fn shift_down<S>(&mut self, store: &mut S, mut hole: usize, node: Node<K, D>)
    where
        S: EntryStore<K> + ?Sized,
    {
        let len = self.nodes.len();
        let mut child = 2 * (hole + 1);
        while child <= len {
            if child == len || self.nodes[child].deadline > self.nodes[child - 1].deadline {
                child -= 1;
            }
            let below = self.nodes[child];
            if node.deadline <= below.deadline {
                break;
            }
            self.place(store, hole, below);
            hole = child;
            child = 2 * (hole + 1);
        }
        self.place(store, hole, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use crate::{assert_with_log, test_complete, test_phase};

    #[derive(Debug, Clone)]
    struct Item {
        deadline: u64,
        slot: HeapSlot,
    }

    impl Item {
        fn new(deadline: u64) -> Self {
            Self {
                deadline,
                slot: HeapSlot::DETACHED,
            }
        }
    }

    impl HeapEntry for Item {
        type Deadline = u64;

        fn deadline(&self) -> u64 {
            self.deadline
        }

        fn heap_slot(&self) -> HeapSlot {
            self.slot
        }

        fn set_heap_slot(&mut self, slot: HeapSlot) {
            self.slot = slot;
        }
    }

    fn filled(deadlines: &[u64]) -> (TimerHeap<usize, u64>, Vec<Item>) {
        let mut items: Vec<Item> = deadlines.iter().copied().map(Item::new).collect();
        let mut heap = TimerHeap::new();
        for key in 0..items.len() {
            heap.insert(&mut items, key).expect("insert");
        }
        heap.check_invariants(&items).expect("invariants");
        (heap, items)
    }

    fn drain(heap: &mut TimerHeap<usize, u64>, items: &mut Vec<Item>) -> Vec<u64> {
        let mut out = Vec::new();
        while let Some(key) = heap.extract_min(items) {
            out.push(items[key].deadline);
            heap.check_invariants(&*items).expect("invariants");
        }
        out
    }

    #[test]
    fn new_heap_is_empty_and_unallocated() {
        let heap: TimerHeap<usize, u64> = TimerHeap::new();
        assert!(heap.is_empty());
        assert_eq!(heap.len(), 0);
        assert_eq!(heap.capacity(), 0);
        assert_eq!(heap.peek(), None);
        assert_eq!(heap.peek_deadline(), None);
    }

    #[test]
    fn extracts_in_deadline_order() {
        init_test_logging();
        test_phase!("extracts_in_deadline_order");

        let (mut heap, mut items) = filled(&[5, 3, 8, 1, 4]);
        assert_eq!(heap.peek(), Some(3));
        assert!(items[3].is_heap_top());

        let order = drain(&mut heap, &mut items);
        assert_with_log!(
            order == vec![1, 3, 4, 5, 8],
            "extraction order",
            vec![1, 3, 4, 5, 8],
            order
        );
        assert!(items.iter().all(|item| item.slot.is_detached()));
        test_complete!("extracts_in_deadline_order");
    }

    #[test]
    fn erase_middle_element() {
        let (mut heap, mut items) = filled(&[10, 20, 30]);
        heap.erase(&mut items, 1).expect("erase");
        assert_eq!(items[1].slot, HeapSlot::DETACHED);
        assert_eq!(heap.len(), 2);
        heap.check_invariants(&items).expect("invariants");
        assert_eq!(drain(&mut heap, &mut items), vec![10, 30]);
    }

    #[test]
    fn erase_detached_reports_not_in_heap() {
        let (mut heap, mut items) = filled(&[10, 20]);
        heap.extract_min(&mut items);
        let err = heap.erase(&mut items, 0).expect_err("detached");
        assert!(err.is_not_in_heap());
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn erase_last_position() {
        let (mut heap, mut items) = filled(&[1, 2, 3, 4]);
        let last_key = (0..items.len())
            .find(|&k| items[k].slot.position() == Some(3))
            .expect("someone at slot 3");
        heap.erase(&mut items, last_key).expect("erase");
        heap.check_invariants(&items).expect("invariants");
        assert_eq!(heap.len(), 3);
    }

    #[test]
    fn erase_moves_replacement_up() {
        // Replacement (last element) is earlier than the erased slot's parent.
        let (mut heap, mut items) = filled(&[1, 10, 2, 11, 12, 3, 4]);
        let key = (0..items.len())
            .find(|&k| items[k].deadline == 11)
            .expect("present");
        heap.erase(&mut items, key).expect("erase");
        heap.check_invariants(&items).expect("invariants");
        assert_eq!(drain(&mut heap, &mut items), vec![1, 2, 3, 4, 10, 12]);
    }

    #[test]
    fn adjust_earlier_and_later() {
        let (mut heap, mut items) = filled(&[5, 3, 8, 1, 4]);

        items[2].deadline = 0;
        heap.adjust(&mut items, 2).expect("adjust");
        assert_eq!(heap.peek(), Some(2));
        heap.check_invariants(&items).expect("invariants");

        items[2].deadline = 100;
        heap.adjust(&mut items, 2).expect("adjust");
        assert_eq!(heap.peek(), Some(3));
        heap.check_invariants(&items).expect("invariants");

        assert_eq!(drain(&mut heap, &mut items), vec![1, 3, 4, 5, 100]);
    }

    #[test]
    fn adjust_detached_inserts() {
        let mut items = vec![Item::new(7)];
        let mut heap = TimerHeap::new();
        heap.adjust(&mut items, 0).expect("adjust");
        assert_eq!(heap.len(), 1);
        assert!(items[0].is_heap_top());
    }

    #[test]
    fn unknown_key_is_not_in_heap() {
        let mut items = vec![Item::new(1)];
        let mut heap: TimerHeap<usize, u64> = TimerHeap::new();
        assert!(heap.insert(&mut items, 9).expect_err("oob").is_not_in_heap());
        assert!(heap.adjust(&mut items, 9).expect_err("oob").is_not_in_heap());
    }

    #[test]
    fn growth_doubles_from_eight() {
        let mut items: Vec<Item> = (0..9).map(Item::new).collect();
        let mut heap = TimerHeap::new();
        heap.insert(&mut items, 0).expect("insert");
        assert_eq!(heap.capacity(), 8);
        for key in 1..9 {
            heap.insert(&mut items, key).expect("insert");
        }
        assert_eq!(heap.capacity(), 16);
    }

    #[test]
    fn reserve_jumps_to_request() {
        let mut heap: TimerHeap<usize, u64> = TimerHeap::new();
        heap.reserve(100).expect("reserve");
        assert_eq!(heap.capacity(), 100);
        heap.reserve(10).expect("no-op");
        assert_eq!(heap.capacity(), 100);
    }

    #[test]
    fn bounded_heap_fails_cleanly() {
        init_test_logging();
        let config = TimerHeapConfig {
            initial_capacity: 0,
            max_capacity: Some(2),
        };
        let mut heap = TimerHeap::with_config(config).expect("config");
        let mut items: Vec<Item> = [3, 1, 2].into_iter().map(Item::new).collect();
        heap.insert(&mut items, 0).expect("insert");
        heap.insert(&mut items, 1).expect("insert");

        let err = heap.insert(&mut items, 2).expect_err("bounded");
        assert_eq!(err.kind(), crate::ErrorKind::OutOfMemory);
        assert!(items[2].slot.is_detached());
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.capacity(), 2);
        heap.check_invariants(&items).expect("invariants");
    }

    #[test]
    fn pop_expired_stops_at_now() {
        let (mut heap, mut items) = filled(&[50, 10, 30, 70]);
        let expired = heap.pop_expired(&mut items, 30);
        let deadlines: Vec<u64> = expired.iter().map(|&k| items[k].deadline).collect();
        assert_eq!(deadlines, vec![10, 30]);
        assert_eq!(heap.peek_deadline(), Some(50));
    }

    #[test]
    fn clear_detaches_everything() {
        let (mut heap, mut items) = filled(&[4, 2, 9]);
        let capacity = heap.capacity();
        heap.clear(&mut items);
        assert!(heap.is_empty());
        assert_eq!(heap.capacity(), capacity);
        assert!(items.iter().all(|item| !item.is_enqueued()));
    }

    #[test]
    fn stale_deadline_is_reported() {
        let (heap, mut items) = filled(&[1, 2]);
        items[1].deadline = 0;
        assert!(matches!(
            heap.check_invariants(&items),
            Err(HeapViolation::StaleDeadline { .. })
        ));
    }
}
