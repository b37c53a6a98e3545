//! The tracked-object contract and the timer record.
//!
//! Every object the heap orders carries a [`HeapSlot`]: `-1` while detached,
//! otherwise its current position in the heap array. The heap keeps that
//! back-reference up to date on every move, which is what makes erase and
//! adjust at an arbitrary position `O(log n)`.

use crate::types::{Time, TimerId};
use crate::util::{Arena, ArenaIndex};
use core::fmt;

/// Position of a tracked object in a timer heap, or detached.
///
/// The raw representation is a signed integer where `-1` means "not
/// enqueued". Positions are bounded by `i32::MAX`, which the heap enforces
/// when it grows.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapSlot(i32);

impl HeapSlot {
    /// The slot of an object that is not in any heap.
    pub const DETACHED: Self = Self(-1);

    /// The slot of the heap minimum.
    pub const TOP: Self = Self(0);

    /// Returns the slot for heap position `pos`.
    ///
    /// Positions past `i32::MAX` cannot be represented and map to
    /// [`DETACHED`](Self::DETACHED); the heap never grows that far.
    #[must_use]
    pub fn at(pos: usize) -> Self {
        i32::try_from(pos).map_or(Self::DETACHED, Self)
    }

    /// Returns the raw signed value (`-1` when detached).
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Returns the heap position, or `None` when detached.
    #[must_use]
    pub const fn position(self) -> Option<usize> {
        if self.0 < 0 {
            None
        } else {
            Some(self.0 as usize)
        }
    }

    /// Returns true when the object is not enqueued.
    #[must_use]
    pub const fn is_detached(self) -> bool {
        self.0 < 0
    }
}

impl Default for HeapSlot {
    fn default() -> Self {
        Self::DETACHED
    }
}

impl fmt::Debug for HeapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position() {
            Some(pos) => write!(f, "HeapSlot({pos})"),
            None => f.write_str("HeapSlot(detached)"),
        }
    }
}

/// An object that can be ordered by a [`TimerHeap`](crate::runtime::TimerHeap).
///
/// Implementors store the slot handed to them by the heap and return it
/// unchanged. The deadline may be mutated by the owner only while the object
/// is detached, or immediately before calling `adjust`.
pub trait HeapEntry {
    /// Totally ordered deadline type. Ties are allowed.
    type Deadline: Ord + Copy;

    /// Returns the absolute deadline of this object.
    fn deadline(&self) -> Self::Deadline;

    /// Returns the stored back-reference.
    fn heap_slot(&self) -> HeapSlot;

    /// Overwrites the stored back-reference.
    fn set_heap_slot(&mut self, slot: HeapSlot);

    /// Returns true if this object is currently the heap minimum.
    fn is_heap_top(&self) -> bool {
        self.heap_slot() == HeapSlot::TOP
    }

    /// Returns true if this object is enqueued in a heap.
    fn is_enqueued(&self) -> bool {
        !self.heap_slot().is_detached()
    }
}

/// Storage that resolves heap keys to tracked objects.
///
/// A key that does not resolve is treated as "not in heap" by the entry
/// points and skipped by internal moves.
pub trait EntryStore<K> {
    /// The tracked object type.
    type Entry: HeapEntry;

    /// Looks up the object for `key`.
    fn entry(&self, key: K) -> Option<&Self::Entry>;

    /// Looks up the object for `key` mutably.
    fn entry_mut(&mut self, key: K) -> Option<&mut Self::Entry>;
}

impl<T: HeapEntry> EntryStore<ArenaIndex> for Arena<T> {
    type Entry = T;

    fn entry(&self, key: ArenaIndex) -> Option<&T> {
        self.get(key)
    }

    fn entry_mut(&mut self, key: ArenaIndex) -> Option<&mut T> {
        self.get_mut(key)
    }
}

impl<T: HeapEntry> EntryStore<usize> for [T] {
    type Entry = T;

    fn entry(&self, key: usize) -> Option<&T> {
        self.get(key)
    }

    fn entry_mut(&mut self, key: usize) -> Option<&mut T> {
        self.get_mut(key)
    }
}

impl<T: HeapEntry> EntryStore<usize> for Vec<T> {
    type Entry = T;

    fn entry(&self, key: usize) -> Option<&T> {
        self.get(key)
    }

    fn entry_mut(&mut self, key: usize) -> Option<&mut T> {
        self.get_mut(key)
    }
}

/// Record for a timer owned by a [`TimerQueue`](crate::runtime::TimerQueue).
#[derive(Debug, Clone)]
pub struct TimerRecord {
    /// Identifier handed to the caller at schedule time.
    pub id: TimerId,
    /// Absolute deadline.
    pub deadline: Time,
    /// Number of times the deadline was moved after scheduling.
    pub reschedules: u32,
    heap_slot: HeapSlot,
}

impl TimerRecord {
    /// Creates a detached record.
    #[must_use]
    pub const fn new(id: TimerId, deadline: Time) -> Self {
        Self {
            id,
            deadline,
            reschedules: 0,
            heap_slot: HeapSlot::DETACHED,
        }
    }
}

impl HeapEntry for TimerRecord {
    type Deadline = Time;

    fn deadline(&self) -> Time {
        self.deadline
    }

    fn heap_slot(&self) -> HeapSlot {
        self.heap_slot
    }

    fn set_heap_slot(&mut self, slot: HeapSlot) {
        self.heap_slot = slot;
    }
}

impl EntryStore<TimerId> for Arena<TimerRecord> {
    type Entry = TimerRecord;

    fn entry(&self, key: TimerId) -> Option<&TimerRecord> {
        self.get(key.arena_index())
    }

    fn entry_mut(&mut self, key: TimerId) -> Option<&mut TimerRecord> {
        self.get_mut(key.arena_index())
    }
}
