//! Timer queue for deadline management.
//!
//! [`TimerQueue`] owns its timer records in a generational arena and orders
//! them with a [`TimerHeap`]. Callers hold [`TimerId`]s; an id stays valid
//! until its timer fires or is cancelled, after which every operation on it
//! reports `NotInHeap`.

use crate::error::{Error, Result};
use crate::record::{EntryStore, HeapEntry, TimerRecord};
use crate::runtime::timer_heap::{TimerHeap, TimerHeapConfig};
use crate::types::{Time, TimerId};
use crate::util::Arena;

/// A min-queue of timers ordered by deadline.
#[derive(Debug, Default)]
pub struct TimerQueue {
    records: Arena<TimerRecord>,
    heap: TimerHeap<TimerId>,
}

impl TimerQueue {
    /// Creates a new empty timer queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue whose heap is sized by `config`.
    pub fn with_config(config: TimerHeapConfig) -> Result<Self> {
        Ok(Self {
            records: Arena::new(),
            heap: TimerHeap::with_config(config)?,
        })
    }

    /// Returns the number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if no timer is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Arms a new timer.
    ///
    /// If the heap cannot grow the timer is not created.
    pub fn schedule(&mut self, deadline: Time) -> Result<TimerId> {
        let idx = self
            .records
            .try_insert_with(|idx| TimerRecord::new(TimerId::from_arena(idx), deadline))?;
        let id = TimerId::from_arena(idx);
        if let Err(err) = self.heap.insert(&mut self.records, id) {
            self.records.remove(idx);
            return Err(err);
        }
        Ok(id)
    }

    /// Disarms a pending timer and returns the deadline it had.
    pub fn cancel(&mut self, id: TimerId) -> Result<Time> {
        self.heap.erase(&mut self.records, id)?;
        self.records
            .remove(id.arena_index())
            .map(|record| record.deadline)
            .ok_or_else(|| Error::internal(format!("{id} vanished while being cancelled")))
    }

    /// Moves a pending timer to a new deadline.
    pub fn reschedule(&mut self, id: TimerId, deadline: Time) -> Result<()> {
        let record = self
            .records
            .entry_mut(id)
            .ok_or_else(|| Error::not_in_heap(id))?;
        record.deadline = deadline;
        record.reschedules = record.reschedules.saturating_add(1);
        self.heap.adjust(&mut self.records, id)
    }

    /// Returns the deadline of a pending timer.
    #[must_use]
    pub fn deadline(&self, id: TimerId) -> Option<Time> {
        self.records.entry(id).map(HeapEntry::deadline)
    }

    /// Returns true if the timer has neither fired nor been cancelled.
    #[must_use]
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.records.entry(id).is_some_and(HeapEntry::is_enqueued)
    }

    /// Returns true if the timer is the next one to fire.
    #[must_use]
    pub fn is_next(&self, id: TimerId) -> bool {
        self.records.entry(id).is_some_and(HeapEntry::is_heap_top)
    }

    /// Returns the earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Time> {
        self.heap.peek_deadline()
    }

    /// Fires the earliest timer regardless of the current time.
    pub fn pop_next(&mut self) -> Option<(TimerId, Time)> {
        let id = self.heap.extract_min(&mut self.records)?;
        let record = self.records.remove(id.arena_index())?;
        Some((id, record.deadline))
    }

    /// Fires every timer with a deadline `<= now`, earliest first.
    pub fn pop_expired(&mut self, now: Time) -> Vec<TimerId> {
        let expired = self.heap.pop_expired(&mut self.records, now);
        for id in &expired {
            self.records.remove(id.arena_index());
        }
        expired
    }

    /// Cancels every pending timer.
    pub fn clear(&mut self) {
        self.heap.clear(&mut self.records);
        self.records.clear();
    }

    /// Returns the underlying heap, for inspection.
    #[must_use]
    pub fn heap(&self) -> &TimerHeap<TimerId> {
        &self.heap
    }

    /// Verifies heap order and back-references.
    pub fn check_invariants(
        &self,
    ) -> core::result::Result<(), crate::runtime::timer_heap::HeapViolation> {
        self.heap.check_invariants(&self.records)
    }
}
