//! Records for objects tracked by the timer heap.
//!
//! The heap never owns what it orders. It stores keys, and reaches each
//! tracked object's deadline and heap slot through an [`EntryStore`]. This
//! module defines that contract and the concrete [`TimerRecord`] used by
//! [`TimerQueue`](crate::runtime::TimerQueue).

pub mod timer;

pub use timer::{EntryStore, HeapEntry, HeapSlot, TimerRecord};
