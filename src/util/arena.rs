//! Generational arena holding timer records.
//!
//! The arena gives every record a stable [`ArenaIndex`] for as long as it
//! lives, which is what lets the timer heap store plain indices instead of
//! references. Vacated slots are recycled through a free list and their
//! generation is bumped, so an index held past removal resolves to `None`
//! rather than to whichever record reused the slot.
//!
//! Growth is fallible: inserting into a full arena reserves space with
//! `try_reserve` and reports [`ErrorKind::OutOfMemory`](crate::error::ErrorKind)
//! instead of aborting.

use crate::error::{Error, Result};
use core::fmt;
use core::hash::{Hash, Hasher};

/// An index into an arena with a generation counter for ABA safety.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArenaIndex {
    index: u32,
    generation: u32,
}

impl ArenaIndex {
    /// Creates a new arena index (primarily for testing).
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the raw slot number.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation counter.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaIndex({}:{})", self.index, self.generation)
    }
}

impl Hash for ArenaIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let packed = (u64::from(self.index) << 32) | u64::from(self.generation);
        state.write_u64(packed);
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied {
        value: T,
        generation: u32,
    },
    Vacant {
        next_free: Option<u32>,
        generation: u32,
    },
}

/// A generational arena with free-list slot reuse.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates a new empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Returns the number of occupied slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the arena has no occupied slots.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a value produced by `f` and returns its index.
    ///
    /// The closure receives the assigned index so records can embed their own
    /// id. Nothing is inserted if growing the slot vector fails.
    pub fn try_insert_with<F>(&mut self, f: F) -> Result<ArenaIndex>
    where
        F: FnOnce(ArenaIndex) -> T,
    {
        if let Some(free_index) = self.free_head {
            let slot = &mut self.slots[free_index as usize];
            let Slot::Vacant {
                next_free,
                generation,
            } = *slot
            else {
                return Err(Error::internal("arena free list points at an occupied slot"));
            };
            let idx = ArenaIndex {
                index: free_index,
                generation,
            };
            *slot = Slot::Occupied {
                value: f(idx),
                generation,
            };
            self.free_head = next_free;
            self.len += 1;
            return Ok(idx);
        }

        let index = u32::try_from(self.slots.len())
            .map_err(|_| Error::out_of_memory(self.slots.len().saturating_add(1)))?;
        self.slots.try_reserve(1)?;
        let idx = ArenaIndex {
            index,
            generation: 0,
        };
        self.slots.push(Slot::Occupied {
            value: f(idx),
            generation: 0,
        });
        self.len += 1;
        Ok(idx)
    }

    /// Removes the value at the given index and returns it.
    ///
    /// Returns `None` if the index is stale or the slot is vacant.
    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let slot = self.slots.get_mut(index.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == index.generation => {
                let vacated = Slot::Vacant {
                    next_free: self.free_head,
                    generation: generation.wrapping_add(1),
                };
                let old = core::mem::replace(slot, vacated);
                self.free_head = Some(index.index);
                self.len -= 1;
                match old {
                    Slot::Occupied { value, .. } => Some(value),
                    Slot::Vacant { .. } => None,
                }
            }
            _ => None,
        }
    }

    /// Returns a reference to the value at the given index.
    #[must_use]
    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        match self.slots.get(index.index as usize)? {
            Slot::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Returns a mutable reference to the value at the given index.
    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        match self.slots.get_mut(index.index as usize)? {
            Slot::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Returns true if the index points at a live value.
    #[must_use]
    pub fn contains(&self, index: ArenaIndex) -> bool {
        self.get(index).is_some()
    }

    /// Removes every value, bumping generations so outstanding indices go stale.
    pub fn clear(&mut self) {
        let mut next_free = None;
        for (i, slot) in self.slots.iter_mut().enumerate().rev() {
            let generation = match slot {
                Slot::Occupied { generation, .. } => generation.wrapping_add(1),
                Slot::Vacant { generation, .. } => *generation,
            };
            *slot = Slot::Vacant {
                next_free,
                generation,
            };
            next_free = Some(i as u32);
        }
        self.free_head = next_free;
        self.len = 0;
    }
}
