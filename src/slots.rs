//! Fixed-capacity slot table — admission control and per-task bookkeeping.
//!
//! One [`SlotTable`] is owned exclusively by the event loop (`server::run`).
//! It is the sole authority over which connections are currently admitted
//! and what state each occupied slot is in. See SPEC_FULL.md §4.1 and §3
//! (Data Model) and `spec.md` §4.1/§9 ("Free list in-band", "Per-slot
//! state machine").
//!
//! The free list is still stored in-band (each free slot holds the index
//! of the next free slot), matching the original's O(1) acquire/release,
//! but as a tagged enum variant rather than a sign-punned integer.

/// Terminator for the in-band free list: one past the last valid index.
const END_OF_LIST: usize = usize::MAX;

#[derive(Debug)]
enum SlotState {
    Free { next: usize },
    Reading,
    Launched { child_id: u32, retains_client: bool },
}

/// Errors returned by state-transition methods when a slot is not in the
/// state the caller expected. These indicate a bug in the caller (an
/// event arriving for a slot that already moved on) rather than a
/// transient condition.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("slot {0} is not in the Reading state")]
    NotReading(usize),
}

/// Fixed-capacity table of task slots with an embedded free list.
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<SlotState>,
    free_head: usize,
    in_use: usize,
}

impl SlotTable {
    /// Build a table with all `capacity` slots free.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let next = if i + 1 == capacity { END_OF_LIST } else { i + 1 };
            slots.push(SlotState::Free { next });
        }
        let free_head = if capacity == 0 { END_OF_LIST } else { 0 };
        Self {
            slots,
            free_head,
            in_use: 0,
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of currently occupied slots.
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Whether at least one slot is free — the admission-control gate the
    /// event loop consults before calling `accept` (spec.md §4.6, §9 Open
    /// Question 3: "the saturation check occurs at acquire time").
    pub fn has_free(&self) -> bool {
        self.free_head != END_OF_LIST
    }

    /// Detach the head of the free list and transition it to `Reading`.
    /// Returns `None` if the table is saturated — not itself an error
    /// (spec.md §4.1 "Failure semantics").
    pub fn acquire(&mut self) -> Option<usize> {
        if self.free_head == END_OF_LIST {
            return None;
        }
        let idx = self.free_head;
        let next = match self.slots[idx] {
            SlotState::Free { next } => next,
            _ => unreachable!("free list pointed at an occupied slot"),
        };
        self.free_head = next;
        self.slots[idx] = SlotState::Reading;
        self.in_use += 1;
        Some(idx)
    }

    /// `Reading -> Launched`, recording the child id and whether this
    /// slot retains the client socket (EXEC only).
    pub fn mark_launched(
        &mut self,
        idx: usize,
        child_id: u32,
        retains_client: bool,
    ) -> Result<(), SlotError> {
        match self.slots[idx] {
            SlotState::Reading => {
                self.slots[idx] = SlotState::Launched {
                    child_id,
                    retains_client,
                };
                Ok(())
            }
            _ => Err(SlotError::NotReading(idx)),
        }
    }

    /// Release a slot — valid from `Reading` or `Launched` — linking it
    /// back onto the free list head.
    pub fn release(&mut self, idx: usize) {
        debug_assert!(
            !matches!(self.slots[idx], SlotState::Free { .. }),
            "double release of slot {idx}"
        );
        self.slots[idx] = SlotState::Free {
            next: self.free_head,
        };
        self.free_head = idx;
        self.in_use -= 1;
    }

    /// Linear scan for the slot holding the given child id. O(capacity),
    /// acceptable given the small fixed capacity (spec.md §4.1).
    pub fn find_by_child(&self, child_id: u32) -> Option<usize> {
        self.slots.iter().position(|s| {
            matches!(s, SlotState::Launched { child_id: c, .. } if *c == child_id)
        })
    }

    /// Length of the free-list chain, for invariant testing (spec.md §8
    /// property 1: `in_use + free_list_len == capacity` at every
    /// quiescent point).
    #[cfg(test)]
    pub fn free_list_len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.free_head;
        while cur != END_OF_LIST {
            n += 1;
            cur = match self.slots[cur] {
                SlotState::Free { next } => next,
                _ => panic!("corrupt free list: slot {cur} is not Free"),
            };
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_table_is_all_free() {
        let t = SlotTable::new(4);
        assert_eq!(t.in_use(), 0);
        assert_eq!(t.free_list_len(), 4);
        assert!(t.has_free());
    }

    #[test]
    fn zero_capacity_table_is_saturated() {
        let mut t = SlotTable::new(0);
        assert!(!t.has_free());
        assert_eq!(t.acquire(), None);
    }

    #[test]
    fn acquire_release_cycle_conserves_slots() {
        let mut t = SlotTable::new(3);
        let a = t.acquire().unwrap();
        let b = t.acquire().unwrap();
        assert_eq!(t.in_use() + t.free_list_len(), 3);
        t.release(a);
        assert_eq!(t.in_use() + t.free_list_len(), 3);
        let c = t.acquire().unwrap();
        assert_eq!(c, a, "freed slot should be reused (LIFO free list)");
        t.release(b);
        t.release(c);
        assert_eq!(t.in_use(), 0);
        assert_eq!(t.free_list_len(), 3);
    }

    #[test]
    fn saturation_returns_none_not_error() {
        let mut t = SlotTable::new(2);
        t.acquire().unwrap();
        t.acquire().unwrap();
        assert!(!t.has_free());
        assert_eq!(t.acquire(), None);
    }

    #[test]
    fn mark_launched_then_find_by_child() {
        let mut t = SlotTable::new(2);
        let idx = t.acquire().unwrap();
        t.mark_launched(idx, 4242, true).unwrap();
        assert_eq!(t.find_by_child(4242), Some(idx));
        assert_eq!(t.find_by_child(1), None);
    }

    #[test]
    fn mark_launched_rejects_non_reading_slot() {
        let mut t = SlotTable::new(1);
        let idx = t.acquire().unwrap();
        t.mark_launched(idx, 1, false).unwrap();
        let err = t.mark_launched(idx, 2, false).unwrap_err();
        assert_eq!(err, SlotError::NotReading(idx));
    }

    #[test]
    fn release_from_launched_frees_the_slot() {
        let mut t = SlotTable::new(1);
        let idx = t.acquire().unwrap();
        t.mark_launched(idx, 99, true).unwrap();
        t.release(idx);
        assert_eq!(t.in_use(), 0);
        assert_eq!(t.find_by_child(99), None);
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn double_release_panics_in_debug() {
        let mut t = SlotTable::new(1);
        let idx = t.acquire().unwrap();
        t.release(idx);
        t.release(idx);
    }
}
