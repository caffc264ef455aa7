//! Dependency-edge table: a fixed-capacity set of directed `(from, to)`
//! digest pairs recorded alongside the value store, consulted by callers
//! that need to invalidate downstream values when an upstream one changes.
//!
//! Structured identically to [`crate::hashtable::HashTable`] (linear probing,
//! tombstone reuse) but keyed on the edge itself rather than a single digest.

use std::sync::atomic::Ordering;

use crate::layout::{DepEdgeSlot, EdgeFields, SLOT_EMPTY, SLOT_OCCUPIED, SLOT_TOMBSTONE};

fn seed(edge: &EdgeFields) -> u64 {
    let mut buf = [0u8; 8];
    for i in 0..8 {
        buf[i] = edge.from[i] ^ edge.to[i];
    }
    u64::from_le_bytes(buf)
}

/// Borrowed view over the dependency-edge table's backing slice.
pub struct DepTable<'a> {
    slots: &'a [DepEdgeSlot],
}

impl<'a> DepTable<'a> {
    pub fn new(slots: &'a [DepEdgeSlot]) -> Self {
        Self { slots }
    }

    fn probe(&self, edge: &EdgeFields) -> impl Iterator<Item = usize> + '_ {
        let len = self.slots.len();
        let start = (seed(edge) % len as u64) as usize;
        (0..len).map(move |i| (start + i) % len)
    }

    /// Returns true if the exact edge is already recorded.
    pub fn mem(&self, from: &[u8; 16], to: &[u8; 16]) -> bool {
        let edge = EdgeFields { from: *from, to: *to };
        for idx in self.probe(&edge) {
            match self.slots[idx].state.load(Ordering::Acquire) {
                SLOT_EMPTY => return false,
                SLOT_OCCUPIED => {
                    if self.slots[idx].read_fields() == edge {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }

    /// Records a directed edge if it is not already present.
    pub fn add(&self, from: [u8; 16], to: [u8; 16]) -> Result<bool, crate::error::ArenaError> {
        let edge = EdgeFields { from, to };
        let mut reuse: Option<usize> = None;
        for idx in self.probe(&edge) {
            let slot = &self.slots[idx];
            match slot.state.load(Ordering::Acquire) {
                SLOT_EMPTY => {
                    let target = reuse.unwrap_or(idx);
                    self.slots[target].write_fields(edge);
                    self.slots[target].state.store(SLOT_OCCUPIED, Ordering::Release);
                    return Ok(true);
                }
                SLOT_TOMBSTONE => {
                    if reuse.is_none() {
                        reuse = Some(idx);
                    }
                }
                SLOT_OCCUPIED => {
                    if slot.read_fields() == edge {
                        return Ok(false);
                    }
                }
                _ => unreachable!("dep-edge slot state must be EMPTY, TOMBSTONE, or OCCUPIED"),
            }
        }
        if let Some(target) = reuse {
            self.slots[target].write_fields(edge);
            self.slots[target].state.store(SLOT_OCCUPIED, Ordering::Release);
            return Ok(true);
        }
        Err(crate::error::ArenaError::DepTableFull {
            slots: self.slots.len(),
        })
    }

    /// Removes every edge whose `from` or `to` equals `digest`, returning the
    /// number of edges removed. Used when a value is removed from the store
    /// and its dependency edges become meaningless.
    pub fn remove_touching(&self, digest: &[u8; 16]) -> usize {
        let mut removed = 0;
        for slot in self.slots {
            if slot.state.load(Ordering::Acquire) == SLOT_OCCUPIED {
                let fields = slot.read_fields();
                if &fields.from == digest || &fields.to == digest {
                    slot.state.store(SLOT_TOMBSTONE, Ordering::Release);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// All edges whose `from` equals `digest`.
    pub fn edges_from(&self, digest: &[u8; 16]) -> Vec<[u8; 16]> {
        self.slots
            .iter()
            .filter_map(|slot| {
                if slot.state.load(Ordering::Acquire) == SLOT_OCCUPIED {
                    let fields = slot.read_fields();
                    (&fields.from == digest).then_some(fields.to)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Number of occupied slots, for diagnostics (`dep_used_slots`).
    pub fn used_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state.load(Ordering::Acquire) == SLOT_OCCUPIED)
            .count()
    }

    /// Total slot capacity, for diagnostics (`dep_slots`).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterates over every currently occupied edge, in table order.
    pub fn iter_occupied(&self) -> impl Iterator<Item = EdgeFields> + '_ {
        self.slots.iter().filter_map(|slot| {
            if slot.state.load(Ordering::Acquire) == SLOT_OCCUPIED {
                Some(slot.read_fields())
            } else {
                None
            }
        })
    }
}
