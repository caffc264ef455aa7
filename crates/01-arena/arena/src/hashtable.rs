//! Open-addressing hash table over [`HashSlot`] entries living inside the
//! arena region.
//!
//! Linear probing from a seed derived from the digest's first eight bytes
//! (already uniformly distributed, being an MD5 output). Lookups walk past
//! tombstones but stop at a truly empty slot; inserts reuse the first
//! tombstone seen along the probe chain.

use std::sync::atomic::Ordering;

use crate::layout::{HashSlot, SlotFields, SLOT_EMPTY, SLOT_OCCUPIED, SLOT_TOMBSTONE};

/// Result of attempting to insert a new digest.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A fresh slot was claimed for this digest.
    Inserted,
    /// The digest was already present; no slot was touched.
    AlreadyPresent,
    /// Every probe position was occupied; the table is full.
    Full,
}

/// Borrowed view over the hash-slot table's backing slice.
pub struct HashTable<'a> {
    slots: &'a [HashSlot],
}

fn seed(digest: &[u8; 16]) -> u64 {
    u64::from_le_bytes(digest[0..8].try_into().expect("digest prefix is 8 bytes"))
}

impl<'a> HashTable<'a> {
    /// Wraps a slice of slots already laid out inside the region.
    pub fn new(slots: &'a [HashSlot]) -> Self {
        Self { slots }
    }

    fn probe(&self, digest: &[u8; 16]) -> impl Iterator<Item = usize> + '_ {
        let len = self.slots.len();
        let start = (seed(digest) % len as u64) as usize;
        (0..len).map(move |i| (start + i) % len)
    }

    /// Returns the slot index holding `digest`, if occupied.
    pub fn find(&self, digest: &[u8; 16]) -> Option<usize> {
        for idx in self.probe(digest) {
            let slot = &self.slots[idx];
            match slot.state.load(Ordering::Acquire) {
                SLOT_EMPTY => return None,
                SLOT_OCCUPIED => {
                    let fields = slot.read_fields();
                    if &fields.digest == digest {
                        return Some(idx);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Constant-time membership check.
    pub fn mem(&self, digest: &[u8; 16]) -> bool {
        self.find(digest).is_some()
    }

    /// Returns the fields stored at `idx`. Panics if the slot is not occupied.
    pub fn fields_at(&self, idx: usize) -> SlotFields {
        debug_assert_eq!(self.slots[idx].state.load(Ordering::Acquire), SLOT_OCCUPIED);
        self.slots[idx].read_fields()
    }

    /// Overwrites the fields of an already-occupied slot in place, keeping
    /// its digest and table position. Used by heap compaction to patch in a
    /// relocated `heap_offset` without touching the slot's probe position.
    pub fn overwrite_fields(&self, idx: usize, fields: SlotFields) {
        debug_assert_eq!(self.slots[idx].state.load(Ordering::Acquire), SLOT_OCCUPIED);
        self.slots[idx].write_fields(fields);
    }

    /// Inserts `digest` with `fields` if absent.
    pub fn insert(&self, digest: [u8; 16], fields: SlotFields) -> InsertOutcome {
        let mut reuse: Option<usize> = None;
        for idx in self.probe(&digest) {
            let slot = &self.slots[idx];
            match slot.state.load(Ordering::Acquire) {
                SLOT_EMPTY => {
                    let target = reuse.unwrap_or(idx);
                    self.claim(target, digest, fields);
                    return InsertOutcome::Inserted;
                }
                SLOT_TOMBSTONE => {
                    if reuse.is_none() {
                        reuse = Some(idx);
                    }
                }
                SLOT_OCCUPIED => {
                    let existing = slot.read_fields();
                    if existing.digest == digest {
                        return InsertOutcome::AlreadyPresent;
                    }
                }
                _ => unreachable!("hash slot state must be EMPTY, TOMBSTONE, or OCCUPIED"),
            }
        }
        if let Some(target) = reuse {
            self.claim(target, digest, fields);
            return InsertOutcome::Inserted;
        }
        InsertOutcome::Full
    }

    fn claim(&self, idx: usize, digest: [u8; 16], fields: SlotFields) {
        let slot = &self.slots[idx];
        slot.write_fields(SlotFields { digest, ..fields });
        slot.state.store(SLOT_OCCUPIED, Ordering::Release);
    }

    /// Tombstones the slot holding `digest`, returning its prior fields.
    pub fn remove(&self, digest: &[u8; 16]) -> Option<SlotFields> {
        let idx = self.find(digest)?;
        let fields = self.slots[idx].read_fields();
        self.slots[idx].state.store(SLOT_TOMBSTONE, Ordering::Release);
        Some(fields)
    }

    /// Renames an occupied slot's digest in place without touching its heap
    /// bytes, used to implement `move` without recompressing the value.
    pub fn rekey(&self, old_digest: &[u8; 16], new_digest: [u8; 16]) -> Option<InsertOutcome> {
        let old_idx = self.find(old_digest)?;
        let fields = self.slots[old_idx].read_fields();
        self.slots[old_idx].state.store(SLOT_TOMBSTONE, Ordering::Release);
        Some(self.insert(new_digest, fields))
    }

    /// Number of slots in states other than empty (occupied + tombstoned).
    pub fn nonempty_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state.load(Ordering::Acquire) != SLOT_EMPTY)
            .count()
    }

    /// Number of currently occupied (live) slots.
    pub fn used_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state.load(Ordering::Acquire) == SLOT_OCCUPIED)
            .count()
    }

    /// Iterates over every currently occupied slot's digest and fields, in
    /// table order. Used by `collect()` to find reachable heap bytes.
    pub fn iter_occupied(&self) -> impl Iterator<Item = ([u8; 16], SlotFields)> + '_ {
        self.slots.iter().filter_map(|slot| {
            if slot.state.load(Ordering::Acquire) == SLOT_OCCUPIED {
                let fields = slot.read_fields();
                Some((fields.digest, fields))
            } else {
                None
            }
        })
    }

    /// Total slot count.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
