//! Point-in-time diagnostics for a shared arena.

use std::fmt;

/// A snapshot of arena occupancy and heap usage, as returned by
/// `Arena::stats()` and folded into the process-wide telemetry registry by
/// the value-store layer above this crate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub hash_used_slots: usize,
    pub hash_slot_count: usize,
    pub dep_used_slots: usize,
    pub dep_slot_count: usize,
    pub heap_used_bytes: u64,
    pub heap_capacity_bytes: u64,
    pub reachable_bytes: u64,
    pub collections_run: u64,
}

impl ArenaStats {
    /// Fraction of hash-slot table capacity currently occupied, in `[0, 1]`.
    pub fn hash_load_factor(&self) -> f64 {
        if self.hash_slot_count == 0 {
            return 0.0;
        }
        self.hash_used_slots as f64 / self.hash_slot_count as f64
    }

    /// Fraction of heap capacity currently used, in `[0, 1]`.
    pub fn heap_load_factor(&self) -> f64 {
        if self.heap_capacity_bytes == 0 {
            return 0.0;
        }
        self.heap_used_bytes as f64 / self.heap_capacity_bytes as f64
    }
}

impl fmt::Display for ArenaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arena(hash={}/{}, dep={}/{}, heap={}/{} bytes, reachable={} bytes, collections={})",
            self.hash_used_slots,
            self.hash_slot_count,
            self.dep_used_slots,
            self.dep_slot_count,
            self.heap_used_bytes,
            self.heap_capacity_bytes,
            self.reachable_bytes,
            self.collections_run
        )
    }
}
