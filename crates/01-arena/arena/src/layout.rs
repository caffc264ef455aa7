//! `#[repr(C)]` structures that live inside the mapped arena region.
//!
//! Fixed-size fields and explicit padding keep the layout identical across
//! compilations and processes, since workers `connect()` to the same bytes a
//! master process wrote. Fields are ordered widest-first to avoid implicit
//! alignment padding, mirroring the shared-memory cache layouts this module
//! is grounded on.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Magic bytes written at region offset 0 to validate a mapping before trusting it.
pub const MAGIC: [u8; 8] = *b"HEAPARN1";

/// Sentinel digest prefix meaning "empty slot" in the hash table.
pub const SLOT_EMPTY: u32 = 0;
/// Sentinel meaning "occupied slot".
pub const SLOT_OCCUPIED: u32 = 1;
/// Sentinel meaning "tombstoned slot" (removed, but still occupies a probe position).
pub const SLOT_TOMBSTONE: u32 = 2;

/// Fixed header at the start of the arena region.
#[repr(C)]
pub struct ArenaHeader {
    pub magic: [u8; 8],
    /// Bump cursor into the heap region; the next allocation starts here.
    pub heap_cursor: AtomicU64,
    /// Bytes reachable from live hash-slot entries as of the last `collect()`.
    pub reachable_bytes: AtomicU64,
    pub heap_size: u64,
    pub hash_slot_count: u64,
    pub dep_slot_count: u64,
}

impl ArenaHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(heap_size: u64, hash_slot_count: u64, dep_slot_count: u64) -> Self {
        Self {
            magic: MAGIC,
            heap_cursor: AtomicU64::new(0),
            reachable_bytes: AtomicU64::new(0),
            heap_size,
            hash_slot_count,
            dep_slot_count,
        }
    }
}

/// Fields captured by a consistent (non-torn) slot read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotFields {
    pub digest: [u8; 16],
    pub heap_offset: u64,
    pub compressed_len: u32,
    pub original_len: u32,
}

/// One entry in the hash-slot table.
///
/// Resolves the "partially-written slot" open question in `spec.md` §9 with
/// an explicit seqlock: `version` is odd while a write is in flight and even
/// otherwise; [`Self::read_fields`] retries until it observes a stable even
/// version on both sides of the read, so a reader never sees a torn write.
/// The non-atomic fields live behind `UnsafeCell` because they are written
/// through a shared `&HashSlot` — multiple processes hold that reference
/// concurrently — with exclusivity enforced by the seqlock protocol rather
/// than the type system.
#[repr(C)]
pub struct HashSlot {
    pub state: AtomicU32,
    version: AtomicU32,
    digest: UnsafeCell<[u8; 16]>,
    heap_offset: UnsafeCell<u64>,
    compressed_len: UnsafeCell<u32>,
    original_len: UnsafeCell<u32>,
    pub gc_mark: AtomicU32,
    _pad: u32,
}

// SAFETY: all mutation of the `UnsafeCell` fields goes through `write_fields`,
// which is only ever called by the single writer process while holding
// `allow_hashtable_writes_by_current_process`; readers only ever call
// `read_fields`, which never produces a `&mut` into the cells.
unsafe impl Sync for HashSlot {}

impl HashSlot {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub const fn empty() -> Self {
        Self {
            state: AtomicU32::new(SLOT_EMPTY),
            version: AtomicU32::new(0),
            digest: UnsafeCell::new([0; 16]),
            heap_offset: UnsafeCell::new(0),
            compressed_len: UnsafeCell::new(0),
            original_len: UnsafeCell::new(0),
            gc_mark: AtomicU32::new(0),
            _pad: 0,
        }
    }

    /// Writes new field values under the seqlock protocol.
    ///
    /// The caller (hashtable.rs) must already hold exclusivity for this slot
    /// (single-writer discipline, `spec.md` §5); this only protects readers
    /// from observing a torn write, not concurrent writers from each other.
    pub fn write_fields(&self, fields: SlotFields) {
        let v0 = self.version.load(Ordering::Relaxed);
        self.version.store(v0.wrapping_add(1), Ordering::Release);
        // SAFETY: the seqlock's odd version tells every reader to retry, so no
        // reader observes these writes as anything but torn-and-retried.
        unsafe {
            *self.digest.get() = fields.digest;
            *self.heap_offset.get() = fields.heap_offset;
            *self.compressed_len.get() = fields.compressed_len;
            *self.original_len.get() = fields.original_len;
        }
        self.version.store(v0.wrapping_add(2), Ordering::Release);
    }

    /// Reads a consistent snapshot of the slot's fields, retrying while a
    /// write is observed in flight.
    pub fn read_fields(&self) -> SlotFields {
        loop {
            let v1 = self.version.load(Ordering::Acquire);
            if v1 % 2 != 0 {
                std::hint::spin_loop();
                continue;
            }
            // SAFETY: between the two version loads we only take immutable
            // copies; if a writer interleaved, `v1 != v2` below and we retry.
            let fields = unsafe {
                SlotFields {
                    digest: *self.digest.get(),
                    heap_offset: *self.heap_offset.get(),
                    compressed_len: *self.compressed_len.get(),
                    original_len: *self.original_len.get(),
                }
            };
            let v2 = self.version.load(Ordering::Acquire);
            if v1 == v2 {
                return fields;
            }
            std::hint::spin_loop();
        }
    }
}

/// A directed edge captured by a consistent (non-torn) slot read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeFields {
    pub from: [u8; 16],
    pub to: [u8; 16],
}

/// One entry in the dependency-edge table: a directed edge between two digests.
///
/// Shares `HashSlot`'s seqlock discipline: `state` gates occupancy, `version`
/// gates torn reads of the two digest fields.
#[repr(C)]
pub struct DepEdgeSlot {
    pub state: AtomicU32,
    version: AtomicU32,
    from: UnsafeCell<[u8; 16]>,
    to: UnsafeCell<[u8; 16]>,
}

// SAFETY: see `HashSlot`'s `Sync` impl — mutation is confined to
// `write_fields`, called only by the single writer holding
// `allow_hashtable_writes_by_current_process`.
unsafe impl Sync for DepEdgeSlot {}

impl DepEdgeSlot {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub const fn empty() -> Self {
        Self {
            state: AtomicU32::new(SLOT_EMPTY),
            version: AtomicU32::new(0),
            from: UnsafeCell::new([0; 16]),
            to: UnsafeCell::new([0; 16]),
        }
    }

    pub fn write_fields(&self, fields: EdgeFields) {
        let v0 = self.version.load(Ordering::Relaxed);
        self.version.store(v0.wrapping_add(1), Ordering::Release);
        // SAFETY: see `HashSlot::write_fields`.
        unsafe {
            *self.from.get() = fields.from;
            *self.to.get() = fields.to;
        }
        self.version.store(v0.wrapping_add(2), Ordering::Release);
    }

    pub fn read_fields(&self) -> EdgeFields {
        loop {
            let v1 = self.version.load(Ordering::Acquire);
            if v1 % 2 != 0 {
                std::hint::spin_loop();
                continue;
            }
            // SAFETY: see `HashSlot::read_fields`.
            let fields = unsafe {
                EdgeFields {
                    from: *self.from.get(),
                    to: *self.to.get(),
                }
            };
            let v2 = self.version.load(Ordering::Acquire);
            if v1 == v2 {
                return fields;
            }
            std::hint::spin_loop();
        }
    }
}

/// Computes byte offsets of each region within the arena given slot counts.
#[derive(Clone, Copy, Debug)]
pub struct RegionLayout {
    pub header_offset: usize,
    pub hash_table_offset: usize,
    pub dep_table_offset: usize,
    pub heap_offset: usize,
    pub total_len: usize,
}

impl RegionLayout {
    pub fn new(hash_slot_count: usize, dep_slot_count: usize, heap_size: usize) -> Self {
        let header_offset = 0;
        let hash_table_offset = header_offset + ArenaHeader::SIZE;
        let dep_table_offset = hash_table_offset + hash_slot_count * HashSlot::SIZE;
        let heap_offset = dep_table_offset + dep_slot_count * DepEdgeSlot::SIZE;
        let total_len = heap_offset + heap_size;
        Self {
            header_offset,
            hash_table_offset,
            dep_table_offset,
            heap_offset,
            total_len,
        }
    }
}
