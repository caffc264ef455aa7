//! Process-wide shared arena: a fixed-size mapped region holding a
//! hash-slot table, a dependency-edge table, and a compressed-blob heap,
//! addressable by MD5 digest from any process that maps the same bytes.
//!
//! `Arena` is the facade the layers above this crate talk to; everything
//! else in this crate (`region`, `layout`, `hashtable`, `deptable`, `heap`,
//! `persistence`, `stats`) is an internal building block reassembled here.

pub mod config;
pub mod deptable;
pub mod error;
pub mod hashtable;
pub mod heap;
pub mod layout;
pub mod persistence;
pub mod region;
pub mod stats;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use config::ArenaConfig;
use deptable::DepTable;
use error::{ArenaError, ArenaResult};
use hashtable::{HashTable, InsertOutcome};
use heap::{CollectStats, Heap};
use layout::{ArenaHeader, DepEdgeSlot, HashSlot, RegionLayout, SlotFields, MAGIC};
use persistence::PersistenceState;
use region::ArenaRegion;
use stats::ArenaStats;

/// A process's handle onto the shared arena.
///
/// The process that calls [`Arena::init`] owns initialization and defaults
/// to allowing writes; a process that calls [`Arena::connect`] attaches
/// read-first, matching `allow_hashtable_writes_by_current_process` and
/// `allow_removes` as the two toggles `spec.md` §5 names for gating mutation
/// per handle.
pub struct Arena {
    config: ArenaConfig,
    layout: RegionLayout,
    region: ArenaRegion,
    base: *mut u8,
    allow_removes: AtomicBool,
    allow_hashtable_writes_by_current_process: AtomicBool,
    write_lock: Mutex<()>,
    persistence: Mutex<PersistenceState>,
    collections_run: AtomicU64,
}

// SAFETY: `base` points into `region`'s bytes, which never move for the
// lifetime of `Arena` (mmap'd or heap-allocated once, never reallocated).
// Every read/write through `base` goes through the seqlock- or CAS-guarded
// accessors in `hashtable`, `deptable`, and `heap`; the single-writer
// discipline beyond that is enforced by `write_lock` plus the two allow_*
// toggles, not by Rust's aliasing rules.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Allocates and initializes a fresh arena, zeroing its hash-slot and
    /// dependency-edge tables. See [`region::ArenaRegion::init`] for the
    /// anonymous-mapping/filesystem-fallback allocation strategy.
    pub fn init(config: ArenaConfig) -> ArenaResult<Self> {
        let layout = RegionLayout::new(
            config.hash_slot_count(),
            config.dep_slot_count(),
            config.heap_size,
        );
        let (mut region, trail) =
            ArenaRegion::init(layout.total_len, &config.shm_dirs, config.shm_min_avail)?;
        for attempt in &trail.attempts {
            match &attempt.outcome {
                Ok(()) => log::info!("arena backed by {}", attempt.candidate),
                Err(err) => log::warn!("arena candidate {} rejected: {err}", attempt.candidate),
            }
        }

        let base = region.as_mut_slice().as_mut_ptr();
        // SAFETY: `region` was just allocated with `layout.total_len` bytes
        // and is zeroed; `.write()` initializes each cell without dropping
        // whatever bit pattern the zeroed bytes happened to represent.
        unsafe {
            let header_ptr = base.add(layout.header_offset) as *mut ArenaHeader;
            header_ptr.write(ArenaHeader::new(
                config.heap_size as u64,
                config.hash_slot_count() as u64,
                config.dep_slot_count() as u64,
            ));

            let hash_ptr = base.add(layout.hash_table_offset) as *mut HashSlot;
            for i in 0..config.hash_slot_count() {
                hash_ptr.add(i).write(HashSlot::empty());
            }

            let dep_ptr = base.add(layout.dep_table_offset) as *mut DepEdgeSlot;
            for i in 0..config.dep_slot_count() {
                dep_ptr.add(i).write(DepEdgeSlot::empty());
            }
        }

        Ok(Self {
            config,
            layout,
            region,
            base,
            allow_removes: AtomicBool::new(true),
            allow_hashtable_writes_by_current_process: AtomicBool::new(true),
            write_lock: Mutex::new(()),
            persistence: Mutex::new(PersistenceState::new()),
            collections_run: AtomicU64::new(0),
        })
    }

    /// Attaches to an already-initialized region (for example, one inherited
    /// across a `fork`). Defaults to read-only: the caller must explicitly
    /// call [`Self::set_allow_hashtable_writes_by_current_process`] before
    /// writing.
    pub fn connect(mut region: ArenaRegion, config: ArenaConfig) -> ArenaResult<Self> {
        let layout = RegionLayout::new(
            config.hash_slot_count(),
            config.dep_slot_count(),
            config.heap_size,
        );
        if region.len() < layout.total_len {
            return Err(ArenaError::AssertionFailure(format!(
                "region of {} bytes is too small for computed layout of {} bytes",
                region.len(),
                layout.total_len
            )));
        }

        let base = region.as_mut_slice().as_mut_ptr();
        // SAFETY: `base` was just derived from `region`, which is at least
        // `layout.total_len` bytes; reading the header before trusting the
        // rest of the region is exactly what the magic check is for.
        let header = unsafe { &*(base.add(layout.header_offset) as *const ArenaHeader) };
        if header.magic != MAGIC {
            return Err(ArenaError::AssertionFailure(
                "arena magic mismatch: region was not initialized by Arena::init".to_string(),
            ));
        }

        Ok(Self {
            config,
            layout,
            region,
            base,
            allow_removes: AtomicBool::new(true),
            allow_hashtable_writes_by_current_process: AtomicBool::new(false),
            write_lock: Mutex::new(()),
            persistence: Mutex::new(PersistenceState::new()),
            collections_run: AtomicU64::new(0),
        })
    }

    fn header(&self) -> &ArenaHeader {
        // SAFETY: `base + header_offset` was initialized as `ArenaHeader` by
        // `init` (or validated by `connect`'s magic check) and never moves.
        unsafe { &*(self.base.add(self.layout.header_offset) as *const ArenaHeader) }
    }

    fn hash_table(&self) -> HashTable<'_> {
        // SAFETY: `base + hash_table_offset` holds `hash_slot_count` live
        // `HashSlot`s, written by `init` and never relocated.
        let ptr = unsafe { self.base.add(self.layout.hash_table_offset) as *const HashSlot };
        let slots = unsafe { std::slice::from_raw_parts(ptr, self.config.hash_slot_count()) };
        HashTable::new(slots)
    }

    fn dep_table(&self) -> DepTable<'_> {
        // SAFETY: see `hash_table`; same reasoning for the dep-edge table.
        let ptr = unsafe { self.base.add(self.layout.dep_table_offset) as *const DepEdgeSlot };
        let slots = unsafe { std::slice::from_raw_parts(ptr, self.config.dep_slot_count()) };
        DepTable::new(slots)
    }

    fn heap(&self) -> Heap {
        // SAFETY: `base + heap_offset` is reserved exclusively for the heap
        // for `config.heap_size` bytes; `Heap`'s own CAS-guarded `reserve`
        // keeps concurrent allocators from overlapping.
        let ptr = unsafe { self.base.add(self.layout.heap_offset) };
        unsafe { Heap::from_raw_parts(ptr, self.config.heap_size) }
    }

    fn ensure_writes_allowed(&self) -> ArenaResult<()> {
        if !self
            .allow_hashtable_writes_by_current_process
            .load(Ordering::Acquire)
        {
            return Err(ArenaError::AssertionFailure(
                "hash-table writes are disabled on this arena handle".to_string(),
            ));
        }
        Ok(())
    }

    /// Enables or disables `add`/`move_key` on this handle.
    pub fn set_allow_hashtable_writes_by_current_process(&self, allowed: bool) {
        self.allow_hashtable_writes_by_current_process
            .store(allowed, Ordering::Release);
    }

    /// Enables or disables `remove` on this handle.
    pub fn set_allow_removes(&self, allowed: bool) {
        self.allow_removes.store(allowed, Ordering::Release);
    }

    /// Compresses and stores `value` under `digest` if absent. Returns
    /// `false` if `digest` is already present (idempotent add).
    pub fn add(&self, digest: [u8; 16], value: &[u8]) -> ArenaResult<bool> {
        self.ensure_writes_allowed()?;
        let _guard = self.write_lock.lock();
        let table = self.hash_table();
        if table.mem(&digest) {
            return Ok(false);
        }
        let (offset, compressed_len, original_len) =
            self.heap().compress_and_store(&self.header().heap_cursor, value)?;
        match table.insert(
            digest,
            SlotFields {
                digest,
                heap_offset: offset,
                compressed_len,
                original_len,
            },
        ) {
            InsertOutcome::Inserted => Ok(true),
            InsertOutcome::AlreadyPresent => Ok(false),
            InsertOutcome::Full => Err(ArenaError::HashTableFull {
                slots: table.capacity(),
            }),
        }
    }

    /// Membership check; does not decompress the value.
    pub fn mem(&self, digest: &[u8; 16]) -> bool {
        self.hash_table().mem(digest)
    }

    /// Decompresses and returns the value stored under `digest`, if present.
    pub fn get(&self, digest: &[u8; 16]) -> ArenaResult<Option<Vec<u8>>> {
        let table = self.hash_table();
        let idx = match table.find(digest) {
            Some(idx) => idx,
            None => return Ok(None),
        };
        let fields = table.fields_at(idx);
        let bytes = self
            .heap()
            .load(fields.heap_offset, fields.compressed_len, fields.original_len)?;
        Ok(Some(bytes))
    }

    /// Returns `(compressed_len, original_len)` for the entry at `digest`,
    /// without decompressing it. Used by the typed store layer to report
    /// per-value-type telemetry without paying for a decompress round-trip.
    pub fn value_sizes(&self, digest: &[u8; 16]) -> Option<(u32, u32)> {
        let table = self.hash_table();
        let idx = table.find(digest)?;
        let fields = table.fields_at(idx);
        Some((fields.compressed_len, fields.original_len))
    }

    /// Removes the entry under `digest`, along with every dependency edge
    /// touching it. Returns `false` if `digest` was absent.
    pub fn remove(&self, digest: &[u8; 16]) -> ArenaResult<bool> {
        if !self.allow_removes.load(Ordering::Acquire) {
            return Err(ArenaError::AssertionFailure(
                "removes are disabled on this arena handle".to_string(),
            ));
        }
        let _guard = self.write_lock.lock();
        match self.hash_table().remove(digest) {
            Some(_) => {
                self.dep_table().remove_touching(digest);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Renames the entry at `old_digest` to `new_digest` without
    /// recompressing its bytes. Returns `false` if `old_digest` was absent.
    pub fn move_key(&self, old_digest: &[u8; 16], new_digest: [u8; 16]) -> ArenaResult<bool> {
        self.ensure_writes_allowed()?;
        let _guard = self.write_lock.lock();
        match self.hash_table().rekey(old_digest, new_digest) {
            Some(InsertOutcome::Inserted) => Ok(true),
            Some(InsertOutcome::AlreadyPresent) => Err(ArenaError::AssertionFailure(
                "move target digest is already occupied".to_string(),
            )),
            Some(InsertOutcome::Full) => Err(ArenaError::HashTableFull {
                slots: self.hash_table().capacity(),
            }),
            None => Ok(false),
        }
    }

    /// Records a dependency edge. Returns `false` if the edge already existed.
    pub fn add_dep(&self, from: [u8; 16], to: [u8; 16]) -> ArenaResult<bool> {
        self.dep_table().add(from, to)
    }

    /// Dependency-edge membership check.
    pub fn dep_mem(&self, from: &[u8; 16], to: &[u8; 16]) -> bool {
        self.dep_table().mem(from, to)
    }

    /// Every edge whose source is `digest`.
    pub fn deps_from(&self, digest: &[u8; 16]) -> Vec<[u8; 16]> {
        self.dep_table().edges_from(digest)
    }

    /// Runs a compaction pass if [`config::GcPolicy::should_collect`] says
    /// the heap has grown enough relative to its last-known reachable size.
    /// Returns `None` if no collection was warranted.
    pub fn collect_if_needed(&self) -> ArenaResult<Option<CollectStats>> {
        let header = self.header();
        let used = header.heap_cursor.load(Ordering::Acquire) as usize;
        let reachable = header.reachable_bytes.load(Ordering::Acquire).max(1) as usize;
        if !self.config.gc_policy.should_collect(used, reachable) {
            return Ok(None);
        }
        let _guard = self.write_lock.lock();
        let stats = self.heap().collect(&header.heap_cursor, &self.hash_table())?;
        header
            .reachable_bytes
            .store(stats.bytes_reachable, Ordering::Release);
        self.collections_run.fetch_add(1, Ordering::Relaxed);
        Ok(Some(stats))
    }

    /// Forces a compaction pass regardless of [`config::GcPolicy`].
    pub fn collect(&self) -> ArenaResult<CollectStats> {
        let header = self.header();
        let _guard = self.write_lock.lock();
        let stats = self.heap().collect(&header.heap_cursor, &self.hash_table())?;
        header
            .reachable_bytes
            .store(stats.bytes_reachable, Ordering::Release);
        self.collections_run.fetch_add(1, Ordering::Relaxed);
        Ok(stats)
    }

    /// A point-in-time occupancy and heap-usage snapshot.
    pub fn stats(&self) -> ArenaStats {
        let header = self.header();
        ArenaStats {
            hash_used_slots: self.hash_table().used_slots(),
            hash_slot_count: self.config.hash_slot_count(),
            dep_used_slots: self.dep_table().used_slots(),
            dep_slot_count: self.config.dep_slot_count(),
            heap_used_bytes: header.heap_cursor.load(Ordering::Acquire),
            heap_capacity_bytes: self.config.heap_size as u64,
            reachable_bytes: header.reachable_bytes.load(Ordering::Acquire),
            collections_run: self.collections_run.load(Ordering::Relaxed),
        }
    }

    /// Writes a fresh dependency-table snapshot to `path`.
    pub fn save_dep_table_blob(&self, path: &Path) -> ArenaResult<()> {
        let state = self.persistence.lock();
        persistence::save_dep_table_blob(&state, &self.dep_table(), path)
    }

    /// Sqlite-flavored alias for [`Self::save_dep_table_blob`].
    pub fn save_dep_table_sqlite(&self, path: &Path) -> ArenaResult<()> {
        self.save_dep_table_blob(path)
    }

    /// Overwrites a previously-loaded dependency-table snapshot at `path`.
    pub fn update_dep_table_blob(&self, path: &Path) -> ArenaResult<()> {
        let state = self.persistence.lock();
        persistence::update_dep_table_blob(&state, &self.dep_table(), path)
    }

    /// Sqlite-flavored alias for [`Self::update_dep_table_blob`].
    pub fn update_dep_table_sqlite(&self, path: &Path) -> ArenaResult<()> {
        self.update_dep_table_blob(path)
    }

    /// Loads a dependency-table snapshot from `path`, replaying its edges.
    pub fn load_dep_table_blob(&self, path: &Path) -> ArenaResult<usize> {
        let mut state = self.persistence.lock();
        persistence::load_dep_table_blob(&mut state, &self.dep_table(), path)
    }

    /// Sqlite-flavored alias for [`Self::load_dep_table_blob`].
    pub fn load_dep_table_sqlite(&self, path: &Path) -> ArenaResult<usize> {
        self.load_dep_table_blob(path)
    }
}

impl telemetry::TelemetrySource for Arena {
    /// Folds arena-level occupancy into a single `"Arena"` telemetry
    /// bucket; per-value-type breakdowns are the typed store layer's job.
    fn sample(&self) -> telemetry::TelemetrySample {
        let stats = self.stats();
        let mut sample = telemetry::TelemetrySample::new();
        sample.record("Arena", stats.hash_used_slots as u64, stats.heap_used_bytes);
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ArenaConfig {
        ArenaConfig::builder()
            .global_size(1 << 16)
            .heap_size(1 << 14)
            .hash_table_pow(4)
            .dep_table_pow(4)
            .gc_policy(config::GcPolicy::Testing)
            .build()
    }

    #[test]
    fn add_get_remove_round_trips() {
        let arena = Arena::init(small_config()).unwrap();
        let digest = [7u8; 16];
        assert!(arena.add(digest, b"hello arena").unwrap());
        assert!(!arena.add(digest, b"hello arena").unwrap());
        assert!(arena.mem(&digest));
        assert_eq!(arena.get(&digest).unwrap().unwrap(), b"hello arena");
        assert!(arena.remove(&digest).unwrap());
        assert!(!arena.mem(&digest));
        assert_eq!(arena.get(&digest).unwrap(), None);
    }

    #[test]
    fn move_key_preserves_value_under_new_digest() {
        let arena = Arena::init(small_config()).unwrap();
        let old = [1u8; 16];
        let new = [2u8; 16];
        arena.add(old, b"movable").unwrap();
        assert!(arena.move_key(&old, new).unwrap());
        assert!(!arena.mem(&old));
        assert_eq!(arena.get(&new).unwrap().unwrap(), b"movable");
    }

    #[test]
    fn remove_also_clears_touching_dep_edges() {
        let arena = Arena::init(small_config()).unwrap();
        let a = [10u8; 16];
        let b = [11u8; 16];
        arena.add(a, b"a").unwrap();
        arena.add(b, b"b").unwrap();
        arena.add_dep(a, b).unwrap();
        assert!(arena.dep_mem(&a, &b));
        arena.remove(&a).unwrap();
        assert!(!arena.dep_mem(&a, &b));
    }

    #[test]
    fn writes_disabled_reject_add_and_move() {
        let arena = Arena::init(small_config()).unwrap();
        arena.set_allow_hashtable_writes_by_current_process(false);
        assert!(arena.add([9u8; 16], b"x").is_err());
    }

    #[test]
    fn removes_disabled_rejects_remove() {
        let arena = Arena::init(small_config()).unwrap();
        let digest = [3u8; 16];
        arena.add(digest, b"y").unwrap();
        arena.set_allow_removes(false);
        assert!(arena.remove(&digest).is_err());
    }

    #[test]
    fn collect_if_needed_runs_once_policy_threshold_is_met() {
        let arena = Arena::init(small_config()).unwrap();
        for i in 0..4u8 {
            arena.add([i; 16], b"some reasonably sized payload").unwrap();
        }
        arena.remove(&[0u8; 16]).unwrap();
        arena.remove(&[1u8; 16]).unwrap();
        let stats = arena.collect_if_needed().unwrap();
        assert!(stats.is_some());
        assert_eq!(arena.stats().collections_run, 1);
    }

    #[test]
    fn connect_rejects_region_without_valid_magic() {
        let region = ArenaRegion::new_heap(1 << 16);
        let err = Arena::connect(region, small_config()).unwrap_err();
        assert!(matches!(err, ArenaError::AssertionFailure(_)));
    }
}
