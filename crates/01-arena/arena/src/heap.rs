//! Compressed-blob heap: lz4 compression over a bump allocator, with
//! compaction driven by [`crate::config::GcPolicy`].
//!
//! The heap is a raw byte region inside the shared mapping. Allocation
//! reserves space with a CAS loop against the region header's cursor so
//! concurrent allocators never overlap; the caller still owns the
//! single-writer discipline documented on [`crate::layout::HashSlot`] for
//! everything else.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ArenaError, ArenaResult};
use crate::hashtable::HashTable;
use crate::layout::SlotFields;

/// Raw view over the heap's byte range inside the mapped region.
pub struct Heap {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: `Heap` never aliases mutable access to the same bytes without the
// caller's single-writer discipline (see module docs); all reads and writes
// go through bounds-checked offsets derived from `cursor`'s CAS protocol.
unsafe impl Send for Heap {}
unsafe impl Sync for Heap {}

/// Outcome of a compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub slots_compacted: usize,
    pub bytes_reclaimed: u64,
    pub bytes_reachable: u64,
}

impl Heap {
    /// Wraps `len` bytes starting at `ptr` as the heap region.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for the
    /// lifetime of this `Heap`, and no other live reference may write to
    /// overlapping offsets except under the CAS-guarded allocation protocol.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Total byte capacity of the heap region.
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Compresses `data` and writes it into a freshly reserved range,
    /// returning `(offset, compressed_len, original_len)`.
    pub fn compress_and_store(&self, cursor: &AtomicU64, data: &[u8]) -> ArenaResult<(u64, u32, u32)> {
        let compressed = lz4::block::compress(data, None, false)
            .map_err(|e| ArenaError::AssertionFailure(format!("lz4 compression failed: {e}")))?;
        let clen = compressed.len();

        let offset = self.reserve(cursor, clen)?;
        // SAFETY: `reserve` only returns offsets whose `[offset, offset+clen)`
        // range fits within `self.len` and was atomically claimed from no one
        // else via the cursor CAS loop.
        unsafe {
            std::ptr::copy_nonoverlapping(compressed.as_ptr(), self.ptr.add(offset as usize), clen);
        }
        Ok((offset, clen as u32, data.len() as u32))
    }

    fn reserve(&self, cursor: &AtomicU64, len: usize) -> ArenaResult<u64> {
        loop {
            let cur = cursor.load(Ordering::Acquire);
            let end = cur as usize + len;
            if end > self.len {
                return Err(ArenaError::OutOfHeap {
                    requested: len,
                    available: self.len.saturating_sub(cur as usize),
                });
            }
            if cursor
                .compare_exchange(cur, end as u64, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(cur);
            }
        }
    }

    /// Decompresses the blob stored at `offset`.
    pub fn load(&self, offset: u64, compressed_len: u32, original_len: u32) -> ArenaResult<Vec<u8>> {
        let start = offset as usize;
        let end = start + compressed_len as usize;
        if end > self.len {
            return Err(ArenaError::AssertionFailure(
                "heap read range exceeds region bounds".to_string(),
            ));
        }
        // SAFETY: `[start, end)` was checked against `self.len`, and bytes in
        // that range were written by a prior `compress_and_store` call.
        let slice = unsafe { std::slice::from_raw_parts(self.ptr.add(start), compressed_len as usize) };
        lz4::block::decompress(slice, Some(original_len as i32))
            .map_err(|e| ArenaError::AssertionFailure(format!("lz4 decompression failed: {e}")))
    }

    /// Compacts the heap by relocating every occupied slot's bytes to a
    /// contiguous prefix starting at offset 0, in table order, then resets
    /// `cursor` to the new high-water mark.
    ///
    /// Slot fields are rewritten with their new offsets via
    /// [`crate::layout::HashSlot::write_fields`] so every reader observes
    /// either the pre- or post-collection layout, never a torn one.
    pub fn collect(&self, cursor: &AtomicU64, table: &HashTable<'_>) -> ArenaResult<CollectStats> {
        let entries: Vec<([u8; 16], SlotFields)> = table.iter_occupied().collect();

        let before = cursor.load(Ordering::Acquire);
        let mut write_cursor: u64 = 0;
        let mut relocations = Vec::with_capacity(entries.len());

        for (digest, fields) in &entries {
            let old_offset = fields.heap_offset as usize;
            let clen = fields.compressed_len as usize;
            if write_cursor as usize != old_offset {
                // SAFETY: both ranges lie within `[0, self.len)` — the source
                // because it was previously validated by `reserve`/`load`, the
                // destination because `write_cursor` only ever decreases
                // relative to `old_offset` during compaction. `copy` (not
                // `copy_nonoverlapping`) tolerates the overlapping case.
                unsafe {
                    std::ptr::copy(
                        self.ptr.add(old_offset),
                        self.ptr.add(write_cursor as usize),
                        clen,
                    );
                }
            }
            relocations.push((*digest, write_cursor));
            write_cursor += clen as u64;
        }

        for (digest, new_offset) in &relocations {
            if let Some(idx) = table.find(digest) {
                let mut fields = table.fields_at(idx);
                fields.heap_offset = *new_offset;
                // Re-insert fields through the slot directly: `fields_at`
                // already validated occupancy, and digests are unchanged, so
                // writing back through the table's slot is just an update.
                table.overwrite_fields(idx, fields);
            }
        }

        cursor.store(write_cursor, Ordering::Release);

        Ok(CollectStats {
            slots_compacted: entries.len(),
            bytes_reclaimed: before.saturating_sub(write_cursor),
            bytes_reachable: write_cursor,
        })
    }
}
