//! Process-global dispatch table for concrete layouts' operations.
//!
//! Objects are treated as opaque byte buffers (the same representation the
//! arena's heap stores them as); a concrete layout's vtable is a flat
//! struct of function pointers operating on that representation. Layout
//! kinds sharing a family tag share a vtable slot — the dispatcher forwards
//! through one `Vec` lookup keyed by the 8-bit family tag, never a per-kind
//! branch.

use crate::index::LayoutIndex;

/// Function-pointer table for one family of concrete layouts.
#[derive(Clone, Copy)]
pub struct VTable {
    pub heap_size: fn(&[u8]) -> usize,
    /// Digests of other arena entries this object holds live references to.
    pub scan: fn(&[u8]) -> Vec<[u8; 16]>,
    /// Computes the (possibly different) layout this object should be
    /// promoted to, e.g. after growing past a small-size optimization.
    pub escalate: fn(&[u8]) -> LayoutIndex,
    pub release: fn(&mut Vec<u8>),
    pub element_get: fn(&[u8], usize) -> Option<Vec<u8>>,
    pub element_set: fn(&mut Vec<u8>, usize, &[u8]) -> bool,
    /// Next valid iteration position at or after `from`, if any.
    pub iter_next: fn(&[u8], usize) -> Option<usize>,
    pub sort_pre: fn(&mut Vec<u8>),
    pub sort_post: fn(&mut Vec<u8>),
    pub toggle_legacy_flag: fn(&mut Vec<u8>, bool),
}

/// 256-slot dispatch table indexed by family tag. In debug builds,
/// [`VTableRegistry::get`] is the only way to reach a vtable and always
/// goes through the bounds-checked `Vec` index; there is no unchecked
/// "release" path here to keep this crate free of raw-pointer dispatch —
/// callers needing the release-build unchecked-reinterpretation path
/// documented in the design notes build it at the call site, where the
/// concrete object representation is known.
pub struct VTableRegistry {
    slots: Vec<Option<VTable>>,
}

impl VTableRegistry {
    pub fn new() -> Self {
        Self {
            slots: vec![None; 256],
        }
    }

    pub fn set(&mut self, family_tag: u8, vtable: VTable) {
        self.slots[family_tag as usize] = Some(vtable);
    }

    pub fn get(&self, family_tag: u8) -> Option<&VTable> {
        self.slots[family_tag as usize].as_ref()
    }
}

impl Default for VTableRegistry {
    fn default() -> Self {
        Self::new()
    }
}
