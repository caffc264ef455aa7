//! Per-layout JIT refinement helpers.
//!
//! Every hook is virtual with a default implementation that returns the
//! widest possible layout and an unknown-presence flag; concrete layouts
//! override only the hooks where they can say something more precise.

use crate::index::LayoutIndex;

/// Opaque JIT-level type id. `0` stands for "unknown/widest type".
pub type TypeTag = u32;

pub const UNKNOWN_TYPE: TypeTag = 0;

/// Optional per-layout overrides for the refinement hooks. Any `None` slot
/// falls back to the default (widest layout / unknown presence) behavior.
#[derive(Clone, Copy, Default)]
pub struct JitHooks {
    pub append_type: Option<fn(TypeTag) -> LayoutIndex>,
    pub remove_type: Option<fn(TypeTag) -> LayoutIndex>,
    pub set_type: Option<fn(TypeTag, TypeTag) -> LayoutIndex>,
    pub elem_type: Option<fn(TypeTag) -> (TypeTag, bool)>,
    pub first_last_type: Option<fn(bool, bool) -> (TypeTag, bool)>,
    pub iter_pos_type: Option<fn(TypeTag, bool) -> TypeTag>,
}

impl JitHooks {
    pub fn append_type(&self, top: LayoutIndex, val_type: TypeTag) -> LayoutIndex {
        self.append_type.map_or(top, |f| f(val_type))
    }

    pub fn remove_type(&self, top: LayoutIndex, key_type: TypeTag) -> LayoutIndex {
        self.remove_type.map_or(top, |f| f(key_type))
    }

    pub fn set_type(&self, top: LayoutIndex, key_type: TypeTag, val_type: TypeTag) -> LayoutIndex {
        self.set_type.map_or(top, |f| f(key_type, val_type))
    }

    pub fn elem_type(&self, key_type: TypeTag) -> (TypeTag, bool) {
        self.elem_type.map_or((UNKNOWN_TYPE, false), |f| f(key_type))
    }

    pub fn first_last_type(&self, is_first: bool, is_key: bool) -> (TypeTag, bool) {
        self.first_last_type.map_or((UNKNOWN_TYPE, false), |f| f(is_first, is_key))
    }

    pub fn iter_pos_type(&self, pos_type: TypeTag, is_key: bool) -> TypeTag {
        self.iter_pos_type.map_or(UNKNOWN_TYPE, |f| f(pos_type, is_key))
    }
}
