//! Sealed DAG of array layouts: 15-bit indices, 8-bit family tags, and a
//! flat vtable dispatch array, supporting join/meet lattice operations and
//! a minimal bitmask membership test per layout.
//!
//! Construction happens through [`LayoutBuilder`]; [`LayoutBuilder::seal`]
//! consumes it and returns a [`SealedLayouts`] with no way back — the
//! type-state split (rather than a runtime "is sealed" flag) is what makes
//! "creation after sealing" a compile error at every call site except the
//! one that still holds the builder.

pub mod builder;
pub mod error;
pub mod index;
pub mod jit;
pub mod sealed;
pub mod vtable;

pub use builder::LayoutBuilder;
pub use error::{LayoutError, LayoutResult};
pub use index::{LayoutIndex, LayoutTest};
pub use jit::{JitHooks, TypeTag, UNKNOWN_TYPE};
pub use sealed::{LayoutId, SealedLayouts};
pub use vtable::{VTable, VTableRegistry};

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_vtable() -> VTable {
        VTable {
            heap_size: |bytes| bytes.len(),
            scan: |_| Vec::new(),
            escalate: |_| LayoutIndex::new(0, 0),
            release: |_| {},
            element_get: |_, _| None,
            element_set: |_, _, _| false,
            iter_next: |_, _| None,
            sort_pre: |_| {},
            sort_post: |_| {},
            toggle_legacy_flag: |_, _| {},
        }
    }

    /// Builds the Scenario 5 lattice: `Top`, `VecTop <: Top`,
    /// `EmptyVec <: VecTop`, `IntDict <: Top`.
    fn scenario_five() -> (SealedLayouts, LayoutIndex, LayoutIndex, LayoutIndex, LayoutIndex) {
        let mut builder = LayoutBuilder::new();
        let top = builder.top();
        let vec_top = LayoutIndex::new(0b1101, 0);
        let empty_vec = LayoutIndex::new(0b1100, 0);
        let int_dict = LayoutIndex::new(0b1110, 0);

        builder.create(vec_top, "VecTop", &[top], Some(stub_vtable())).unwrap();
        builder.create(empty_vec, "EmptyVec", &[vec_top], Some(stub_vtable())).unwrap();
        builder.create(int_dict, "IntDict", &[top], Some(stub_vtable())).unwrap();

        (builder.seal(), top, vec_top, empty_vec, int_dict)
    }

    #[test]
    fn construction_rejects_duplicate_index_and_missing_parent() {
        let mut builder = LayoutBuilder::new();
        let a = LayoutIndex::new(1, 0);
        builder.create(a, "A", &[builder.top()], None).unwrap();
        assert!(matches!(
            builder.create(a, "A again", &[builder.top()], None),
            Err(LayoutError::DuplicateIndex { .. })
        ));

        let ghost_parent = LayoutIndex::new(99, 99);
        assert!(matches!(
            builder.create(LayoutIndex::new(2, 0), "B", &[ghost_parent], None),
            Err(LayoutError::MissingParent { .. })
        ));
    }

    #[test]
    fn abstract_layout_has_no_vtable() {
        let (sealed, top, ..) = scenario_five();
        assert!(!sealed.is_concrete(sealed.top()));
        assert!(matches!(sealed.vtable(sealed.top()), Err(LayoutError::AbstractLayoutHasNoVtable { .. })));
        assert_eq!(sealed.index_of(sealed.top()), top);
    }

    #[test]
    fn scenario_five_join_and_meet() {
        let (sealed, top, vec_top, empty_vec, int_dict) = scenario_five();
        let id = |idx| sealed.id_of(idx).unwrap();

        let join_empty_int = sealed.join(id(empty_vec), id(int_dict));
        assert_eq!(sealed.index_of(join_empty_int), top);

        let meet_empty_int = sealed.meet(id(empty_vec), id(int_dict));
        assert_eq!(meet_empty_int, None);

        let join_vectop_empty = sealed.join(id(vec_top), id(empty_vec));
        assert_eq!(sealed.index_of(join_vectop_empty), vec_top);

        let meet_vectop_empty = sealed.meet(id(vec_top), id(empty_vec)).unwrap();
        assert_eq!(sealed.index_of(meet_vectop_empty), empty_vec);
    }

    #[test]
    fn scenario_five_layout_test_matches_both_descendant_family_tags() {
        let (sealed, _, vec_top, empty_vec, int_dict) = scenario_five();
        let vec_top_id = sealed.id_of(vec_top).unwrap();
        let test = sealed.test(vec_top_id);

        assert!(test.matches(vec_top));
        assert!(test.matches(empty_vec));
        assert!(!test.matches(int_dict));
    }

    #[test]
    fn invariant_lattice_bounds_hold_for_every_pair() {
        let (sealed, top, vec_top, empty_vec, int_dict) = scenario_five();
        let ids: Vec<LayoutId> = [top, vec_top, empty_vec, int_dict]
            .into_iter()
            .map(|idx| sealed.id_of(idx).unwrap())
            .collect();

        for &a in &ids {
            for &b in &ids {
                let j = sealed.join(a, b);
                assert!(sealed.le(a, j));
                assert!(sealed.le(b, j));
                if let Some(m) = sealed.meet(a, b) {
                    assert!(sealed.le(m, a));
                    assert!(sealed.le(m, b));
                }
                if sealed.le(a, b) && sealed.le(b, a) {
                    assert_eq!(a, b);
                }
            }
        }
    }

    #[test]
    fn invariant_layout_test_soundness_holds_for_every_index_pair() {
        let (sealed, top, vec_top, empty_vec, int_dict) = scenario_five();
        let all = [top, vec_top, empty_vec, int_dict];

        for &l in &all {
            let l_id = sealed.id_of(l).unwrap();
            let test = sealed.test(l_id);
            for &candidate in &all {
                let candidate_id = sealed.id_of(candidate).unwrap();
                assert_eq!(test.matches(candidate), sealed.le(candidate_id, l_id));
            }
        }
    }

    #[test]
    fn invariant_family_tag_equals_index_upper_byte() {
        let (_, top, vec_top, empty_vec, int_dict) = scenario_five();
        for idx in [top, vec_top, empty_vec, int_dict] {
            assert_eq!((idx.as_u16() >> 8) as u8, idx.family());
        }
    }

    #[test]
    fn jit_hooks_default_to_widest_layout_when_unset() {
        let (sealed, top, _, empty_vec, _) = scenario_five();
        let empty_vec_id = sealed.id_of(empty_vec).unwrap();
        assert_eq!(sealed.append_type(empty_vec_id, UNKNOWN_TYPE), top);
        assert_eq!(sealed.elem_type(empty_vec_id, UNKNOWN_TYPE), (UNKNOWN_TYPE, false));
    }
}
