//! The ten numbered invariants from the testable-properties list, exercised
//! across the composed stack rather than inside any single crate's own
//! unit tests.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};

use shared_heap::arena::config::ArenaConfig;
use shared_heap::arena::Arena;
use shared_heap::layout::{LayoutBuilder, LayoutIndex, VTable};
use shared_heap::store_overlay::OverlayError;
use shared_heap::{CachedStore, OverlayStack};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Payload(Vec<u8>);

impl shared_heap::store_immediate::ValueDescriptor for Payload {
    fn description() -> &'static str {
        "Payload"
    }
    fn prefix() -> u32 {
        901
    }
}

fn fresh_store() -> CachedStore<String, Payload> {
    let config = ArenaConfig::builder()
        .global_size(1 << 18)
        .heap_size(1 << 16)
        .hash_table_pow(8)
        .dep_table_pow(8)
        .build();
    let arena = Arc::new(Arena::init(config).unwrap());
    CachedStore::new(arena, 8)
}

fn fresh_overlay() -> OverlayStack {
    let config = ArenaConfig::builder()
        .global_size(1 << 18)
        .heap_size(1 << 16)
        .hash_table_pow(8)
        .dep_table_pow(8)
        .build();
    let arena = Arc::new(Arena::init(config).unwrap());
    OverlayStack::new(arena)
}

proptest! {
    /// 1. Round trip: `add(k, v); get(k) = Some v`.
    #[test]
    fn invariant_1_round_trip(key in "[a-z]{1,12}", bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let store = fresh_store();
        store.add(&key, Payload(bytes.clone())).unwrap();
        prop_assert_eq!(store.get(&key).unwrap(), Some(Payload(bytes)));
    }

    /// 3. Move: `add(a,v); move(a,b)` ⇒ `¬mem(a) ∧ get(b) = Some v`.
    fn invariant_3_move(a_digest in any::<[u8; 16]>(), b_digest in any::<[u8; 16]>(), bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
        prop_assume!(a_digest != b_digest);
        let mut overlay = fresh_overlay();
        overlay.push_stack();
        overlay.add(a_digest, bytes.clone()).unwrap();
        overlay.move_key(&a_digest, b_digest).unwrap();

        prop_assert!(!overlay.mem(&a_digest).unwrap());
        prop_assert_eq!(overlay.get(&b_digest).unwrap(), Some(bytes));
    }
}

/// 2. Remove idempotence on membership: `remove(k); mem(k) = false`, and
/// `remove` of an absent key is fatal (surfaced as an error, never a
/// silent no-op, so callers cannot mistake it for success).
#[test]
fn invariant_2_remove_then_absent_and_remove_of_absent_errors() {
    let store = fresh_store();
    let k = "k".to_string();
    store.add(&k, Payload(vec![1, 2, 3])).unwrap();

    store.remove(&k).unwrap();
    assert!(!store.mem(&k).unwrap());

    let err = store.remove(&k).unwrap_err();
    assert!(matches!(
        err,
        shared_heap::cached_store::CachedStoreError::Overlay(OverlayError::RemoveOfAbsent { .. })
    ));
}

/// 4. Old/new isolation: `add(k,v); oldify(k)` ⇒ `¬mem(k) ∧ mem_old(k) ∧
/// get_old(k) = Some v`; `revive` inverts this and drops any pre-existing
/// new binding first.
#[test]
fn invariant_4_old_new_isolation_and_revive_drops_pending_new_binding() {
    let store = fresh_store();
    let k = "k".to_string();

    store.add(&k, Payload(vec![1])).unwrap();
    store.oldify(&k).unwrap();
    assert!(!store.mem(&k).unwrap());
    assert!(store.mem_old(&k).unwrap());
    assert_eq!(store.get_old(&k).unwrap(), Some(Payload(vec![1])));

    // A fresh binding written while `k` is staged in the old namespace must
    // be dropped, not merged, when `revive` restores the old value.
    store.add(&k, Payload(vec![2])).unwrap();
    store.revive(&k).unwrap();
    assert_eq!(store.get(&k).unwrap(), Some(Payload(vec![1])));
    assert!(!store.mem_old(&k).unwrap());
}

/// 5. Overlay revert: `push; op*; revert_all; pop` leaves the arena and
/// cache unchanged from pre-push state, for any op sequence.
#[test]
fn invariant_5_overlay_revert_restores_pre_push_state() {
    let store = fresh_store();
    let k = "k".to_string();
    store.add(&k, Payload(vec![9])).unwrap();

    store.push_stack();
    store.add(&k, Payload(vec![99])).unwrap();
    store.add(&"other".to_string(), Payload(vec![1, 2])).unwrap();

    store.pop_stack();
    assert_eq!(store.get(&k).unwrap(), Some(Payload(vec![9])));
}

/// 6. Overlay commit chaining: `push; add(k,v); push; remove(k); commit_all;
/// commit_all` leaves `¬mem(k)` and is equivalent to a direct `add; remove`
/// at the base level.
#[test]
fn invariant_6_commit_chaining_equals_direct_add_then_remove() {
    let mut overlay = fresh_overlay();
    let digest = [7u8; 16];

    overlay.push_stack();
    overlay.add(digest, b"v".to_vec()).unwrap();
    overlay.push_stack();
    overlay.remove(&digest).unwrap();
    overlay.commit_all().unwrap();
    overlay.commit_all().unwrap();

    assert!(!overlay.mem(&digest).unwrap());
}

/// 7. Cache coherence: after `add(k,v)`, the next `get(k)` may hit either
/// tier but must return `Some v`; after `remove(k)`, no tier reports `k`.
#[test]
fn invariant_7_cache_coherence_across_add_and_remove() {
    let store = fresh_store();
    let k = "k".to_string();

    store.add(&k, Payload(vec![5])).unwrap();
    assert_eq!(store.get(&k).unwrap(), Some(Payload(vec![5])));

    store.remove(&k).unwrap();
    assert_eq!(store.get(&k).unwrap(), None);
}

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

fn four_layer_lattice() -> (shared_heap::layout::SealedLayouts, Vec<shared_heap::layout::LayoutId>) {
    let mut builder = LayoutBuilder::new();
    let top = builder.top();
    let vec_top = LayoutIndex::new(0b1101, 0);
    let empty_vec = LayoutIndex::new(0b1100, 0);
    let int_dict = LayoutIndex::new(0b1110, 0);

    builder.create(vec_top, "VecTop", &[top], Some(stub_vtable())).unwrap();
    builder.create(empty_vec, "EmptyVec", &[vec_top], Some(stub_vtable())).unwrap();
    builder.create(int_dict, "IntDict", &[top], Some(stub_vtable())).unwrap();

    let sealed = builder.seal();
    let ids = [top, vec_top, empty_vec, int_dict]
        .into_iter()
        .map(|idx| sealed.id_of(idx).unwrap())
        .collect();
    (sealed, ids)
}

/// 8. Lattice: ∀ layouts `a,b`: `a ≤ (a|b) ∧ b ≤ (a|b) ∧ (a&b) ≤ a ∧
/// (a&b) ≤ b`; `a ≤ b ∧ b ≤ a ⇒ a = b`; `(a|b)` and `(a&b)` are unique.
#[test]
fn invariant_8_lattice_bounds_hold_for_every_pair() {
    let (sealed, ids) = four_layer_lattice();

    for &a in &ids {
        for &b in &ids {
            let join = sealed.join(a, b);
            assert!(sealed.le(a, join));
            assert!(sealed.le(b, join));
            if let Some(meet) = sealed.meet(a, b) {
                assert!(sealed.le(meet, a));
                assert!(sealed.le(meet, b));
            }
            if sealed.le(a, b) && sealed.le(b, a) {
                assert_eq!(a, b);
            }
            // Uniqueness: recomputing join/meet yields the same id.
            assert_eq!(sealed.join(a, b), join);
        }
    }
}

/// 9. Layout test soundness: for sealed layout `L` with test `(mask, eq)`,
/// and any index `i`: `(i & mask == eq) ⇔ FromIndex(i) ≤ L`.
#[test]
fn invariant_9_layout_test_soundness_holds_for_every_index_pair() {
    let (sealed, ids) = four_layer_lattice();

    for &l in &ids {
        let test = sealed.test(l);
        for &candidate in &ids {
            let index = sealed.index_of(candidate);
            assert_eq!(test.matches(index), sealed.le(candidate, l));
        }
    }
}

/// 10. Family-tag invariant: the upper byte of every layout's index equals
/// its family tag (concrete layouts only).
#[test]
fn invariant_10_family_tag_equals_index_upper_byte() {
    let (sealed, ids) = four_layer_lattice();
    for &id in &ids {
        if sealed.is_concrete(id) {
            let index = sealed.index_of(id);
            assert_eq!((index.as_u16() >> 8) as u8, index.family());
        }
    }
}
