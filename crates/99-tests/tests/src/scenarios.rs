//! The six literal end-to-end scenarios.

use serde::{Deserialize, Serialize};
use telemetry::LogLevel;

use shared_heap::arena::config::ArenaConfig;
use shared_heap::arena::region::ArenaRegion;
use shared_heap::store_immediate::{ImmediateStore, ValueDescriptor};
use shared_heap::CachedStore;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Text(String);

impl Text {
    fn new(s: &str) -> Self {
        Text(s.to_string())
    }
}

impl ValueDescriptor for Text {
    fn description() -> &'static str {
        "Text"
    }
    fn prefix() -> u32 {
        900
    }
}

fn small_config() -> ArenaConfig {
    ArenaConfig::builder()
        .global_size(1 << 16)
        .heap_size(1 << 14)
        .hash_table_pow(6)
        .dep_table_pow(6)
        .build()
}

/// `init{heap=1MB, hash_pow=10}`; `add("foo","bar"); add("foo","baz");
/// get("foo") = "bar"`.
#[test]
fn scenario_1_init_and_idempotent_add() {
    let config = ArenaConfig::builder()
        .global_size(2 << 20)
        .heap_size(1 << 20)
        .hash_table_pow(10)
        .dep_table_pow(10)
        .build();
    let (_, arena) = shared_heap::init(config).unwrap();
    let store = ImmediateStore::<String, Text>::new(arena, LogLevel::from_raw(0));

    assert!(store.add(&"foo".to_string(), &Text::new("bar")).unwrap());
    assert!(!store.add(&"foo".to_string(), &Text::new("baz")).unwrap());
    assert_eq!(store.get(&"foo".to_string()).unwrap(), Some(Text::new("bar")));
}

/// `add("x","1"); oldify("x"); add("x","2"); get("x")="2"; get_old("x")="1";
/// revive("x"); get("x")="1"; ¬mem_old("x")`.
#[test]
fn scenario_2_oldify_then_overwrite_then_revive() {
    let (_, arena) = shared_heap::init(small_config()).unwrap();
    let store: CachedStore<String, Text> = CachedStore::new(arena, 8);
    let x = "x".to_string();

    store.add(&x, Text::new("1")).unwrap();
    store.oldify(&x).unwrap();
    store.add(&x, Text::new("2")).unwrap();

    assert_eq!(store.get(&x).unwrap(), Some(Text::new("2")));
    assert_eq!(store.get_old(&x).unwrap(), Some(Text::new("1")));

    store.revive(&x).unwrap();
    assert_eq!(store.get(&x).unwrap(), Some(Text::new("1")));
    assert!(!store.mem_old(&x).unwrap());
}

/// `push; add("a","A"); push; remove("a"); commit_all; commit_all;
/// mem("a") = false`.
#[test]
fn scenario_3_nested_remove_commits_down_to_the_arena() {
    let (_, arena) = shared_heap::init(small_config()).unwrap();
    let mut overlay = shared_heap::OverlayStack::new(arena);
    let digest = [0xAAu8; 16];

    overlay.push_stack();
    overlay.add(digest, b"A".to_vec()).unwrap();
    overlay.push_stack();
    overlay.remove(&digest).unwrap();
    overlay.commit_all().unwrap();
    overlay.commit_all().unwrap();

    assert!(!overlay.mem(&digest).unwrap());
}

/// LFU with capacity 2: add keys 1..5, read 1 three times, add 6; after
/// collection the cache retains 1 and the single most-frequently-added
/// other key, and capacity = 2 holds.
#[test]
fn scenario_4_lfu_collection_keeps_the_hottest_keys() {
    let cache = local_cache::FreqCache::<u32, &'static str>::new(2);

    // Reads must land before the table fills to `2 * target` — collection
    // triggers the moment the fourth distinct key is inserted, so a key's
    // frequency only protects it if it was bumped beforehand.
    cache.add(1, "one");
    cache.get(&1);
    cache.get(&1);
    cache.get(&1);

    cache.add(2, "two");
    cache.add(3, "three");
    cache.add(4, "four"); // table now at capacity (4); triggers collection

    // Collection resets every surviving counter to 0, so "1" needs another
    // bump to stay ahead of whatever the second collection also holds.
    cache.get(&1);
    cache.add(5, "five");
    cache.add(6, "six"); // back at capacity (4); triggers collection again

    assert!(cache.len() <= 2);
    assert_eq!(cache.get(&1), Some("one"));
}

/// Build `Top`, `VecTop<:Top`, `EmptyVec<:VecTop`, `IntDict<:Top`; seal.
/// `(EmptyVec | IntDict) = Top`, `(EmptyVec & IntDict) = ⊥`,
/// `(VecTop | EmptyVec) = VecTop`, and `VecTop`'s test matches any index
/// whose family byte is `0b1101` or `0b1100`.
#[test]
fn scenario_5_layout_lattice_joins_meets_and_test() {
    use shared_heap::layout::{LayoutBuilder, LayoutIndex, VTable};

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

    let mut builder = LayoutBuilder::new();
    let top = builder.top();
    let vec_top = LayoutIndex::new(0b1101, 0);
    let empty_vec = LayoutIndex::new(0b1100, 0);
    let int_dict = LayoutIndex::new(0b1110, 0);

    builder.create(vec_top, "VecTop", &[top], Some(stub_vtable())).unwrap();
    builder.create(empty_vec, "EmptyVec", &[vec_top], Some(stub_vtable())).unwrap();
    builder.create(int_dict, "IntDict", &[top], Some(stub_vtable())).unwrap();
    let sealed = builder.seal();

    let id = |idx| sealed.id_of(idx).unwrap();

    assert_eq!(sealed.index_of(sealed.join(id(empty_vec), id(int_dict))), top);
    assert_eq!(sealed.meet(id(empty_vec), id(int_dict)), None);
    assert_eq!(sealed.index_of(sealed.join(id(vec_top), id(empty_vec))), vec_top);

    let vec_top_test = sealed.test(id(vec_top));
    assert!(vec_top_test.matches(LayoutIndex::new(0b1101, 0)));
    assert!(vec_top_test.matches(LayoutIndex::new(0b1101, 7)));
    assert!(vec_top_test.matches(LayoutIndex::new(0b1100, 0)));
    assert!(vec_top_test.matches(LayoutIndex::new(0b1100, 42)));
    assert!(!vec_top_test.matches(LayoutIndex::new(0b1110, 0)));
}

/// `init` on a `shm_dirs` list where earlier candidates cannot back the
/// region: init must record each rejection via the trail and still succeed
/// on the first workable candidate.
#[test]
fn scenario_6_shm_dirs_fallback_records_failures_and_succeeds_later() {
    let tmp = std::env::temp_dir().join("shared-heap-scenario-6-workable");
    std::fs::create_dir_all(&tmp).unwrap();
    let workable = tmp.to_str().unwrap().to_string();

    let shm_dirs = vec![
        "/nonexistent/shared-heap-scenario-6-missing-a".to_string(),
        "/nonexistent/shared-heap-scenario-6-missing-b".to_string(),
        workable,
    ];

    let (_region, trail) = ArenaRegion::init_filesystem_chain(1 << 12, &shm_dirs, 0).unwrap();

    assert_eq!(trail.attempts.len(), 3);
    assert!(trail.attempts[0].outcome.is_err());
    assert!(trail.attempts[1].outcome.is_err());
    assert!(trail.attempts[2].outcome.is_ok());

    std::fs::remove_dir_all(&tmp).ok();
}
