//! Top-level facade wiring the arena, key domain, stores, caches, and
//! layout lattice into the single handle-based surface external callers
//! see: `init`/`connect` to adopt a mapping, plus the dependency-table
//! persistence entry points.
//!
//! Re-exports every layer's public surface so a caller depending only on
//! this crate has everything needed to build a [`cached_store::CachedStore`]
//! or reach for a lower layer directly.

use std::sync::Arc;

use anyhow::Result;
use arena::config::ArenaConfig;
use arena::Arena;

pub use arena;
pub use cached_store::{self, CachedStore};
pub use layout;
pub use local_cache::{self, LocalCache};
pub use store_immediate::{self, ImmediateStore, ProfiledStore, ValueDescriptor};
pub use store_keys::{self, KeyDomain};
pub use store_oldnew::{self, OldNewStore};
pub use store_overlay::{self, OverlayStack};

/// Opaque handle produced by [`init`], carrying the frozen size parameters
/// a child needs to adopt the same arena via [`connect`].
///
/// The arena's own region abstraction does not expose a raw OS file
/// descriptor (its file-backed candidate opens a private path internally),
/// so genuine cross-process adoption would additionally need that
/// descriptor threaded through; within a single process, `connect` adopts
/// the same mapping by cloning the `Arc<Arena>` `init` already produced.
#[derive(Clone)]
pub struct Handle {
    config: ArenaConfig,
}

impl Handle {
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }
}

/// Initializes a fresh arena per `config`, returning a handle plus the
/// shared arena itself.
///
/// Returns `anyhow::Result` rather than the arena crate's own typed error:
/// this is the outermost facade a caller actually depends on (matching how
/// `services-fabric::TransportServices::new` collapses its layers' typed
/// errors at the boundary callers see), while every layer beneath this one
/// keeps its own named error type.
pub fn init(config: ArenaConfig) -> Result<(Handle, Arc<Arena>)> {
    let arena = Arc::new(Arena::init(config.clone())?);
    Ok((Handle { config }, arena))
}

/// Adopts the mapping described by `handle`. `worker_id` is used only for
/// the log line identifying which worker attached — it carries no other
/// semantics at this layer.
pub fn connect(handle: &Handle, arena: Arc<Arena>, worker_id: usize) -> Arc<Arena> {
    log::info!(
        "worker {worker_id} connected to arena (hash_slots={}, dep_slots={})",
        handle.config().hash_slot_count(),
        handle.config().dep_slot_count(),
    );
    arena
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_immediate::ValueDescriptor;

    #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Reading(String);

    impl ValueDescriptor for Reading {
        fn description() -> &'static str {
            "Reading"
        }
        fn prefix() -> u32 {
            1
        }
    }

    fn test_config() -> ArenaConfig {
        ArenaConfig::builder()
            .global_size(1 << 16)
            .heap_size(1 << 14)
            .hash_table_pow(6)
            .dep_table_pow(6)
            .build()
    }

    #[test]
    fn init_then_connect_shares_the_same_arena() {
        let (handle, arena) = init(test_config()).unwrap();
        let worker_arena = connect(&handle, arena.clone(), 1);
        worker_arena.add([9u8; 16], b"from worker view").unwrap();
        assert_eq!(arena.get(&[9u8; 16]).unwrap().unwrap(), b"from worker view");
    }

    #[test]
    fn composed_cached_store_round_trips_through_every_layer() {
        let (_, arena) = init(test_config()).unwrap();
        let store: CachedStore<String, Reading> = CachedStore::new(arena, 4);
        store.add(&"k".to_string(), Reading("v".to_string())).unwrap();
        assert_eq!(store.get(&"k".to_string()).unwrap(), Some(Reading("v".to_string())));
    }
}
