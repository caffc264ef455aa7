//! Two disjoint key namespaces — "new" and "old" — layered over one shared
//! arena, used to stage speculative recomputation: a key's prior value is
//! parked in the old namespace while a new one is computed, then either
//! discarded or promoted back.
//!
//! The New and Old views never see each other through normal reads; only
//! `oldify`/`revive` cross the boundary, and they do so by moving the
//! arena's hash-table entry rather than copying its bytes.

pub mod error;

use std::marker::PhantomData;
use std::sync::Arc;

use arena::Arena;
use serde::de::DeserializeOwned;
use serde::Serialize;
use store_immediate::ValueDescriptor;
use store_keys::KeyDomain;

pub use error::{OldNewError, OldNewResult};

/// Typed view over an arena's new/old namespace pair for one value type.
pub struct OldNewStore<K, V> {
    arena: Arc<Arena>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> OldNewStore<K, V>
where
    K: Serialize,
    V: Serialize + DeserializeOwned + ValueDescriptor,
{
    /// Builds a view over `arena` for value type `V`'s registered prefix.
    pub fn new(arena: Arc<Arena>) -> Self {
        Self {
            arena,
            _marker: PhantomData,
        }
    }

    fn digest_new(k: &K) -> [u8; 16] {
        KeyDomain::<K>::md5(&KeyDomain::<K>::make(V::prefix(), k))
    }

    fn digest_old(k: &K) -> [u8; 16] {
        KeyDomain::<K>::md5_old(&KeyDomain::<K>::make_old(V::prefix(), k))
    }

    fn encode(value: &V) -> OldNewResult<Vec<u8>> {
        bincode::serialize(value).map_err(|source| OldNewError::Encode {
            description: V::description(),
            source,
        })
    }

    fn decode(bytes: &[u8]) -> OldNewResult<V> {
        bincode::deserialize(bytes).map_err(|source| OldNewError::Decode {
            description: V::description(),
            source,
        })
    }

    /// Stores `value` under `k` in the new namespace.
    pub fn add(&self, k: &K, value: &V) -> OldNewResult<bool> {
        Ok(self.arena.add(Self::digest_new(k), &Self::encode(value)?)?)
    }

    /// Fetches `k` from the new namespace.
    pub fn get(&self, k: &K) -> OldNewResult<Option<V>> {
        match self.arena.get(&Self::digest_new(k))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Membership check in the new namespace.
    pub fn mem(&self, k: &K) -> bool {
        self.arena.mem(&Self::digest_new(k))
    }

    /// Removes `k` from the new namespace.
    pub fn remove(&self, k: &K) -> OldNewResult<bool> {
        Ok(self.arena.remove(&Self::digest_new(k))?)
    }

    /// Fetches `k` from the old namespace.
    pub fn get_old(&self, k: &K) -> OldNewResult<Option<V>> {
        match self.arena.get(&Self::digest_old(k))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Membership check in the old namespace.
    pub fn mem_old(&self, k: &K) -> bool {
        self.arena.mem(&Self::digest_old(k))
    }

    /// Removes `k` from the old namespace.
    pub fn remove_old(&self, k: &K) -> OldNewResult<bool> {
        Ok(self.arena.remove(&Self::digest_old(k))?)
    }

    /// Moves the binding for `k` from the new namespace to the old one.
    /// Returns `false` if `k` had no new binding to move.
    pub fn oldify(&self, k: &K) -> OldNewResult<bool> {
        Ok(self.arena.move_key(&Self::digest_new(k), Self::digest_old(k))?)
    }

    /// Moves the binding for `k` from the old namespace back to the new
    /// one, removing any pre-existing new binding first so the arena's
    /// move precondition (destination unoccupied) always holds.
    /// Returns `false` if `k` had no old binding to revive.
    pub fn revive(&self, k: &K) -> OldNewResult<bool> {
        if !self.mem_old(k) {
            return Ok(false);
        }
        self.remove(k)?;
        Ok(self.arena.move_key(&Self::digest_old(k), Self::digest_new(k))?)
    }

    /// `oldify` over every key in `ks`. Per-element semantics; a failure on
    /// one key does not roll back keys already processed.
    pub fn oldify_batch(&self, ks: &[K]) -> OldNewResult<Vec<bool>> {
        ks.iter().map(|k| self.oldify(k)).collect()
    }

    /// `revive` over every key in `ks`.
    pub fn revive_batch(&self, ks: &[K]) -> OldNewResult<Vec<bool>> {
        ks.iter().map(|k| self.revive(k)).collect()
    }

    /// `remove` over every key in `ks`.
    pub fn remove_batch(&self, ks: &[K]) -> OldNewResult<Vec<bool>> {
        ks.iter().map(|k| self.remove(k)).collect()
    }

    /// `remove_old` over every key in `ks`.
    pub fn remove_old_batch(&self, ks: &[K]) -> OldNewResult<Vec<bool>> {
        ks.iter().map(|k| self.remove_old(k)).collect()
    }

    /// `get` over every key in `ks`.
    pub fn get_batch(&self, ks: &[K]) -> OldNewResult<Vec<Option<V>>> {
        ks.iter().map(|k| self.get(k)).collect()
    }

    /// `get_old` over every key in `ks`.
    pub fn get_old_batch(&self, ks: &[K]) -> OldNewResult<Vec<Option<V>>> {
        ks.iter().map(|k| self.get_old(k)).collect()
    }
}
