//! Namespaced, MD5-digested keys with old/new discrimination.
//!
//! A [`Key`] is the byte buffer hashed to produce the 16-byte digest the
//! arena's hash table is keyed by: `prefix || stringify(user_key)`, with a
//! reserved `"old_"` token spliced in front for the old-value namespace so
//! the two flavors never collide in the arena even though they share one
//! hash-slot table.

use std::marker::PhantomData;

use md5::{Digest, Md5};
use serde::Serialize;
use smallvec::SmallVec;

/// Reserved byte sequence marking an old-flavored key. No prefix may ever
/// produce a buffer starting with this token; [`KeyDomain::make`] enforces
/// it at construction time rather than leaving it as a documented caveat.
pub const OLD_TOKEN: &[u8] = b"old_";

/// Most keys are a 4-byte prefix plus a short serialized user value (an
/// integer, a short string, a small tuple); this many bytes fit inline
/// without a heap allocation per key built.
const INLINE_KEY_BYTES: usize = 24;

/// An opaque pre-digest key buffer. Two `Key`s are equal iff their MD5
/// digests would be equal, so `Key` itself can stand in for the digest in
/// tests and diagnostics without re-hashing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key(SmallVec<[u8; INLINE_KEY_BYTES]>);

impl Key {
    /// The raw bytes that get MD5-digested. Exposed for diagnostics only —
    /// stores should go through [`KeyDomain::md5`]/[`KeyDomain::md5_old`].
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn is_old_flavored(&self) -> bool {
        self.0.starts_with(OLD_TOKEN)
    }
}

/// Stateless key-construction surface for a user key type `K`.
///
/// Generic rather than holding a `prefix` field: `spec.md`'s components
/// call `make`/`make_old` with an explicit prefix per call, since one
/// store can multiplex several prefixes over the same `K`.
pub struct KeyDomain<K> {
    _marker: PhantomData<K>,
}

impl<K: Serialize> KeyDomain<K> {
    /// Builds the new-flavored key for `(prefix, k)`.
    ///
    /// # Panics
    /// Panics if the resulting buffer happens to start with [`OLD_TOKEN`] —
    /// this can only happen if `prefix`'s raw bytes collide with the token,
    /// which is a configuration bug the caller must fix, not a condition a
    /// value store can recover from silently.
    pub fn make(prefix: u32, k: &K) -> Key {
        let mut buf: SmallVec<[u8; INLINE_KEY_BYTES]> = SmallVec::from_slice(&prefix.to_le_bytes());
        buf.extend(stringify(k));
        assert!(
            !buf.starts_with(OLD_TOKEN),
            "prefix {prefix} collides with the reserved old_ token at key construction"
        );
        Key(buf)
    }

    /// Builds the old-flavored key for `(prefix, k)` directly, equivalent to
    /// `to_old(&make(prefix, k))`.
    pub fn make_old(prefix: u32, k: &K) -> Key {
        Self::to_old(&Self::make(prefix, k))
    }

    /// Converts a new-flavored key to its old-flavored counterpart.
    pub fn to_old(key: &Key) -> Key {
        let mut buf: SmallVec<[u8; INLINE_KEY_BYTES]> = SmallVec::from_slice(OLD_TOKEN);
        buf.extend_from_slice(&key.0);
        Key(buf)
    }

    /// Inverse of [`Self::to_old`]: recovers the new-flavored key from an
    /// old-flavored one.
    ///
    /// # Panics
    /// Panics if `key` is not old-flavored (does not start with
    /// [`OLD_TOKEN`]) — callers should only ever pass keys produced by
    /// `to_old` or `make_old`.
    pub fn new_from_old(key: &Key) -> Key {
        let stripped = key
            .0
            .strip_prefix(OLD_TOKEN)
            .expect("new_from_old called on a key that was never old-flavored");
        Key(SmallVec::from_slice(stripped))
    }

    /// MD5 digest of a new-flavored key.
    ///
    /// # Panics
    /// Panics in debug builds if `key` is old-flavored; use
    /// [`Self::md5_old`] for those.
    pub fn md5(key: &Key) -> [u8; 16] {
        debug_assert!(
            !key.is_old_flavored(),
            "md5() called on an old-flavored key; use md5_old()"
        );
        digest(&key.0)
    }

    /// MD5 digest of an old-flavored key.
    ///
    /// # Panics
    /// Panics in debug builds if `key` is new-flavored; use [`Self::md5`]
    /// for those.
    pub fn md5_old(key: &Key) -> [u8; 16] {
        debug_assert!(
            key.is_old_flavored(),
            "md5_old() called on a new-flavored key; use md5()"
        );
        digest(&key.0)
    }
}

fn stringify<K: Serialize>(k: &K) -> Vec<u8> {
    bincode::serialize(k).expect("key type must be bincode-serializable")
}

fn digest(bytes: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
