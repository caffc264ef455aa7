//! Typed wrapper binding a key domain and a value type to the raw arena.
//!
//! Every `add`/`get` records size telemetry under the value type's
//! registered description; an optional [`ProfiledStore`] layers a
//! write-timestamp envelope on top at a configured sampling rate.

pub mod envelope;
pub mod error;
pub mod value;

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arena::Arena;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use store_keys::KeyDomain;
use telemetry::{LogLevel, TelemetrySample, TelemetrySource};

pub use envelope::Envelope;
pub use error::{StoreError, StoreResult};
pub use value::ValueDescriptor;

fn pad_to_8(n: usize) -> usize {
    (n + 7) & !7
}

/// Typed, telemetry-emitting binding between a key type `K`, a value type
/// `V`, and the shared arena.
pub struct ImmediateStore<K, V> {
    arena: Arc<Arena>,
    log_level: LogLevel,
    add_count: AtomicU64,
    compressed_bytes: AtomicU64,
    uncompressed_bytes: AtomicU64,
    padded_bytes: AtomicU64,
    get_count: AtomicU64,
    deserialized_bytes: AtomicU64,
    allocated_bytes: AtomicU64,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> ImmediateStore<K, V>
where
    K: Serialize + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + ValueDescriptor + Send + Sync + 'static,
{
    /// Builds a store over `arena` and registers it with the process-wide
    /// telemetry registry.
    pub fn new(arena: Arc<Arena>, log_level: LogLevel) -> Arc<Self> {
        let store = Arc::new(Self {
            arena,
            log_level,
            add_count: AtomicU64::new(0),
            compressed_bytes: AtomicU64::new(0),
            uncompressed_bytes: AtomicU64::new(0),
            padded_bytes: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            deserialized_bytes: AtomicU64::new(0),
            allocated_bytes: AtomicU64::new(0),
            _marker: PhantomData,
        });
        let source: Arc<dyn TelemetrySource> = store.clone();
        telemetry::registry().register(&source);
        store
    }

    fn digest(k: &K) -> [u8; 16] {
        let key = KeyDomain::<K>::make(V::prefix(), k);
        KeyDomain::<K>::md5(&key)
    }

    /// Serializes and stores `value` under `k`, returning `false` if `k` was
    /// already present (idempotent add). Records compressed, uncompressed,
    /// and padded size on success.
    pub fn add(&self, k: &K, value: &V) -> StoreResult<bool> {
        let bytes = bincode::serialize(value).map_err(|source| StoreError::Encode {
            description: V::description(),
            source,
        })?;
        let digest = Self::digest(k);
        let inserted = self.arena.add(digest, &bytes)?;
        if inserted {
            if let Some((compressed_len, original_len)) = self.arena.value_sizes(&digest) {
                self.add_count.fetch_add(1, Ordering::Relaxed);
                self.compressed_bytes.fetch_add(compressed_len as u64, Ordering::Relaxed);
                self.uncompressed_bytes.fetch_add(original_len as u64, Ordering::Relaxed);
                self.padded_bytes
                    .fetch_add(pad_to_8(compressed_len as usize) as u64, Ordering::Relaxed);
            }
        }
        Ok(inserted)
    }

    /// Fetches and deserializes the value stored under `k`, if present.
    /// Records bytes deserialized, and at [`LogLevel::Verbose`] an estimate
    /// of bytes allocated for the deserialized value.
    pub fn get(&self, k: &K) -> StoreResult<Option<V>> {
        let digest = Self::digest(k);
        let Some(bytes) = self.arena.get(&digest)? else {
            return Ok(None);
        };
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.deserialized_bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        let value: V = bincode::deserialize(&bytes).map_err(|source| StoreError::Decode {
            description: V::description(),
            source,
        })?;
        if self.log_level.measures_reachable_words() {
            self.allocated_bytes
                .fetch_add(std::mem::size_of::<V>() as u64, Ordering::Relaxed);
        }
        Ok(Some(value))
    }

    /// Membership check; does not deserialize the value.
    pub fn mem(&self, k: &K) -> bool {
        self.arena.mem(&Self::digest(k))
    }

    /// Removes the entry at `k`. Returns `false` if it was absent.
    pub fn remove(&self, k: &K) -> StoreResult<bool> {
        Ok(self.arena.remove(&Self::digest(k))?)
    }

    /// Renames the entry at `src` to `dst` without re-encoding its bytes.
    pub fn move_key(&self, src: &K, dst: &K) -> StoreResult<bool> {
        Ok(self.arena.move_key(&Self::digest(src), Self::digest(dst))?)
    }
}

impl<K, V> TelemetrySource for ImmediateStore<K, V>
where
    K: Send + Sync,
    V: ValueDescriptor + Send + Sync,
{
    fn sample(&self) -> TelemetrySample {
        let mut sample = TelemetrySample::new();
        let count = self.add_count.load(Ordering::Relaxed) + self.get_count.load(Ordering::Relaxed);
        let bytes =
            self.compressed_bytes.load(Ordering::Relaxed) + self.deserialized_bytes.load(Ordering::Relaxed);
        sample.record(V::description(), count, bytes);
        sample
    }
}

impl<V: ValueDescriptor> ValueDescriptor for Envelope<V> {
    fn description() -> &'static str {
        V::description()
    }

    fn prefix() -> u32 {
        V::prefix()
    }
}

/// Wraps values with a write-timestamp envelope at a configured sampling
/// rate, emitting an access-sample log event on reads that hit a
/// previously-profiled entry.
pub struct ProfiledStore<K, V> {
    inner: Arc<ImmediateStore<K, Envelope<V>>>,
    sample_rate: f64,
}

impl<K, V> ProfiledStore<K, V>
where
    K: Serialize + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + ValueDescriptor + Send + Sync + 'static,
{
    /// Builds a profiled store wrapping `inner`'s arena, sampling at
    /// `sample_rate` (clamped to `[0, 1]`).
    pub fn new(arena: Arc<Arena>, log_level: LogLevel, sample_rate: f64) -> Self {
        Self {
            inner: ImmediateStore::new(arena, log_level),
            sample_rate: sample_rate.clamp(0.0, 1.0),
        }
    }

    fn now_nanos() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }

    /// Stores `value` under `k`, wrapping it in a write-timestamp envelope
    /// with probability `sample_rate`.
    pub fn add(&self, k: &K, value: V) -> StoreResult<bool> {
        let sampled = self.sample_rate > 0.0 && rand::thread_rng().gen_bool(self.sample_rate);
        let envelope = if sampled {
            Envelope::Profiled {
                written_at_nanos: Self::now_nanos(),
                value,
            }
        } else {
            Envelope::Plain(value)
        };
        self.inner.add(k, &envelope)
    }

    /// Fetches the value stored under `k`, emitting an access-sample log
    /// event if the stored entry carried a write-timestamp.
    pub fn get(&self, k: &K) -> StoreResult<Option<V>> {
        let Some(envelope) = self.inner.get(k)? else {
            return Ok(None);
        };
        if let Some(written_at_nanos) = envelope.written_at_nanos() {
            log::trace!(
                "access sample: {} written_at_nanos={written_at_nanos}",
                V::description()
            );
        }
        Ok(Some(envelope.into_value()))
    }

    /// Membership check; does not deserialize the value.
    pub fn mem(&self, k: &K) -> bool {
        self.inner.mem(k)
    }

    /// Removes the entry at `k`. Returns `false` if it was absent.
    pub fn remove(&self, k: &K) -> StoreResult<bool> {
        self.inner.remove(k)
    }
}
