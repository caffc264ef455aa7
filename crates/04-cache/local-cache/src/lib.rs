//! Two-tier process-local cache: an LRA ("least recently added") ordered
//! cache as L1 backed by an LFU frequency cache as L2.
//!
//! Neither tier is stack-qualified — an overlay push/pop clears both via
//! the shared [`telemetry::invalidate_all`] callback list, since a cached
//! value has no way to record which overlay frame it was read under.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use telemetry::Invalidate;

struct OrderedInner<K, V> {
    queue: VecDeque<K>,
    map: HashMap<K, V>,
}

/// LRA cache: evicts the oldest *inserted* key at capacity. Reads never
/// reorder the queue.
pub struct OrderedCache<K, V> {
    capacity: usize,
    inner: Mutex<OrderedInner<K, V>>,
}

impl<K, V> OrderedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Builds a cache of `capacity` entries and registers it for
    /// invalidation.
    pub fn new(capacity: usize) -> Arc<Self> {
        let cache = Arc::new(Self {
            capacity: capacity.max(1),
            inner: Mutex::new(OrderedInner {
                queue: VecDeque::new(),
                map: HashMap::new(),
            }),
        });
        let target: Arc<dyn Invalidate> = cache.clone();
        telemetry::invalidation_registry().register(&target);
        cache
    }

    /// Inserts or overwrites `k`. At capacity, evicts the oldest-inserted
    /// key first (which may already have been removed directly).
    pub fn add(&self, k: K, v: V) {
        let mut inner = self.inner.lock();
        if !inner.map.contains_key(&k) {
            if inner.queue.len() >= self.capacity {
                if let Some(oldest) = inner.queue.pop_front() {
                    inner.map.remove(&oldest);
                }
            }
            inner.queue.push_back(k.clone());
        }
        inner.map.insert(k, v);
    }

    /// Reads `k` without affecting insertion order.
    pub fn get(&self, k: &K) -> Option<V> {
        self.inner.lock().map.get(k).cloned()
    }

    /// Removes `k` from both the table and the insertion queue.
    pub fn remove(&self, k: &K) {
        let mut inner = self.inner.lock();
        inner.map.remove(k);
        inner.queue.retain(|queued| queued != k);
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Invalidate for OrderedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn invalidate(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        inner.map.clear();
    }
}

struct FreqEntry<V> {
    counter: u64,
    value: V,
}

struct FreqInner<K, V> {
    entries: HashMap<K, FreqEntry<V>>,
}

/// LFU cache of capacity `2 * target`. When the table fills to capacity, a
/// single pass sorts by descending frequency, keeps the top `target`
/// entries (resetting their counters to 0), and discards the rest.
pub struct FreqCache<K, V> {
    capacity: usize,
    target: usize,
    inner: Mutex<FreqInner<K, V>>,
}

impl<K, V> FreqCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Builds a cache that collects down to `target` entries once it fills
    /// to `2 * target`, and registers it for invalidation.
    pub fn new(target: usize) -> Arc<Self> {
        let target = target.max(1);
        let cache = Arc::new(Self {
            capacity: target * 2,
            target,
            inner: Mutex::new(FreqInner {
                entries: HashMap::new(),
            }),
        });
        let target_dyn: Arc<dyn Invalidate> = cache.clone();
        telemetry::invalidation_registry().register(&target_dyn);
        cache
    }

    /// Inserts or updates `k`. If the stored value is already physically
    /// identical to `v`, only the counter is bumped; otherwise the counter
    /// resets to 0 and the value is replaced. Triggers collection once the
    /// table reaches its `2 * target` capacity.
    pub fn add(&self, k: K, v: V) {
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(&k) {
            Some(entry) if entry.value == v => {
                entry.counter += 1;
            }
            Some(entry) => {
                entry.counter = 0;
                entry.value = v;
            }
            None => {
                inner.entries.insert(k, FreqEntry { counter: 0, value: v });
            }
        }
        if inner.entries.len() >= self.capacity {
            self.collect(&mut inner);
        }
    }

    fn collect(&self, inner: &mut FreqInner<K, V>) {
        let mut ranked: Vec<(K, u64, V)> = inner
            .entries
            .drain()
            .map(|(k, entry)| (k, entry.counter, entry.value))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(self.target);
        for (k, _freq, value) in ranked {
            inner.entries.insert(k, FreqEntry { counter: 0, value });
        }
    }

    /// Reads `k`, incrementing its frequency counter on a hit.
    pub fn get(&self, k: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get_mut(k)?;
        entry.counter += 1;
        Some(entry.value.clone())
    }

    /// Removes `k` unconditionally.
    pub fn remove(&self, k: &K) {
        self.inner.lock().entries.remove(k);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Invalidate for FreqCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn invalidate(&self) {
        self.inner.lock().entries.clear();
    }
}

/// Two-tier cache: L1 is an [`OrderedCache`] of capacity `C`, L2 is a
/// [`FreqCache`] of capacity `2C`.
///
/// `get` checks L1 first; an L1 hit also refreshes the entry's L2
/// frequency, and an L2 hit promotes the entry into L1. `add` writes
/// through both tiers; `remove` clears both.
pub struct LocalCache<K, V> {
    l1: Arc<OrderedCache<K, V>>,
    l2: Arc<FreqCache<K, V>>,
}

impl<K, V> LocalCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Builds a two-tier cache with L1 capacity `c` and L2 capacity `2c`.
    pub fn new(c: usize) -> Arc<Self> {
        let cache = Arc::new(Self {
            l1: OrderedCache::new(c),
            l2: FreqCache::new(c),
        });
        let target: Arc<dyn Invalidate> = cache.clone();
        telemetry::invalidation_registry().register(&target);
        cache
    }

    /// Reads `k`, consulting L1 then L2, promoting/refreshing as described
    /// on [`LocalCache`].
    pub fn get(&self, k: &K) -> Option<V> {
        if let Some(v) = self.l1.get(k) {
            self.l2.add(k.clone(), v.clone());
            return Some(v);
        }
        if let Some(v) = self.l2.get(k) {
            self.l1.add(k.clone(), v.clone());
            return Some(v);
        }
        None
    }

    /// Writes `k`/`v` into both tiers.
    pub fn add(&self, k: K, v: V) {
        self.l1.add(k.clone(), v.clone());
        self.l2.add(k, v);
    }

    /// Clears `k` from both tiers.
    pub fn remove(&self, k: &K) {
        self.l1.remove(k);
        self.l2.remove(k);
    }
}

impl<K, V> Invalidate for LocalCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn invalidate(&self) {
        self.l1.invalidate();
        self.l2.invalidate();
    }
}
