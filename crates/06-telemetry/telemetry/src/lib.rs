//! Process-wide telemetry and invalidation registries.
//!
//! Every store, overlay stack, and local cache in this workspace registers
//! itself here instead of reaching for ambient module state directly. The
//! registries are explicit singletons (`OnceLock`-backed), not statics
//! scattered across call sites, so init/teardown stays visible at the call
//! site that needs it.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use arc_swap::ArcSwap;

/// Sampling verbosity requested at arena init time.
///
/// Mirrors the `log_level` configuration knob: `Off` disables sampling
/// entirely, `Basic` reports totals, `Verbose` additionally enables the
/// (expensive) reachable-word measurements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    #[default]
    Off,
    Basic,
    Verbose,
}

impl LogLevel {
    /// Constructs a level from the raw integer knob described in the config surface.
    pub fn from_raw(level: u32) -> Self {
        match level {
            0 => LogLevel::Off,
            1 => LogLevel::Basic,
            _ => LogLevel::Verbose,
        }
    }

    /// Whether sampling is enabled at all.
    pub fn samples(self) -> bool {
        self != LogLevel::Off
    }

    /// Whether the (expensive) reachable-word sampling is enabled.
    pub fn measures_reachable_words(self) -> bool {
        self == LogLevel::Verbose
    }
}

/// Counters recorded for a single value-type description.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValueTypeSample {
    /// Number of values of this type currently tracked.
    pub count: u64,
    /// Total bytes attributed to this type (compressed/serialized size).
    pub bytes: u64,
}

impl ValueTypeSample {
    fn merge(&mut self, other: ValueTypeSample) {
        self.count += other.count;
        self.bytes += other.bytes;
    }
}

/// A structured telemetry sample, nested by value-type description.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TelemetrySample {
    by_value_type: std::collections::BTreeMap<&'static str, ValueTypeSample>,
}

impl TelemetrySample {
    /// Creates an empty sample.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `count`/`bytes` against a value-type description.
    pub fn record(&mut self, description: &'static str, count: u64, bytes: u64) {
        self.by_value_type
            .entry(description)
            .or_default()
            .merge(ValueTypeSample { count, bytes });
    }

    /// Folds another sample's counters into this one.
    pub fn merge(&mut self, other: &TelemetrySample) {
        for (description, sample) in &other.by_value_type {
            self.by_value_type.entry(description).or_default().merge(*sample);
        }
    }

    /// Returns the per-value-type breakdown.
    pub fn by_value_type(&self) -> &std::collections::BTreeMap<&'static str, ValueTypeSample> {
        &self.by_value_type
    }

    /// Total count across all value types.
    pub fn total_count(&self) -> u64 {
        self.by_value_type.values().map(|s| s.count).sum()
    }

    /// Total bytes across all value types.
    pub fn total_bytes(&self) -> u64 {
        self.by_value_type.values().map(|s| s.bytes).sum()
    }
}

impl fmt::Display for TelemetrySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "telemetry(count={}, bytes={}, types={})",
            self.total_count(),
            self.total_bytes(),
            self.by_value_type.len()
        )
    }
}

/// Something that can be asked for a point-in-time telemetry sample.
///
/// Implemented by the immediate store, the overlay stack, and every local
/// cache; the registry holds only weak references so a dropped store
/// disappears from future folds without explicit unregistration.
pub trait TelemetrySource: Send + Sync {
    /// Produces the current sample for this source.
    fn sample(&self) -> TelemetrySample;
}

/// Process-wide list of telemetry sources, folded by [`get_telemetry`].
///
/// Backed by `ArcSwap` rather than a mutex: registration is rare (one call
/// per store/cache construction) while folding happens on every telemetry
/// sample, so reads should never block behind a writer.
pub struct TelemetryRegistry {
    sources: ArcSwap<Vec<Weak<dyn TelemetrySource>>>,
}

impl TelemetryRegistry {
    fn new() -> Self {
        Self {
            sources: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Registers a source. The registry does not keep it alive.
    pub fn register(&self, source: &Arc<dyn TelemetrySource>) {
        self.sources.rcu(|current| {
            let mut next = (**current).clone();
            next.push(Arc::downgrade(source));
            next
        });
    }

    /// Folds every live source into a single sample, dropping dead entries.
    pub fn fold(&self) -> TelemetrySample {
        let sources = self.sources.load();
        let mut total = TelemetrySample::new();
        let mut saw_dead = false;
        for weak in sources.iter() {
            match weak.upgrade() {
                Some(source) => total.merge(&source.sample()),
                None => saw_dead = true,
            }
        }
        if saw_dead {
            self.sources.rcu(|current| {
                current
                    .iter()
                    .filter(|weak| weak.strong_count() > 0)
                    .cloned()
                    .collect::<Vec<_>>()
            });
        }
        total
    }
}

static REGISTRY: OnceLock<TelemetryRegistry> = OnceLock::new();

/// Returns the process-wide telemetry registry, creating it on first access.
pub fn registry() -> &'static TelemetryRegistry {
    REGISTRY.get_or_init(TelemetryRegistry::new)
}

/// Folds every registered telemetry source into one sample.
///
/// At [`LogLevel::Off`] callers should skip sampling entirely upstream; this
/// function itself always folds what is registered, matching "`log_level` 0
/// disables sampling entirely" being the caller's responsibility to honor
/// before paying for a sample.
pub fn get_telemetry() -> TelemetrySample {
    registry().fold()
}

/// Something that can drop all of its cached entries on demand.
///
/// Implemented by [`local-cache`]'s `OrderedCache`, `FreqCache`, and
/// `LocalCache`; invoked by [`invalidate_all`].
pub trait Invalidate: Send + Sync {
    /// Clears every entry held by this source.
    fn invalidate(&self);
}

/// Process-wide list of invalidation callbacks.
pub struct InvalidationRegistry {
    targets: ArcSwap<Vec<Weak<dyn Invalidate>>>,
}

impl InvalidationRegistry {
    fn new() -> Self {
        Self {
            targets: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Registers a cache for invalidation. The registry does not keep it alive.
    pub fn register(&self, target: &Arc<dyn Invalidate>) {
        self.targets.rcu(|current| {
            let mut next = (**current).clone();
            next.push(Arc::downgrade(target));
            next
        });
    }

    /// Invalidates every live registrant, dropping dead entries.
    pub fn invalidate_all(&self) {
        let targets = self.targets.load();
        let mut saw_dead = false;
        for weak in targets.iter() {
            match weak.upgrade() {
                Some(target) => target.invalidate(),
                None => saw_dead = true,
            }
        }
        if saw_dead {
            self.targets.rcu(|current| {
                current
                    .iter()
                    .filter(|weak| weak.strong_count() > 0)
                    .cloned()
                    .collect::<Vec<_>>()
            });
        }
    }
}

static INVALIDATION: OnceLock<InvalidationRegistry> = OnceLock::new();

/// Returns the process-wide invalidation registry, creating it on first access.
pub fn invalidation_registry() -> &'static InvalidationRegistry {
    INVALIDATION.get_or_init(InvalidationRegistry::new)
}

/// Clears every registered cache. Overlay push/pop calls this because cache
/// entries are not stack-qualified (`spec.md` §4.G).
pub fn invalidate_all() {
    invalidation_registry().invalidate_all();
}
