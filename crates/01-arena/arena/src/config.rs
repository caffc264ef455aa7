use serde::{Deserialize, Serialize};

/// Garbage-collector aggressiveness, controlling the overhead multiplier used
/// by [`GcPolicy::should_collect`].
///
/// Values are the overhead multipliers named verbatim in `spec.md` §4.A.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GcPolicy {
    /// Collect once used bytes reach 2.0x reachable bytes.
    Gentle,
    /// Collect once used bytes reach 1.2x reachable bytes.
    Aggressive,
    /// Collect as soon as used bytes reach reachable bytes (1.0x); for tests.
    Testing,
}

impl GcPolicy {
    fn overhead(self) -> f64 {
        match self {
            GcPolicy::Gentle => 2.0,
            GcPolicy::Aggressive => 1.2,
            GcPolicy::Testing => 1.0,
        }
    }

    /// Whether a `collect()` is warranted given current usage.
    pub fn should_collect(self, used_bytes: usize, reachable_bytes: usize) -> bool {
        (used_bytes as f64) >= (reachable_bytes as f64) * self.overhead()
    }
}

/// Frozen size parameters for a shared arena, set once at init time.
///
/// Built with [`ConfigBuilder`], matching the teacher's
/// method-chained-builder-then-`build()` shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Total size in bytes of the mapped region (header + hash table + dep table + heap).
    pub global_size: usize,
    /// Size in bytes reserved for the compressed-blob heap.
    pub heap_size: usize,
    /// `log2` of the dependency-edge table's slot count.
    pub dep_table_pow: u32,
    /// `log2` of the hash-slot table's slot count.
    pub hash_table_pow: u32,
    /// Ordered list of candidate filesystems to try for a file-backed mapping
    /// when an anonymous mapping is unavailable.
    pub shm_dirs: Vec<String>,
    /// Minimum free bytes a candidate filesystem must report to be usable.
    pub shm_min_avail: u64,
    /// Sampling verbosity; see [`telemetry::LogLevel`].
    pub log_level: u32,
    /// Fraction (0.0-1.0) of writes wrapped in profiling envelopes.
    pub sample_rate: f64,
    /// GC aggressiveness.
    pub gc_policy: GcPolicy,
    /// Worker count, used only for per-worker buffer sizing hints.
    pub worker_count: Option<usize>,
}

impl ArenaConfig {
    /// Starts a new builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Number of hash-slot table entries (`2^hash_table_pow`).
    pub fn hash_slot_count(&self) -> usize {
        1usize << self.hash_table_pow
    }

    /// Number of dependency-edge table entries (`2^dep_table_pow`).
    pub fn dep_slot_count(&self) -> usize {
        1usize << self.dep_table_pow
    }
}

/// Builder for [`ArenaConfig`].
#[derive(Debug)]
pub struct ConfigBuilder {
    global_size: usize,
    heap_size: usize,
    dep_table_pow: u32,
    hash_table_pow: u32,
    shm_dirs: Vec<String>,
    shm_min_avail: u64,
    log_level: u32,
    sample_rate: f64,
    gc_policy: GcPolicy,
    worker_count: Option<usize>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            global_size: 1 << 20,
            heap_size: 1 << 19,
            dep_table_pow: 10,
            hash_table_pow: 10,
            shm_dirs: Vec::new(),
            shm_min_avail: 0,
            log_level: 0,
            sample_rate: 0.0,
            gc_policy: GcPolicy::Gentle,
            worker_count: None,
        }
    }
}

impl ConfigBuilder {
    /// Sets the total mapped-region size in bytes.
    pub fn global_size(mut self, bytes: usize) -> Self {
        self.global_size = bytes;
        self
    }

    /// Sets the compressed-blob heap size in bytes.
    pub fn heap_size(mut self, bytes: usize) -> Self {
        self.heap_size = bytes;
        self
    }

    /// Sets `log2` of the dependency table's slot count.
    pub fn dep_table_pow(mut self, pow: u32) -> Self {
        self.dep_table_pow = pow;
        self
    }

    /// Sets `log2` of the hash-slot table's slot count.
    pub fn hash_table_pow(mut self, pow: u32) -> Self {
        self.hash_table_pow = pow;
        self
    }

    /// Appends a candidate filesystem directory.
    pub fn shm_dir(mut self, dir: impl Into<String>) -> Self {
        self.shm_dirs.push(dir.into());
        self
    }

    /// Sets the ordered candidate filesystem list wholesale.
    pub fn shm_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.shm_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the minimum free-byte requirement for a candidate filesystem.
    pub fn shm_min_avail(mut self, bytes: u64) -> Self {
        self.shm_min_avail = bytes;
        self
    }

    /// Sets the sampling verbosity (0 = off, 1 = basic, >=2 = verbose).
    pub fn log_level(mut self, level: u32) -> Self {
        self.log_level = level;
        self
    }

    /// Sets the fraction of writes wrapped in profiling envelopes.
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets GC aggressiveness.
    pub fn gc_policy(mut self, policy: GcPolicy) -> Self {
        self.gc_policy = policy;
        self
    }

    /// Sets the optional worker count used for per-worker buffer sizing.
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Finalizes the configuration.
    pub fn build(self) -> ArenaConfig {
        ArenaConfig {
            global_size: self.global_size,
            heap_size: self.heap_size,
            dep_table_pow: self.dep_table_pow,
            hash_table_pow: self.hash_table_pow,
            shm_dirs: self.shm_dirs,
            shm_min_avail: self.shm_min_avail,
            log_level: self.log_level,
            sample_rate: self.sample_rate,
            gc_policy: self.gc_policy,
            worker_count: self.worker_count,
        }
    }
}
