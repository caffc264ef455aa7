use thiserror::Error;

/// Convenience alias for fallible arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;

/// Errors surfaced by the shared arena.
///
/// Per `spec.md` §7, every variant here is fatal once raised from inside a
/// running process: the shared region offers no partial-state recovery.
/// `Init` variants are the one exception — they drive fallback to the next
/// candidate filesystem during [`crate::Arena::init`] rather than aborting.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// The compressed-blob heap has no room left for a new allocation.
    #[error("arena out of heap: requested {requested} bytes, {available} available")]
    OutOfHeap { requested: usize, available: usize },

    /// Every probe in the hash-slot table's open-addressing chain is occupied.
    #[error("hash table full: {slots} slots all occupied")]
    HashTableFull { slots: usize },

    /// Every slot in the dependency-edge table is occupied.
    #[error("dependency table full: {slots} slots all occupied")]
    DepTableFull { slots: usize },

    /// A stored revision/version counter was read as zero, which can only
    /// happen if a reader raced a writer without the documented barrier.
    #[error("revision length is zero for digest {digest:02x?}")]
    RevisionLengthZero { digest: [u8; 16] },

    /// An internal invariant was violated; this always indicates a bug.
    #[error("internal assertion failure: {0}")]
    AssertionFailure(String),

    /// Initialization error, see [`ArenaInitError`].
    #[error(transparent)]
    Init(#[from] ArenaInitError),
}

/// Errors raised while allocating the backing region at init time.
#[derive(Debug, Error)]
pub enum ArenaInitError {
    /// The anonymous mmap attempt itself failed (not a filesystem fallback).
    #[error("anonymous mapping init failed")]
    AnonymousMappingInitFailure,

    /// A candidate filesystem does not have the minimum required free bytes.
    #[error("insufficient free bytes: need {required}, candidate has {available}")]
    InsufficientFreeBytes { required: u64, available: u64 },

    /// A candidate filesystem could not be statted or is not usable for shared mappings.
    #[error("filesystem unusable at {path}: {reason}")]
    FilesystemUnusable { path: String, reason: String },

    /// Every candidate in `shm_dirs` (plus the anonymous attempt) was exhausted.
    #[error("out of memory: exhausted {candidates} shared-memory candidates")]
    OutOfMemory { candidates: usize },
}
