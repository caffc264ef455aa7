use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the typed immediate store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying arena rejected the operation.
    #[error(transparent)]
    Arena(#[from] arena::error::ArenaError),

    /// Encoding a value to its wire form failed.
    #[error("failed to encode value for {description}: {source}")]
    Encode {
        description: &'static str,
        #[source]
        source: bincode::Error,
    },

    /// Decoding a value from its wire form failed.
    #[error("failed to decode value for {description}: {source}")]
    Decode {
        description: &'static str,
        #[source]
        source: bincode::Error,
    },
}
