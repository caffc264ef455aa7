use thiserror::Error;

pub type CachedStoreResult<T> = Result<T, CachedStoreError>;

#[derive(Debug, Error)]
pub enum CachedStoreError {
    #[error(transparent)]
    Overlay(#[from] store_overlay::OverlayError),

    #[error("encode failed for {description}")]
    Encode {
        description: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("decode failed for {description}")]
    Decode {
        description: &'static str,
        #[source]
        source: bincode::Error,
    },
}
