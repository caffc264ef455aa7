use thiserror::Error;

pub type OldNewResult<T> = Result<T, OldNewError>;

#[derive(Debug, Error)]
pub enum OldNewError {
    #[error(transparent)]
    Arena(#[from] arena::error::ArenaError),

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
