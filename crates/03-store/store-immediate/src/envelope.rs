use serde::{Deserialize, Serialize};

/// Wraps a stored value with an optional write-timestamp, used by the
/// profiled store to sample access latency without changing the payload
/// type callers deserialize.
///
/// Tagged as a two-variant enum with a one-byte discriminator under
/// `bincode`'s default enum encoding, so a non-profiled read of a value
/// that happened to be stored profiled still decodes the payload: both
/// variants carry the same `V`, just with or without the timestamp.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Envelope<V> {
    Plain(V),
    Profiled { written_at_nanos: u64, value: V },
}

impl<V> Envelope<V> {
    /// Unwraps the payload, discarding any write-timestamp.
    pub fn into_value(self) -> V {
        match self {
            Envelope::Plain(v) => v,
            Envelope::Profiled { value, .. } => value,
        }
    }

    /// The write-timestamp, if this value was stored under profiling.
    pub fn written_at_nanos(&self) -> Option<u64> {
        match self {
            Envelope::Plain(_) => None,
            Envelope::Profiled { written_at_nanos, .. } => Some(*written_at_nanos),
        }
    }
}
