use thiserror::Error;

pub type OverlayResult<T> = Result<T, OverlayError>;

/// Errors surfaced by the overlay stack's per-key state machine.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// The underlying arena rejected an operation committed through.
    #[error(transparent)]
    Arena(#[from] arena::error::ArenaError),

    /// `remove` was called on a digest with no visible entry in this frame
    /// or any frame/arena below it — there is no `Empty --remove-->` row in
    /// the per-key state table.
    #[error("cannot remove digest {digest:02x?}: no visible entry at or below this frame")]
    RemoveOfAbsent { digest: [u8; 16] },

    /// `remove` was called on a digest already in the `Remove` state —
    /// `Remove --remove--> ERROR` in the per-key state table.
    #[error("cannot remove digest {digest:02x?}: already removed in this frame")]
    DoubleRemove { digest: [u8; 16] },

    /// `move_key`'s precondition `mem(src) ∧ ¬mem(dst)` did not hold.
    #[error("move precondition failed: source present={src_present}, destination present={dst_present}")]
    MovePrecondition { src_present: bool, dst_present: bool },
}
