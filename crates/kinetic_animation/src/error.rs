//! Animation error taxonomy
//!
//! Only programmer-error-class invalid inputs surface to the caller, and
//! only synchronously at animation start. Everything else (cancellation
//! races, missing measurements, destroyed subscribers) is handled in place
//! and never propagates.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnimationError {
    /// Keyframe values and time offsets have different lengths.
    #[error("keyframe list has {values} values but {times} time offsets")]
    MismatchedKeyframes { values: usize, times: usize },

    /// A keyframe target list with no entries.
    #[error("keyframe list must contain at least one value")]
    EmptyKeyframes,

    /// A pair of adjacent values that cannot be mixed continuously.
    #[error("cannot animate between `{from}` and `{to}`")]
    NotAnimatable { from: String, to: String },
}
