use thiserror::Error;

use crate::datatype::Datatype;

/// Errors produced by attribute value operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// Exact retrieval was requested for a kind other than the stored one.
    #[error("type mismatch: requested {requested}, stored {stored}")]
    Mismatch {
        requested: Datatype,
        stored: Datatype,
    },

    /// The operation needs a sequence kind.
    #[error("{0} is not a sequence kind")]
    NotASequence(Datatype),

    /// The operation needs a scalar kind.
    #[error("{0} is not a scalar kind")]
    NotAScalar(Datatype),

    /// Element access past the end of a sequence.
    #[error("index {index} out of bounds for sequence of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}
