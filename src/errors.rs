use std::io;

use thiserror::Error;

use crate::data::PairKey;
use crate::types::ImageId;

/// Error type for sampling, design construction, and store failures.
#[derive(Debug, Error)]
pub enum DesignError {
    /// Fewer active images match the filter than were requested.
    #[error("insufficient active images: requested {requested}, only {available} available")]
    InsufficientPool {
        /// Images asked for.
        requested: usize,
        /// Active images matching the filter.
        available: usize,
    },
    #[error(
        "no design with tuple size {tuple_size} reaches {min_occurrences} occurrences for {} image(s)",
        short.len()
    )]
    /// The builder ran out of rounds before every candidate reached the target.
    DesignInfeasible {
        /// Images per tuple.
        tuple_size: usize,
        /// Occurrence target.
        min_occurrences: usize,
        /// Images that stayed below the occurrence target, with their final counts.
        short: Vec<(ImageId, usize)>,
    },
    /// The backing store could not be read or written.
    #[error("record store is unavailable: {reason}")]
    StoreUnavailable {
        /// Underlying failure.
        reason: String,
    },
    /// A task registration would recreate a historical pair.
    #[error("pair '{pair}' already exists in the pair history")]
    PairConflict {
        /// First conflicting pair.
        pair: PairKey,
    },
    /// An id that is not registered in the store.
    #[error("unknown image '{0}'")]
    UnknownImage(ImageId),
    /// A worker response that does not fit the task layout.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Settings that can never produce a task.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DesignError {
    pub(crate) fn store(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }
}
