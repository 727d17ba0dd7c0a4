//! Error type shared by the association engine.

use thiserror::Error;

use crate::tracker::InstanceId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A k-nearest-neighbor query asked for more neighbors than are indexed.
    #[error("requested {requested} neighbors but only {available} points are indexed")]
    InsufficientPoints { requested: usize, available: usize },

    /// Two clusters of one frame resolved to the same instance id.
    #[error("instance id {id} assigned to clusters {first} and {second} in the same frame")]
    AssignmentConflict {
        id: InstanceId,
        first: usize,
        second: usize,
    },

    /// A feature vector does not match the dimension used by the active scene.
    #[error("feature dimension mismatch: expected {expected}, found {found}")]
    FeatureDimension { expected: usize, found: usize },

    /// Per-point arrays of one frame disagree in length.
    #[error("per-point field `{field}` has {found} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid tracker configuration: {0}")]
    InvalidConfig(String),
}
