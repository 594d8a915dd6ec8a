//! Error type shared by cells, layers, the engine wrapper and the container.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RecurrentError>;

/// Everything that can go wrong while composing or running recurrent units.
///
/// All of these are programming or configuration errors. Nothing here is
/// transient, so callers should surface them rather than retry.
#[derive(Debug, Error)]
pub enum RecurrentError {
    /// Stateful mode was requested but some state cannot be built ahead of time.
    #[error("stateful recurrent units require statically shaped state: {0}")]
    StatefulShape(String),

    /// A shape spec resolved to something other than a rank-2 tensor.
    #[error("state shape must resolve to rank 2, got {0:?}")]
    StateRank(Vec<usize>),

    #[error("shape mismatch in `{unit}`: expected {expected}, got {actual}")]
    ShapeMismatch {
        unit: String,
        expected: String,
        actual: String,
    },

    /// Step functions take input, state, weights and constants, in that order.
    #[error("step functions accept between 1 and 4 arguments, got {0}")]
    StepArity(usize),

    #[error("cell `{cell}` returned {actual} states but declares {expected}")]
    StateCount {
        cell: String,
        expected: usize,
        actual: usize,
    },

    #[error("the recurrent container has no sub-units")]
    EmptyContainer,

    #[error("first sub-unit `{0}` does not declare an input shape")]
    MissingInputShape(String),

    #[error("unrolling requires a fixed input length")]
    UnrollWithoutLength,

    #[error("cannot scan over an empty sequence")]
    EmptySequence,

    #[error("unknown initializer `{0}`")]
    UnknownInitializer(String),

    #[error("unknown regularizer `{0}`")]
    UnknownRegularizer(String),

    #[error("unknown activation `{0}`")]
    UnknownActivation(String),

    #[error("no factory registered for layer class `{0}`")]
    UnknownLayer(String),

    #[error("invalid config for `{class_name}`: {reason}")]
    InvalidConfig { class_name: String, reason: String },

    #[error("expected {expected} weight arrays, got {actual}")]
    WeightCount { expected: usize, actual: usize },

    #[error("weight {index} has shape {actual:?}, expected {expected:?}")]
    WeightShape {
        index: usize,
        expected: [usize; 2],
        actual: [usize; 2],
    },

    #[error("initial weights are pending; call `build()` before the first forward pass")]
    PendingInitialWeights,

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Array(#[from] ndarray::ShapeError),
}

impl RecurrentError {
    pub(crate) fn shape_mismatch(
        unit: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        RecurrentError::ShapeMismatch {
            unit: unit.into(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }

    pub(crate) fn invalid_config(class_name: impl Into<String>, reason: impl ToString) -> Self {
        RecurrentError::InvalidConfig {
            class_name: class_name.into(),
            reason: reason.to_string(),
        }
    }
}
