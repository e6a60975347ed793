//! Error types for the inference core

use std::path::PathBuf;
use thiserror::Error;

/// Stage of the transform chain that produced a [`TransformError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStage {
    Scaling,
    Projection,
}

impl std::fmt::Display for TransformStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformStage::Scaling => f.write_str("scaling"),
            TransformStage::Projection => f.write_str("PCA projection"),
        }
    }
}

/// A domain constraint violated by one customer attribute.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value {value} for '{field}': {constraint}")]
pub struct ValidationError {
    pub field: &'static str,
    pub value: i64,
    pub constraint: &'static str,
}

/// Scaling or projection failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Input width does not match what the artifact was fitted on
    #[error("{stage} expected {expected} values, got {actual}")]
    ShapeMismatch {
        stage: TransformStage,
        expected: usize,
        actual: usize,
    },

    /// The transform produced NaN or infinity
    #[error("{stage} produced a non-finite value at index {index}")]
    NonFinite { stage: TransformStage, index: usize },

    /// Artifact missing or not loaded
    #[error("{0} artifact is not initialized")]
    Uninitialized(TransformStage),
}

impl TransformError {
    pub fn stage(&self) -> TransformStage {
        match self {
            TransformError::ShapeMismatch { stage, .. }
            | TransformError::NonFinite { stage, .. }
            | TransformError::Uninitialized(stage) => *stage,
        }
    }
}

/// Classifier invocation failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("classifier expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("classifier has no reference samples")]
    EmptyModel,

    #[error("classifier received a non-finite input")]
    NonFiniteInput,

    #[error("classifier has {points} samples but {labels} labels")]
    LabelCountMismatch { points: usize, labels: usize },
}

/// Fatal problem while loading fitted artifacts at start-up.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {artifact} artifact: {reason}")]
    Invalid {
        artifact: &'static str,
        reason: String,
    },

    #[error("{artifact} digest mismatch: expected {expected}, found {actual}")]
    DigestMismatch {
        artifact: &'static str,
        expected: String,
        actual: String,
    },
}

impl StartupError {
    pub(crate) fn invalid<S: Into<String>>(artifact: &'static str, reason: S) -> Self {
        StartupError::Invalid {
            artifact,
            reason: reason.into(),
        }
    }
}
