//! Prediction pipeline error types

use custcat_ai_core::{PredictionError, TransformError, ValidationError};
use custcat_types::FeatureIntakeError;
use thiserror::Error;

/// Why a prediction request was rejected.
///
/// Each variant identifies the stage that failed; nothing after that stage
/// ran and nothing was recorded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("request body must be a JSON object")]
    MalformedBody,

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("field '{field}' must be {expected}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("error applying {}: {0}", .0.stage())]
    Transform(#[from] TransformError),

    #[error("prediction failed: {0}")]
    Prediction(#[from] PredictionError),
}

impl PipelineError {
    /// `true` when the caller can fix the request and resubmit.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::MalformedBody
                | PipelineError::MissingFields(_)
                | PipelineError::InvalidType { .. }
                | PipelineError::Validation(_)
        )
    }
}

impl From<FeatureIntakeError> for PipelineError {
    fn from(err: FeatureIntakeError) -> Self {
        match err {
            FeatureIntakeError::NotAnObject => PipelineError::MalformedBody,
            FeatureIntakeError::Missing(fields) => PipelineError::MissingFields(fields),
            FeatureIntakeError::InvalidType { field, expected } => {
                PipelineError::InvalidType { field, expected }
            }
        }
    }
}
