//! Prediction service type definitions

use custcat_types::CustomerFeatures;
use serde::Serialize;

/// Label plus the features it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    pub prediction: u32,
    pub input_features: CustomerFeatures,
}

/// What happened to the best-effort write of a served prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Persisted,
    Failed(String),
}

impl RecordOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, RecordOutcome::Persisted)
    }
}

/// A successful pipeline run.
///
/// Only `result` reaches the caller; `record` is kept for logging, metrics
/// and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionOutcome {
    pub result: PredictionResult,
    pub record: RecordOutcome,
}
