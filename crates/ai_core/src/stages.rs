//! Seams between the pipeline and the fitted artifacts.
//!
//! The service only sees these traits, so tests can swap in doubles and the
//! node can share one loaded set of artifacts across all request tasks.

use crate::errors::{PredictionError, TransformError};

/// Per-field standardization fitted at training time.
pub trait FeatureScaler: Send + Sync {
    fn transform(&self, features: &[f64]) -> Result<Vec<f64>, TransformError>;
}

/// Linear projection into the reduced component space.
pub trait FeatureProjection: Send + Sync {
    fn transform(&self, scaled: &[f64]) -> Result<Vec<f64>, TransformError>;
}

/// Maps a projected point onto a category label.
pub trait Classifier: Send + Sync {
    fn predict(&self, point: &[f64]) -> Result<u32, PredictionError>;
}
