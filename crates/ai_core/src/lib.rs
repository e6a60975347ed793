//! Inference core for customer category prediction
//!
//! Everything between a parsed request and a category label:
//!
//! - `validation`: domain checks on the raw customer attributes
//! - `scaler`: pre-fitted standardization
//! - `projection`: pre-fitted principal-component projection
//! - `knn`: pre-fitted k-nearest-neighbour classifier
//! - `stages`: traits the service uses to call the three artifacts
//! - `artifacts`: start-up loading and cross-checking of the artifact files
//! - `errors`: error types for each stage

pub mod artifacts;
pub mod errors;
pub mod knn;
pub mod projection;
pub mod scaler;
pub mod stages;
pub mod validation;

pub use artifacts::{digest_hex, ArtifactDigests, FittedArtifacts, LoadedArtifact};
pub use errors::{PredictionError, StartupError, TransformError, TransformStage, ValidationError};
pub use knn::{DistanceMetric, KnnClassifier, Weighting};
pub use projection::PcaProjection;
pub use scaler::StandardScaler;
pub use stages::{Classifier, FeatureProjection, FeatureScaler};
pub use validation::{validate, ValidatedFeatures};

/// Crate version string for metadata reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
