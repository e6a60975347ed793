//! Customer category prediction service
//!
//! Ties the inference core to the prediction store:
//! - request intake and field presence checks
//! - validation, scaling, projection and classification
//! - best-effort recording of every served prediction
//! - pipeline counters

pub mod errors;
pub mod metrics;
pub mod recorder;
pub mod service;
pub mod types;

pub use errors::PipelineError;
pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot};
pub use recorder::ResultRecorder;
pub use service::PredictionService;
pub use types::{PredictionOutcome, PredictionResult, RecordOutcome};

/// Prediction service version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
