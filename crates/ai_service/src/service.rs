//! Prediction service: the request pipeline
//!
//! intake → validation → scaling → projection → classification → recording.
//! Every stage before recording is a pure function of its input and the
//! start-up artifacts, so a failure short-circuits without side effects and
//! nothing is retried.

use crate::errors::PipelineError;
use crate::metrics::{PipelineMetrics, PipelineMetricsSnapshot};
use crate::recorder::ResultRecorder;
use crate::types::{PredictionOutcome, PredictionResult};
use custcat_ai_core::{
    validate, Classifier, FeatureProjection, FeatureScaler, FittedArtifacts,
};
use custcat_storage::PredictionStore;
use custcat_types::CustomerFeatures;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Orchestrates one prediction per call. Cheap to clone; clones share the
/// artifacts, the store and the counters.
#[derive(Clone)]
pub struct PredictionService {
    scaler: Arc<dyn FeatureScaler>,
    projection: Arc<dyn FeatureProjection>,
    classifier: Arc<dyn Classifier>,
    recorder: ResultRecorder,
    metrics: Arc<PipelineMetrics>,
}

impl PredictionService {
    pub fn new(
        scaler: Arc<dyn FeatureScaler>,
        projection: Arc<dyn FeatureProjection>,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn PredictionStore>,
    ) -> Self {
        Self {
            scaler,
            projection,
            classifier,
            recorder: ResultRecorder::new(store),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Wire the service to artifacts loaded at start-up.
    pub fn from_artifacts(artifacts: &FittedArtifacts, store: Arc<dyn PredictionStore>) -> Self {
        info!("Prediction service ready (crate v{})", crate::VERSION);
        Self::new(
            artifacts.scaler.clone(),
            artifacts.projection.clone(),
            artifacts.classifier.clone(),
            store,
        )
    }

    /// Run the pipeline on a raw JSON request body.
    ///
    /// All missing fields are reported before any type or domain check.
    pub fn predict_json(&self, body: &Value) -> Result<PredictionOutcome, PipelineError> {
        let outcome = CustomerFeatures::from_json(body)
            .map_err(PipelineError::from)
            .and_then(|features| self.run(features));
        self.observe(&outcome);
        outcome
    }

    /// Run the pipeline on an already-parsed record.
    pub fn predict(&self, features: CustomerFeatures) -> Result<PredictionOutcome, PipelineError> {
        let outcome = self.run(features);
        self.observe(&outcome);
        outcome
    }

    pub fn metrics(&self) -> PipelineMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn run(&self, features: CustomerFeatures) -> Result<PredictionOutcome, PipelineError> {
        let validated = validate(features)?;
        let vector = validated.to_vector();
        debug!("Validated features: {:?}", vector);

        let scaled = self.scaler.transform(&vector)?;
        debug!("Scaled features: {:?}", scaled);

        let projected = self.projection.transform(&scaled)?;
        debug!("Projected features: {:?}", projected);

        let label = self.classifier.predict(&projected)?;
        debug!("Predicted category: {}", label);

        let record = self.recorder.record(&validated, label);

        Ok(PredictionOutcome {
            result: PredictionResult {
                prediction: label,
                input_features: validated.into_inner(),
            },
            record,
        })
    }

    fn observe(&self, outcome: &Result<PredictionOutcome, PipelineError>) {
        match outcome {
            Ok(outcome) => self.metrics.record_served(outcome.record.is_persisted()),
            Err(err) => {
                let client_error = err.is_client_error();
                if client_error {
                    warn!("Rejected prediction request: {}", err);
                } else {
                    error!("Prediction pipeline failed: {}", err);
                }
                self.metrics.record_rejection(client_error);
            }
        }
    }
}
