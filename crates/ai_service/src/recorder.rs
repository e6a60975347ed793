//! Best-effort recording of served predictions

use crate::types::RecordOutcome;
use custcat_storage::PredictionStore;
use custcat_types::{CustomerFeatures, PredictionRecord};
use std::sync::Arc;
use tracing::{debug, error};

/// Appends each served prediction to the store without ever failing the
/// request that produced it.
#[derive(Clone)]
pub struct ResultRecorder {
    store: Arc<dyn PredictionStore>,
}

impl ResultRecorder {
    pub fn new(store: Arc<dyn PredictionStore>) -> Self {
        Self { store }
    }

    /// Single attempt, no retry. Errors are logged and returned as
    /// [`RecordOutcome::Failed`].
    pub fn record(&self, features: &CustomerFeatures, label: u32) -> RecordOutcome {
        let record = PredictionRecord::new(*features, label);
        match self.store.insert_prediction(&record) {
            Ok(()) => {
                debug!("Prediction {} recorded", label);
                RecordOutcome::Persisted
            }
            Err(err) => {
                error!("Failed to record prediction {}: {}", label, err);
                RecordOutcome::Failed(err.to_string())
            }
        }
    }
}
