use crate::CustomerFeatures;
use serde::{Deserialize, Serialize};

/// Document appended to the prediction store: the submitted features plus
/// the predicted label under `custcat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(flatten)]
    pub features: CustomerFeatures,
    pub custcat: u32,
}

impl PredictionRecord {
    pub fn new(features: CustomerFeatures, custcat: u32) -> Self {
        Self { features, custcat }
    }
}
