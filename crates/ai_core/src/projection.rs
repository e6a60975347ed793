//! Principal-component projection
//!
//! `components · (x - mean)`, optionally whitened by the per-component
//! explained variance.

use crate::errors::{StartupError, TransformError, TransformStage};
use crate::stages::FeatureProjection;
use serde::{Deserialize, Serialize};

/// Pre-fitted PCA basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaProjection {
    /// Per-feature mean subtracted before projecting
    pub mean: Vec<f64>,
    /// One row per retained component, each as wide as `mean`
    pub components: Vec<Vec<f64>>,
    #[serde(default)]
    pub explained_variance: Option<Vec<f64>>,
    #[serde(default)]
    pub whiten: bool,
}

impl PcaProjection {
    pub fn new(mean: Vec<f64>, components: Vec<Vec<f64>>) -> Self {
        Self {
            mean,
            components,
            explained_variance: None,
            whiten: false,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.mean.len()
    }

    pub fn output_dim(&self) -> usize {
        self.components.len()
    }

    pub fn validate(&self, expected_input: usize) -> Result<(), StartupError> {
        if self.input_dim() != expected_input {
            return Err(StartupError::invalid(
                "pca",
                format!(
                    "mean has {} entries, expected {expected_input}",
                    self.input_dim()
                ),
            ));
        }
        if self.components.is_empty() {
            return Err(StartupError::invalid("pca", "no components"));
        }
        for (idx, row) in self.components.iter().enumerate() {
            if row.len() != expected_input {
                return Err(StartupError::invalid(
                    "pca",
                    format!("component {idx} has {} entries, expected {expected_input}", row.len()),
                ));
            }
        }
        let mut all_values = self.mean.iter().chain(self.components.iter().flatten());
        if all_values.any(|v| !v.is_finite()) {
            return Err(StartupError::invalid("pca", "non-finite coefficients"));
        }

        if self.whiten {
            let variance = self
                .explained_variance
                .as_ref()
                .ok_or_else(|| StartupError::invalid("pca", "whiten requires explained_variance"))?;
            if variance.len() != self.output_dim() {
                return Err(StartupError::invalid(
                    "pca",
                    format!(
                        "explained_variance has {} entries, expected {}",
                        variance.len(),
                        self.output_dim()
                    ),
                ));
            }
            if variance.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                return Err(StartupError::invalid(
                    "pca",
                    "explained_variance must be positive",
                ));
            }
        }
        Ok(())
    }
}

impl FeatureProjection for PcaProjection {
    fn transform(&self, scaled: &[f64]) -> Result<Vec<f64>, TransformError> {
        if self.components.is_empty() {
            return Err(TransformError::Uninitialized(TransformStage::Projection));
        }
        if scaled.len() != self.input_dim() {
            return Err(TransformError::ShapeMismatch {
                stage: TransformStage::Projection,
                expected: self.input_dim(),
                actual: scaled.len(),
            });
        }

        let centered: Vec<f64> = scaled.iter().zip(&self.mean).map(|(x, m)| x - m).collect();
        let mut projected: Vec<f64> = self
            .components
            .iter()
            .map(|row| row.iter().zip(&centered).map(|(w, x)| w * x).sum::<f64>())
            .collect();

        if self.whiten {
            if let Some(variance) = &self.explained_variance {
                for (value, var) in projected.iter_mut().zip(variance) {
                    *value /= var.sqrt();
                }
            }
        }

        if let Some(index) = projected.iter().position(|v| !v.is_finite()) {
            return Err(TransformError::NonFinite {
                stage: TransformStage::Projection,
                index,
            });
        }
        Ok(projected)
    }
}
