//! Standard scaler
//!
//! Applies `(x - mean) / scale` per field with parameters learned offline.

use crate::errors::{StartupError, TransformError, TransformStage};
use crate::stages::FeatureScaler;
use custcat_types::{FEATURE_COUNT, FEATURE_NAMES};
use serde::{Deserialize, Serialize};

/// Pre-fitted standardization parameters.
///
/// `mean` is absent when the scaler was fitted without centering and
/// `scale` is absent when it was fitted without variance scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub mean: Option<Vec<f64>>,
    #[serde(default)]
    pub scale: Option<Vec<f64>>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Self {
        Self {
            feature_names: None,
            mean: Some(mean),
            scale: Some(scale),
        }
    }

    /// Check the artifact against the canonical feature layout.
    pub fn validate(&self) -> Result<(), StartupError> {
        if let Some(names) = &self.feature_names {
            if names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
                return Err(StartupError::invalid(
                    "scaler",
                    format!("feature names {names:?} do not match {FEATURE_NAMES:?}"),
                ));
            }
        }

        for (label, values) in [("mean", &self.mean), ("scale", &self.scale)] {
            if let Some(values) = values {
                if values.len() != FEATURE_COUNT {
                    return Err(StartupError::invalid(
                        "scaler",
                        format!("{label} has {} entries, expected {FEATURE_COUNT}", values.len()),
                    ));
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(StartupError::invalid(
                        "scaler",
                        format!("{label} contains non-finite values"),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, features: &[f64]) -> Result<Vec<f64>, TransformError> {
        if features.len() != FEATURE_COUNT {
            return Err(TransformError::ShapeMismatch {
                stage: TransformStage::Scaling,
                expected: FEATURE_COUNT,
                actual: features.len(),
            });
        }

        let mut out = features.to_vec();
        if let Some(mean) = &self.mean {
            for (value, mu) in out.iter_mut().zip(mean) {
                *value -= mu;
            }
        }
        if let Some(scale) = &self.scale {
            for (value, sigma) in out.iter_mut().zip(scale) {
                // Constant columns are fitted with a zero scale; leave them unscaled.
                if *sigma != 0.0 {
                    *value /= sigma;
                }
            }
        }

        if let Some(index) = out.iter().position(|v| !v.is_finite()) {
            return Err(TransformError::NonFinite {
                stage: TransformStage::Scaling,
                index,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaler() -> StandardScaler {
        StandardScaler::new(vec![2.0; FEATURE_COUNT], vec![4.0; FEATURE_COUNT])
    }

    #[test]
    fn standardizes_each_field() {
        let input = [10.0; FEATURE_COUNT];
        let out = scaler().transform(&input).unwrap();
        assert_eq!(out, vec![2.0; FEATURE_COUNT]);
    }

    #[test]
    fn zero_scale_leaves_centered_value() {
        let mut scale = vec![1.0; FEATURE_COUNT];
        scale[3] = 0.0;
        let scaler = StandardScaler::new(vec![1.0; FEATURE_COUNT], scale);
        let out = scaler.transform(&[3.0; FEATURE_COUNT]).unwrap();
        assert_eq!(out[3], 2.0);
    }

    #[test]
    fn optional_parameters_are_skipped() {
        let scaler = StandardScaler {
            feature_names: None,
            mean: None,
            scale: Some(vec![2.0; FEATURE_COUNT]),
        };
        let out = scaler.transform(&[8.0; FEATURE_COUNT]).unwrap();
        assert_eq!(out, vec![4.0; FEATURE_COUNT]);
    }

    #[test]
    fn rejects_wrong_width() {
        let err = scaler().transform(&[1.0; 10]).unwrap_err();
        assert_eq!(
            err,
            TransformError::ShapeMismatch {
                stage: TransformStage::Scaling,
                expected: FEATURE_COUNT,
                actual: 10
            }
        );
    }

    #[test]
    fn validate_checks_width_and_names() {
        assert!(scaler().validate().is_ok());

        let short = StandardScaler::new(vec![0.0; 3], vec![1.0; FEATURE_COUNT]);
        assert!(short.validate().is_err());

        let mut reordered = scaler();
        let mut names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        names.swap(0, 1);
        reordered.feature_names = Some(names);
        assert!(reordered.validate().is_err());
    }
}
