//! k-nearest-neighbour classifier
//!
//! Brute-force search over the stored reference samples. Neighbour order is
//! ascending distance with ties kept in sample order; vote ties go to the
//! smallest label, so results are stable across runs and platforms.

use crate::errors::{PredictionError, StartupError};
use crate::stages::Classifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Distance used to rank reference samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
    Minkowski(f64),
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let pairs = a.iter().zip(b);
        match *self {
            DistanceMetric::Euclidean => pairs.map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt(),
            DistanceMetric::Manhattan => pairs.map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Minkowski(p) => pairs
                .map(|(x, y)| (x - y).abs().powf(p))
                .sum::<f64>()
                .powf(1.0 / p),
        }
    }
}

/// How neighbours contribute to the vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    #[default]
    Uniform,
    /// Inverse distance; exact matches outvote everything else
    Distance,
}

/// Fitted k-NN model: reference points in projected space and their labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnClassifier {
    pub k: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub weights: Weighting,
    pub points: Vec<Vec<f64>>,
    pub labels: Vec<u32>,
}

impl KnnClassifier {
    pub fn new(k: usize, points: Vec<Vec<f64>>, labels: Vec<u32>) -> Self {
        Self {
            k,
            metric: DistanceMetric::Euclidean,
            weights: Weighting::Uniform,
            points,
            labels,
        }
    }

    /// Dimensionality of the reference samples, if any.
    pub fn dim(&self) -> Option<usize> {
        self.points.first().map(Vec::len)
    }

    pub fn validate(&self, expected_dim: usize) -> Result<(), StartupError> {
        if self.points.is_empty() {
            return Err(StartupError::invalid("knn", "no reference samples"));
        }
        if self.labels.len() != self.points.len() {
            return Err(StartupError::invalid(
                "knn",
                format!(
                    "{} labels for {} samples",
                    self.labels.len(),
                    self.points.len()
                ),
            ));
        }
        if self.k == 0 || self.k > self.points.len() {
            return Err(StartupError::invalid(
                "knn",
                format!("k={} outside 1..={}", self.k, self.points.len()),
            ));
        }
        if let DistanceMetric::Minkowski(p) = self.metric {
            if !p.is_finite() || p < 1.0 {
                return Err(StartupError::invalid("knn", format!("minkowski p={p} < 1")));
            }
        }
        for (idx, point) in self.points.iter().enumerate() {
            if point.len() != expected_dim {
                return Err(StartupError::invalid(
                    "knn",
                    format!(
                        "sample {idx} has {} dimensions, projection yields {expected_dim}",
                        point.len()
                    ),
                ));
            }
            if point.iter().any(|v| !v.is_finite()) {
                return Err(StartupError::invalid(
                    "knn",
                    format!("sample {idx} has non-finite coordinates"),
                ));
            }
        }
        Ok(())
    }

    fn nearest(&self, point: &[f64]) -> Vec<(f64, usize)> {
        let mut ranked: Vec<(f64, usize)> = self
            .points
            .iter()
            .enumerate()
            .map(|(idx, sample)| (self.metric.distance(point, sample), idx))
            .collect();
        // Stable sort keeps sample order for equal distances.
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        ranked.truncate(self.k.max(1));
        ranked
    }
}

impl Classifier for KnnClassifier {
    fn predict(&self, point: &[f64]) -> Result<u32, PredictionError> {
        let dim = self.dim().ok_or(PredictionError::EmptyModel)?;
        if self.labels.len() != self.points.len() {
            return Err(PredictionError::LabelCountMismatch {
                points: self.points.len(),
                labels: self.labels.len(),
            });
        }
        if point.len() != dim {
            return Err(PredictionError::DimensionMismatch {
                expected: dim,
                actual: point.len(),
            });
        }
        if point.iter().any(|v| !v.is_finite()) {
            return Err(PredictionError::NonFiniteInput);
        }

        let neighbours = self.nearest(point);
        let exact_match = neighbours.iter().any(|(d, _)| *d == 0.0);

        let mut votes: BTreeMap<u32, f64> = BTreeMap::new();
        for (distance, idx) in neighbours {
            let weight = match self.weights {
                Weighting::Uniform => 1.0,
                Weighting::Distance if exact_match => {
                    if distance == 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
                Weighting::Distance => 1.0 / distance,
            };
            *votes.entry(self.labels[idx]).or_insert(0.0) += weight;
        }

        // BTreeMap iterates labels ascending; only a strictly larger tally
        // replaces the leader, so ties resolve to the smallest label.
        let mut winner: Option<(u32, f64)> = None;
        for (label, tally) in votes {
            match winner {
                Some((_, best)) if tally <= best => {}
                _ => winner = Some((label, tally)),
            }
        }
        winner.map(|(label, _)| label).ok_or(PredictionError::EmptyModel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(k: usize) -> KnnClassifier {
        KnnClassifier::new(
            k,
            vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![10.0, 10.0],
                vec![10.0, 11.0],
            ],
            vec![1, 1, 2, 4, 4],
        )
    }

    #[test]
    fn majority_of_nearest_wins() {
        let knn = model(3);
        assert_eq!(knn.predict(&[0.1, 0.2]).unwrap(), 1);
        assert_eq!(knn.predict(&[9.0, 9.0]).unwrap(), 4);
    }

    #[test]
    fn single_neighbour_returns_its_label() {
        assert_eq!(model(1).predict(&[0.9, 0.1]).unwrap(), 2);
    }

    #[test]
    fn vote_ties_go_to_smallest_label() {
        let knn = KnnClassifier::new(2, vec![vec![0.0], vec![2.0]], vec![3, 2]);
        assert_eq!(knn.predict(&[1.0]).unwrap(), 2);
    }

    #[test]
    fn distance_weighting_prefers_closer_samples() {
        let mut knn = KnnClassifier::new(
            3,
            vec![vec![0.0], vec![3.0], vec![3.5]],
            vec![1, 2, 2],
        );
        assert_eq!(knn.predict(&[0.5]).unwrap(), 2);
        knn.weights = Weighting::Distance;
        assert_eq!(knn.predict(&[0.5]).unwrap(), 1);
    }

    #[test]
    fn exact_match_dominates_distance_vote() {
        let mut knn = KnnClassifier::new(
            3,
            vec![vec![1.0], vec![1.1], vec![0.9]],
            vec![3, 1, 1],
        );
        knn.weights = Weighting::Distance;
        assert_eq!(knn.predict(&[1.0]).unwrap(), 3);
    }

    #[test]
    fn manhattan_and_minkowski_metrics() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert_eq!(DistanceMetric::Euclidean.distance(&a, &b), 5.0);
        assert_eq!(DistanceMetric::Manhattan.distance(&a, &b), 7.0);
        let p2 = DistanceMetric::Minkowski(2.0).distance(&a, &b);
        assert!((p2 - 5.0).abs() < 1e-12);
    }

    #[test]
    fn predictions_are_repeatable() {
        let knn = model(3);
        let point = [0.4, 0.6];
        let first = knn.predict(&point).unwrap();
        for _ in 0..10 {
            assert_eq!(knn.predict(&point).unwrap(), first);
        }
    }

    #[test]
    fn rejects_bad_inputs() {
        let knn = model(3);
        assert_eq!(
            knn.predict(&[1.0]).unwrap_err(),
            PredictionError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(
            knn.predict(&[f64::NAN, 0.0]).unwrap_err(),
            PredictionError::NonFiniteInput
        );
        let empty = KnnClassifier::new(1, Vec::new(), Vec::new());
        assert_eq!(empty.predict(&[0.0]).unwrap_err(), PredictionError::EmptyModel);
    }

    #[test]
    fn validate_checks_structure() {
        assert!(model(3).validate(2).is_ok());
        assert!(model(3).validate(3).is_err());
        assert!(model(0).validate(2).is_err());
        assert!(model(6).validate(2).is_err());

        let mut mislabeled = model(3);
        mislabeled.labels.pop();
        assert!(mislabeled.validate(2).is_err());
    }

    #[test]
    fn short_label_list_is_an_error_not_a_panic() {
        let mut mislabeled = model(5);
        mislabeled.labels.truncate(2);
        assert_eq!(
            mislabeled.predict(&[0.0, 0.0]).unwrap_err(),
            PredictionError::LabelCountMismatch {
                points: 5,
                labels: 2
            }
        );
    }

    #[test]
    fn metric_deserializes_from_artifact_json() {
        let knn: KnnClassifier = serde_json::from_str(
            r#"{"k": 1, "metric": {"minkowski": 3.0}, "weights": "distance",
                "points": [[0.0]], "labels": [2]}"#,
        )
        .unwrap();
        assert_eq!(knn.metric, DistanceMetric::Minkowski(3.0));
        assert_eq!(knn.weights, Weighting::Distance);

        let defaulted: KnnClassifier =
            serde_json::from_str(r#"{"k": 1, "points": [[0.0]], "labels": [2]}"#).unwrap();
        assert_eq!(defaulted.metric, DistanceMetric::Euclidean);
    }
}
