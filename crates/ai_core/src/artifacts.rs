//! Loading of the fitted artifacts at start-up
//!
//! The three JSON artifacts are read once, checked against each other and
//! then shared read-only for the life of the process. Any problem here is a
//! [`StartupError`]; callers are expected to abort rather than serve.

use crate::errors::StartupError;
use crate::knn::KnnClassifier;
use crate::projection::PcaProjection;
use crate::scaler::StandardScaler;
use custcat_types::FEATURE_COUNT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const SCALER_FILE: &str = "scaler.json";
pub const PCA_FILE: &str = "pca.json";
pub const KNN_FILE: &str = "knn_model.json";

/// Expected BLAKE3 digests (lowercase hex) of the artifact files.
///
/// A `None` entry skips verification for that file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigests {
    #[serde(default)]
    pub scaler: Option<String>,
    #[serde(default)]
    pub pca: Option<String>,
    #[serde(default)]
    pub knn: Option<String>,
}

impl ArtifactDigests {
    /// Reject digests that are not 64 hex characters.
    pub fn validate(&self) -> Result<(), String> {
        for (name, digest) in [("scaler", &self.scaler), ("pca", &self.pca), ("knn", &self.knn)] {
            if let Some(digest) = digest {
                if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(format!("{name} digest must be 64 hex characters"));
                }
            }
        }
        Ok(())
    }
}

/// Digest of one loaded artifact file, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedArtifact {
    pub path: PathBuf,
    pub blake3: String,
}

/// Scaler, projection and classifier loaded together.
#[derive(Debug, Clone)]
pub struct FittedArtifacts {
    pub scaler: Arc<StandardScaler>,
    pub projection: Arc<PcaProjection>,
    pub classifier: Arc<KnnClassifier>,
    pub sources: Vec<LoadedArtifact>,
}

impl FittedArtifacts {
    /// Assemble artifacts built in memory, applying the same consistency checks
    /// as [`FittedArtifacts::load_from_dir`].
    pub fn from_parts(
        scaler: StandardScaler,
        projection: PcaProjection,
        classifier: KnnClassifier,
    ) -> Result<Self, StartupError> {
        scaler.validate()?;
        projection.validate(FEATURE_COUNT)?;
        classifier.validate(projection.output_dim())?;

        Ok(Self {
            scaler: Arc::new(scaler),
            projection: Arc::new(projection),
            classifier: Arc::new(classifier),
            sources: Vec::new(),
        })
    }

    /// Read `scaler.json`, `pca.json` and `knn_model.json` from `dir`.
    pub fn load_from_dir(dir: &Path, digests: &ArtifactDigests) -> Result<Self, StartupError> {
        let (scaler, scaler_src) =
            load_artifact::<StandardScaler>(&dir.join(SCALER_FILE), "scaler", &digests.scaler)?;
        let (projection, pca_src) =
            load_artifact::<PcaProjection>(&dir.join(PCA_FILE), "pca", &digests.pca)?;
        let (classifier, knn_src) =
            load_artifact::<KnnClassifier>(&dir.join(KNN_FILE), "knn", &digests.knn)?;

        let mut artifacts = Self::from_parts(scaler, projection, classifier)?;
        artifacts.sources = vec![scaler_src, pca_src, knn_src];

        info!(
            "Loaded fitted artifacts from {}: {} components, k={}, {} reference samples",
            dir.display(),
            artifacts.projection.output_dim(),
            artifacts.classifier.k,
            artifacts.classifier.points.len()
        );
        Ok(artifacts)
    }
}

/// BLAKE3 digest of `bytes` as lowercase hex.
pub fn digest_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn load_artifact<T: DeserializeOwned>(
    path: &Path,
    artifact: &'static str,
    expected_digest: &Option<String>,
) -> Result<(T, LoadedArtifact), StartupError> {
    let bytes = fs::read(path).map_err(|source| StartupError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let actual = digest_hex(&bytes);
    if let Some(expected) = expected_digest {
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(StartupError::DigestMismatch {
                artifact,
                expected: expected.clone(),
                actual,
            });
        }
    }

    let value = serde_json::from_slice(&bytes).map_err(|source| StartupError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Loaded {} artifact {} (blake3 {})", artifact, path.display(), actual);
    Ok((
        value,
        LoadedArtifact {
            path: path.to_path_buf(),
            blake3: actual,
        },
    ))
}
