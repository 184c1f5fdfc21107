use crate::error::{AppError, Result};
use crate::ml::classifier::{Classifier, TrainedModel};
use crate::ml::features::FeatureEngineer;
use crate::ml::models::ModelMetadata;
use crate::ml::preprocessing::{MedianImputer, StandardScaler};
use crate::ml::threshold::ThresholdAnalysis;
use crate::models::StartupRecord;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Artifact format version written into package metadata
pub const PACKAGE_VERSION: &str = "1.0.0";

/// Probability and decision for one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrediction {
    pub probability: f64,
    pub threshold: f64,
    pub positive: bool,
}

/// Everything needed to score raw records: the fitted feature engineer,
/// imputer, optional scaler, classifier and decision threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPackage {
    pub metadata: ModelMetadata,
    pub features: FeatureEngineer,
    pub imputer: MedianImputer,
    pub scaler: Option<StandardScaler>,
    pub model: TrainedModel,
    pub threshold: f64,
    pub threshold_analysis: Option<ThresholdAnalysis>,
}

/// Location of the digest written next to a package
pub fn checksum_path(path: &Path) -> PathBuf {
    let mut sidecar = path.as_os_str().to_owned();
    sidecar.push(".sha256");
    PathBuf::from(sidecar)
}

pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl ModelPackage {
    /// Feature engineering, imputation and scaling, in training order
    pub fn preprocess(&self, records: &[StartupRecord]) -> Result<Array2<f64>> {
        let features = self.features.transform(records)?;
        let imputed = self.imputer.transform(&features)?;
        match &self.scaler {
            Some(scaler) => scaler.transform(&imputed),
            None => Ok(imputed),
        }
    }

    /// Positive-class probability per record
    pub fn predict_proba(&self, records: &[StartupRecord]) -> Result<Vec<f64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let x = self.preprocess(records)?;
        Ok(self.model.predict_proba(&x)?.to_vec())
    }

    pub fn predict(&self, record: &StartupRecord) -> Result<ScoredPrediction> {
        let probability = self
            .predict_proba(std::slice::from_ref(record))?
            .first()
            .copied()
            .ok_or_else(|| AppError::Internal("Model returned no probability".to_string()))?;

        Ok(ScoredPrediction {
            probability,
            threshold: self.threshold,
            positive: probability >= self.threshold,
        })
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.feature_names()
    }

    /// Replace the decision threshold, rejecting values outside [0, 1]
    pub fn set_threshold(&mut self, threshold: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::Validation(format!(
                "Threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        self.threshold = threshold;
        Ok(())
    }

    /// Serialize to `path`, returning the SHA-256 of the written bytes
    pub fn save(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let bytes = bincode::serialize(self)?;
        std::fs::write(path, &bytes)?;
        let digest = checksum(&bytes);
        std::fs::write(checksum_path(path), format!("{}\n", digest))?;

        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            sha256 = %digest,
            "Model package saved"
        );
        Ok(digest)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            AppError::Configuration(format!("Cannot read model package {}: {}", path.display(), e))
        })?;

        let digest = checksum(&bytes);
        match std::fs::read_to_string(checksum_path(path)) {
            Ok(expected) if expected.trim() != digest => {
                return Err(AppError::Configuration(format!(
                    "Checksum mismatch for model package {}: expected {}, found {}",
                    path.display(),
                    expected.trim(),
                    digest
                )));
            }
            Ok(_) => {}
            Err(_) => tracing::warn!(
                path = %path.display(),
                "No checksum file next to model package, skipping verification"
            ),
        }

        let package: Self = bincode::deserialize(&bytes)?;

        if package.metadata.version != PACKAGE_VERSION {
            tracing::warn!(
                found = %package.metadata.version,
                expected = PACKAGE_VERSION,
                "Model package version differs"
            );
        }
        if !package.model.is_trained() || !package.features.is_fitted() {
            return Err(AppError::NotFitted(format!(
                "Model package {} contains an unfitted pipeline",
                path.display()
            )));
        }

        tracing::info!(
            path = %path.display(),
            sha256 = %digest,
            model_type = %package.metadata.model_type,
            n_features = package.metadata.n_features,
            threshold = package.threshold,
            "Model package loaded"
        );
        Ok(package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_hex_sha256() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_load_missing_package() {
        assert!(matches!(
            ModelPackage::load("/nonexistent/model.bin"),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_checksum_path_appends_suffix() {
        assert_eq!(
            checksum_path(Path::new("models/model.bin")),
            PathBuf::from("models/model.bin.sha256")
        );
    }

    #[test]
    fn test_load_rejects_checksum_mismatch() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"package bytes").unwrap();
        std::fs::write(checksum_path(file.path()), checksum(b"other bytes")).unwrap();

        let result = ModelPackage::load(file.path());
        std::fs::remove_file(checksum_path(file.path())).unwrap();
        match result {
            Err(AppError::Configuration(message)) => assert!(message.contains("Checksum mismatch")),
            other => panic!("expected checksum mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_garbage_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a model").unwrap();
        assert!(ModelPackage::load(file.path()).is_err());
    }
}
