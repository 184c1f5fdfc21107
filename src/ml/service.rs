use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::metrics::{MODEL_LOADED, PREDICTIONS_TOTAL, PREDICTION_DURATION_SECONDS};
use crate::ml::models::{ModelMetadata, ModelMetrics};
use crate::ml::pipeline::ModelPackage;
use crate::ml::threshold::ScenarioRecommendations;
use crate::models::{PredictRequest, PredictionResponse};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Description of the loaded model served by `GET /model`
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub metadata: ModelMetadata,
    pub threshold: f64,
    pub feature_names: Vec<String>,
    pub validation_metrics: Option<ModelMetrics>,
    pub scenarios: Option<ScenarioRecommendations>,
}

/// Scores requests against a model package loaded once at startup
pub struct PredictionService {
    /// Package location
    artifact_path: PathBuf,

    /// Threshold forced by configuration instead of the calibrated one
    threshold_override: Option<f64>,

    /// Loaded package, `None` until a load succeeds
    package: Arc<RwLock<Option<Arc<ModelPackage>>>>,
}

impl PredictionService {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            artifact_path: config.artifact_path.clone(),
            threshold_override: config.threshold_override,
            package: Arc::new(RwLock::new(None)),
        }
    }

    /// Wrap an already loaded package
    pub fn with_package(package: ModelPackage) -> Self {
        MODEL_LOADED.set(1.0);
        Self {
            artifact_path: PathBuf::new(),
            threshold_override: None,
            package: Arc::new(RwLock::new(Some(Arc::new(package)))),
        }
    }

    /// Load the package from disk, keeping any previous one on failure
    pub async fn load(&self) -> Result<()> {
        let path = self.artifact_path.clone();
        let override_threshold = self.threshold_override;

        let loaded = tokio::task::spawn_blocking(move || -> Result<ModelPackage> {
            let mut package = ModelPackage::load(&path)?;
            if let Some(threshold) = override_threshold {
                package.set_threshold(threshold)?;
            }
            Ok(package)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Model loading task failed: {}", e)))?;

        match loaded {
            Ok(package) => {
                info!(
                    "🚀 Loaded {} model ({} features, threshold {:.2})",
                    package.metadata.model_type.display_name(),
                    package.metadata.n_features,
                    package.threshold
                );
                *self.package.write().await = Some(Arc::new(package));
                MODEL_LOADED.set(1.0);
                Ok(())
            }
            Err(e) => {
                error!(path = %self.artifact_path.display(), "Failed to load model package: {}", e);
                Err(e)
            }
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.package.read().await.is_some()
    }

    async fn current(&self) -> Result<Arc<ModelPackage>> {
        self.package
            .read()
            .await
            .clone()
            .ok_or(AppError::ModelNotLoaded)
    }

    pub async fn predict(&self, request: PredictRequest) -> Result<PredictionResponse> {
        let mut responses = self.predict_batch(vec![request]).await?;
        responses
            .pop()
            .ok_or_else(|| AppError::Internal("Empty prediction batch".to_string()))
    }

    pub async fn predict_batch(&self, requests: Vec<PredictRequest>) -> Result<Vec<PredictionResponse>> {
        let package = self.current().await?;
        let started = Instant::now();

        let (names, records): (Vec<Option<String>>, Vec<_>) = requests
            .into_iter()
            .map(|request| (request.name.clone(), request.into_record()))
            .unzip();

        let scorer = package.clone();
        let probabilities = tokio::task::spawn_blocking(move || scorer.predict_proba(&records))
            .await
            .map_err(|e| AppError::Internal(format!("Scoring task failed: {}", e)))??;
        let responses: Vec<PredictionResponse> = names
            .into_iter()
            .zip(probabilities)
            .map(|(name, probability)| PredictionResponse::new(name, probability, package.threshold))
            .collect();

        PREDICTION_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
        for response in &responses {
            PREDICTIONS_TOTAL
                .with_label_values(&[&response.prediction_label.to_string()])
                .inc();
        }

        Ok(responses)
    }

    pub async fn model_info(&self) -> Result<ModelInfo> {
        let package = self.current().await?;
        Ok(ModelInfo {
            metadata: package.metadata.clone(),
            threshold: package.threshold,
            feature_names: package.feature_names(),
            validation_metrics: package.metadata.validation_metrics.clone(),
            scenarios: package
                .threshold_analysis
                .as_ref()
                .map(|analysis| analysis.scenarios.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_predict_without_model() {
        let service = PredictionService::new(&ModelConfig {
            artifact_path: PathBuf::from("/nonexistent/model.bin"),
            threshold_override: None,
        });

        assert!(!service.is_loaded().await);
        assert!(service.load().await.is_err());
        assert!(matches!(
            service.predict(PredictRequest::default()).await,
            Err(AppError::ModelNotLoaded)
        ));
        assert!(matches!(service.model_info().await, Err(AppError::ModelNotLoaded)));
    }
}
