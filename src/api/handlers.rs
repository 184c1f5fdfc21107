use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::ml::ModelInfo;
use crate::models::{PredictRequest, PredictionResponse};
use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde::Serialize;
use validator::Validate;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let model_loaded = state.service.is_loaded().await;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    pub uptime_seconds: u64,
}

/// Score a single startup
pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictionResponse>> {
    request.validate()?;

    let response = state.service.predict(request).await?;

    tracing::debug!(
        label = %response.prediction_label,
        probability = response.probability,
        "Prediction served"
    );
    Ok(Json(response))
}

/// Score several startups in one call
pub async fn predict_batch(
    State(state): State<AppState>,
    Json(requests): Json<Vec<PredictRequest>>,
) -> Result<Json<Vec<PredictionResponse>>> {
    let max_batch_size = state.config.server.max_batch_size;
    if requests.is_empty() {
        return Err(AppError::Validation("Batch must contain at least one record".to_string()));
    }
    if requests.len() > max_batch_size {
        return Err(AppError::Validation(format!(
            "Batch of {} records exceeds the limit of {}",
            requests.len(),
            max_batch_size
        )));
    }
    for request in &requests {
        request.validate()?;
    }

    let responses = state.service.predict_batch(requests).await?;
    tracing::debug!(count = responses.len(), "Batch prediction served");
    Ok(Json(responses))
}

/// Describe the loaded model
pub async fn model_info(State(state): State<AppState>) -> Result<Json<ModelInfo>> {
    Ok(Json(state.service.model_info().await?))
}

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}
