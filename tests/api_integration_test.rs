//! HTTP API integration tests against the router, without binding a socket

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use startup_predictor::{
    api::{build_router, AppState},
    config::{Config, ModelConfig},
    ml::{dataset::load_records, ModelType, PredictionService, Trainer},
    models::PredictRequest,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

fn trained_router() -> Router {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("startups.csv");
    common::write_csv(&data_path, 60);

    let package = Trainer::new(common::fast_config(ModelType::GradientBoosting))
        .train(load_records(&data_path).unwrap())
        .unwrap()
        .package;

    let mut config = Config::default();
    config.server.max_batch_size = 3;
    build_router(AppState::new(
        Arc::new(config),
        Arc::new(PredictionService::with_package(package)),
    ))
}

fn empty_router() -> Router {
    let service = PredictionService::new(&ModelConfig {
        artifact_path: PathBuf::from("/nonexistent/model.bin"),
        threshold_override: None,
    });
    build_router(AppState::new(Arc::new(Config::default()), Arc::new(service)))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn promising_startup() -> Value {
    json!({
        "name": "Acme Robotics",
        "founded_at": "2005-01-01",
        "first_funding_at": "4/1/2005",
        "last_funding_at": "2009-06-15",
        "relationships": "14",
        "funding_rounds": 3,
        "funding_total_usd": 8200000,
        "milestones": 2,
        "age_first_milestone_year": 1,
        "age_last_milestone_year": 3,
        "has_roundA": 1,
        "has_roundB": 1,
        "avg_participants": 2.5,
        "is_top500": 1,
        "category_code": "software"
    })
}

#[tokio::test]
async fn test_health_reports_model_state() {
    let (status, body) = send(trained_router(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);

    let (status, body) = send(empty_router(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], false);
}

#[tokio::test]
async fn test_predict_single() {
    let (status, body) = send(trained_router(), post_json("/predict", promising_startup())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Acme Robotics");
    let probability = body["probability"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&probability));
    let percent = body["success_probability"].as_f64().unwrap();
    assert!((percent - probability * 100.0).abs() < 0.01);
    assert!(body["prediction_label"] == "Success" || body["prediction_label"] == "Failure");
    assert!(body["risk_level"].is_string());
    assert!(body["recommendation"].is_string());
}

#[tokio::test]
async fn test_predict_coerces_garbage_fields() {
    let body = json!({
        "relationships": "lots",
        "founded_at": "sometime in 2010",
        "funding_total_usd": null
    });
    let (status, body) = send(trained_router(), post_json("/predict", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["probability"].is_number());
}

#[tokio::test]
async fn test_predict_rejects_negative_counts() {
    let body = json!({ "relationships": -4 });
    let (status, body) = send(trained_router(), post_json("/predict", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_predict_without_model() {
    let (status, body) = send(empty_router(), post_json("/predict", promising_startup())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "MODEL_NOT_LOADED");
    assert_eq!(body["error"]["status"], 500);
}

#[tokio::test]
async fn test_predict_batch() {
    let batch = json!([promising_startup(), { "name": "Unknown" }]);
    let (status, body) = send(trained_router(), post_json("/predict/batch", batch)).await;

    assert_eq!(status, StatusCode::OK);
    let responses = body.as_array().unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["name"], "Acme Robotics");
    assert_eq!(responses[1]["name"], "Unknown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_service_batch_matches_package_scores() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("startups.csv");
    common::write_csv(&data_path, 60);
    let records = load_records(&data_path).unwrap();

    let package = Trainer::new(common::fast_config(ModelType::GradientBoosting))
        .train(records.clone())
        .unwrap()
        .package;
    let expected = package.predict_proba(&records).unwrap();
    let service = PredictionService::with_package(package);

    let requests: Vec<PredictRequest> = records
        .into_iter()
        .map(|record| PredictRequest { name: None, record })
        .collect();

    let responses = service.predict_batch(requests).await.unwrap();
    assert_eq!(responses.len(), expected.len());
    for (response, probability) in responses.iter().zip(&expected) {
        assert_eq!(response.probability, *probability);
    }
}

#[tokio::test]
async fn test_predict_batch_limits() {
    let app = trained_router();

    let (status, _) = send(app.clone(), post_json("/predict/batch", json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let oversized = json!([{}, {}, {}, {}]);
    let (status, body) = send(app, post_json("/predict/batch", oversized)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_model_info() {
    let (status, body) = send(trained_router(), get("/model")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["model_type"], "gradient_boosting");
    let features = body["feature_names"].as_array().unwrap();
    assert_eq!(features.len(), body["metadata"]["n_features"].as_u64().unwrap() as usize);
    assert!(body["threshold"].is_number());
    assert!(body["scenarios"]["balanced"].is_number());
    assert!(body["validation_metrics"]["accuracy"].is_number());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = trained_router();
    let _ = startup_predictor::metrics::init_metrics();
    send(app.clone(), post_json("/predict", promising_startup())).await;

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("startup_predictor_predictions_total"));
    assert!(text.contains("startup_predictor_http_requests_total"));
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(trained_router(), request).await;
    assert!(status.is_client_error());
}
