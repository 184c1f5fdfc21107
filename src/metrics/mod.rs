/// Prometheus metrics for the prediction service.
///
/// Covers HTTP traffic, prediction volume and latency, error codes and
/// model availability. Everything is registered on [`PROMETHEUS_REGISTRY`]
/// and exported through [`gather_metrics`] by `GET /metrics`.
///
/// # Example
/// ```no_run
/// use startup_predictor::metrics::PREDICTIONS_TOTAL;
///
/// PREDICTIONS_TOTAL.with_label_values(&["Success"]).inc();
/// ```
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::time::Instant;

const NAMESPACE: &str = "startup_predictor";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Total number of HTTP requests received
    ///
    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// HTTP request duration in seconds
    ///
    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    // ============================================================================
    // Prediction Metrics
    // ============================================================================

    /// Total number of scored records
    ///
    /// Labels: label (Success, Failure)
    pub static ref PREDICTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("predictions_total", "Total number of scored records")
            .namespace(NAMESPACE),
        &["label"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// Time spent scoring one request (single or batch)
    pub static ref PREDICTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "prediction_duration_seconds",
            "Time spent scoring one request in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
    ).expect("Failed to create PREDICTION_DURATION_SECONDS metric");

    /// Total number of failed requests
    ///
    /// Labels: code
    pub static ref PREDICTION_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("prediction_errors_total", "Total number of failed requests by error code")
            .namespace(NAMESPACE),
        &["code"]
    ).expect("Failed to create PREDICTION_ERRORS_TOTAL metric");

    /// 1 when a model package is loaded, 0 otherwise
    pub static ref MODEL_LOADED: Gauge = Gauge::with_opts(
        Opts::new("model_loaded", "Whether a model package is loaded")
            .namespace(NAMESPACE)
    ).expect("Failed to create MODEL_LOADED metric");

    // ============================================================================
    // System Metrics
    // ============================================================================

    /// Build information
    ///
    /// Labels: version
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Build information")
            .namespace(NAMESPACE),
        &["version"]
    ).expect("Failed to create BUILD_INFO metric");
}

/// Register every metric with [`PROMETHEUS_REGISTRY`].
///
/// # Errors
///
/// Fails when called twice in the same process, since metrics can only be
/// registered once.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(PREDICTIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PREDICTION_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PREDICTION_ERRORS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(MODEL_LOADED.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(BUILD_INFO.clone()))?;
    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1.0);

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Generate Prometheus text format metrics
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Axum middleware recording request count and latency per matched route
pub async fn track_http(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        // Registration is global; a second call in the same process errors
        let _ = init_metrics();
        assert!(gather_metrics().contains("startup_predictor_build_info"));
    }

    #[test]
    fn test_prediction_metrics() {
        PREDICTIONS_TOTAL.with_label_values(&["Success"]).inc();

        let value = PREDICTIONS_TOTAL.with_label_values(&["Success"]).get();
        assert!(value >= 1.0);
    }

    #[test]
    fn test_gather_metrics() {
        let _ = init_metrics();
        MODEL_LOADED.set(0.0);
        let metrics = gather_metrics();
        assert!(metrics.contains("startup_predictor_model_loaded"));
    }
}
