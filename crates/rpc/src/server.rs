use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use custcat_ai_service::{PipelineError, PredictionService};
use custcat_types::CustomerFeatures;
use serde::Serialize;
use serde_json::Value;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const SERVICE_NAME: &str = "Customer Category Prediction API";
const PREDICTION_MESSAGE: &str = "Prediction completed successfully";

/// HTTP-level limits and CORS policy.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Requests admitted concurrently; the rest wait for a slot
    pub max_in_flight: usize,
    pub max_body_bytes: usize,
    /// `*` allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 256,
            max_body_bytes: 16 * 1024,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
    pub server: ServerConfig,
    pub start_time: Instant,
    pub req_count: Arc<AtomicUsize>,
    pub malformed_bodies: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(service: PredictionService, server: ServerConfig) -> Self {
        Self {
            service,
            server,
            start_time: Instant::now(),
            req_count: Arc::new(AtomicUsize::new(0)),
            malformed_bodies: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct PredictResponse {
    prediction: u32,
    message: &'static str,
    input_features: CustomerFeatures,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    message: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct RootResponse {
    message: &'static str,
    status: &'static str,
    version: &'static str,
    endpoints: Value,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            detail: self.message,
        });
        (self.status, payload).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        if err.is_client_error() {
            ApiError::bad_request(err.to_string())
        } else {
            ApiError::internal(err.to_string())
        }
    }
}

/// Serve `state` on `addr` until `shutdown` resolves, then drain in-flight
/// requests.
pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(Arc::new(state));
    let listener = bind_listener(addr).await?;
    if let Ok(local) = listener.local_addr() {
        info!("Prediction API listening on http://{}", local);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server terminated unexpectedly")
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl-C handler: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining in-flight requests");
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.server.allowed_origins))
        .layer(GlobalConcurrencyLimitLayer::new(state.server.max_in_flight));
    // Enforced by the JSON extractor, so oversized bodies get the same
    // `{"detail": ...}` shape as every other rejection.
    let body_limit = DefaultBodyLimit::max(state.server.max_body_bytes);

    Router::new()
        .route("/", get(handle_root))
        .route("/api/test", get(handle_test))
        .route("/predict", post(handle_predict))
        .route("/version", get(handle_version))
        .route("/metrics", get(handle_metrics))
        .layer(body_limit)
        .layer(middleware)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn handle_predict(
    State(state): State<SharedState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    state.record_request();

    let Json(body) = payload.map_err(|rejection| {
        state.malformed_bodies.fetch_add(1, Ordering::Relaxed);
        warn!("Rejected malformed request body: {}", rejection.body_text());
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, rejection.body_text())
        } else {
            ApiError::bad_request(rejection.body_text())
        }
    })?;

    // Sled writes may block; keep them off the async workers.
    let service = state.service.clone();
    let outcome = tokio::task::spawn_blocking(move || service.predict_json(&body))
        .await
        .map_err(|err| ApiError::internal(format!("prediction task failed: {err}")))??;

    Ok(Json(PredictResponse {
        prediction: outcome.result.prediction,
        message: PREDICTION_MESSAGE,
        input_features: outcome.result.input_features,
    }))
}

async fn handle_test(State(state): State<SharedState>) -> Json<StatusResponse> {
    state.record_request();
    Json(StatusResponse {
        message: "API is up and running",
        status: "OK",
    })
}

async fn handle_root(State(state): State<SharedState>) -> Json<RootResponse> {
    state.record_request();
    Json(RootResponse {
        message: SERVICE_NAME,
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: serde_json::json!({
            "/predict": "POST - run a prediction",
            "/api/test": "GET - connectivity check",
            "/version": "GET - service version",
            "/metrics": "GET - Prometheus metrics",
        }),
    })
}

async fn handle_version(State(state): State<SharedState>) -> Json<VersionResponse> {
    state.record_request();
    Json(VersionResponse {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_metrics(State(state): State<SharedState>) -> Response {
    let req_total = state.record_request();
    let uptime = state.uptime_seconds();
    let pipeline = state.service.metrics();
    let rejected =
        pipeline.client_rejections + state.malformed_bodies.load(Ordering::Relaxed) as u64;

    let mut metrics =
        "# HELP custcat_http_requests_total Total number of HTTP requests handled\n".to_string();
    metrics.push_str("# TYPE custcat_http_requests_total counter\n");
    metrics.push_str(&format!("custcat_http_requests_total {req_total}\n"));
    metrics.push_str("# HELP custcat_predictions_served_total Predictions returned to callers\n");
    metrics.push_str("# TYPE custcat_predictions_served_total counter\n");
    metrics.push_str(&format!(
        "custcat_predictions_served_total {}\n",
        pipeline.predictions_served
    ));
    metrics.push_str("# HELP custcat_rejected_requests_total Requests rejected as invalid\n");
    metrics.push_str("# TYPE custcat_rejected_requests_total counter\n");
    metrics.push_str(&format!("custcat_rejected_requests_total {rejected}\n"));
    metrics.push_str("# HELP custcat_failed_requests_total Requests failed by a pipeline stage\n");
    metrics.push_str("# TYPE custcat_failed_requests_total counter\n");
    metrics.push_str(&format!(
        "custcat_failed_requests_total {}\n",
        pipeline.server_failures
    ));
    metrics.push_str("# HELP custcat_record_failures_total Served predictions that were not persisted\n");
    metrics.push_str("# TYPE custcat_record_failures_total counter\n");
    metrics.push_str(&format!(
        "custcat_record_failures_total {}\n",
        pipeline.record_failures
    ));
    metrics.push_str("# HELP custcat_uptime_seconds Uptime of the service in seconds\n");
    metrics.push_str("# TYPE custcat_uptime_seconds gauge\n");
    metrics.push_str(&format!("custcat_uptime_seconds {uptime}\n"));

    let mut response = Response::new(Body::from(metrics));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use custcat_ai_core::{
        Classifier, KnnClassifier, PcaProjection, PredictionError, StandardScaler,
    };
    use custcat_storage::{MemoryStorage, PredictionStore};
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Fixture {
        router: Router,
        store: Arc<MemoryStorage>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStorage::new());
        let state = AppState::new(service_with(store.clone()), ServerConfig::default());
        Fixture {
            router: build_router(Arc::new(state)),
            store,
        }
    }

    fn fixture_service() -> PredictionService {
        service_with(Arc::new(MemoryStorage::new()))
    }

    // Projects onto (region, age); region 1 customers around age 30 are
    // labelled 2, region 3 customers around age 60 are labelled 4.
    fn service_with(store: Arc<MemoryStorage>) -> PredictionService {
        let width = custcat_types::FEATURE_COUNT;
        let scaler = StandardScaler::new(vec![0.0; width], vec![1.0; width]);
        let mut region = vec![0.0; width];
        region[0] = 1.0;
        let mut age = vec![0.0; width];
        age[2] = 1.0;
        let projection = PcaProjection::new(vec![0.0; width], vec![region, age]);
        let classifier = KnnClassifier::new(
            1,
            vec![vec![1.0, 30.0], vec![3.0, 60.0]],
            vec![2, 4],
        );

        PredictionService::new(
            Arc::new(scaler),
            Arc::new(projection),
            Arc::new(classifier),
            store,
        )
    }

    fn sample_body() -> Value {
        json!({
            "region": 1, "tenure": 12, "age": 30, "marital": 1, "address": 5,
            "income": 45.0, "ed": 3, "employ": 4, "retire": 0, "gender": 1, "reside": 2
        })
    }

    fn post_json(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = send(router, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn predict_returns_label_and_echo() {
        let fx = fixture();
        let (status, body) = send_json(&fx.router, post_json(sample_body().to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction"], json!(2));
        assert_eq!(body["message"], json!(PREDICTION_MESSAGE));
        assert_eq!(body["input_features"], sample_body());
        assert_eq!(fx.store.prediction_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_field_is_a_bad_request_naming_it() {
        let fx = fixture();
        let mut body = sample_body();
        body.as_object_mut().unwrap().remove("reside");

        let (status, body) = send_json(&fx.router, post_json(body.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("reside"));
        assert_eq!(fx.store.prediction_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn domain_violation_is_a_bad_request() {
        let fx = fixture();
        let mut body = sample_body();
        body["ed"] = json!(7);

        let (status, body) = send_json(&fx.router, post_json(body.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.contains("ed"));
        assert!(detail.contains("between 1 and 5"));
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request_with_detail() {
        let fx = fixture();
        let (status, body) = send_json(&fx.router, post_json("{\"region\": 1,".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn storage_outage_keeps_the_response_identical() {
        let fx = fixture();
        let (_, healthy) = send_json(&fx.router, post_json(sample_body().to_string())).await;

        fx.store.set_fail_writes(true);
        let (status, degraded) = send_json(&fx.router, post_json(sample_body().to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(healthy, degraded);
        assert_eq!(fx.store.prediction_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn readiness_and_root_metadata() {
        let fx = fixture();
        let (status, body) = send_json(&fx.router, get("/api/test")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"message": "API is up and running", "status": "OK"})
        );

        let (status, body) = send_json(&fx.router, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("running"));
        assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
        assert!(body["endpoints"]["/predict"].is_string());
    }

    #[tokio::test]
    async fn metrics_count_predictions_and_rejections() {
        let fx = fixture();
        send(&fx.router, post_json(sample_body().to_string())).await;
        send(&fx.router, post_json("not json".into())).await;

        let (status, bytes) = send(&fx.router, get("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("custcat_predictions_served_total 1\n"));
        assert!(text.contains("custcat_rejected_requests_total 1\n"));
        assert!(text.contains("custcat_http_requests_total 3\n"));
    }

    #[tokio::test]
    async fn oversized_body_is_refused_with_detail() {
        let fx = fixture();
        let padding = "x".repeat(ServerConfig::default().max_body_bytes + 1);
        let mut body = sample_body();
        body["padding"] = json!(padding);

        let (status, body) = send_json(&fx.router, post_json(body.to_string())).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["detail"].is_string());
        assert_eq!(fx.store.prediction_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn declared_oversized_length_is_refused_with_detail() {
        let fx = fixture();
        let payload = format!(
            "{{\"padding\": \"{}\"}}",
            "x".repeat(ServerConfig::default().max_body_bytes)
        );
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, payload.len())
            .body(Body::from(payload))
            .unwrap();

        let (status, body) = send_json(&fx.router, request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["detail"].is_string());
    }

    struct SlowClassifier {
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Classifier for SlowClassifier {
        fn predict(&self, _point: &[f64]) -> Result<u32, PredictionError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(2)
        }
    }

    fn slow_router(max_in_flight: usize, classifier: Arc<SlowClassifier>) -> Router {
        let width = custcat_types::FEATURE_COUNT;
        let service = PredictionService::new(
            Arc::new(StandardScaler::new(vec![0.0; width], vec![1.0; width])),
            Arc::new(PcaProjection::new(vec![0.0; width], vec![vec![1.0; width]])),
            classifier,
            Arc::new(MemoryStorage::new()),
        );
        let state = AppState::new(
            service,
            ServerConfig {
                max_in_flight,
                ..ServerConfig::default()
            },
        );
        build_router(Arc::new(state))
    }

    fn slow_classifier() -> Arc<SlowClassifier> {
        Arc::new(SlowClassifier {
            delay: Duration::from_millis(200),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn max_in_flight_serializes_concurrent_predictions() {
        let classifier = slow_classifier();
        let router = slow_router(1, classifier.clone());

        let started = Instant::now();
        let (first, second) = tokio::join!(
            send(&router, post_json(sample_body().to_string())),
            send(&router, post_json(sample_body().to_string())),
        );

        assert_eq!(first.0, StatusCode::OK);
        assert_eq!(second.0, StatusCode::OK);
        assert_eq!(classifier.peak.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= classifier.delay * 2);
    }

    #[tokio::test]
    async fn requests_overlap_when_slots_are_free() {
        let classifier = slow_classifier();
        let router = slow_router(2, classifier.clone());

        let (first, second) = tokio::join!(
            send(&router, post_json(sample_body().to_string())),
            send(&router, post_json(sample_body().to_string())),
        );

        assert_eq!(first.0, StatusCode::OK);
        assert_eq!(second.0, StatusCode::OK);
        assert_eq!(classifier.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn explicit_origin_list_is_echoed_for_allowed_origins() {
        let service = fixture_service();
        let state = AppState::new(
            service,
            ServerConfig {
                allowed_origins: vec!["http://localhost:8501".to_string(), "bad\norigin".to_string()],
                ..ServerConfig::default()
            },
        );
        let router = build_router(Arc::new(state));
        let request = Request::builder()
            .uri("/api/test")
            .header(header::ORIGIN, "http://localhost:8501")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:8501"
        );
    }
}
