//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once the webhook is serving)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// Labels for admission outcome metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct VerdictLabels {
    /// `allowed`, `denied` or `error`
    pub verdict: String,
}

impl EncodeLabelSet for VerdictLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("verdict", self.verdict.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-check image metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CheckLabels {
    /// Validator name
    pub check: String,
    /// `pass`, `fail` or `error`
    pub result: String,
}

impl EncodeLabelSet for CheckLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("check", self.check.as_str()).encode(encoder.encode_label())?;
        ("result", self.result.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the admission controller
pub struct Metrics {
    /// Admission requests by outcome
    pub admission_requests_total: Family<VerdictLabels, Counter>,
    /// Per-image check outcomes
    pub image_checks_total: Family<CheckLabels, Counter>,
    /// Pod validation duration histogram
    pub validation_duration_seconds: Histogram,
    /// Images resolved to a digest
    pub images_resolved_total: Counter,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_requests_total = Family::<VerdictLabels, Counter>::default();
        registry.register(
            "imageadmission_admission_requests",
            "Total number of pod admission decisions",
            admission_requests_total.clone(),
        );

        let image_checks_total = Family::<CheckLabels, Counter>::default();
        registry.register(
            "imageadmission_image_checks",
            "Total number of image checks by validator and result",
            image_checks_total.clone(),
        );

        // Registry and attestation round trips dominate; start at 5ms.
        let validation_duration_seconds = Histogram::new(exponential_buckets(0.005, 2.0, 12));
        registry.register(
            "imageadmission_validation_duration_seconds",
            "Duration of pod validation in seconds",
            validation_duration_seconds.clone(),
        );

        let images_resolved_total = Counter::default();
        registry.register(
            "imageadmission_images_resolved",
            "Total number of container images resolved to a digest",
            images_resolved_total.clone(),
        );

        Self {
            admission_requests_total,
            image_checks_total,
            validation_duration_seconds,
            images_resolved_total,
            registry,
        }
    }

    /// Record one admission decision
    pub fn record_admission(&self, verdict: &str, duration_secs: f64) {
        let labels = VerdictLabels {
            verdict: verdict.to_string(),
        };
        self.admission_requests_total.get_or_create(&labels).inc();
        self.validation_duration_seconds.observe(duration_secs);
    }

    /// Record one image check
    pub fn record_image_check(&self, check: &str, result: &str) {
        let labels = CheckLabels {
            check: check.to_string(),
            result: result.to_string(),
        };
        self.image_checks_total.get_or_create(&labels).inc();
    }

    /// Record resolved images
    pub fn record_images_resolved(&self, count: u64) {
        self.images_resolved_total.inc_by(count);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the webhook is ready to serve admissions
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
    /// Last admission decision timestamp (Unix epoch seconds)
    pub last_admission: AtomicU64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
            last_admission: AtomicU64::new(0),
        }
    }

    /// Mark the controller as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the controller is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the webhook server is listening.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on `0.0.0.0:<port>`
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
