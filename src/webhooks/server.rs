//! Admission webhook server.
//!
//! Provides HTTP endpoints for Kubernetes admission webhooks.
//!
//! To enable the webhook:
//! 1. Deploy cert-manager for TLS certificates
//! 2. Create a ValidatingWebhookConfiguration for pods pointing at `/validate-pods`
//! 3. Mount the TLS certificate secret to the controller pod at /etc/webhook/certs/
//!
//! The webhook server starts automatically when certificates are present.
//!
//! Register both `pods` and `pods/ephemeralcontainers` (CREATE and UPDATE) in
//! the webhook rules. Without the subresource, images attached by
//! `kubectl debug` are never sent for review.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use axum_server::tls_rustls::RustlsConfig;
use k8s_openapi::api::core::v1::Pod;
use kube::Resource;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::pod::PodContext;
use super::validator::PodValidator;
use crate::health::HealthState;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;

/// Shared state for webhook handlers
pub struct WebhookState {
    pub validator: Arc<PodValidator>,
}

impl WebhookState {
    pub fn new(validator: Arc<PodValidator>) -> Self {
        Self { validator }
    }
}

type ReviewResponse = (StatusCode, Json<AdmissionReview<DynamicObject>>);

/// Create a denial response with reason embedded in message.
/// kube-rs deny() only sets status.message, so we format as "[reason] message"
fn deny_with_reason<T: Resource<DynamicType = ()>>(
    request: &AdmissionRequest<T>,
    message: &str,
    reason: &str,
) -> AdmissionReview<DynamicObject> {
    let full_message = format!("[{}] {}", reason, message);
    AdmissionResponse::from(request)
        .deny(full_message)
        .into_review()
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/validate-pods", post(validate_pods))
        .with_state(state)
}

/// Pod admission handler
pub async fn validate_pods(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<Pod>>,
) -> ReviewResponse {
    let request: AdmissionRequest<Pod> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    AdmissionResponse::invalid(format!("Invalid AdmissionReview: {}", e))
                        .into_review(),
                ),
            );
        }
    };

    let uid = &request.uid;
    debug!(
        uid = %uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = ?request.name,
        "Processing admission request"
    );

    // Nothing new is scheduled on DELETE or CONNECT
    if matches!(request.operation, Operation::Delete | Operation::Connect) {
        info!(uid = %uid, operation = ?request.operation, "Admission request allowed");
        return (
            StatusCode::OK,
            Json(AdmissionResponse::from(&request).into_review()),
        );
    }

    let pod = match &request.object {
        Some(pod) => pod,
        None => {
            error!(uid = %uid, "Missing object in request");
            return (
                StatusCode::OK,
                Json(deny_with_reason(
                    &request,
                    "Missing object in request",
                    "InvalidRequest",
                )),
            );
        }
    };

    let context = PodContext::from_pod(pod);
    match state.validator.validate_pod(&context).await {
        Ok(verdict) if verdict.valid => {
            info!(uid = %uid, pod_name = %context.name, "Admission request allowed");
            (
                StatusCode::OK,
                Json(AdmissionResponse::from(&request).into_review()),
            )
        }
        Ok(verdict) => {
            warn!(uid = %uid, pod_name = %context.name, reason = %verdict.reason, "Admission request denied");
            (
                StatusCode::OK,
                Json(deny_with_reason(&request, &verdict.reason, "ImagePolicy")),
            )
        }
        Err(e) => {
            error!(uid = %uid, pod_name = %context.name, error = %e, "Admission request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AdmissionResponse::invalid(e.to_string()).into_review()),
            )
        }
    }
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS
///
/// Binds to `0.0.0.0:<port>` and serves the /validate-pods endpoint.
/// TLS certificates are loaded from the paths specified (PEM format).
/// When `health` is given it is marked ready once the listener is bound.
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    port: u16,
    cert_path: &Path,
    key_path: &Path,
    health: Option<Arc<HealthState>>,
) -> Result<(), WebhookError> {
    let app = create_webhook_router(state);

    let config = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let handle = axum_server::Handle::new();

    if let Some(health) = health {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Some(addr) = handle.listening().await {
                info!(%addr, "Webhook server listening with TLS");
                health.set_ready(true).await;
            }
        });
    }

    axum_server::bind_rustls(addr, config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
