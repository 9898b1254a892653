//! Webhook module for validating pod admission requests.
//!
//! Every container image of an admitted pod must resolve to a digest and
//! pass the policy chain:
//! - Name format: image comes from an allowed repository
//! - Provenance: the digest carries a verified build provenance
//! - Score: the digest carries a verified score above the threshold

pub mod observer;
pub mod pod;
pub mod policies;
mod server;
pub mod validator;

pub use observer::{NoopObserver, TracingObserver, ValidationObserver};
pub use pod::{ContainerImage, PodContext, display_name};
pub use policies::{ResolvedImage, ResolvedPod, VALID_POD_REASON, ValidationVerdict, Validator};
pub use server::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, WebhookState,
    create_webhook_router, run_webhook_server, validate_pods,
};
pub use validator::PodValidator;

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
