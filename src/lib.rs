//! image-admission-controller library crate
//!
//! Admits pods only when every container image resolves to a digest that
//! carries a verified build provenance and a sufficient score attestation.
//! Exports the validation pipeline, its registry and attestation
//! collaborators, and the webhook and health servers.

pub mod attestation;
pub mod config;
pub mod error;
pub mod health;
pub mod image;
pub mod registry;
pub mod webhooks;

pub use config::{Args, PolicyParameters};
pub use error::{Error, Result};
pub use health::HealthState;
pub use webhooks::{
    PodContext, PodValidator, ValidationVerdict, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH,
    WEBHOOK_PORT, WebhookError, WebhookState, run_webhook_server,
};
