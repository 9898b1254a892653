// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for pod admission.
//!
//! These tests drive the full validation pipeline (reference resolution,
//! digest pinning, policy chain) WITHOUT a cluster or registry. Collaborators
//! are mocked, and attestation tests feed real DSSE envelopes through the
//! production statement verifier.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_pinned_image_with_valid_attestations
//! ```
//!
//! ## Test Categories
//!
//! - **Pipeline tests**: ordering, short-circuit and idempotence properties
//! - **Scenario tests**: end-to-end admission scenarios
//! - **Attestation tests**: envelope and claim checks through `StatementVerifier`

mod mocks;

use std::sync::Arc;

use image_admission::attestation::{ProvenanceVerifier, ScoreVerifier};
use image_admission::config::PolicyParameters;
use image_admission::webhooks::{ContainerImage, PodContext, PodValidator, ValidationObserver};

pub use mocks::*;

/// Standard chain over the given collaborators
pub fn standard_validator(
    policy: PolicyParameters,
    registry: Arc<MockRegistry>,
    provenance: Arc<dyn ProvenanceVerifier>,
    score: Arc<dyn ScoreVerifier>,
    observer: Arc<dyn ValidationObserver>,
) -> PodValidator {
    PodValidator::standard(
        Arc::new(policy),
        registry.clone(),
        registry,
        provenance,
        score,
    )
    .with_observer(observer)
}

/// Registry serving both attestation kinds
pub fn attested_registry() -> MockRegistry {
    use image_admission::registry::AttestationKind;

    MockRegistry::new()
        .with_attestation(
            AttestationKind::Provenance,
            provenance_envelope(SOURCE_REPO, "main", BUILDER_ID),
        )
        .with_attestation(AttestationKind::Score, score_envelope(8.5, SOURCE_REPO))
}

pub fn pod(name: &str, containers: &[(&str, &str)]) -> PodContext {
    PodContext::new(
        name,
        containers
            .iter()
            .map(|(container, image)| ContainerImage::new(*container, *image))
            .collect(),
    )
}

pub fn pinned(name: &str) -> String {
    format!("{}@sha256:{}", name, HEX)
}
