//! Build provenance policy.
//!
//! Validates:
//! - A provenance attestation exists for the image digest
//! - Its signature verifies against the trusted provenance key
//! - It was produced by the expected builder from the expected repository
//!   and branch
//!
//! The digest, never the tag, is the verification subject.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ResolvedImage, ValidationVerdict, Validator, fetch_attestation, verdict_for};
use crate::attestation::{ProvenanceChecks, ProvenanceVerifier};
use crate::config::PolicyParameters;
use crate::error::{Error, Result};
use crate::registry::{AttestationDownloader, AttestationKind};

/// Verifies the build provenance of each image
pub struct ProvenanceCheck {
    downloader: Arc<dyn AttestationDownloader>,
    verifier: Arc<dyn ProvenanceVerifier>,
    policy: Arc<PolicyParameters>,
}

impl ProvenanceCheck {
    pub fn new(
        downloader: Arc<dyn AttestationDownloader>,
        verifier: Arc<dyn ProvenanceVerifier>,
        policy: Arc<PolicyParameters>,
    ) -> Self {
        Self {
            downloader,
            verifier,
            policy,
        }
    }
}

#[async_trait]
impl Validator for ProvenanceCheck {
    fn name(&self) -> &'static str {
        "provenance"
    }

    async fn validate_image(&self, image: &ResolvedImage) -> Result<ValidationVerdict> {
        let reference = &image.reference;
        let checks = ProvenanceChecks {
            repo_url: self.policy.source_repo.clone(),
            branch: self.policy.branch.clone(),
            builder_id: self.policy.builder_id.clone(),
            tag: reference.tag.clone(),
        };

        let outcome = match fetch_attestation(
            self.downloader.as_ref(),
            reference,
            AttestationKind::Provenance,
        )
        .await
        {
            Ok((_dir, path)) => {
                self.verifier
                    .verify(
                        &path,
                        &self.policy.provenance_key_path,
                        &reference.digest,
                        &checks,
                    )
                    .await
            }
            Err(e) => Err(e),
        };

        verdict_for("provenance", reference, outcome, |image, source| {
            Error::Provenance { image, source }
        })
    }
}
