//! Score policy.
//!
//! Validates:
//! - A score attestation exists for the image digest
//! - Its signature verifies against the trusted score key
//! - The attested score is at least the configured minimum

use std::sync::Arc;

use async_trait::async_trait;

use super::{ResolvedImage, ValidationVerdict, Validator, fetch_attestation, verdict_for};
use crate::attestation::ScoreVerifier;
use crate::config::PolicyParameters;
use crate::error::{Error, Result};
use crate::registry::{AttestationDownloader, AttestationKind};

/// Verifies the attested score of each image
pub struct ScoreCheck {
    downloader: Arc<dyn AttestationDownloader>,
    verifier: Arc<dyn ScoreVerifier>,
    policy: Arc<PolicyParameters>,
}

impl ScoreCheck {
    pub fn new(
        downloader: Arc<dyn AttestationDownloader>,
        verifier: Arc<dyn ScoreVerifier>,
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
impl Validator for ScoreCheck {
    fn name(&self) -> &'static str {
        "score"
    }

    async fn validate_image(&self, image: &ResolvedImage) -> Result<ValidationVerdict> {
        let reference = &image.reference;

        let outcome =
            match fetch_attestation(self.downloader.as_ref(), reference, AttestationKind::Score)
                .await
            {
                Ok((_dir, path)) => {
                    self.verifier
                        .verify(
                            &path,
                            &self.policy.score_key_path,
                            &reference.digest,
                            self.policy.min_score,
                            self.policy.source_repo.as_deref(),
                        )
                        .await
                }
                Err(e) => Err(e),
            };

        verdict_for("score", reference, outcome, |image, source| Error::Score {
            image,
            source,
        })
    }
}
