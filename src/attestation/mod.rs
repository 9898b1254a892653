//! Attestation verification collaborators.
//!
//! The provenance and score checks hand a downloaded attestation to a
//! [`ProvenanceVerifier`] or [`ScoreVerifier`]. [`StatementVerifier`]
//! implements both over DSSE envelopes carrying in-toto statements; the
//! signature itself is checked by a [`SignatureVerifier`], so no
//! cryptography runs in this process.

mod signature;
mod statement;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::image::Digest;
use crate::registry::RegistryError;

pub use signature::{CommandSignatureVerifier, SignatureVerifier};
pub use statement::{
    Envelope, EnvelopeSignature, IN_TOTO_PAYLOAD_TYPE, Statement, StatementVerifier, Subject,
};

/// Errors produced while verifying an attestation
#[derive(Error, Debug)]
pub enum VerifyError {
    /// No attestation of the requested kind exists
    #[error("attestation missing: {0}")]
    MissingAttestation(String),

    /// Envelope signature did not verify against the trusted key
    #[error("signature verification failed: {0}")]
    Signature(String),

    /// Statement does not name the image digest as a subject
    #[error("attestation subject does not match digest {0}")]
    SubjectMismatch(String),

    /// Statement claims differ from the expected policy values
    #[error("attestation metadata mismatch: {0}")]
    Metadata(String),

    /// Attested score is below the configured minimum
    #[error("score {score} is below the minimum of {min_score}")]
    ScoreBelowThreshold { score: f64, min_score: f64 },

    /// Attestation could not be decoded
    #[error("malformed attestation: {0}")]
    Malformed(String),

    /// Verification could not be carried out at all
    #[error("verifier unavailable: {0}")]
    Unavailable(String),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VerifyError {
    /// Check if this error is a verdict on the attestation rather than a
    /// failure to evaluate it
    pub fn is_rejection(&self) -> bool {
        !matches!(self, VerifyError::Unavailable(_) | VerifyError::Io(_))
    }
}

/// Map a registry failure during attestation download onto a verification
/// outcome
impl From<RegistryError> for VerifyError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(what) => VerifyError::MissingAttestation(what),
            RegistryError::Json(e) => VerifyError::Malformed(e.to_string()),
            too_large @ RegistryError::TooLarge { .. } => {
                VerifyError::Malformed(too_large.to_string())
            }
            other => VerifyError::Unavailable(other.to_string()),
        }
    }
}

/// Expected build identity for provenance verification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceChecks {
    /// Source repository URL the image must be built from
    pub repo_url: Option<String>,
    /// Branch the build must run on
    pub branch: Option<String>,
    /// Builder identity that must have produced the image
    pub builder_id: Option<String>,
    /// Tag the pod referenced, if any; informational only since tags are
    /// not bound to signed content
    pub tag: Option<String>,
}

/// Verifies a provenance attestation for an image digest
#[async_trait]
pub trait ProvenanceVerifier: Send + Sync {
    async fn verify(
        &self,
        attestation: &Path,
        key: &Path,
        digest: &Digest,
        checks: &ProvenanceChecks,
    ) -> Result<(), VerifyError>;
}

/// Verifies a score attestation for an image digest
#[async_trait]
pub trait ScoreVerifier: Send + Sync {
    async fn verify(
        &self,
        attestation: &Path,
        key: &Path,
        digest: &Digest,
        min_score: f64,
        repo: Option<&str>,
    ) -> Result<(), VerifyError>;
}
