//! DSSE envelopes, in-toto statements and their claim checks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ProvenanceChecks, ProvenanceVerifier, ScoreVerifier, SignatureVerifier, VerifyError};
use crate::image::Digest;

/// DSSE payload type of an in-toto statement
pub const IN_TOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// DSSE envelope as stored in an attestation layer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub payload_type: String,
    /// Base64 encoded statement
    pub payload: String,
    #[serde(default)]
    pub signatures: Vec<EnvelopeSignature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeSignature {
    #[serde(default)]
    pub keyid: Option<String>,
    pub sig: String,
}

impl Envelope {
    /// Decode the in-toto statement carried by this envelope
    pub fn statement(&self) -> Result<Statement, VerifyError> {
        if self.payload_type != IN_TOTO_PAYLOAD_TYPE {
            return Err(VerifyError::Malformed(format!(
                "unexpected payload type {}",
                self.payload_type
            )));
        }
        if self.signatures.is_empty() {
            return Err(VerifyError::Signature("envelope is unsigned".to_string()));
        }

        let payload = STANDARD
            .decode(self.payload.as_bytes())
            .map_err(|e| VerifyError::Malformed(format!("payload is not base64: {}", e)))?;
        serde_json::from_slice(&payload)
            .map_err(|e| VerifyError::Malformed(format!("invalid in-toto statement: {}", e)))
    }
}

/// in-toto statement
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    #[serde(rename = "_type")]
    pub statement_type: String,
    pub subject: Vec<Subject>,
    pub predicate_type: String,
    #[serde(default)]
    pub predicate: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub name: Option<String>,
    pub digest: HashMap<String, String>,
}

impl Statement {
    /// Check that one of the subjects is the given image digest
    pub fn check_subject(&self, digest: &Digest) -> Result<(), VerifyError> {
        let matches = self.subject.iter().any(|subject| {
            subject
                .digest
                .get(digest.algorithm())
                .is_some_and(|hex| hex.eq_ignore_ascii_case(digest.hex()))
        });
        if matches {
            Ok(())
        } else {
            Err(VerifyError::SubjectMismatch(digest.to_string()))
        }
    }

    fn predicate_as<T: DeserializeOwned>(&self) -> Result<T, VerifyError> {
        serde_json::from_value(self.predicate.clone()).map_err(|e| {
            VerifyError::Malformed(format!("invalid {} predicate: {}", self.predicate_type, e))
        })
    }
}

/// SLSA provenance predicate, reduced to the checked fields
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvenancePredicate {
    builder: Builder,
    #[serde(default)]
    invocation: Invocation,
}

#[derive(Debug, Deserialize)]
struct Builder {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Invocation {
    #[serde(default)]
    config_source: ConfigSource,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigSource {
    #[serde(default)]
    uri: String,
}

/// Score predicate
#[derive(Debug, Deserialize)]
struct ScorePredicate {
    score: f64,
    #[serde(default)]
    repository: Option<String>,
}

/// Split a `git+<repo>@<ref>` source URI into repository and git ref
fn split_source_uri(uri: &str) -> (&str, Option<&str>) {
    let uri = uri.strip_prefix("git+").unwrap_or(uri);
    match uri.rsplit_once('@') {
        // An '@' inside the authority (user@host) is not a ref separator
        Some((repo, git_ref))
            if repo
                .split_once("://")
                .is_some_and(|(_, path)| path.contains('/')) =>
        {
            (repo, Some(git_ref))
        }
        _ => (uri, None),
    }
}

fn normalize_repo(repo: &str) -> &str {
    let repo = repo.trim_end_matches('/');
    repo.strip_suffix(".git").unwrap_or(repo)
}

fn branch_matches(git_ref: &str, branch: &str) -> bool {
    git_ref == branch || git_ref.strip_prefix("refs/heads/") == Some(branch)
}

/// Verifies DSSE-wrapped in-toto attestations for both provenance and score
pub struct StatementVerifier {
    signatures: Arc<dyn SignatureVerifier>,
}

impl StatementVerifier {
    pub fn new(signatures: Arc<dyn SignatureVerifier>) -> Self {
        Self { signatures }
    }

    /// Verify the envelope signature, decode the statement and check its
    /// subject
    async fn open(
        &self,
        attestation: &Path,
        key: &Path,
        digest: &Digest,
    ) -> Result<Statement, VerifyError> {
        self.signatures.verify(attestation, key).await?;

        let raw = tokio::fs::read(attestation).await?;
        let envelope: Envelope = serde_json::from_slice(&raw)
            .map_err(|e| VerifyError::Malformed(format!("invalid DSSE envelope: {}", e)))?;
        let statement = envelope.statement()?;
        statement.check_subject(digest)?;
        Ok(statement)
    }
}

#[async_trait]
impl ProvenanceVerifier for StatementVerifier {
    async fn verify(
        &self,
        attestation: &Path,
        key: &Path,
        digest: &Digest,
        checks: &ProvenanceChecks,
    ) -> Result<(), VerifyError> {
        let statement = self.open(attestation, key, digest).await?;
        let predicate: ProvenancePredicate = statement.predicate_as()?;

        if let Some(expected) = &checks.builder_id {
            if &predicate.builder.id != expected {
                return Err(VerifyError::Metadata(format!(
                    "builder id {:?} does not match expected {:?}",
                    predicate.builder.id, expected
                )));
            }
        }

        let (repo, git_ref) = split_source_uri(&predicate.invocation.config_source.uri);

        if let Some(expected) = &checks.repo_url {
            if normalize_repo(repo) != normalize_repo(expected) {
                return Err(VerifyError::Metadata(format!(
                    "source repository {:?} does not match expected {:?}",
                    repo, expected
                )));
            }
        }

        if let Some(branch) = &checks.branch {
            if !git_ref.is_some_and(|r| branch_matches(r, branch)) {
                return Err(VerifyError::Metadata(format!(
                    "source ref {:?} is not branch {:?}",
                    git_ref.unwrap_or_default(),
                    branch
                )));
            }
        }

        debug!(
            digest = %digest,
            builder = %predicate.builder.id,
            tag = ?checks.tag,
            "provenance attestation verified"
        );
        Ok(())
    }
}

#[async_trait]
impl ScoreVerifier for StatementVerifier {
    async fn verify(
        &self,
        attestation: &Path,
        key: &Path,
        digest: &Digest,
        min_score: f64,
        repo: Option<&str>,
    ) -> Result<(), VerifyError> {
        let statement = self.open(attestation, key, digest).await?;
        let predicate: ScorePredicate = statement.predicate_as()?;

        if let Some(expected) = repo {
            let attested = predicate.repository.as_deref().unwrap_or_default();
            if normalize_repo(attested) != normalize_repo(expected) {
                return Err(VerifyError::Metadata(format!(
                    "score repository {:?} does not match expected {:?}",
                    attested, expected
                )));
            }
        }

        if predicate.score.is_nan() || predicate.score < min_score {
            return Err(VerifyError::ScoreBelowThreshold {
                score: predicate.score,
                min_score,
            });
        }

        debug!(digest = %digest, score = predicate.score, "score attestation verified");
        Ok(())
    }
}
