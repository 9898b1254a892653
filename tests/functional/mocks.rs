//! Mock collaborators for pod validation tests.
//!
//! Every mock records how often it was called so tests can assert which
//! parts of the pipeline ran. Attestation mocks write real DSSE envelopes
//! so the production `StatementVerifier` can be exercised end to end.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use image_admission::attestation::{
    IN_TOTO_PAYLOAD_TYPE, ProvenanceChecks, ProvenanceVerifier, ScoreVerifier, SignatureVerifier,
    VerifyError,
};
use image_admission::error::Result;
use image_admission::image::{Digest, ImageReference};
use image_admission::registry::{
    AttestationDownloader, AttestationKind, DigestResolver, RegistryError,
};
use image_admission::webhooks::{ResolvedPod, ValidationObserver, ValidationVerdict};

pub const HEX: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
pub const SOURCE_REPO: &str = "https://github.com/acme/app";
pub const BUILDER_ID: &str = "https://github.com/slsa-framework/slsa-github-generator";

pub fn digest() -> Digest {
    format!("sha256:{}", HEX).parse().unwrap()
}

/// Registry serving one digest for every tag and attestations from memory
#[derive(Default)]
pub struct MockRegistry {
    /// Digest lookups as `name:tag`
    pub lookups: Mutex<Vec<String>>,
    pub downloads: AtomicUsize,
    /// Attestation bodies by kind; missing kinds answer 404
    pub attestations: HashMap<&'static str, String>,
    /// Status code returned for every request, if set
    pub failure: Option<u16>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(status: u16) -> Self {
        Self {
            failure: Some(status),
            ..Default::default()
        }
    }

    pub fn with_attestation(mut self, kind: AttestationKind, body: String) -> Self {
        self.attestations.insert(kind.as_str(), body);
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }

    fn status_error(&self, status: u16) -> RegistryError {
        RegistryError::Status {
            url: "https://registry.example/v2".to_string(),
            status,
        }
    }
}

#[async_trait]
impl DigestResolver for MockRegistry {
    async fn resolve_digest(
        &self,
        name: &str,
        tag: &str,
    ) -> std::result::Result<Digest, RegistryError> {
        self.lookups.lock().unwrap().push(format!("{}:{}", name, tag));
        match self.failure {
            Some(status) => Err(self.status_error(status)),
            None => Ok(digest()),
        }
    }
}

#[async_trait]
impl AttestationDownloader for MockRegistry {
    async fn download(
        &self,
        image: &ImageReference,
        kind: AttestationKind,
        dest_dir: &Path,
    ) -> std::result::Result<PathBuf, RegistryError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.failure {
            return Err(self.status_error(status));
        }
        let body = self.attestations.get(kind.as_str()).ok_or_else(|| {
            RegistryError::NotFound(format!("{} for {}", kind.tag_for(&image.digest), image.name))
        })?;
        let path = dest_dir.join(format!("{}.json", kind));
        std::fs::write(&path, body)?;
        Ok(path)
    }
}

/// Provenance verifier with a fixed outcome
pub struct MockProvenance {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<(Digest, ProvenanceChecks)>>,
    pub mismatch: Option<String>,
}

impl MockProvenance {
    pub fn ok() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            mismatch: None,
        }
    }

    pub fn mismatch(reason: &str) -> Self {
        Self {
            mismatch: Some(reason.to_string()),
            ..Self::ok()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProvenanceVerifier for MockProvenance {
    async fn verify(
        &self,
        _attestation: &Path,
        _key: &Path,
        digest: &Digest,
        checks: &ProvenanceChecks,
    ) -> std::result::Result<(), VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((digest.clone(), checks.clone()));
        match &self.mismatch {
            Some(reason) => Err(VerifyError::Metadata(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Score verifier attesting a fixed score
pub struct MockScore {
    pub calls: AtomicUsize,
    pub score: f64,
}

impl MockScore {
    pub fn new(score: f64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            score,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoreVerifier for MockScore {
    async fn verify(
        &self,
        _attestation: &Path,
        _key: &Path,
        _digest: &Digest,
        min_score: f64,
        _repo: Option<&str>,
    ) -> std::result::Result<(), VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.score < min_score {
            return Err(VerifyError::ScoreBelowThreshold {
                score: self.score,
                min_score,
            });
        }
        Ok(())
    }
}

/// Signature verifier accepting or rejecting every envelope
pub struct FixedSignatures(pub bool);

#[async_trait]
impl SignatureVerifier for FixedSignatures {
    async fn verify(&self, _envelope: &Path, _key: &Path) -> std::result::Result<(), VerifyError> {
        if self.0 {
            Ok(())
        } else {
            Err(VerifyError::Signature("invalid signature".to_string()))
        }
    }
}

/// Observer recording every event it receives
#[derive(Default)]
pub struct RecordingObserver {
    pub resolving: Mutex<Vec<(String, String, String)>>,
    pub resolved: Mutex<Vec<ResolvedPod>>,
    pub checks: Mutex<Vec<(String, &'static str)>>,
    pub verdicts: Mutex<Vec<(String, bool)>>,
}

impl ValidationObserver for RecordingObserver {
    fn resolving(&self, pod_name: &str, container: &str, image: &str) {
        self.resolving.lock().unwrap().push((
            pod_name.to_string(),
            container.to_string(),
            image.to_string(),
        ));
    }

    fn images_resolved(&self, pod: &ResolvedPod) {
        self.resolved.lock().unwrap().push(pod.clone());
    }

    fn image_verified(
        &self,
        _pod_name: &str,
        check: &str,
        image: &image_admission::webhooks::ResolvedImage,
        outcome: &Result<ValidationVerdict>,
    ) {
        let result = match outcome {
            Ok(v) if v.valid => "pass",
            Ok(_) => "fail",
            Err(_) => "error",
        };
        self.checks
            .lock()
            .unwrap()
            .push((format!("{}:{}", check, image.container), result));
    }

    fn verdict(&self, pod_name: &str, outcome: &Result<ValidationVerdict>, _elapsed: Duration) {
        let valid = outcome.as_ref().is_ok_and(|v| v.valid);
        self.verdicts
            .lock()
            .unwrap()
            .push((pod_name.to_string(), valid));
    }
}

/// Wrap an in-toto statement about [`digest`] in a signed DSSE envelope
pub fn envelope(predicate_type: &str, predicate: serde_json::Value) -> String {
    let statement = json!({
        "_type": "https://in-toto.io/Statement/v0.1",
        "subject": [{"name": "repo/app", "digest": {"sha256": HEX}}],
        "predicateType": predicate_type,
        "predicate": predicate,
    });
    json!({
        "payloadType": IN_TOTO_PAYLOAD_TYPE,
        "payload": STANDARD.encode(statement.to_string()),
        "signatures": [{"keyid": "", "sig": "MEUCIQ=="}],
    })
    .to_string()
}

pub fn provenance_envelope(repo: &str, branch: &str, builder: &str) -> String {
    envelope(
        "https://slsa.dev/provenance/v0.2",
        json!({
            "builder": {"id": builder},
            "buildType": "https://github.com/slsa-framework/slsa-github-generator/generic@v1",
            "invocation": {
                "configSource": {
                    "uri": format!("git+{}@refs/heads/{}", repo, branch),
                    "entryPoint": ".github/workflows/release.yml"
                }
            }
        }),
    )
}

pub fn score_envelope(score: f64, repo: &str) -> String {
    envelope(
        "https://example.com/score/v1",
        json!({"score": score, "repository": repo}),
    )
}
