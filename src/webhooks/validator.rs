//! Pod validation: resolve every container image to a digest, enforce the
//! pinning policy, then run the policy chain.

use std::sync::Arc;
use std::time::Instant;

use super::observer::{NoopObserver, ValidationObserver};
use super::pod::PodContext;
use super::policies::{
    NameFormatCheck, ProvenanceCheck, ResolvedImage, ResolvedPod, ScoreCheck, ValidationVerdict,
    Validator, run_chain,
};
use crate::attestation::{ProvenanceVerifier, ScoreVerifier};
use crate::config::PolicyParameters;
use crate::error::{Error, Result};
use crate::image;
use crate::registry::{AttestationDownloader, DigestResolver};

/// Validates pods against a fixed policy.
///
/// Holds no per-request state; one instance serves concurrent admissions.
pub struct PodValidator {
    policy: Arc<PolicyParameters>,
    registry: Arc<dyn DigestResolver>,
    chain: Vec<Arc<dyn Validator>>,
    observer: Arc<dyn ValidationObserver>,
}

impl PodValidator {
    pub fn new(
        policy: Arc<PolicyParameters>,
        registry: Arc<dyn DigestResolver>,
        chain: Vec<Arc<dyn Validator>>,
    ) -> Self {
        Self {
            policy,
            registry,
            chain,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Build the standard chain: repository name, provenance, score
    pub fn standard(
        policy: Arc<PolicyParameters>,
        registry: Arc<dyn DigestResolver>,
        downloader: Arc<dyn AttestationDownloader>,
        provenance: Arc<dyn ProvenanceVerifier>,
        score: Arc<dyn ScoreVerifier>,
    ) -> Self {
        let chain: Vec<Arc<dyn Validator>> = vec![
            Arc::new(NameFormatCheck::new(policy.clone())),
            Arc::new(ProvenanceCheck::new(
                downloader.clone(),
                provenance,
                policy.clone(),
            )),
            Arc::new(ScoreCheck::new(downloader, score, policy.clone())),
        ];
        Self::new(policy, registry, chain)
    }

    /// Replace the observer notified during validation
    pub fn with_observer(mut self, observer: Arc<dyn ValidationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Names of the validators in chain order
    pub fn chain_names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|v| v.name()).collect()
    }

    /// Decide whether a pod may be admitted.
    ///
    /// `Ok` with an invalid verdict is a policy rejection; `Err` means the
    /// decision could not be made.
    pub async fn validate_pod(&self, pod: &PodContext) -> Result<ValidationVerdict> {
        let started = Instant::now();
        let outcome = self.evaluate(pod).await;
        self.observer.verdict(&pod.name, &outcome, started.elapsed());
        outcome
    }

    async fn evaluate(&self, pod: &PodContext) -> Result<ValidationVerdict> {
        let mut images = Vec::with_capacity(pod.containers.len());

        for container in &pod.containers {
            self.observer
                .resolving(&pod.name, &container.name, &container.image);

            match self.resolve_container(&container.image).await {
                Ok(reference) => images.push(ResolvedImage {
                    container: container.name.clone(),
                    reference,
                }),
                Err(e) => {
                    let err = Error::Image {
                        container: container.name.clone(),
                        source: Box::new(e),
                    };
                    if err.is_policy_violation() {
                        return Ok(ValidationVerdict::from(&err));
                    }
                    return Err(err);
                }
            }
        }

        let resolved = ResolvedPod {
            name: pod.name.clone(),
            images,
        };
        self.observer.images_resolved(&resolved);

        run_chain(&resolved, &self.chain, self.observer.as_ref()).await
    }

    async fn resolve_container(&self, raw: &str) -> Result<image::ImageReference> {
        let reference =
            image::resolve(raw, self.policy.require_digest, self.registry.as_ref()).await?;
        image::enforce(&reference, self.policy.allow_tagged)?;
        Ok(reference)
    }
}
