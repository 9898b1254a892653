//! Image admission policies.
//!
//! Policies form an ordered chain of [`Validator`]s:
//! - Name check: image must come from an allowed repository
//! - Provenance check: image digest must carry a verified build provenance
//! - Score check: image digest must carry a verified score above threshold
//!
//! The chain short-circuits: the first failing validator decides the reason
//! and later validators are never invoked.

pub mod name_format;
pub mod provenance;
pub mod score;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use super::observer::ValidationObserver;
use crate::attestation::VerifyError;
use crate::error::{Error, Result};
use crate::image::ImageReference;
use crate::registry::{AttestationDownloader, AttestationKind};

pub use name_format::NameFormatCheck;
pub use provenance::ProvenanceCheck;
pub use score::ScoreCheck;

/// Reason reported for an admitted pod
pub const VALID_POD_REASON: &str = "valid pod";

/// Outcome of a validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    /// Whether the validation passed
    pub valid: bool,
    /// Why; always populated
    pub reason: String,
}

impl ValidationVerdict {
    /// Create a passing verdict
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: VALID_POD_REASON.to_string(),
        }
    }

    /// Create a failing verdict
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// An operational failure never admits; its message is the reason
impl From<&Error> for ValidationVerdict {
    fn from(err: &Error) -> Self {
        Self::invalid(err.to_string())
    }
}

/// A container image after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    /// Name of the container referencing the image
    pub container: String,
    pub reference: ImageReference,
}

/// A pod whose images have all been resolved, in container order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPod {
    /// Display name, for diagnostics only
    pub name: String,
    pub images: Vec<ResolvedImage>,
}

/// A check in the validation chain.
///
/// Pod-level checks override [`Validator::validate_pod`], per-image checks
/// override [`Validator::validate_image`]. An `Err` means the check could
/// not be evaluated; `Ok` with an invalid verdict is a policy rejection.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Stable name for diagnostics
    fn name(&self) -> &'static str;

    async fn validate_pod(&self, _pod: &ResolvedPod) -> Result<ValidationVerdict> {
        Ok(ValidationVerdict::valid())
    }

    async fn validate_image(&self, _image: &ResolvedImage) -> Result<ValidationVerdict> {
        Ok(ValidationVerdict::valid())
    }
}

/// Run the chain over a resolved pod.
///
/// Pod-level checks run first in chain order, then every image in container
/// order is run through the chain. Stops at the first error or failing
/// verdict. Every image check is reported to `observer`.
pub async fn run_chain(
    pod: &ResolvedPod,
    chain: &[Arc<dyn Validator>],
    observer: &dyn ValidationObserver,
) -> Result<ValidationVerdict> {
    for validator in chain {
        let verdict = validator.validate_pod(pod).await?;
        if !verdict.valid {
            return Ok(verdict);
        }
    }

    for image in &pod.images {
        for validator in chain {
            let outcome = validator.validate_image(image).await;
            observer.image_verified(&pod.name, validator.name(), image, &outcome);
            let verdict = outcome?;
            if !verdict.valid {
                return Ok(verdict);
            }
        }
    }

    Ok(ValidationVerdict::valid())
}

/// Download an attestation into a fresh temporary directory.
///
/// The directory is removed when the returned guard is dropped.
pub(crate) async fn fetch_attestation(
    downloader: &dyn AttestationDownloader,
    image: &ImageReference,
    kind: AttestationKind,
) -> std::result::Result<(TempDir, PathBuf), VerifyError> {
    let dir = tempfile::Builder::new()
        .prefix("admission-controller-")
        .tempdir()?;
    let path = downloader.download(image, kind, dir.path()).await?;
    Ok((dir, path))
}

/// Turn a verification outcome into a verdict: rejections fail the image,
/// anything else is an operational error built by `on_error`
pub(crate) fn verdict_for(
    label: &str,
    image: &ImageReference,
    outcome: std::result::Result<(), VerifyError>,
    on_error: impl FnOnce(String, VerifyError) -> Error,
) -> Result<ValidationVerdict> {
    match outcome {
        Ok(()) => Ok(ValidationVerdict::valid()),
        Err(e) if e.is_rejection() => Ok(ValidationVerdict::invalid(format!(
            "{} validation for {} failed: {}",
            label, image, e
        ))),
        Err(e) => Err(on_error(image.to_string(), e)),
    }
}
