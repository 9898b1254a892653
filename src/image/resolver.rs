//! Resolution of raw image strings into digest-pinned references, and the
//! digest pinning policy applied to the result.

use crate::error::{Error, Result};
use crate::image::reference::{DEFAULT_TAG, ImageReference, ParsedReference};
use crate::registry::DigestResolver;

/// Resolve a raw image string into an [`ImageReference`].
///
/// A reference with an explicit digest never touches the registry. When
/// `force_digest_present` is set, a reference without a digest is refused
/// instead of being looked up.
pub async fn resolve(
    raw: &str,
    force_digest_present: bool,
    registry: &dyn DigestResolver,
) -> Result<ImageReference> {
    let parsed = ParsedReference::parse(raw)?;

    if let Some(digest) = parsed.digest {
        return Ok(ImageReference {
            name: parsed.name,
            tag: None,
            digest,
        });
    }

    if force_digest_present {
        return Err(Error::PolicyViolation(
            "tagged reference without digest not permitted".to_string(),
        ));
    }

    let tag = parsed.tag.unwrap_or_else(|| DEFAULT_TAG.to_string());
    let digest = registry
        .resolve_digest(&parsed.name, &tag)
        .await
        .map_err(|source| Error::Resolution {
            reference: format!("{}:{}", parsed.name, tag),
            source,
        })?;

    Ok(ImageReference {
        name: parsed.name,
        tag: Some(tag),
        digest,
    })
}

/// Enforce the digest pinning policy on a resolved reference.
///
/// A tag means the pod spec named a mutable pointer rather than content.
pub fn enforce(reference: &ImageReference, allow_tagged: bool) -> Result<()> {
    match &reference.tag {
        Some(tag) if !allow_tagged => Err(Error::PolicyViolation(format!(
            "referencing a tagged image is not allowed ({})",
            tag
        ))),
        _ => Ok(()),
    }
}
