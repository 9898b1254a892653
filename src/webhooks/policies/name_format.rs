//! Repository name policy.
//!
//! Validates:
//! - The image comes from one of the allowed repository prefixes
//!
//! An empty prefix list admits every repository.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ResolvedImage, ValidationVerdict, Validator};
use crate::config::PolicyParameters;
use crate::error::Result;

/// Checks image names against the allowed repository prefixes
pub struct NameFormatCheck {
    policy: Arc<PolicyParameters>,
}

impl NameFormatCheck {
    pub fn new(policy: Arc<PolicyParameters>) -> Self {
        Self { policy }
    }
}

/// Prefixes match whole path components: `ghcr.io/acme` admits
/// `ghcr.io/acme/app` but not `ghcr.io/acme-evil/app`.
fn has_prefix(name: &str, prefix: &str) -> bool {
    name == prefix
        || name
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[async_trait]
impl Validator for NameFormatCheck {
    fn name(&self) -> &'static str {
        "name-format"
    }

    async fn validate_image(&self, image: &ResolvedImage) -> Result<ValidationVerdict> {
        let allowed = &self.policy.allowed_repositories;
        let name = &image.reference.name;

        if allowed.is_empty() || allowed.iter().any(|prefix| has_prefix(name, prefix)) {
            return Ok(ValidationVerdict::valid());
        }

        Ok(ValidationVerdict::invalid(format!(
            "image {} of container {} is not from an allowed repository",
            image.reference, image.container
        )))
    }
}
