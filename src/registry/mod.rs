//! Registry collaborators.
//!
//! The validation pipeline only sees the [`DigestResolver`] and
//! [`AttestationDownloader`] traits; [`RegistryClient`] implements both over
//! the OCI distribution API.

mod client;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::image::{Digest, ImageReference};

pub use client::{RegistryClient, parse_www_authenticate};

/// Errors that can occur while talking to a registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Registry answered with an unexpected status code
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// Requested manifest or blob does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Manifest response carried no content digest
    #[error("registry response for {0} carried no Docker-Content-Digest header")]
    MissingDigest(String),

    /// Content digest returned by the registry is malformed
    #[error("registry returned an invalid digest: {0}")]
    InvalidDigest(String),

    /// Token negotiation failed
    #[error("registry authentication failed: {0}")]
    Auth(String),

    /// Writing downloaded content failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest could not be decoded
    #[error("invalid manifest: {0}")]
    Json(#[from] serde_json::Error),

    /// Response body exceeded the size accepted for its kind
    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

impl RegistryError {
    /// Check if this error indicates missing content
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }

    /// Check if this error may go away on retry
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Http(_) | RegistryError::Io(_) => true,
            RegistryError::Status { status, .. } => *status >= 500 || *status == 429,
            RegistryError::NotFound(_)
            | RegistryError::MissingDigest(_)
            | RegistryError::InvalidDigest(_)
            | RegistryError::Auth(_)
            | RegistryError::Json(_)
            | RegistryError::TooLarge { .. } => false,
        }
    }
}

/// Kind of attestation attached to an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttestationKind {
    Provenance,
    Score,
}

impl AttestationKind {
    /// Short name used in attestation tags and file names
    pub fn as_str(&self) -> &'static str {
        match self {
            AttestationKind::Provenance => "provenance",
            AttestationKind::Score => "score",
        }
    }

    /// Tag under which the attestation for `digest` is stored, e.g.
    /// `sha256-<hex>.provenance.att`
    pub fn tag_for(&self, digest: &Digest) -> String {
        format!("{}-{}.{}.att", digest.algorithm(), digest.hex(), self.as_str())
    }
}

impl fmt::Display for AttestationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Looks up the content digest a tag currently points to
#[async_trait]
pub trait DigestResolver: Send + Sync {
    async fn resolve_digest(&self, name: &str, tag: &str) -> Result<Digest, RegistryError>;
}

/// Fetches an attestation for an image digest onto local disk
#[async_trait]
pub trait AttestationDownloader: Send + Sync {
    /// Download the attestation of `kind` for `image` into `dest_dir` and
    /// return the path of the written file
    async fn download(
        &self,
        image: &ImageReference,
        kind: AttestationKind,
        dest_dir: &Path,
    ) -> Result<PathBuf, RegistryError>;
}
