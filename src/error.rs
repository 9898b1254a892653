//! Error types for admission validation.
//!
//! Errors are classified so the webhook can tell a transient failure (retry
//! the admission) from a request it could never admit.

use thiserror::Error;

use crate::attestation::VerifyError;
use crate::registry::RegistryError;

/// Error type for the validation pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Reference violates the configured digest/tag policy
    #[error("{0}")]
    PolicyViolation(String),

    /// Raw image string could not be parsed
    #[error("invalid image reference {reference:?}: {message}")]
    InvalidReference { reference: String, message: String },

    /// Registry lookup of a missing digest failed
    #[error("failed to resolve digest for {reference}: {source}")]
    Resolution {
        reference: String,
        #[source]
        source: RegistryError,
    },

    /// Resolution of a container image failed
    #[error("image {container} is invalid: {source}")]
    Image {
        container: String,
        #[source]
        source: Box<Error>,
    },

    /// Provenance verification could not be carried out
    #[error("provenance validation for {image} failed: {source}")]
    Provenance {
        image: String,
        #[source]
        source: VerifyError,
    },

    /// Score verification could not be carried out
    #[error("score validation for {image} failed: {source}")]
    Score {
        image: String,
        #[source]
        source: VerifyError,
    },

    /// Local filesystem error (temporary attestation storage)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid process configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build an invalid reference error
    pub fn invalid_reference(reference: &str, message: impl Into<String>) -> Self {
        Error::InvalidReference {
            reference: reference.to_string(),
            message: message.into(),
        }
    }

    /// Check if this error is an expected policy outcome rather than an
    /// operational failure
    pub fn is_policy_violation(&self) -> bool {
        match self {
            Error::PolicyViolation(_) => true,
            Error::Image { source, .. } => source.is_policy_violation(),
            _ => false,
        }
    }

    /// Check if retrying the admission could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Resolution { source, .. } => source.is_transient(),
            Error::Image { source, .. } => source.is_retryable(),
            Error::Provenance { source, .. } | Error::Score { source, .. } => {
                !source.is_rejection()
            }
            Error::Io(_) => true,
            Error::PolicyViolation(_) | Error::InvalidReference { .. } | Error::Config(_) => false,
        }
    }
}

/// Result type alias for validation operations
pub type Result<T> = std::result::Result<T, Error>;
