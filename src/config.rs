//! Process configuration.
//!
//! Every setting is a CLI flag with an environment variable fallback so the
//! controller can be configured from a Deployment manifest. The admission
//! policy is lifted out of the flags once, at startup, into an immutable
//! [`PolicyParameters`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::{Error, Result};
use crate::webhooks::{WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT};

/// Default location of the trusted attestation public key
pub const DEFAULT_KEY_PATH: &str = "/attestation-key.pub";

/// Default health server port
pub const HEALTH_PORT: u16 = 8080;

/// Default branch provenance must be built from
pub const DEFAULT_BRANCH: &str = "main";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Command line arguments
#[derive(Debug, Clone, Parser)]
#[command(
    name = "image-admission-controller",
    version,
    about = "Admission webhook that admits pods only when their images carry verified attestations"
)]
pub struct Args {
    /// Webhook server port
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = WEBHOOK_PORT)]
    pub webhook_port: u16,

    /// Health and metrics server port
    #[arg(long, env = "HEALTH_PORT", default_value_t = HEALTH_PORT)]
    pub health_port: u16,

    /// Webhook TLS certificate (PEM)
    #[arg(long, env = "WEBHOOK_CERT_PATH", default_value = WEBHOOK_CERT_PATH)]
    pub cert_path: PathBuf,

    /// Webhook TLS private key (PEM)
    #[arg(long, env = "WEBHOOK_KEY_PATH", default_value = WEBHOOK_KEY_PATH)]
    pub key_path: PathBuf,

    /// Admit images referenced by tag (resolved to a digest at admission)
    #[arg(long, env = "ALLOW_TAGGED_IMAGES")]
    pub allow_tagged: bool,

    /// Refuse references without a digest instead of looking them up
    #[arg(long, env = "REQUIRE_IMAGE_DIGEST")]
    pub require_digest: bool,

    /// Source repository URL images must be built from
    #[arg(long, env = "EXPECTED_SOURCE_REPO")]
    pub source_repo: Option<String>,

    /// Branch images must be built from (empty disables the check)
    #[arg(long, env = "EXPECTED_BRANCH", default_value = DEFAULT_BRANCH)]
    pub branch: String,

    /// Builder identity that must have produced the images
    #[arg(long, env = "EXPECTED_BUILDER_ID")]
    pub builder_id: Option<String>,

    /// Minimum attested score
    #[arg(long, env = "MIN_SCORE", default_value_t = 0.0)]
    pub min_score: f64,

    /// Public key for provenance attestations
    #[arg(long, env = "PROVENANCE_KEY_PATH", default_value = DEFAULT_KEY_PATH)]
    pub provenance_key_path: PathBuf,

    /// Public key for score attestations (defaults to the provenance key)
    #[arg(long, env = "SCORE_KEY_PATH")]
    pub score_key_path: Option<PathBuf>,

    /// Repository prefixes images may come from (repeatable; empty allows all)
    #[arg(
        long = "allowed-repository",
        env = "ALLOWED_REPOSITORIES",
        value_delimiter = ','
    )]
    pub allowed_repositories: Vec<String>,

    /// Program that verifies attestation envelope signatures; invoked as
    /// `<program> [args...] <key> <envelope>`
    #[arg(long, env = "SIGNATURE_VERIFIER")]
    pub signature_verifier: PathBuf,

    /// Extra leading argument for the signature verifier (repeatable)
    #[arg(long = "signature-verifier-arg", allow_hyphen_values = true)]
    pub signature_verifier_args: Vec<String>,

    /// Talk plain HTTP to registries
    #[arg(long, env = "INSECURE_REGISTRY")]
    pub insecure_registry: bool,

    /// Registry request timeout in seconds
    #[arg(long, env = "REGISTRY_TIMEOUT_SECS", default_value_t = 30)]
    pub registry_timeout_secs: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Args {
    /// Build the admission policy from the parsed flags
    pub fn policy(&self) -> Result<PolicyParameters> {
        if !self.min_score.is_finite() || self.min_score < 0.0 {
            return Err(Error::Config(format!(
                "min score must be a non-negative number (got {})",
                self.min_score
            )));
        }

        if self.require_digest && self.allow_tagged {
            tracing::warn!("--allow-tagged has no effect together with --require-digest");
        }

        Ok(PolicyParameters {
            allow_tagged: self.allow_tagged,
            require_digest: self.require_digest,
            source_repo: non_empty(self.source_repo.as_deref()),
            branch: non_empty(Some(&self.branch)),
            builder_id: non_empty(self.builder_id.as_deref()),
            min_score: self.min_score,
            score_key_path: self
                .score_key_path
                .clone()
                .unwrap_or_else(|| self.provenance_key_path.clone()),
            provenance_key_path: self.provenance_key_path.clone(),
            allowed_repositories: self
                .allowed_repositories
                .iter()
                .map(|r| r.trim().trim_end_matches('/').to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        })
    }

    /// Registry request timeout
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Admission policy shared read-only by every validation
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyParameters {
    /// Admit references that carry a tag
    pub allow_tagged: bool,
    /// Never look up a digest; references must carry one
    pub require_digest: bool,
    /// Expected source repository URL
    pub source_repo: Option<String>,
    /// Expected source branch
    pub branch: Option<String>,
    /// Expected builder identity
    pub builder_id: Option<String>,
    /// Minimum acceptable score
    pub min_score: f64,
    /// Trusted key for provenance attestations
    pub provenance_key_path: PathBuf,
    /// Trusted key for score attestations
    pub score_key_path: PathBuf,
    /// Allowed repository prefixes, empty allows all
    pub allowed_repositories: Vec<String>,
}

impl Default for PolicyParameters {
    fn default() -> Self {
        Self {
            allow_tagged: false,
            require_digest: false,
            source_repo: None,
            branch: Some(DEFAULT_BRANCH.to_string()),
            builder_id: None,
            min_score: 0.0,
            provenance_key_path: PathBuf::from(DEFAULT_KEY_PATH),
            score_key_path: PathBuf::from(DEFAULT_KEY_PATH),
            allowed_repositories: Vec::new(),
        }
    }
}
