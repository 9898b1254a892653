//! Envelope signature verification through an external program.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::VerifyError;

/// Checks the signature of an attestation envelope against a public key
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(&self, envelope: &Path, key: &Path) -> Result<(), VerifyError>;
}

/// Runs `<program> [args...] <key> <envelope>`; exit status 0 means the
/// signature verified.
#[derive(Debug, Clone)]
pub struct CommandSignatureVerifier {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSignatureVerifier {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl SignatureVerifier for CommandSignatureVerifier {
    async fn verify(&self, envelope: &Path, key: &Path) -> Result<(), VerifyError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(key)
            .arg(envelope)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                VerifyError::Unavailable(format!("failed to run {}: {}", self.program.display(), e))
            })?;

        if output.status.success() {
            debug!(envelope = %envelope.display(), "envelope signature verified");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let detail = if stderr.is_empty() {
            format!("{} exited with {}", self.program.display(), output.status)
        } else {
            stderr
        };
        Err(VerifyError::Signature(detail))
    }
}
