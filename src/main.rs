//! image-admission-controller - A Kubernetes admission webhook that verifies
//! container image attestations.
//!
//! This is the main entry point that:
//! - Parses configuration and initializes structured logging
//! - Builds the registry client, attestation verifiers and policy chain
//! - Starts the health server, and the webhook server when TLS certificates exist

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use image_admission::attestation::{CommandSignatureVerifier, StatementVerifier};
use image_admission::config::{Args, LogFormat};
use image_admission::health::{HealthState, run_health_server};
use image_admission::registry::RegistryClient;
use image_admission::run_webhook_server;
use image_admission::webhooks::{PodValidator, TracingObserver, WebhookState};

/// Grace period for in-flight admissions to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing subscriber
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("image_admission=info".parse()?)
        .add_directive("image_admission_controller=info".parse()?);
    match args.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    info!("Starting image-admission-controller");

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    let policy = Arc::new(args.policy()?);
    info!(
        allow_tagged = policy.allow_tagged,
        require_digest = policy.require_digest,
        source_repo = ?policy.source_repo,
        branch = ?policy.branch,
        builder_id = ?policy.builder_id,
        min_score = policy.min_score,
        allowed_repositories = ?policy.allowed_repositories,
        "Loaded admission policy"
    );

    let registry = Arc::new(RegistryClient::new(
        args.insecure_registry,
        args.registry_timeout(),
    )?);
    let signatures = Arc::new(CommandSignatureVerifier::new(
        &args.signature_verifier,
        args.signature_verifier_args.clone(),
    ));
    let statements = Arc::new(StatementVerifier::new(signatures));

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    let validator = PodValidator::standard(
        policy,
        registry.clone(),
        registry,
        statements.clone(),
        statements,
    )
    .with_observer(Arc::new(TracingObserver::new(Some(health_state.clone()))));
    info!(chain = ?validator.chain_names(), "Validation chain ready");

    // Start health server immediately so probes work before TLS is up
    let health_handle = {
        let health_state = health_state.clone();
        let port = args.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    // Only start webhook server if certificates are available
    let webhook_handle = if args.cert_path.exists() && args.key_path.exists() {
        info!("TLS certificates found, starting webhook server");
        let state = Arc::new(WebhookState::new(Arc::new(validator)));
        let port = args.webhook_port;
        let cert_path = args.cert_path.clone();
        let key_path = args.key_path.clone();
        let ready = health_state.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = run_webhook_server(state, port, &cert_path, &key_path, Some(ready)).await
            {
                error!("Webhook server error: {}", e);
            }
        });
        Some(handle)
    } else {
        warn!(
            cert_path = %args.cert_path.display(),
            key_path = %args.key_path.display(),
            "Webhook certificates not found, webhook server disabled"
        );
        None
    };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        result = async {
            match webhook_handle {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        } => {
            if let Err(e) = result {
                error!("Webhook server task panicked: {}", e);
            }
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready so the API server stops routing admissions here
            health_state.set_ready(false).await;
            info!("Marked controller as not ready");

            info!(
                "Waiting {}s for in-flight admissions to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Admission controller stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the controller cannot shut
/// down gracefully without them.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
