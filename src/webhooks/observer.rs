//! Observability hooks for the validation pipeline.
//!
//! The pod validator reports through a [`ValidationObserver`] instead of
//! logging directly, so the decision path stays independent of the logging
//! and metrics backends.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use super::policies::{ResolvedImage, ResolvedPod, ValidationVerdict};
use crate::error::Result;
use crate::health::HealthState;

/// Hooks invoked at fixed points of a pod validation
pub trait ValidationObserver: Send + Sync {
    /// Before a container image is resolved
    fn resolving(&self, _pod_name: &str, _container: &str, _image: &str) {}

    /// After every container image resolved successfully
    fn images_resolved(&self, _pod: &ResolvedPod) {}

    /// After one validator checked one image
    fn image_verified(
        &self,
        _pod_name: &str,
        _check: &str,
        _image: &ResolvedImage,
        _outcome: &Result<ValidationVerdict>,
    ) {
    }

    /// After the pod verdict is known
    fn verdict(&self, _pod_name: &str, _outcome: &Result<ValidationVerdict>, _elapsed: Duration) {}
}

/// Observer that ignores every event
pub struct NoopObserver;

impl ValidationObserver for NoopObserver {}

/// Observer that logs through `tracing` and, when attached to a
/// [`HealthState`], records Prometheus metrics
#[derive(Default)]
pub struct TracingObserver {
    health: Option<Arc<HealthState>>,
}

impl TracingObserver {
    pub fn new(health: Option<Arc<HealthState>>) -> Self {
        Self { health }
    }
}

impl ValidationObserver for TracingObserver {
    fn resolving(&self, pod_name: &str, container: &str, image: &str) {
        debug!(pod_name = %pod_name, container = %container, image = %image, "Resolving image");
    }

    fn images_resolved(&self, pod: &ResolvedPod) {
        let images: Vec<String> = pod
            .images
            .iter()
            .map(|i| i.reference.to_string())
            .collect();
        info!(pod_name = %pod.name, images = ?images, "Resolved pod images");

        if let Some(health) = &self.health {
            health.metrics.record_images_resolved(pod.images.len() as u64);
        }
    }

    fn image_verified(
        &self,
        pod_name: &str,
        check: &str,
        image: &ResolvedImage,
        outcome: &Result<ValidationVerdict>,
    ) {
        let result = match outcome {
            Ok(verdict) if verdict.valid => "pass",
            Ok(_) => "fail",
            Err(_) => "error",
        };
        debug!(
            pod_name = %pod_name,
            container = %image.container,
            image = %image.reference,
            check,
            result,
            "Image check finished"
        );

        if let Some(health) = &self.health {
            health.metrics.record_image_check(check, result);
        }
    }

    fn verdict(&self, pod_name: &str, outcome: &Result<ValidationVerdict>, elapsed: Duration) {
        let label = match outcome {
            Ok(verdict) if verdict.valid => {
                info!(pod_name = %pod_name, "Pod images verified");
                "allowed"
            }
            Ok(verdict) => {
                warn!(pod_name = %pod_name, reason = %verdict.reason, "Pod rejected");
                "denied"
            }
            Err(e) => {
                warn!(
                    pod_name = %pod_name,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Pod validation failed"
                );
                "error"
            }
        };

        if let Some(health) = &self.health {
            health
                .metrics
                .record_admission(label, elapsed.as_secs_f64());
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            health.last_admission.store(now, Ordering::Relaxed);
        }
    }
}
