// Test code is allowed to panic on failure
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

//! Unit tests for image-admission-controller.
//!
//! These tests run without a cluster or registry and test individual
//! components through the public API.

mod error_tests {
    use image_admission::attestation::VerifyError;
    use image_admission::error::Error;
    use image_admission::registry::RegistryError;
    use image_admission::webhooks::ValidationVerdict;

    #[test]
    fn test_policy_violation_classification() {
        let err = Error::Image {
            container: "app".to_string(),
            source: Box::new(Error::PolicyViolation("not allowed".to_string())),
        };
        assert!(err.is_policy_violation());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "image app is invalid: not allowed");
    }

    #[test]
    fn test_resolution_retryable_only_when_transient() {
        let transient = Error::Resolution {
            reference: "repo/app:v1".to_string(),
            source: RegistryError::Status {
                url: "https://r/v2".to_string(),
                status: 503,
            },
        };
        assert!(transient.is_retryable());
        assert!(!transient.is_policy_violation());

        let permanent = Error::Resolution {
            reference: "repo/app:v1".to_string(),
            source: RegistryError::NotFound("repo/app:v1".to_string()),
        };
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn test_verification_errors() {
        let unavailable = Error::Provenance {
            image: "repo/app@sha256:ab".to_string(),
            source: VerifyError::Unavailable("connection refused".to_string()),
        };
        assert!(unavailable.is_retryable());
        assert_eq!(
            unavailable.to_string(),
            "provenance validation for repo/app@sha256:ab failed: verifier unavailable: connection refused"
        );

        let score = Error::Score {
            image: "repo/app@sha256:ab".to_string(),
            source: VerifyError::Io(std::io::Error::other("disk full")),
        };
        assert!(score.is_retryable());
    }

    #[test]
    fn test_verdict_from_error() {
        let err = Error::Config("bad flag".to_string());
        let verdict = ValidationVerdict::from(&err);
        assert!(!verdict.valid);
        assert_eq!(verdict.reason, "configuration error: bad flag");
    }

    #[test]
    fn test_registry_errors_map_to_verification_outcomes() {
        assert!(matches!(
            VerifyError::from(RegistryError::NotFound("x".to_string())),
            VerifyError::MissingAttestation(_)
        ));
        assert!(!VerifyError::from(RegistryError::Auth("denied".to_string())).is_rejection());
    }
}

mod config_tests {
    use clap::Parser;
    use image_admission::config::{Args, DEFAULT_KEY_PATH, LogFormat, PolicyParameters};
    use std::path::PathBuf;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec![
            "image-admission-controller",
            "--signature-verifier",
            "/usr/local/bin/verify-attestation",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_match_policy_defaults() {
        let args = args(&[]);
        assert_eq!(args.webhook_port, 9443);
        assert_eq!(args.health_port, 8080);
        assert_eq!(args.log_format, LogFormat::Json);

        let policy = args.policy().unwrap();
        assert_eq!(policy, PolicyParameters::default());
        assert_eq!(policy.provenance_key_path, PathBuf::from(DEFAULT_KEY_PATH));
    }

    #[test]
    fn test_empty_branch_disables_branch_check() {
        let policy = args(&["--branch", ""]).policy().unwrap();
        assert_eq!(policy.branch, None);
    }

    #[test]
    fn test_separate_score_key() {
        let policy = args(&[
            "--provenance-key-path",
            "/keys/provenance.pub",
            "--score-key-path",
            "/keys/score.pub",
        ])
        .policy()
        .unwrap();
        assert_eq!(policy.provenance_key_path, PathBuf::from("/keys/provenance.pub"));
        assert_eq!(policy.score_key_path, PathBuf::from("/keys/score.pub"));
    }

    #[test]
    fn test_signature_verifier_is_required() {
        assert!(Args::try_parse_from(["image-admission-controller"]).is_err());
    }
}

mod reference_tests {
    use image_admission::image::{DOCKER_HUB_HOST, ParsedReference, split_registry};

    const HEX: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_registry_port_is_not_a_tag() {
        let parsed = ParsedReference::parse("localhost:5000/team/app").unwrap();
        assert_eq!(parsed.name, "localhost:5000/team/app");
        assert_eq!(parsed.tag, None);

        let parsed = ParsedReference::parse("localhost:5000/team/app:1.2").unwrap();
        assert_eq!(parsed.tag.as_deref(), Some("1.2"));
    }

    #[test]
    fn test_docker_hub_inference() {
        assert_eq!(
            split_registry("nginx"),
            (DOCKER_HUB_HOST.to_string(), "library/nginx".to_string())
        );
        assert_eq!(
            split_registry("ghcr.io/acme/app"),
            ("ghcr.io".to_string(), "acme/app".to_string())
        );
    }

    #[test]
    fn test_short_digest_rejected() {
        assert!(ParsedReference::parse("repo/app@sha256:abc").is_err());
        assert!(ParsedReference::parse(&format!("repo/app@sha256:{}", HEX)).is_ok());
    }
}
