// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for image-admission-controller.
//!
//! Uses proptest to generate random image references and verify parsing
//! invariants.

use proptest::prelude::*;

use image_admission::image::{Digest, ImageReference, ParsedReference, enforce, split_registry};

/// Strategy for repository path components.
fn component() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}([._-][a-z0-9]{1,6})?"
}

/// Strategy for repository names with an optional registry host.
fn repository() -> impl Strategy<Value = String> {
    (
        prop_oneof![
            Just(None),
            Just(Some("ghcr.io".to_string())),
            Just(Some("localhost:5000".to_string())),
            Just(Some("registry.example.com:8443".to_string())),
        ],
        prop::collection::vec(component(), 1..4),
    )
        .prop_map(|(host, parts)| {
            let path = parts.join("/");
            match host {
                Some(host) => format!("{}/{}", host, path),
                None => path,
            }
        })
}

/// Strategy for tags.
fn tag() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_][A-Za-z0-9_.-]{0,20}"
}

/// Strategy for sha256 digests.
fn digest() -> impl Strategy<Value = String> {
    "[0-9a-f]{64}".prop_map(|hex| format!("sha256:{}", hex))
}

proptest! {
    /// Property: A reference carrying a digest never yields a tag.
    #[test]
    fn test_digest_reference_has_no_tag(
        repo in repository(),
        tag in prop::option::of(tag()),
        digest in digest()
    ) {
        let raw = match &tag {
            Some(tag) => format!("{}:{}@{}", repo, tag, digest),
            None => format!("{}@{}", repo, digest),
        };
        let parsed = ParsedReference::parse(&raw).unwrap();
        prop_assert_eq!(parsed.name, repo);
        prop_assert_eq!(parsed.tag, None);
        prop_assert_eq!(parsed.digest.unwrap().to_string(), digest);
    }

    /// Property: The tag is whatever follows the last colon after the last
    /// slash; registry ports never leak into it.
    #[test]
    fn test_tag_split(repo in repository(), tag in tag()) {
        let parsed = ParsedReference::parse(&format!("{}:{}", repo, tag)).unwrap();
        prop_assert_eq!(parsed.name, repo);
        prop_assert_eq!(parsed.tag, Some(tag));
        prop_assert!(parsed.digest.is_none());
    }

    /// Property: Digests display exactly as parsed, never truncated.
    #[test]
    fn test_digest_display_round_trip(digest in digest()) {
        let parsed: Digest = digest.parse().unwrap();
        prop_assert_eq!(parsed.to_string(), digest);
    }

    /// Property: A resolved reference displays in a form that parses back
    /// to the same name and digest.
    #[test]
    fn test_reference_display_parses_back(
        repo in repository(),
        tag in prop::option::of(tag()),
        digest in digest()
    ) {
        let reference = ImageReference {
            name: repo.clone(),
            tag,
            digest: digest.parse().unwrap(),
        };
        let parsed = ParsedReference::parse(&reference.to_string()).unwrap();
        prop_assert_eq!(parsed.name, repo);
        prop_assert_eq!(parsed.digest, Some(reference.digest));
    }

    /// Property: Only untagged references pass the pinning policy when tags
    /// are not allowed; everything passes when they are.
    #[test]
    fn test_enforce_rejects_exactly_tagged(
        repo in repository(),
        tag in prop::option::of(tag()),
        digest in digest()
    ) {
        let reference = ImageReference {
            name: repo,
            tag: tag.clone(),
            digest: digest.parse().unwrap(),
        };
        prop_assert_eq!(enforce(&reference, false).is_ok(), tag.is_none());
        prop_assert!(enforce(&reference, true).is_ok());
    }

    /// Property: The host is never part of the repository path.
    #[test]
    fn test_split_registry_separates_host(repo in repository()) {
        let (host, path) = split_registry(&repo);
        prop_assert!(!host.is_empty());
        prop_assert!(repo.ends_with(&path) || path.starts_with("library/"));
        let host_prefix = format!("{}/", host);
        prop_assert!(!path.starts_with(&host_prefix));
    }
}
