//! Image reference parsing.
//!
//! Handles formats like:
//! - `alpine` (tag defaulted later by the resolver)
//! - `repo/app:v1`
//! - `registry.example.com:5000/team/app:v1`
//! - `ghcr.io/owner/app@sha256:<hex>`
//! - `ghcr.io/owner/app:v1@sha256:<hex>` (the tag is dropped, the digest pins)

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Tag used when a reference names neither a tag nor a digest
pub const DEFAULT_TAG: &str = "latest";

/// Docker Hub's registry API host
pub const DOCKER_HUB_HOST: &str = "registry-1.docker.io";

const NAME_PATTERN: &str = r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*(?::[0-9]+)?/)?[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*$";
const TAG_PATTERN: &str = r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$";

static NAME_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(NAME_PATTERN).ok());
static TAG_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(TAG_PATTERN).ok());

fn is_valid_name(name: &str) -> bool {
    NAME_RE.as_ref().is_some_and(|re| re.is_match(name))
}

fn is_valid_tag(tag: &str) -> bool {
    TAG_RE.as_ref().is_some_and(|re| re.is_match(tag))
}

/// Content-addressed image identifier (`algorithm:hex`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    /// Hash algorithm, e.g. `sha256`
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Lowercase hex encoding of the hash
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| Error::invalid_reference(s, "digest must be algorithm:hex"))?;

        if algorithm.is_empty()
            || !algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(Error::invalid_reference(
                s,
                format!("unsupported digest algorithm {:?}", algorithm),
            ));
        }

        if !hex
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(Error::invalid_reference(
                s,
                "digest must be lowercase hex encoded",
            ));
        }

        let expected_len = match algorithm {
            "sha256" => Some(64),
            "sha512" => Some(128),
            _ => None,
        };
        let length_ok = match expected_len {
            Some(len) => hex.len() == len,
            None => hex.len() >= 32,
        };
        if !length_ok {
            return Err(Error::invalid_reference(
                s,
                format!("digest has invalid length {} for {}", hex.len(), algorithm),
            ));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// A container image reference pinned to a content digest.
///
/// The digest is the verification subject; `name` and `tag` are kept for
/// diagnostics and policy only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry and repository, as written in the pod spec
    pub name: String,
    /// Tag, absent when the pod spec pinned a digest
    pub tag: Option<String>,
    /// Resolved content digest
    pub digest: Digest,
}

impl ImageReference {
    /// Registry API host serving this image
    pub fn registry_host(&self) -> String {
        split_registry(&self.name).0
    }

    /// Repository path within the registry
    pub fn repository(&self) -> String {
        split_registry(&self.name).1
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}@{}", self.name, tag, self.digest),
            None => write!(f, "{}@{}", self.name, self.digest),
        }
    }
}

/// A raw reference after parsing, before digest resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    pub name: String,
    pub tag: Option<String>,
    pub digest: Option<Digest>,
}

impl ParsedReference {
    /// Parse a raw image string from a container spec
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::invalid_reference(raw, "empty image reference"));
        }

        let (name_part, digest) = match raw.split_once('@') {
            Some((name, digest)) => (name, Some(digest.parse::<Digest>()?)),
            None => (raw, None),
        };

        // A colon after the last slash separates the tag; earlier colons
        // belong to a registry port.
        let last_slash = name_part.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name_part[last_slash..].rfind(':') {
            Some(idx) => {
                let split = last_slash + idx;
                (&name_part[..split], Some(&name_part[split + 1..]))
            }
            None => (name_part, None),
        };

        if !is_valid_name(name) {
            return Err(Error::invalid_reference(raw, "malformed repository name"));
        }

        if tag.is_some_and(|t| !is_valid_tag(t)) {
            return Err(Error::invalid_reference(raw, "malformed tag"));
        }

        // A digest pins the content, so any tag next to it is dropped.
        let tag = if digest.is_some() {
            None
        } else {
            tag.map(str::to_string)
        };

        Ok(Self {
            name: name.to_string(),
            tag,
            digest,
        })
    }
}

/// Split a repository name into registry API host and repository path.
///
/// The first component is a host when it contains `.` or `:` or is
/// `localhost`; otherwise the image lives on Docker Hub, where single
/// component names belong to `library/`.
pub fn split_registry(name: &str) -> (String, String) {
    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            let host = if first == "docker.io" || first == "index.docker.io" {
                DOCKER_HUB_HOST.to_string()
            } else {
                first.to_string()
            };
            let repository = if host == DOCKER_HUB_HOST && !rest.contains('/') {
                format!("library/{}", rest)
            } else {
                rest.to_string()
            };
            return (host, repository);
        }
        return (DOCKER_HUB_HOST.to_string(), name.to_string());
    }
    (DOCKER_HUB_HOST.to_string(), format!("library/{}", name))
}
