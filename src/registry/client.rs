//! OCI distribution API client.
//!
//! Only two operations are needed: a `HEAD` on a manifest to learn the
//! digest a tag points to, and fetching the single-layer manifests that
//! carry attestations. Anonymous bearer tokens are negotiated on demand and
//! cached per registry host.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue, WWW_AUTHENTICATE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::{AttestationDownloader, AttestationKind, DigestResolver, RegistryError};
use crate::image::{Digest, ImageReference, split_registry};

const DIGEST_HEADER: &str = "docker-content-digest";

/// Largest attestation manifest accepted
pub const MAX_MANIFEST_BYTES: usize = 4 * 1024 * 1024;
/// Largest attestation blob accepted
pub const MAX_ATTESTATION_BYTES: usize = 16 * 1024 * 1024;

/// OCI media types accepted for manifest requests
const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json";

/// Image manifest, reduced to what attestation download needs
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    digest: String,
}

/// Token response from a registry auth server
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Registry client implementing the digest and attestation collaborators
pub struct RegistryClient {
    client: Client,
    scheme: &'static str,
    /// Cached bearer tokens per registry host
    tokens: RwLock<HashMap<String, String>>,
}

impl RegistryClient {
    /// Create a client. `insecure` switches to plain HTTP for local
    /// registries.
    pub fn new(insecure: bool, timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            scheme: if insecure { "http" } else { "https" },
            tokens: RwLock::new(HashMap::new()),
        })
    }

    fn manifest_url(&self, host: &str, repository: &str, reference: &str) -> String {
        format!(
            "{}://{}/v2/{}/manifests/{}",
            self.scheme, host, repository, reference
        )
    }

    fn blob_url(&self, host: &str, repository: &str, digest: &str) -> String {
        format!("{}://{}/v2/{}/blobs/{}", self.scheme, host, repository, digest)
    }

    /// Send a request, negotiating a bearer token when the registry asks
    /// for one
    async fn send<F>(&self, host: &str, repository: &str, request: F) -> Result<Response, RegistryError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let cached = self.tokens.read().await.get(host).cloned();
        let mut builder = request();
        if let Some(token) = &cached {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        let challenge = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RegistryError::Auth("missing WWW-Authenticate header".to_string()))?
            .to_string();

        debug!(host = %host, "registry requested authentication");
        let token = self.fetch_token(&challenge, repository).await?;
        self.tokens
            .write()
            .await
            .insert(host.to_string(), token.clone());

        Ok(request().bearer_auth(token).send().await?)
    }

    /// Fetch an anonymous pull token from the realm named in a challenge
    async fn fetch_token(&self, challenge: &str, repository: &str) -> Result<String, RegistryError> {
        let params = parse_www_authenticate(challenge);
        let realm = params
            .get("realm")
            .ok_or_else(|| RegistryError::Auth("missing realm in WWW-Authenticate".to_string()))?;

        let mut token_url = reqwest::Url::parse(realm)
            .map_err(|e| RegistryError::Auth(format!("invalid realm URL {}: {}", realm, e)))?;
        {
            let mut query = token_url.query_pairs_mut();
            if let Some(service) = params.get("service") {
                query.append_pair("service", service);
            }
            match params.get("scope") {
                Some(scope) => query.append_pair("scope", scope),
                None => query.append_pair("scope", &format!("repository:{}:pull", repository)),
            };
        }

        let resp = self.client.get(token_url).send().await?;
        if !resp.status().is_success() {
            return Err(RegistryError::Auth(format!(
                "token request failed with status {}",
                resp.status()
            )));
        }

        let token: TokenResponse = resp.json().await?;
        token
            .token
            .or(token.access_token)
            .ok_or_else(|| RegistryError::Auth("no token in response".to_string()))
    }

    fn check_status(resp: &Response, url: &str, what: &str) -> Result<(), RegistryError> {
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            return Err(RegistryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DigestResolver for RegistryClient {
    async fn resolve_digest(&self, name: &str, tag: &str) -> Result<Digest, RegistryError> {
        let (host, repository) = split_registry(name);
        let url = self.manifest_url(&host, &repository, tag);

        let resp = self
            .send(&host, &repository, || {
                self.client
                    .head(&url)
                    .header(ACCEPT, HeaderValue::from_static(MANIFEST_ACCEPT))
            })
            .await?;
        Self::check_status(&resp, &url, &format!("{}:{}", name, tag))?;

        let digest = resp
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RegistryError::MissingDigest(url.clone()))?;

        digest
            .parse()
            .map_err(|_| RegistryError::InvalidDigest(digest.to_string()))
    }
}

#[async_trait]
impl AttestationDownloader for RegistryClient {
    async fn download(
        &self,
        image: &ImageReference,
        kind: AttestationKind,
        dest_dir: &Path,
    ) -> Result<PathBuf, RegistryError> {
        let host = image.registry_host();
        let repository = image.repository();
        let what = format!("{} attestation for {}", kind, image);

        let manifest_url = self.manifest_url(&host, &repository, &kind.tag_for(&image.digest));
        let resp = self
            .send(&host, &repository, || {
                self.client
                    .get(&manifest_url)
                    .header(ACCEPT, HeaderValue::from_static(MANIFEST_ACCEPT))
            })
            .await?;
        Self::check_status(&resp, &manifest_url, &what)?;

        let body = read_limited(resp, &manifest_url, MAX_MANIFEST_BYTES).await?;
        let manifest: Manifest = serde_json::from_slice(&body)?;
        let layer = manifest
            .layers
            .first()
            .ok_or_else(|| RegistryError::NotFound(what.clone()))?;

        let blob_url = self.blob_url(&host, &repository, &layer.digest);
        let resp = self
            .send(&host, &repository, || self.client.get(&blob_url))
            .await?;
        Self::check_status(&resp, &blob_url, &what)?;

        let path = dest_dir.join(format!("{}.json", kind));
        let body = read_limited(resp, &blob_url, MAX_ATTESTATION_BYTES).await?;
        tokio::fs::write(&path, body).await?;
        debug!(image = %image, kind = %kind, path = %path.display(), "downloaded attestation");

        Ok(path)
    }
}

/// Read a response body, failing once it grows past `limit` bytes
async fn read_limited(
    mut resp: Response,
    url: &str,
    limit: usize,
) -> Result<Vec<u8>, RegistryError> {
    let too_large = || RegistryError::TooLarge {
        url: url.to_string(),
        limit,
    };

    if resp
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Parse the parameters of a `WWW-Authenticate: Bearer ...` challenge.
///
/// Values may be quoted and may contain commas (e.g. a scope with
/// `pull,push`).
pub fn parse_www_authenticate(header: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let header = header.trim();
    let rest = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .unwrap_or(header);

    let mut chars = rest.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if *c == ',' || c.is_whitespace()) {
            chars.next();
        }

        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }

        let value: String = if chars.peek() == Some(&'"') {
            chars.next();
            chars.by_ref().take_while(|c| *c != '"').collect()
        } else {
            chars.by_ref().take_while(|c| *c != ',').collect()
        };

        params.insert(key.trim().to_string(), value.trim().to_string());
    }

    params
}
