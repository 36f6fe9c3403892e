//! Docker Registry v2 digest lookup
//!
//! Resolves tags to manifest digests with a `HEAD` request against
//! `/v2/<repository>/manifests/<reference>`. Registries answer with the
//! `Docker-Content-Digest` header; the few that omit it get a `GET` and the
//! digest is computed from the manifest body.
//!
//! Anonymous pulls still need a bearer token on Docker Hub and most hosted
//! registries. A `401` carries a `WWW-Authenticate` challenge naming the token
//! service, which is queried with the configured credentials (if any) for the
//! registry host. Tokens are cached per repository for the lifetime of the
//! resolver.

use anyhow::Result;
use reqwest::{Client, Method, Response, StatusCode, header};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::DigestResolver;
use super::reference::ImageReference;
use crate::core::AnchorError;

/// Docker Hub's API endpoint.
const DOCKER_REGISTRY_URL: &str = "https://registry-1.docker.io";

/// Header carrying the manifest digest.
const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// Accept every manifest flavor so multi-arch images resolve to their index
/// digest instead of a single platform's manifest.
const ACCEPT_MANIFEST: &str = concat!(
    "application/vnd.docker.distribution.manifest.list.v2+json, ",
    "application/vnd.oci.image.index.v1+json, ",
    "application/vnd.docker.distribution.manifest.v2+json, ",
    "application/vnd.oci.image.manifest.v1+json"
);

/// Default request timeout.
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(60);

/// Basic credentials for a registry host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    /// OAuth2 name used by some registries instead of `token`.
    #[serde(default)]
    access_token: Option<String>,
}

/// Parsed `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Default, PartialEq, Eq)]
struct AuthChallenge {
    realm: String,
    service: String,
    scope: String,
}

/// [`DigestResolver`] backed by the registry HTTP API.
pub struct RegistryResolver {
    client: Client,
    credentials: HashMap<String, RegistryAuth>,
    /// Bearer tokens keyed by `registry/repository`.
    tokens: Arc<RwLock<HashMap<String, String>>>,
}

impl RegistryResolver {
    /// Create a resolver whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("anchor/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .build()
            .map_err(|e| AnchorError::Other {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            credentials: HashMap::new(),
            tokens: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Use `credentials` (keyed by registry host) when a registry asks for a
    /// token.
    #[must_use]
    pub fn with_credentials(mut self, credentials: HashMap<String, RegistryAuth>) -> Self {
        self.credentials = credentials;
        self
    }

    fn registry_to_url(registry: &str) -> String {
        match registry {
            "docker.io" | "index.docker.io" | "registry-1.docker.io" => {
                DOCKER_REGISTRY_URL.to_string()
            }
            r if r.starts_with("http://") || r.starts_with("https://") => r.to_string(),
            r if r.starts_with("localhost") || r.starts_with("127.0.0.1") => format!("http://{r}"),
            r => format!("https://{r}"),
        }
    }

    fn credentials_for(&self, registry: &str) -> Option<&RegistryAuth> {
        self.credentials.get(registry).or_else(|| {
            // Docker Hub credentials are commonly stored under its legacy names.
            if registry == "docker.io" {
                self.credentials
                    .get("index.docker.io")
                    .or_else(|| self.credentials.get("registry-1.docker.io"))
            } else {
                None
            }
        })
    }

    async fn fetch_digest(&self, reference: &ImageReference) -> Result<String, AnchorError> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            Self::registry_to_url(&reference.registry),
            reference.repository,
            reference.manifest_reference()
        );
        let image = reference.to_string();

        tracing::debug!(target: "registry", "HEAD {}", url);
        let response = self.request_with_auth(Method::HEAD, &url, reference).await?;
        check_status(&response, &image)?;

        if let Some(digest) = header_digest(&response) {
            tracing::debug!(target: "registry", "{} -> {}", image, digest);
            return Ok(digest);
        }

        tracing::debug!(target: "registry", "No {} header for {}, fetching manifest body", DOCKER_CONTENT_DIGEST, image);
        let response = self.request_with_auth(Method::GET, &url, reference).await?;
        check_status(&response, &image)?;
        if let Some(digest) = header_digest(&response) {
            return Ok(digest);
        }

        let body = response.bytes().await.map_err(|e| AnchorError::DigestResolution {
            image: image.clone(),
            reason: format!("failed to read manifest body: {e}"),
        })?;
        Ok(compute_digest(&body))
    }

    async fn request_with_auth(
        &self,
        method: Method,
        url: &str,
        reference: &ImageReference,
    ) -> Result<Response, AnchorError> {
        let token_key = format!("{}/{}", reference.registry, reference.repository);
        let cached_token = self.tokens.read().await.get(&token_key).cloned();

        if let Some(token) = cached_token {
            let response = self.send(method.clone(), url, Some(&token), reference).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }
            self.tokens.write().await.remove(&token_key);
        }

        let response = self.send(method.clone(), url, None, reference).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge_header = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AnchorError::RegistryAuth {
                registry: reference.registry.clone(),
                reason: "missing WWW-Authenticate header".to_string(),
            })?;
        let challenge = parse_www_authenticate(challenge_header).ok_or_else(|| {
            AnchorError::RegistryAuth {
                registry: reference.registry.clone(),
                reason: format!("unsupported challenge: {challenge_header}"),
            }
        })?;

        let token = self.get_token(&challenge, reference).await?;
        self.tokens.write().await.insert(token_key, token.clone());

        self.send(method, url, Some(&token), reference).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        reference: &ImageReference,
    ) -> Result<Response, AnchorError> {
        let mut request = self.client.request(method, url).header(header::ACCEPT, ACCEPT_MANIFEST);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.map_err(|e| AnchorError::DigestResolution {
            image: reference.to_string(),
            reason: format!("request failed: {e}"),
        })
    }

    async fn get_token(
        &self,
        challenge: &AuthChallenge,
        reference: &ImageReference,
    ) -> Result<String, AnchorError> {
        let auth_error = |reason: String| AnchorError::RegistryAuth {
            registry: reference.registry.clone(),
            reason,
        };

        // Registries that omit the scope expect the pull scope of the repository.
        let scope = if challenge.scope.is_empty() {
            format!("repository:{}:pull", reference.repository)
        } else {
            challenge.scope.clone()
        };

        let mut query = vec![("scope", scope)];
        if !challenge.service.is_empty() {
            query.push(("service", challenge.service.clone()));
        }

        tracing::debug!(target: "registry", "Requesting token from {}", challenge.realm);
        let mut request = self.client.get(&challenge.realm).query(&query);
        if let Some(auth) = self.credentials_for(&reference.registry) {
            tracing::debug!(target: "registry", "Using credentials for {}", reference.registry);
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| auth_error(format!("token request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(auth_error(format!("token request failed: {status} {}", body.trim())));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| auth_error(format!("failed to parse token response: {e}")))?;

        token_response
            .token
            .or(token_response.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| auth_error("token response carried no token".to_string()))
    }
}

impl DigestResolver for RegistryResolver {
    async fn resolve_digest(&self, image: &str, cancel: &CancellationToken) -> Result<String> {
        let reference = ImageReference::parse(image)?;

        let digest = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AnchorError::Cancelled.into()),
            result = self.fetch_digest(&reference) => result,
        };

        digest.map_err(|e| match e {
            // Keep the reference as the user wrote it.
            AnchorError::DigestResolution {
                reason, ..
            } => AnchorError::DigestResolution {
                image: image.to_string(),
                reason,
            }
            .into(),
            other => other.into(),
        })
    }
}

fn check_status(response: &Response, image: &str) -> Result<(), AnchorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let reason = match status {
        StatusCode::NOT_FOUND => "manifest not found".to_string(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            format!("access denied ({status})")
        }
        _ => format!("registry returned {status}"),
    };
    Err(AnchorError::DigestResolution {
        image: image.to_string(),
        reason,
    })
}

fn header_digest(response: &Response) -> Option<String> {
    response
        .headers()
        .get(DOCKER_CONTENT_DIGEST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|d| d.contains(':'))
        .map(str::to_string)
}

/// `sha256:<hex>` of a manifest body.
fn compute_digest(body: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(body)))
}

/// Parse `Bearer realm="...",service="...",scope="..."`.
fn parse_www_authenticate(value: &str) -> Option<AuthChallenge> {
    let params = value.trim().strip_prefix("Bearer ")?;

    let mut challenge = AuthChallenge::default();
    for part in split_params(params) {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        let value = raw.trim().trim_matches('"').to_string();
        match key.trim() {
            "realm" => challenge.realm = value,
            "service" => challenge.service = value,
            "scope" => challenge.scope = value,
            _ => {}
        }
    }

    (!challenge.realm.is_empty()).then_some(challenge)
}

/// Split on commas outside quotes; scopes may list actions like `pull,push`.
fn split_params(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&params[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&params[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_to_url() {
        assert_eq!(RegistryResolver::registry_to_url("docker.io"), "https://registry-1.docker.io");
        assert_eq!(RegistryResolver::registry_to_url("ghcr.io"), "https://ghcr.io");
        assert_eq!(
            RegistryResolver::registry_to_url("localhost:5000"),
            "http://localhost:5000"
        );
        assert_eq!(
            RegistryResolver::registry_to_url("https://registry.local"),
            "https://registry.local"
        );
    }

    #[test]
    fn test_parse_www_authenticate() {
        let challenge = parse_www_authenticate(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/golang:pull""#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert_eq!(challenge.service, "registry.docker.io");
        assert_eq!(challenge.scope, "repository:library/golang:pull");
    }

    #[test]
    fn test_parse_www_authenticate_quoted_commas() {
        let challenge = parse_www_authenticate(
            r#"Bearer realm="https://ghcr.io/token",scope="repository:org/app:pull,push""#,
        )
        .unwrap();
        assert_eq!(challenge.scope, "repository:org/app:pull,push");
        assert!(challenge.service.is_empty());
    }

    #[test]
    fn test_parse_www_authenticate_rejects_basic() {
        assert!(parse_www_authenticate(r#"Basic realm="registry""#).is_none());
        assert!(parse_www_authenticate(r#"Bearer service="x""#).is_none());
    }

    #[test]
    fn test_token_response_variants() {
        let docker: TokenResponse =
            serde_json::from_str(r#"{"token":"abc","expires_in":300}"#).unwrap();
        assert_eq!(docker.token.as_deref(), Some("abc"));

        let oauth: TokenResponse = serde_json::from_str(r#"{"access_token":"xyz"}"#).unwrap();
        assert_eq!(oauth.token, None);
        assert_eq!(oauth.access_token.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_compute_digest() {
        assert_eq!(
            compute_digest(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_credentials_for_docker_hub_aliases() {
        let mut credentials = HashMap::new();
        credentials.insert(
            "index.docker.io".to_string(),
            RegistryAuth {
                username: "user".to_string(),
                password: "secret".to_string(),
            },
        );
        let resolver = RegistryResolver::new(DEFAULT_REGISTRY_TIMEOUT)
            .unwrap()
            .with_credentials(credentials);
        assert_eq!(resolver.credentials_for("docker.io").unwrap().username, "user");
        assert!(resolver.credentials_for("ghcr.io").is_none());
    }

    #[tokio::test]
    async fn test_resolve_digest_cancelled() {
        let resolver = RegistryResolver::new(DEFAULT_REGISTRY_TIMEOUT).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolver.resolve_digest("golang:1.22", &cancel).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<AnchorError>(), Some(AnchorError::Cancelled)));
    }
}
