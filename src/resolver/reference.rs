//! Image reference parsing
//!
//! Splits references like `ghcr.io/org/app:v1` into the registry, repository
//! and tag or digest needed to address the registry's manifest endpoint.

use crate::core::AnchorError;

/// Registry used when the reference names none.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag used when the reference carries neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, optionally with port (e.g. "docker.io", "localhost:5000")
    pub registry: String,
    /// Repository path (e.g. "library/golang")
    pub repository: String,
    pub tag: Option<String>,
    /// Digest (e.g. "sha256:abc...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference.
    ///
    /// - `golang` → docker.io/library/golang:latest
    /// - `golang:1.22-bookworm` → docker.io/library/golang:1.22-bookworm
    /// - `bitnami/redis` → docker.io/bitnami/redis:latest
    /// - `localhost:5000/app` → localhost:5000/app:latest
    /// - `ghcr.io/org/app@sha256:abc` → ghcr.io/org/app@sha256:abc
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::DigestResolution`] for empty references,
    /// malformed digests or an empty repository.
    pub fn parse(reference: &str) -> Result<Self, AnchorError> {
        let invalid = |reason: &str| AnchorError::DigestResolution {
            image: reference.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty image reference"));
        }

        let (name_tag, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(invalid("invalid digest, expected algorithm:hex"));
                }
                (name, Some(digest.to_string()))
            }
            None => (trimmed, None),
        };

        // A tag colon can only appear after the last slash; an earlier colon
        // belongs to a registry port.
        let last_segment_start = name_tag.rfind('/').map_or(0, |pos| pos + 1);
        let (name, tag) = match name_tag[last_segment_start..].rfind(':') {
            Some(colon) => {
                let split = last_segment_start + colon;
                (&name_tag[..split], Some(name_tag[split + 1..].to_string()))
            }
            None => (name_tag, None),
        };

        let (registry, repository) = split_registry_repository(name);
        if repository.is_empty() || tag.as_deref() == Some("") {
            return Err(invalid("empty repository or tag"));
        }

        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Tag or digest to request from the manifest endpoint; the digest wins.
    #[must_use]
    pub fn manifest_reference(&self) -> &str {
        self.digest.as_deref().or(self.tag.as_deref()).unwrap_or(DEFAULT_TAG)
    }

    /// Fully qualified form, e.g. `docker.io/library/golang:1.22`.
    #[must_use]
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(tag) = &self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(digest) = &self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// The first path component is a registry when it looks like a host name.
fn split_registry_repository(name: &str) -> (String, String) {
    if let Some((first, rest)) = name.split_once('/')
        && (first.contains('.') || first.contains(':') || first == "localhost")
    {
        return (first.to_string(), rest.to_string());
    }

    let repository = if name.contains('/') {
        name.to_string()
    } else {
        format!("library/{name}")
    };
    (DEFAULT_REGISTRY.to_string(), repository)
}
