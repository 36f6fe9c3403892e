//! Digest and package version resolution
//!
//! The rewrite engine never talks to a registry or a container directly. It
//! depends on two capabilities:
//!
//! - [`DigestResolver`] maps an image reference such as `golang:1.22-bookworm`
//!   to its content digest (`sha256:...`).
//! - [`VersionResolver`] maps a set of apt package names to the exact versions
//!   available for an architecture inside a given image.
//!
//! The production implementations are [`RegistryResolver`], which asks the
//! image's registry over the Docker Registry v2 API, and [`AptResolver`], which
//! runs `apt-cache show` in a throwaway container. Both honour the
//! cancellation token they are handed.

pub mod apt;
pub mod reference;
pub mod registry;

pub use apt::{AptResolver, parse_package_versions};
pub use reference::ImageReference;
pub use registry::{RegistryAuth, RegistryResolver};

use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Resolves an image reference to a content-addressed digest.
pub trait DigestResolver {
    /// Return the digest (e.g. `sha256:4f2a...`) that `image` currently
    /// points at.
    fn resolve_digest(
        &self,
        image: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Resolves apt package names to exact versions.
pub trait VersionResolver {
    /// Return `name -> version` for the packages found. Packages the image's
    /// apt sources do not know are absent from the map.
    fn resolve_versions(
        &self,
        packages: &[String],
        architecture: &str,
        image: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<HashMap<String, String>>> + Send;
}
