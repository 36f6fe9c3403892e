//! Test utilities for anchor
//!
//! In-memory resolvers and logging setup shared by unit and integration tests.
//! Enabled for `cfg(test)` and through the `test-utils` feature.
//!
//! # Example
//!
//! ```rust,no_run
//! use anchor_cli::dockerfile;
//! use anchor_cli::rewrite::Anchorer;
//! use anchor_cli::test_utils::{StubDigestResolver, StubVersionResolver};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let anchorer = Anchorer::new(
//!     StubDigestResolver::new(&[("debian:bookworm", "sha256:abc")]),
//!     StubVersionResolver::new(&[("curl", "7.88.1")]),
//! );
//! let mut nodes = dockerfile::parse("FROM debian:bookworm\nRUN apt-get install curl\n");
//! anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Mutex, Once};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::core::AnchorError;
use crate::resolver::{DigestResolver, VersionResolver};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` if given, otherwise `RUST_LOG`; with neither, logging stays
/// off. Safe to call from every test.
///
/// ```bash
/// RUST_LOG=anchor=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

fn to_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

/// [`DigestResolver`] answering from a fixed table.
///
/// Unknown images fail with [`AnchorError::DigestResolution`]. Every requested
/// image is recorded.
#[derive(Debug, Default)]
pub struct StubDigestResolver {
    digests: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl StubDigestResolver {
    #[must_use]
    pub fn new(digests: &[(&str, &str)]) -> Self {
        Self {
            digests: to_map(digests),
            calls: Mutex::default(),
        }
    }

    /// Images requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl DigestResolver for StubDigestResolver {
    async fn resolve_digest(&self, image: &str, cancel: &CancellationToken) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(AnchorError::Cancelled.into());
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(image.to_string());
        }
        self.digests.get(image).cloned().ok_or_else(|| {
            AnchorError::DigestResolution {
                image: image.to_string(),
                reason: "manifest not found".to_string(),
            }
            .into()
        })
    }
}

/// One recorded version lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCall {
    pub packages: Vec<String>,
    pub architecture: String,
    pub image: String,
}

/// [`VersionResolver`] answering from a fixed table.
///
/// Returns the known versions of the requested packages and omits the rest,
/// the way apt omits packages it has never heard of.
#[derive(Debug, Default)]
pub struct StubVersionResolver {
    versions: HashMap<String, String>,
    failure: Option<String>,
    calls: Mutex<Vec<VersionCall>>,
}

impl StubVersionResolver {
    #[must_use]
    pub fn new(versions: &[(&str, &str)]) -> Self {
        Self {
            versions: to_map(versions),
            failure: None,
            calls: Mutex::default(),
        }
    }

    /// Fail every lookup with [`AnchorError::PackageResolution`] and `reason`.
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<VersionCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl VersionResolver for StubVersionResolver {
    async fn resolve_versions(
        &self,
        packages: &[String],
        architecture: &str,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, String>> {
        if cancel.is_cancelled() {
            return Err(AnchorError::Cancelled.into());
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(VersionCall {
                packages: packages.to_vec(),
                architecture: architecture.to_string(),
                image: image.to_string(),
            });
        }
        if let Some(reason) = &self.failure {
            return Err(AnchorError::PackageResolution {
                packages: packages.join(", "),
                architecture: architecture.to_string(),
                image: image.to_string(),
                reason: reason.clone(),
            }
            .into());
        }
        Ok(packages
            .iter()
            .filter_map(|p| self.versions.get(p).map(|v| (p.clone(), v.clone())))
            .collect())
    }
}

/// [`VersionResolver`] whose lookups never finish on their own.
///
/// Each call signals [`PendingVersionResolver::started`] and then waits until
/// the token is cancelled, failing with [`AnchorError::Cancelled`].
#[derive(Debug, Default)]
pub struct PendingVersionResolver {
    started: Notify,
    calls: Mutex<Vec<VersionCall>>,
}

impl PendingVersionResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once a lookup is in flight.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    pub fn calls(&self) -> Vec<VersionCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl VersionResolver for PendingVersionResolver {
    async fn resolve_versions(
        &self,
        packages: &[String],
        architecture: &str,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, String>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(VersionCall {
                packages: packages.to_vec(),
                architecture: architecture.to_string(),
                image: image.to_string(),
            });
        }
        self.started.notify_one();
        cancel.cancelled().await;
        Err(AnchorError::Cancelled.into())
    }
}
