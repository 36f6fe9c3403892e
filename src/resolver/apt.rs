//! apt package version lookup inside a container
//!
//! Versions come from the image itself: a throwaway container enables the
//! target architecture, refreshes the apt index and prints `apt-cache show`
//! stanzas for every requested `name:arch`. The first `Version:` of each
//! package is the candidate apt would install.

use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::VersionResolver;
use crate::core::AnchorError;
use crate::docker::{DEFAULT_TIMEOUT, DockerCommand};
use crate::utils::progress::spinner_with_message;

/// [`VersionResolver`] that asks apt inside the base image.
#[derive(Debug, Clone)]
pub struct AptResolver {
    timeout: Option<Duration>,
}

impl Default for AptResolver {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl AptResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit each container run to `timeout`, or `None` to wait indefinitely.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell script run inside the container.
    #[must_use]
    pub fn build_script(packages: &[String], architecture: &str) -> String {
        let mut script = format!(
            "dpkg --add-architecture {architecture} && apt-get update && apt-cache show --"
        );
        for package in packages {
            script.push(' ');
            script.push_str(package);
            script.push(':');
            script.push_str(architecture);
        }
        script
    }
}

impl VersionResolver for AptResolver {
    async fn resolve_versions(
        &self,
        packages: &[String],
        architecture: &str,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, String>> {
        if packages.is_empty() {
            return Ok(HashMap::new());
        }

        let joined = packages.join(", ");
        let failed = |reason: String| AnchorError::PackageResolution {
            packages: joined.clone(),
            architecture: architecture.to_string(),
            image: image.to_string(),
            reason,
        };

        let script = Self::build_script(packages, architecture);
        tracing::debug!(target: "anchor", "Resolving [{}] for {} in {}", joined, architecture, image);

        let spinner = spinner_with_message(format!("Resolving package versions in {image}..."));
        let result = DockerCommand::run(image, &script)
            .with_timeout(self.timeout)
            .with_context(format!("apt {architecture}"))
            .execute(cancel)
            .await;
        spinner.finish_and_clear();

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                return Err(match e.downcast::<AnchorError>() {
                    Ok(AnchorError::Cancelled) => AnchorError::Cancelled.into(),
                    Ok(AnchorError::DockerCommandError {
                        stderr, ..
                    }) => failed(stderr.trim().to_string()).into(),
                    Ok(other) => other.into(),
                    Err(e) => e.context(failed("could not start docker".to_string())),
                });
            }
        };

        let versions = parse_package_versions(&output.stdout).map_err(|e| failed(e.to_string()))?;
        for package in packages {
            if !versions.contains_key(package) {
                tracing::warn!(target: "anchor", "No version found for {} ({}) in {}", package, architecture, image);
            }
        }
        Ok(versions)
    }
}

/// Parse `apt-cache show` output into `package -> version`.
///
/// Each stanza starts with `Package:`; the first `Version:` seen for a
/// package wins and later stanzas for it are ignored.
///
/// # Errors
///
/// [`AnchorError::MalformedPackageOutput`] if a `Version:` line appears with
/// no package in scope.
pub fn parse_package_versions(output: &str) -> Result<HashMap<String, String>, AnchorError> {
    let mut versions = HashMap::new();
    let mut current: Option<&str> = None;

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("Package:") {
            current = Some(rest.trim());
            continue;
        }
        if let Some(rest) = line.strip_prefix("Version:") {
            let Some(package) = current.take() else {
                return Err(AnchorError::MalformedPackageOutput {
                    line: line.to_string(),
                });
            };
            versions.entry(package.to_string()).or_insert_with(|| rest.trim().to_string());
        }
    }

    Ok(versions)
}
