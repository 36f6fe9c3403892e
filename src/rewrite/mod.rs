//! Dockerfile rewrite engine
//!
//! [`Anchorer`] walks parsed [`Nodes`] once per target architecture and pins
//! what it finds:
//!
//! - `FROM <image>` becomes `FROM <image>@<digest>`. The plain reference then
//!   serves as the base image for the `RUN` instructions that follow.
//! - Packages named by `apt-get install` in a `RUN` instruction become
//!   `<name>=<version>` with versions resolved for the architecture inside the
//!   current base image, and the instruction is prefixed with
//!   `dpkg --add-architecture <arch> && apt-get update &&`.
//!
//! `# anchor ignore=<names>` (or bare `# anchor ignore`) attached to an
//! instruction leaves the named images or packages as written. All other
//! instructions and every comment or blank line pass through untouched.
//!
//! Resolution goes through the [`DigestResolver`] and [`VersionResolver`]
//! traits, and the first resolver error aborts the pass. Callers should parse
//! fresh nodes for every architecture and only write them out when `process`
//! succeeds.
//!
//! ```rust,no_run
//! use anchor_cli::dockerfile;
//! use anchor_cli::resolver::{AptResolver, RegistryResolver};
//! use anchor_cli::rewrite::Anchorer;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let anchorer = Anchorer::new(RegistryResolver::new(Duration::from_secs(60))?, AptResolver::new());
//! let mut nodes = dockerfile::parse("FROM debian:bookworm\nRUN apt-get install -y curl\n");
//! anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await?;
//! print!("{nodes}");
//! # Ok(())
//! # }
//! ```

pub mod packages;

pub use packages::{PinFormat, append_package_versions, parse_command};

use anyhow::Result;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::core::AnchorError;
use crate::dockerfile::{CommandType, Node, Nodes};
use crate::resolver::{DigestResolver, VersionResolver};

/// Image name that denotes an empty base.
const SCRATCH: &str = "scratch";

/// A reference pinned during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchored {
    Image {
        /// Stage alias from `FROM ... AS <stage>`, if any
        stage: Option<String>,
        image: String,
        digest: String,
    },
    Package {
        name: String,
        version: String,
    },
}

impl std::fmt::Display for Anchored {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image {
                image,
                digest,
                ..
            } => write!(f, "{image} to {digest}"),
            Self::Package {
                name,
                version,
            } => write!(f, "{name} to {version}"),
        }
    }
}

/// Outcome of one architecture pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Pins in document order.
    pub anchored: Vec<Anchored>,
    /// References left as written (ignored, already pinned, `scratch`, stage
    /// references, build arguments).
    pub skipped: Vec<String>,
}

impl ProcessReport {
    pub fn images(&self) -> impl Iterator<Item = &Anchored> {
        self.anchored.iter().filter(|a| matches!(a, Anchored::Image { .. }))
    }

    pub fn packages(&self) -> impl Iterator<Item = &Anchored> {
        self.anchored.iter().filter(|a| matches!(a, Anchored::Package { .. }))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchored.is_empty()
    }
}

/// Parsed `FROM` instruction.
#[derive(Debug, PartialEq, Eq)]
struct FromInstruction<'a> {
    image: &'a str,
    stage: Option<&'a str>,
}

impl<'a> FromInstruction<'a> {
    /// `FROM [--flag=value...] <image> [AS <stage>]`
    fn parse(command: &'a str) -> Result<Self, AnchorError> {
        let mut tokens = command.split_whitespace().skip(1).filter(|t| !t.starts_with("--"));
        let image = tokens.next().ok_or_else(|| AnchorError::MissingImage {
            instruction: command.to_string(),
        })?;
        let stage = match (tokens.next(), tokens.next()) {
            (Some(keyword), Some(stage)) if keyword.eq_ignore_ascii_case("as") => Some(stage),
            _ => None,
        };
        Ok(Self {
            image,
            stage,
        })
    }
}

/// Per-pass state threaded through the nodes in document order.
#[derive(Default)]
struct PassState {
    /// Base image for the `RUN` instructions that follow.
    current_image: Option<String>,
    /// Lower-cased stage alias to its base image.
    stages: HashMap<String, String>,
}

/// Pins images and packages in parsed Dockerfile nodes.
pub struct Anchorer<D, V> {
    digests: D,
    versions: V,
    pin_format: PinFormat,
}

impl<D: DigestResolver, V: VersionResolver> Anchorer<D, V> {
    pub fn new(digests: D, versions: V) -> Self {
        Self {
            digests,
            versions,
            pin_format: PinFormat::default(),
        }
    }

    #[must_use]
    pub fn with_pin_format(mut self, pin_format: PinFormat) -> Self {
        self.pin_format = pin_format;
        self
    }

    pub fn digest_resolver(&self) -> &D {
        &self.digests
    }

    pub fn version_resolver(&self) -> &V {
        &self.versions
    }

    /// Run one architecture pass over `nodes`, mutating them in place.
    ///
    /// # Errors
    ///
    /// - [`AnchorError::MissingImage`] for a `FROM` without an image
    /// - [`AnchorError::MissingBaseImage`] for packages to resolve before any `FROM`
    /// - any resolver error, including [`AnchorError::Cancelled`]
    ///
    /// On error the nodes may be partially rewritten and must be discarded.
    pub async fn process(
        &self,
        nodes: &mut Nodes,
        architecture: &str,
        cancel: &CancellationToken,
    ) -> Result<ProcessReport> {
        let mut state = PassState::default();
        let mut report = ProcessReport::default();

        for node in nodes.iter_mut() {
            if cancel.is_cancelled() {
                return Err(AnchorError::Cancelled.into());
            }
            match node.command_type {
                CommandType::From => self.process_from(node, &mut state, &mut report, cancel).await?,
                CommandType::Run => {
                    self.process_run(node, architecture, &state, &mut report, cancel).await?;
                }
                CommandType::Other => {}
            }
        }

        tracing::info!(
            target: "anchor",
            "Pass for {} pinned {} image(s) and {} package(s)",
            architecture,
            report.images().count(),
            report.packages().count()
        );
        Ok(report)
    }

    async fn process_from(
        &self,
        node: &mut Node,
        state: &mut PassState,
        report: &mut ProcessReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let command = node.command.clone();
        let from = FromInstruction::parse(&command)?;
        let image = from.image;
        let stage = from.stage.map(str::to_string);

        let base = if let Some(base) = state.stages.get(&image.to_ascii_lowercase()) {
            tracing::debug!(target: "anchor", "{} refers to an earlier stage", image);
            report.skipped.push(image.to_string());
            base.clone()
        } else if self.should_skip(node, image) {
            report.skipped.push(image.to_string());
            image.to_string()
        } else {
            match stage.as_deref() {
                Some(stage) => tracing::info!(target: "anchor", "Resolving {} image {}", stage, image),
                None => tracing::info!(target: "anchor", "Resolving final image {}", image),
            }
            let digest = self.digests.resolve_digest(image, cancel).await?;
            if pin_image(node, image, &digest) {
                report.anchored.push(Anchored::Image {
                    stage: stage.clone(),
                    image: image.to_string(),
                    digest,
                });
            } else {
                report.skipped.push(image.to_string());
            }
            image.to_string()
        };

        if let Some(stage) = &stage {
            state.stages.insert(stage.to_ascii_lowercase(), base.clone());
        }
        state.current_image = Some(base);
        Ok(())
    }

    /// References that are never sent to the digest resolver.
    fn should_skip(&self, node: &Node, image: &str) -> bool {
        if node.ignore_set().contains(image) {
            tracing::debug!(target: "anchor", "Ignoring image {}", image);
            return true;
        }
        if image.contains('@') {
            tracing::debug!(target: "anchor", "{} is already pinned", image);
            return true;
        }
        if image == SCRATCH {
            return true;
        }
        if image.contains('$') {
            tracing::warn!(target: "anchor", "Cannot pin {} because it uses a build argument", image);
            return true;
        }
        false
    }

    async fn process_run(
        &self,
        node: &mut Node,
        architecture: &str,
        state: &PassState,
        report: &mut ProcessReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let candidates = parse_command(&node.command);
        if candidates.is_empty() {
            return Ok(());
        }

        let ignored = node.ignore_set();
        let (wanted, skipped): (Vec<String>, Vec<String>) =
            candidates.into_iter().partition(|name| !ignored.contains(name));
        for name in &skipped {
            tracing::debug!(target: "anchor", "Ignoring package {}", name);
        }
        report.skipped.extend(skipped);
        if wanted.is_empty() {
            return Ok(());
        }

        let Some(image) = state.current_image.as_deref() else {
            return Err(AnchorError::MissingBaseImage {
                packages: wanted.join(", "),
            }
            .into());
        };

        let mut versions = self.versions.resolve_versions(&wanted, architecture, image, cancel).await?;
        versions.retain(|name, _| !ignored.contains(name));

        let pinned = append_package_versions(node, &versions, architecture, self.pin_format);
        report.anchored.extend(pinned.into_iter().map(|(name, version)| Anchored::Package {
            name,
            version,
        }));
        Ok(())
    }
}

/// Replace the first occurrence of `image` on the instruction's first line.
/// Returns whether the line was rewritten.
fn pin_image(node: &mut Node, image: &str, digest: &str) -> bool {
    let Some(index) = node.first_command_index() else {
        return false;
    };
    let entry = &mut node.entries[index];
    if entry.value.contains(image) {
        entry.value = entry.value.replacen(image, &format!("{image}@{digest}"), 1);
        true
    } else {
        tracing::warn!(target: "anchor", "{} is not on the first line of its FROM instruction, leaving it unpinned", image);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dockerfile;
    use crate::test_utils::{StubDigestResolver, StubVersionResolver};

    fn anchorer(
        digests: &[(&str, &str)],
        versions: &[(&str, &str)],
    ) -> Anchorer<StubDigestResolver, StubVersionResolver> {
        Anchorer::new(StubDigestResolver::new(digests), StubVersionResolver::new(versions))
    }

    #[test]
    fn test_from_instruction_parse() {
        assert_eq!(
            FromInstruction::parse("FROM golang:1.22 AS builder").unwrap(),
            FromInstruction {
                image: "golang:1.22",
                stage: Some("builder"),
            }
        );
        assert_eq!(
            FromInstruction::parse("FROM --platform=$BUILDPLATFORM golang:1.22 as build").unwrap(),
            FromInstruction {
                image: "golang:1.22",
                stage: Some("build"),
            }
        );
        assert_eq!(FromInstruction::parse("FROM debian").unwrap().stage, None);
        assert!(matches!(
            FromInstruction::parse("FROM").unwrap_err(),
            AnchorError::MissingImage { .. }
        ));
    }

    #[tokio::test]
    async fn test_digest_substitution_keeps_alias() {
        let anchorer = anchorer(&[("golang:1.22-bookworm", "sha256:abc")], &[]);
        let mut nodes = dockerfile::parse("FROM golang:1.22-bookworm AS builder\n");
        let report = anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();

        let out = nodes.to_string();
        assert_eq!(out, "FROM golang:1.22-bookworm@sha256:abc AS builder\n");
        assert_eq!(out.matches("golang:1.22-bookworm@sha256:abc").count(), 1);
        assert_eq!(
            report.anchored,
            vec![Anchored::Image {
                stage: Some("builder".to_string()),
                image: "golang:1.22-bookworm".to_string(),
                digest: "sha256:abc".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_ignored_image_not_resolved_but_used_as_base() {
        let anchorer = anchorer(&[], &[("curl", "7.68.0")]);
        let text = "# anchor ignore=golang:1.22-bookworm\nFROM golang:1.22-bookworm\nRUN apt-get install -y curl\n";
        let mut nodes = dockerfile::parse(text);
        anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();

        assert!(anchorer.digests.calls().is_empty());
        assert_eq!(anchorer.versions.calls()[0].image, "golang:1.22-bookworm");
        assert!(nodes.to_string().contains("FROM golang:1.22-bookworm\n"));
    }

    #[tokio::test]
    async fn test_run_uses_plain_reference_of_current_image() {
        let anchorer = anchorer(&[("debian:bookworm", "sha256:def")], &[("curl", "1.0")]);
        let mut nodes = dockerfile::parse("FROM debian:bookworm\nRUN apt-get install curl\n");
        anchorer.process(&mut nodes, "arm64", &CancellationToken::new()).await.unwrap();

        let calls = anchorer.versions.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].image, "debian:bookworm");
        assert_eq!(calls[0].architecture, "arm64");
        assert_eq!(calls[0].packages, vec!["curl"]);
    }

    #[tokio::test]
    async fn test_package_pins_and_single_bootstrap() {
        let anchorer = anchorer(&[("debian:bookworm", "sha256:def")], &[("curl", "7.68.0"), ("wget", "1.20.3")]);
        let text = "FROM debian:bookworm\nRUN apt-get update \\\n    && apt-get install -y curl wget \\\n    && apt-get install -y curl\n";
        let mut nodes = dockerfile::parse(text);
        let report = anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();

        let out = nodes.to_string();
        assert_eq!(out.matches("curl=7.68.0").count(), 2);
        assert_eq!(out.matches("wget=1.20.3").count(), 1);
        assert_eq!(out.matches("dpkg --add-architecture amd64").count(), 1);
        assert_eq!(report.packages().count(), 2);
    }

    #[tokio::test]
    async fn test_partial_package_ignore() {
        let anchorer = anchorer(&[("debian:bookworm", "sha256:def")], &[("curl", "7.68.0"), ("wget", "1.20.3")]);
        let text = "FROM debian:bookworm\n# anchor ignore=curl\nRUN apt-get install -y curl wget\n";
        let mut nodes = dockerfile::parse(text);
        anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();

        let out = nodes.to_string();
        assert!(out.contains(" curl wget=1.20.3\n"));
        assert!(!out.contains("curl="));
        assert_eq!(anchorer.versions.calls()[0].packages, vec!["wget"]);
    }

    #[tokio::test]
    async fn test_all_packages_ignored_skips_resolver() {
        let anchorer = anchorer(&[("debian:bookworm", "sha256:def")], &[("curl", "1.0")]);
        let text = "FROM debian:bookworm\n# anchor ignore\nRUN apt-get install -y curl\n";
        let mut nodes = dockerfile::parse(text);
        anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();

        assert!(anchorer.versions.calls().is_empty());
        assert!(nodes.to_string().ends_with("RUN apt-get install -y curl\n"));
    }

    #[tokio::test]
    async fn test_run_without_from_fails() {
        let anchorer = anchorer(&[], &[("curl", "1.0")]);
        let mut nodes = dockerfile::parse("RUN apt-get install curl\n");
        let err = anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnchorError>(),
            Some(AnchorError::MissingBaseImage { packages }) if packages == "curl"
        ));
    }

    #[tokio::test]
    async fn test_run_without_install_needs_no_base() {
        let anchorer = anchorer(&[], &[]);
        let text = "RUN echo apt-get install curl\n";
        let mut nodes = dockerfile::parse(text);
        anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();
        assert_eq!(nodes.to_string(), text);
    }

    #[tokio::test]
    async fn test_stage_reference_and_special_images_skip_resolver() {
        let anchorer = anchorer(&[("golang:1.22", "sha256:abc")], &[("curl", "1.0")]);
        let text = "\
FROM golang:1.22 AS Build
FROM build
RUN apt-get install curl
FROM scratch
FROM alpine@sha256:fff
FROM ${BASE_IMAGE}
";
        let mut nodes = dockerfile::parse(text);
        let report = anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();

        assert_eq!(anchorer.digests.calls(), vec!["golang:1.22"]);
        assert_eq!(anchorer.versions.calls()[0].image, "golang:1.22");
        assert_eq!(report.skipped, vec!["build", "scratch", "alpine@sha256:fff", "${BASE_IMAGE}"]);
        assert!(nodes.to_string().contains("FROM build\n"));
    }

    #[tokio::test]
    async fn test_other_nodes_untouched() {
        let anchorer = anchorer(&[("debian", "sha256:1")], &[]);
        let text = "ARG VERSION=1\nFROM debian\nCOPY . /src\n  RUN apt-get install curl\n# trailing\n";
        let mut nodes = dockerfile::parse(text);
        anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();
        assert_eq!(
            nodes.to_string(),
            "ARG VERSION=1\nFROM debian@sha256:1\nCOPY . /src\n  RUN apt-get install curl\n# trailing\n"
        );
        assert!(anchorer.versions.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resolver_error_aborts() {
        let anchorer = anchorer(&[], &[]);
        let mut nodes = dockerfile::parse("FROM unknown:1\n");
        let err = anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnchorError>(),
            Some(AnchorError::DigestResolution { image, .. }) if image == "unknown:1"
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let anchorer = anchorer(&[("debian", "sha256:1")], &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut nodes = dockerfile::parse("FROM debian\n");
        let err = anchorer.process(&mut nodes, "amd64", &cancel).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<AnchorError>(), Some(AnchorError::Cancelled)));
        assert!(anchorer.digests.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_while_lookup_in_flight() {
        use crate::test_utils::PendingVersionResolver;
        use std::sync::Arc;

        let anchorer = Arc::new(Anchorer::new(
            StubDigestResolver::new(&[("debian", "sha256:1")]),
            PendingVersionResolver::new(),
        ));
        let cancel = CancellationToken::new();

        let pass = tokio::spawn({
            let anchorer = Arc::clone(&anchorer);
            let cancel = cancel.clone();
            async move {
                let mut nodes =
                    dockerfile::parse("FROM debian\nRUN apt-get install curl\nFROM debian\n");
                anchorer.process(&mut nodes, "amd64", &cancel).await
            }
        });

        anchorer.version_resolver().started().await;
        cancel.cancel();

        let err = pass.await.unwrap().unwrap_err();
        assert!(matches!(err.downcast_ref::<AnchorError>(), Some(AnchorError::Cancelled)));
        assert_eq!(anchorer.digest_resolver().calls(), vec!["debian"]);
        assert_eq!(anchorer.version_resolver().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_image_off_first_line_reported_as_skipped() {
        let anchorer = anchorer(&[("debian", "sha256:1")], &[]);
        let text = "FROM --platform=linux/amd64 \\\n    debian\n";
        let mut nodes = dockerfile::parse(text);

        let report = anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();

        assert_eq!(nodes.to_string(), text);
        assert!(report.is_empty());
        assert_eq!(report.skipped, vec!["debian"]);
        assert_eq!(anchorer.digests.calls(), vec!["debian"]);
    }

    #[tokio::test]
    async fn test_second_pass_on_output_is_stable() {
        let anchorer = anchorer(&[("debian:bookworm", "sha256:def")], &[("curl", "1.0")]);
        let mut nodes = dockerfile::parse("FROM debian:bookworm\nRUN apt-get install curl\n");
        anchorer.process(&mut nodes, "amd64", &CancellationToken::new()).await.unwrap();
        let first = nodes.to_string();

        let mut again = dockerfile::parse(&first);
        let report = anchorer.process(&mut again, "amd64", &CancellationToken::new()).await.unwrap();
        assert_eq!(again.to_string(), first);
        assert!(report.is_empty());
    }
}
