//! Error handling for anchor
//!
//! This module provides the error types and user-friendly error reporting for
//! anchor. The error system follows two principles:
//! 1. **Strongly-typed errors** for precise handling inside the crate
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`AnchorError`] - Enumerated error types for every failure case
//! - [`ErrorContext`] - Wrapper that adds a suggestion and details for display
//!
//! # Error Categories
//!
//! - **Docker**: [`AnchorError::DockerNotFound`], [`AnchorError::DockerNotRunning`],
//!   [`AnchorError::DockerCommandError`]
//! - **Dockerfile**: [`AnchorError::MissingImage`], [`AnchorError::MissingBaseImage`]
//! - **Resolution**: [`AnchorError::DigestResolution`], [`AnchorError::RegistryAuth`],
//!   [`AnchorError::PackageResolution`], [`AnchorError::MalformedPackageOutput`]
//! - **Control flow**: [`AnchorError::Cancelled`], [`AnchorError::OverwriteDeclined`]
//! - **Configuration and I/O**: [`AnchorError::ConfigError`], [`AnchorError::IoError`],
//!   [`AnchorError::TomlError`]
//!
//! Use [`user_friendly_error`] to turn any `anyhow::Error` into an
//! [`ErrorContext`] ready for display.
//!
//! # Examples
//!
//! ```rust,no_run
//! use anchor_cli::core::{AnchorError, user_friendly_error};
//!
//! fn check() -> anyhow::Result<()> {
//!     Err(AnchorError::DockerNotRunning.into())
//! }
//!
//! if let Err(e) = check() {
//!     let ctx = user_friendly_error(e);
//!     ctx.display(); // Shows colored error with suggestions
//! }
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for anchor operations.
///
/// Every variant carries the image, package set or architecture it concerns so
/// that a failed architecture pass can be traced back to its cause.
#[derive(Error, Debug)]
pub enum AnchorError {
    /// The `docker` executable is not on `PATH`.
    #[error("Docker is not installed or not found in PATH")]
    DockerNotFound,

    /// `docker info` failed or did not report a server.
    #[error("Docker is not running")]
    DockerNotRunning,

    /// A docker invocation exited unsuccessfully or timed out.
    #[error("Docker operation failed: {operation}")]
    DockerCommandError {
        /// The docker subcommand that failed (e.g., "run", "info")
        operation: String,
        /// The error output from the docker command
        stderr: String,
    },

    /// A `FROM` instruction without an image token.
    #[error("FROM instruction is missing an image reference: {instruction}")]
    MissingImage {
        /// The flattened instruction text
        instruction: String,
    },

    /// A `RUN` instruction needs package versions before any `FROM`.
    #[error("Cannot resolve packages {packages} without a preceding FROM instruction")]
    MissingBaseImage {
        /// Comma separated package names
        packages: String,
    },

    /// The registry could not produce a digest for an image.
    #[error("Failed to resolve digest for image '{image}'")]
    DigestResolution {
        /// Image reference as written in the Dockerfile
        image: String,
        /// Why resolution failed
        reason: String,
    },

    /// Registry token exchange failed.
    #[error("Registry authentication failed for {registry}")]
    RegistryAuth {
        /// Registry host
        registry: String,
        /// Why authentication failed
        reason: String,
    },

    /// Version lookup inside the base image failed.
    #[error("Failed to resolve versions for [{packages}] ({architecture}) in image '{image}'")]
    PackageResolution {
        /// Comma separated package names
        packages: String,
        /// Target architecture
        architecture: String,
        /// Image the lookup ran in
        image: String,
        /// Why resolution failed
        reason: String,
    },

    /// `apt-cache show` output that cannot be interpreted.
    #[error("Unexpected package metadata: {line}")]
    MalformedPackageOutput {
        /// The offending line
        line: String,
    },

    /// Host or requested architecture is not supported.
    #[error("Unsupported architecture: {architecture}")]
    UnsupportedArchitecture {
        /// The architecture name
        architecture: String,
    },

    /// The pass was interrupted before it finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// The user answered anything but `y` at the overwrite prompt.
    #[error("Exiting without writing file {path}")]
    OverwriteDeclined {
        /// Output path that already exists
        path: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

/// Error wrapper carrying a suggestion and details for display.
#[derive(Debug)]
pub struct ErrorContext {
    pub error: AnchorError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: AnchorError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error, details and suggestion to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-facing [`ErrorContext`].
///
/// Known [`AnchorError`] variants get tailored suggestions. Anything else is
/// reported with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let error = match error.downcast::<AnchorError>() {
        Ok(anchor_error) => return create_error_context(anchor_error),
        Err(error) => error,
    };

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(AnchorError::Other {
                    message: error.to_string(),
                })
                .with_suggestion("Check the permissions of the input file and output directory")
                .with_details("anchor could not read or write a file");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(AnchorError::Other {
                    message: error.to_string(),
                })
                .with_suggestion(
                    "Check that the input Dockerfile exists, or pass its path with --input",
                )
                .with_details("A required file or directory could not be found");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(AnchorError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of your anchor configuration file");
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(AnchorError::Other {
        message,
    })
}

fn create_error_context(error: AnchorError) -> ErrorContext {
    match error {
        AnchorError::DockerNotFound => ErrorContext::new(AnchorError::DockerNotFound)
            .with_suggestion("Install Docker from https://docs.docker.com/get-docker/ and make sure 'docker' is in your PATH")
            .with_details("anchor runs package lookups inside the base image with 'docker run'"),

        AnchorError::DockerNotRunning => ErrorContext::new(AnchorError::DockerNotRunning)
            .with_suggestion("Start the Docker daemon (or Docker Desktop) and try again")
            .with_details("'docker info' did not report a running server"),

        AnchorError::DockerCommandError { operation, stderr } => {
            let details = if stderr.trim().is_empty() {
                "Docker exited without an error message".to_string()
            } else {
                stderr.trim().to_string()
            };
            let suggestion = match operation.as_str() {
                "run" => "Check that the base image can be pulled and ships bash and apt",
                _ => "Run the docker command manually for more details",
            };
            ErrorContext::new(AnchorError::DockerCommandError { operation, stderr })
                .with_suggestion(suggestion)
                .with_details(details)
        }

        AnchorError::MissingImage { instruction } => ErrorContext::new(AnchorError::MissingImage { instruction })
            .with_suggestion("Every FROM instruction needs an image, e.g. 'FROM debian:bookworm'"),

        AnchorError::MissingBaseImage { packages } => ErrorContext::new(AnchorError::MissingBaseImage { packages })
            .with_suggestion("Move the RUN instruction after a FROM instruction")
            .with_details("Package versions are looked up inside the most recent base image"),

        AnchorError::DigestResolution { image, reason } => {
            let suggestion = format!(
                "Check that '{image}' exists and is reachable, or skip it with '# anchor ignore={image}'"
            );
            ErrorContext::new(AnchorError::DigestResolution { image, reason: reason.clone() })
                .with_suggestion(suggestion)
                .with_details(reason)
        }

        AnchorError::RegistryAuth { registry, reason } => {
            let suggestion = format!(
                "Add credentials for {registry} under [registries.\"{registry}\"] in the anchor config"
            );
            ErrorContext::new(AnchorError::RegistryAuth { registry, reason: reason.clone() })
                .with_suggestion(suggestion)
                .with_details(reason)
        }

        AnchorError::PackageResolution { packages, architecture, image, reason } => {
            let suggestion = format!(
                "Check the package names exist for {architecture}, or skip them with '# anchor ignore=<name>'"
            );
            ErrorContext::new(AnchorError::PackageResolution {
                packages,
                architecture,
                image,
                reason: reason.clone(),
            })
            .with_suggestion(suggestion)
            .with_details(reason)
        }

        AnchorError::UnsupportedArchitecture { architecture } => {
            ErrorContext::new(AnchorError::UnsupportedArchitecture { architecture })
                .with_suggestion("Pass the target explicitly, e.g. '--architectures amd64,arm64'")
        }

        AnchorError::OverwriteDeclined { path } => ErrorContext::new(AnchorError::OverwriteDeclined { path })
            .with_suggestion("Pass --yes to overwrite, or choose another file with --output"),

        other => ErrorContext::new(other),
    }
}
