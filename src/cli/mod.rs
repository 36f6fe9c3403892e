//! Command-line interface for anchor.
//!
//! Without a subcommand, anchor pins a Dockerfile template (see
//! [`AnchorCommand`]). The only subcommand is `version`.
//!
//! ```bash
//! # Anchor Dockerfile.template for the host architecture into ./Dockerfile
//! anchor
//!
//! # Two architectures, written to Dockerfile.amd64 and Dockerfile.arm64
//! anchor -a amd64,arm64 -y
//!
//! # Preview without writing
//! anchor -i build/Dockerfile.template --dry-run
//! ```
//!
//! Global flags:
//! - `--verbose` / `--quiet` adjust log output (colored progress is always shown)
//! - `--no-progress` hides spinners
//! - `--config <PATH>` selects the configuration file (also `ANCHOR_CONFIG`)
//!
//! Ctrl+C or SIGTERM cancels the running pass. In-flight `docker run`
//! containers are killed and nothing is written.

pub mod anchor;
pub mod version;

pub use anchor::{AnchorCommand, output_path};
pub use version::VersionCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::{CONFIG_PATH_ENV, GlobalConfig};
use crate::utils::progress::NO_PROGRESS_ENV;

/// Settings derived from the global flags.
///
/// Kept separate from [`Cli`] so tests can drive [`Cli::execute_with_config`]
/// with explicit settings.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Filter directive for the log subscriber, overridden by `RUST_LOG`.
    pub log_level: Option<String>,

    /// Hide spinners (sets `ANCHOR_NO_PROGRESS`).
    pub no_progress: bool,

    /// Configuration file to load instead of the default location.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Export settings that are read through the environment.
    ///
    /// Must run before any other thread is started.
    pub fn apply_to_env(&self) {
        if self.no_progress {
            // SAFETY: called once from the main task before spawning work.
            unsafe { std::env::set_var(NO_PROGRESS_ENV, "1") };
        }
    }

    /// Install the global tracing subscriber, writing to stderr.
    ///
    /// `RUST_LOG` wins over `log_level`. Does nothing if a subscriber is
    /// already installed.
    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(self.log_level.as_deref().unwrap_or("warn"))
        });

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    }
}

/// Anchor Dockerfiles to image digests and exact package versions.
#[derive(Parser, Debug)]
#[command(
    name = "anchor",
    about = "anchor is a tool to anchor Dockerfiles to specific versions",
    version,
    long_about = "anchor is a tool to anchor Dockerfiles to specific versions for their base images and packages.",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    anchor: AnchorCommand,

    /// Show debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable spinners
    #[arg(long, global = true)]
    no_progress: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the version number of anchor
    Version(VersionCommand),
}

impl Cli {
    /// Execute with settings built from the parsed flags.
    ///
    /// # Errors
    ///
    /// Returns whatever the selected command fails with.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// `--verbose` → `debug`, `--quiet` → `error`, otherwise `warn`.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        };

        CliConfig {
            log_level: Some(log_level.to_string()),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Execute with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns whatever the selected command fails with.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.apply_to_env();
        config.init_logging();

        match self.command {
            Some(Commands::Version(cmd)) => cmd.execute(),
            None => {
                let global = GlobalConfig::load_with_optional(config.config_path.clone()).await?;

                let cancel = CancellationToken::new();
                let watcher = tokio::spawn(cancel_on_shutdown(cancel.clone()));
                let result = self.anchor.execute(&global, &cancel).await;
                watcher.abort();
                result
            }
        }
    }
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling");
    token.cancel();
}
