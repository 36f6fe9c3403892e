//! Docker command execution
//!
//! [`DockerCommand`] is a small builder around `tokio::process::Command` for
//! invoking the docker CLI with consistent logging, timeouts, cancellation and
//! error mapping. Children are spawned with `kill_on_drop`, so a cancelled or
//! timed-out invocation never leaves an orphaned `docker run` behind.
//!
//! ```rust,no_run
//! use anchor_cli::docker::DockerCommand;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cancel = CancellationToken::new();
//! let output = DockerCommand::run("debian:bookworm", "apt-cache policy curl")
//!     .with_context("curl lookup")
//!     .execute(&cancel)
//!     .await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::AnchorError;
use crate::utils::platform::{command_exists, get_docker_command};

/// Default timeout for docker invocations. `apt-get update` inside a fresh
/// container is the slow path.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Builder for a single docker CLI invocation.
pub struct DockerCommand {
    args: Vec<String>,
    timeout_duration: Option<Duration>,
    context: Option<String>,
}

impl Default for DockerCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            timeout_duration: Some(DEFAULT_TIMEOUT),
            context: None,
        }
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone)]
pub struct DockerCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl DockerCommand {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the timeout, or `None` to wait indefinitely.
    #[must_use]
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Label used in log lines for this invocation.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    /// Run the command to completion, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`AnchorError::Cancelled`] if `cancel` fires first; the child is killed
    /// - [`AnchorError::DockerCommandError`] on timeout or non-zero exit
    /// - an I/O error if the process cannot be spawned
    pub async fn execute(self, cancel: &CancellationToken) -> Result<DockerCommandOutput> {
        if cancel.is_cancelled() {
            return Err(AnchorError::Cancelled.into());
        }

        let start = Instant::now();
        let docker = get_docker_command();
        let label = self.context.as_deref().unwrap_or("docker");
        tracing::debug!(target: "docker", "({}) Executing command: {} {}", label, docker, self.args.join(" "));

        let mut cmd = Command::new(docker);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output_future = async {
            match self.timeout_duration {
                Some(duration) => match timeout(duration, cmd.output()).await {
                    Ok(result) => Ok(result),
                    Err(_) => Err(duration),
                },
                None => Ok(cmd.output().await),
            }
        };

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(target: "docker", "({}) Cancelled: docker {}", label, self.args.join(" "));
                return Err(AnchorError::Cancelled.into());
            }
            result = output_future => match result {
                Ok(output) => output
                    .with_context(|| format!("Failed to execute docker {}", self.args.join(" ")))?,
                Err(duration) => {
                    tracing::warn!(
                        target: "docker",
                        "Command timed out after {} seconds: docker {}",
                        duration.as_secs(),
                        self.args.join(" ")
                    );
                    return Err(AnchorError::DockerCommandError {
                        operation: self.operation(),
                        stderr: format!(
                            "Docker command timed out after {} seconds: docker {}",
                            duration.as_secs(),
                            self.args.join(" ")
                        ),
                    }
                    .into());
                }
            },
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(target: "docker", "({}) Command failed with exit code: {:?}", label, output.status.code());
            if !stderr.is_empty() {
                tracing::debug!(target: "docker", "({}) {}", label, stderr.trim());
            }
            return Err(AnchorError::DockerCommandError {
                operation: self.operation(),
                stderr: if stderr.trim().is_empty() { stdout } else { stderr },
            }
            .into());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(target: "docker::perf", "({}) docker {} took {:.2}s", label, self.operation(), elapsed.as_secs_f64());
        } else {
            tracing::debug!(target: "docker::perf", "({}) docker {} took {}ms", label, self.operation(), elapsed.as_millis());
        }

        Ok(DockerCommandOutput {
            stdout,
            stderr,
        })
    }
}

// Convenience builders for the invocations anchor needs

impl DockerCommand {
    /// `docker --version`
    #[must_use]
    pub fn version() -> Self {
        Self::new().arg("--version").with_timeout(Some(Duration::from_secs(30)))
    }

    /// `docker info`
    #[must_use]
    pub fn info() -> Self {
        Self::new().arg("info").with_timeout(Some(Duration::from_secs(60)))
    }

    /// `docker run --rm <image> bash -c <script>`
    #[must_use]
    pub fn run(image: &str, script: &str) -> Self {
        Self::new().args(["run", "--rm", image, "bash", "-c", script])
    }
}

/// Whether the docker CLI is installed and answers `--version`.
pub async fn is_docker_installed(cancel: &CancellationToken) -> bool {
    command_exists(get_docker_command()) && DockerCommand::version().execute(cancel).await.is_ok()
}

/// Whether the docker daemon is reachable.
pub async fn is_docker_running(cancel: &CancellationToken) -> bool {
    match DockerCommand::info().execute(cancel).await {
        Ok(output) => output.stdout.contains("Server:"),
        Err(e) => {
            tracing::debug!(target: "docker", "docker info failed: {e:#}");
            false
        }
    }
}

/// Fail unless docker is installed and its daemon is running.
///
/// # Errors
///
/// Returns [`AnchorError::DockerNotFound`] or [`AnchorError::DockerNotRunning`].
pub async fn ensure_docker_available(cancel: &CancellationToken) -> Result<()> {
    if !is_docker_installed(cancel).await {
        return Err(AnchorError::DockerNotFound.into());
    }
    if !is_docker_running(cancel).await {
        return Err(AnchorError::DockerNotRunning.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_builder_arguments() {
        let cmd = DockerCommand::run("debian:bookworm", "apt-get update");
        assert_eq!(
            cmd.arguments(),
            &["run", "--rm", "debian:bookworm", "bash", "-c", "apt-get update"]
        );
        assert_eq!(cmd.operation(), "run");
        assert_eq!(cmd.timeout_duration, Some(DEFAULT_TIMEOUT));
    }

    #[test]
    fn test_builder_chaining() {
        let cmd = DockerCommand::new()
            .arg("image")
            .args(["ls", "-q"])
            .with_timeout(None)
            .with_context("list");
        assert_eq!(cmd.arguments(), &["image", "ls", "-q"]);
        assert!(cmd.timeout_duration.is_none());
        assert_eq!(cmd.context.as_deref(), Some("list"));
    }

    #[test]
    fn test_operation_of_empty_command() {
        assert_eq!(DockerCommand::new().operation(), "unknown");
    }

    #[tokio::test]
    async fn test_execute_respects_cancelled_token() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = DockerCommand::info().execute(&cancel).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<AnchorError>(), Some(AnchorError::Cancelled)));
    }
}
