//! The anchoring command
//!
//! Reads the template once, then for every architecture parses it afresh,
//! pins images and packages, and writes `<output>` (or `<output>.<arch>` when
//! more than one architecture is requested). An existing output is only
//! replaced after confirmation unless `--yes` is given.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::config::GlobalConfig;
use crate::core::AnchorError;
use crate::docker::ensure_docker_available;
use crate::dockerfile;
use crate::resolver::{AptResolver, RegistryResolver};
use crate::rewrite::{Anchored, Anchorer, PinFormat, ProcessReport};
use crate::utils::platform::{host_architecture, validate_architecture};
use crate::utils::atomic_write;

/// Options for anchoring a Dockerfile template.
#[derive(Args, Debug, Clone)]
pub struct AnchorCommand {
    /// Dockerfile template to anchor
    #[arg(short, long, default_value = "Dockerfile.template")]
    pub input: PathBuf,

    /// Output Dockerfile; with several architectures each gets a `.<arch>` suffix
    #[arg(short, long, default_value = "Dockerfile")]
    pub output: PathBuf,

    /// Comma separated architectures to anchor (default: config, then host)
    #[arg(short, long, value_delimiter = ',')]
    pub architectures: Vec<String>,

    /// Print the anchored Dockerfile instead of writing it
    #[arg(long)]
    pub dry_run: bool,

    /// Overwrite existing output without asking
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// How pinned packages are written
    #[arg(long, value_enum, default_value_t = PinFormat::Plain)]
    pub pin_format: PinFormat,
}

impl AnchorCommand {
    /// Anchor the template for every architecture.
    ///
    /// # Errors
    ///
    /// Fails if docker is unavailable, the template cannot be read, any
    /// architecture pass fails, or the user declines an overwrite.
    pub async fn execute(self, config: &GlobalConfig, cancel: &CancellationToken) -> Result<()> {
        let architectures = self.architectures(config)?;

        ensure_docker_available(cancel).await?;

        let template = tokio::fs::read_to_string(&self.input)
            .await
            .with_context(|| format!("Failed to read {}", self.input.display()))?;

        let digests = RegistryResolver::new(config.registry_timeout())?
            .with_credentials(config.registry_auth());
        let versions = AptResolver::new().with_timeout(config.docker_timeout());
        let anchorer = Anchorer::new(digests, versions).with_pin_format(self.pin_format);

        let suffix_arch = architectures.len() > 1;
        for architecture in &architectures {
            if cancel.is_cancelled() {
                return Err(AnchorError::Cancelled.into());
            }
            println!("{}", format!("Anchoring to architecture: {architecture}").cyan());

            let mut nodes = dockerfile::parse(&template);
            let report = anchorer.process(&mut nodes, architecture, cancel).await?;
            print_report(&report);

            let rendered = nodes.to_string();
            if self.dry_run {
                println!("{}", "Generated anchored Dockerfile".green());
                println!("{rendered}");
                continue;
            }

            let output = output_path(&self.output, architecture, suffix_arch);
            self.write_output(&output, &rendered, cancel).await?;
        }

        Ok(())
    }

    /// Architectures from the command line, else the config, else the host.
    fn architectures(&self, config: &GlobalConfig) -> Result<Vec<String>> {
        let requested = if self.architectures.is_empty() {
            &config.architectures
        } else {
            &self.architectures
        };

        let mut architectures: Vec<String> = Vec::new();
        for architecture in requested.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
            validate_architecture(architecture)?;
            if !architectures.iter().any(|a| a == architecture) {
                architectures.push(architecture.to_string());
            }
        }

        if architectures.is_empty() {
            architectures.push(host_architecture()?.to_string());
        }
        tracing::debug!(target: "anchor", "Architectures: {}", architectures.join(", "));
        Ok(architectures)
    }

    async fn write_output(&self, output: &Path, rendered: &str, cancel: &CancellationToken) -> Result<()> {
        let display_path = std::path::absolute(output).unwrap_or_else(|_| output.to_path_buf());

        if output.exists() && !self.yes {
            println!(
                "{}",
                format!("File {} already exists. Overwrite? (y/n)", display_path.display()).yellow()
            );
            if !confirm(cancel).await? {
                println!("{}", "Generated anchored Dockerfile".green());
                println!("{rendered}");
                return Err(AnchorError::OverwriteDeclined {
                    path: display_path.display().to_string(),
                }
                .into());
            }
        }

        atomic_write(output, rendered.as_bytes())?;
        println!("{}", format!("Generated anchored Dockerfile: {}", display_path.display()).green());
        Ok(())
    }
}

/// Read one line from stdin; only `y` (any case) confirms.
async fn confirm(cancel: &CancellationToken) -> Result<bool> {
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        () = cancel.cancelled() => Err(AnchorError::Cancelled.into()),
        read = stdin.read_line(&mut line) => {
            read.context("Failed to read confirmation from stdin")?;
            Ok(line.trim().eq_ignore_ascii_case("y"))
        }
    }
}

/// `<output>.<arch>` when several architectures are written, else `<output>`.
#[must_use]
pub fn output_path(output: &Path, architecture: &str, suffix_arch: bool) -> PathBuf {
    if suffix_arch {
        let mut name = output.as_os_str().to_os_string();
        name.push(".");
        name.push(architecture);
        PathBuf::from(name)
    } else {
        output.to_path_buf()
    }
}

fn print_report(report: &ProcessReport) {
    for anchored in &report.anchored {
        if let Anchored::Image {
            stage,
            ..
        } = anchored
        {
            let message = match stage {
                Some(stage) => format!("Parsing {stage} image..."),
                None => "Parsing the final image...".to_string(),
            };
            println!("{}", message.blue());
        }
        println!("\t⚓ Anchored {anchored}");
    }
}
