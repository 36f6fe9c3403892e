//! `anchor version`

use anyhow::Result;
use clap::Args;

/// Print the anchor version and the commit it was built from.
#[derive(Args, Debug, Clone, Default)]
pub struct VersionCommand {}

impl VersionCommand {
    /// # Errors
    ///
    /// Never fails; returns `Result` like every other command.
    pub fn execute(&self) -> Result<()> {
        println!("{}", version_string());
        Ok(())
    }
}

/// `version: <version> (commit <commit>)`. The commit comes from
/// `ANCHOR_COMMIT` at build time.
#[must_use]
pub fn version_string() -> String {
    format!(
        "version: {} (commit {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("ANCHOR_COMMIT").unwrap_or("unknown")
    )
}
