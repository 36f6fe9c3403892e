//! Global configuration
//!
//! User-wide settings live in `~/.anchor/config.toml`. The file is optional;
//! a missing file means defaults everywhere. anchor only reads it; keep it
//! private when it holds registry passwords.
//!
//! ```toml
//! # Architectures to anchor when --architectures is not given
//! architectures = ["amd64", "arm64"]
//!
//! # Seconds before a docker invocation is killed
//! docker_timeout = 600
//!
//! # Seconds before a registry request is abandoned
//! registry_timeout = 60
//!
//! [registries."ghcr.io"]
//! username = "octocat"
//! password = "ghp_xxxxxxxxxxxx"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::resolver::RegistryAuth;
use crate::utils::platform::get_home_dir;

/// Environment variable that overrides the configuration path.
pub const CONFIG_PATH_ENV: &str = "ANCHOR_CONFIG";

const fn default_docker_timeout() -> u64 {
    600
}

const fn default_registry_timeout() -> u64 {
    60
}

/// Credentials for one registry host.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

/// Global configuration for anchor.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Architectures used when none are given on the command line.
    #[serde(default)]
    pub architectures: Vec<String>,

    /// Timeout in seconds for each docker invocation. `0` disables it.
    #[serde(default = "default_docker_timeout")]
    pub docker_timeout: u64,

    /// Timeout in seconds for registry requests.
    #[serde(default = "default_registry_timeout")]
    pub registry_timeout: u64,

    /// Credentials keyed by registry host (e.g. `ghcr.io`, `docker.io`).
    #[serde(default)]
    pub registries: HashMap<String, RegistryCredentials>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            architectures: Vec::new(),
            docker_timeout: default_docker_timeout(),
            registry_timeout: default_registry_timeout(),
            registries: HashMap::new(),
        }
    }
}

impl GlobalConfig {
    /// Load from `path`, or from [`Self::default_path`] when `None`.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// no default location can be determined.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// this schema.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// `$ANCHOR_CONFIG` if set, else `~/.anchor/config.toml`
    /// (`%LOCALAPPDATA%\anchor\config.toml` on Windows).
    ///
    /// # Errors
    ///
    /// Returns an error if the home or local data directory is unknown.
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("anchor")
        } else {
            get_home_dir()?.join(".anchor")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Docker timeout, `None` when disabled.
    #[must_use]
    pub const fn docker_timeout(&self) -> Option<Duration> {
        match self.docker_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    #[must_use]
    pub const fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout)
    }

    /// Registry credentials in the form the digest resolver takes.
    #[must_use]
    pub fn registry_auth(&self) -> HashMap<String, RegistryAuth> {
        self.registries
            .iter()
            .map(|(host, creds)| {
                (
                    host.clone(),
                    RegistryAuth {
                        username: creds.username.clone(),
                        password: creds.password.clone(),
                    },
                )
            })
            .collect()
    }
}
