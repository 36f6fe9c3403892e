//! Platform-specific helpers
//!
//! Locating executables and mapping the host CPU onto the architecture names
//! used by Debian and Docker (`amd64`, `arm64`).

use anyhow::Result;
use std::path::PathBuf;

use crate::core::AnchorError;

#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Name of the docker executable for this platform.
#[must_use]
pub const fn get_docker_command() -> &'static str {
    if is_windows() {
        "docker.exe"
    } else {
        "docker"
    }
}

/// Whether `cmd` can be found on `PATH`.
#[must_use]
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// The user's home directory.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))
}

/// Map a Rust target architecture name onto the Debian/Docker name.
///
/// # Errors
///
/// Returns [`AnchorError::UnsupportedArchitecture`] for anything other than
/// x86-64 and 64-bit ARM.
pub fn debian_architecture(rust_arch: &str) -> Result<&'static str, AnchorError> {
    match rust_arch {
        "x86_64" => Ok("amd64"),
        "aarch64" => Ok("arm64"),
        other => Err(AnchorError::UnsupportedArchitecture {
            architecture: other.to_string(),
        }),
    }
}

/// Debian architecture names apt understands.
pub const DEBIAN_ARCHITECTURES: &[&str] =
    &["amd64", "arm64", "armel", "armhf", "i386", "mips64el", "ppc64el", "riscv64", "s390x"];

/// Check that `architecture` is a Debian architecture name.
///
/// # Errors
///
/// Returns [`AnchorError::UnsupportedArchitecture`] otherwise.
pub fn validate_architecture(architecture: &str) -> Result<(), AnchorError> {
    if DEBIAN_ARCHITECTURES.contains(&architecture) {
        Ok(())
    } else {
        Err(AnchorError::UnsupportedArchitecture {
            architecture: architecture.to_string(),
        })
    }
}

/// Debian architecture name of the machine running anchor.
///
/// # Errors
///
/// Returns [`AnchorError::UnsupportedArchitecture`] on unsupported hosts.
pub fn host_architecture() -> Result<&'static str, AnchorError> {
    debian_architecture(std::env::consts::ARCH)
}
