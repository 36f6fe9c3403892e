//! File system helpers
//!
//! Generated Dockerfiles are written atomically: the content goes to a
//! temporary file in the destination directory which is then renamed over the
//! target, so an interrupted run never leaves a half-written Dockerfile behind.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Create `path` and all missing parents.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Write `content` to `path` atomically.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created, written, synced
/// or renamed onto `path`.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut file = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in: {}", parent.display()))?;

    file.write_all(content)
        .with_context(|| format!("Failed to write temp file for: {}", path.display()))?;
    file.as_file().sync_all().context("Failed to sync file to disk")?;

    file.persist(path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Dockerfile");

        atomic_write(&path, b"FROM alpine\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "FROM alpine\n");
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Dockerfile");
        fs::write(&path, "old").unwrap();

        atomic_write(&path, b"new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("build").join("docker").join("Dockerfile.arm64");

        atomic_write(&path, b"FROM alpine\n").unwrap();
        assert!(path.exists());
    }
}
