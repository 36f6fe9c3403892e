//! Cross-platform utilities and helpers
//!
//! - [`fs`] - Atomic file writes for generated Dockerfiles
//! - [`platform`] - Executable lookup and host architecture detection
//! - [`progress`] - Spinners for long-running lookups

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, ensure_dir};
pub use platform::{command_exists, get_docker_command, host_architecture};
pub use progress::{ProgressBar, spinner_with_message};
