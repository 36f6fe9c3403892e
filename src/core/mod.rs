//! Core types shared across anchor
//!
//! Currently this is the error system: [`AnchorError`] for typed failures
//! inside the crate and [`ErrorContext`] / [`user_friendly_error`] for turning
//! them into actionable CLI output.
//!
//! # Example
//!
//! ```rust,no_run
//! use anchor_cli::core::{AnchorError, user_friendly_error};
//!
//! let error: anyhow::Error = AnchorError::DockerNotFound.into();
//! user_friendly_error(error).display();
//! ```

pub mod error;

pub use error::{AnchorError, ErrorContext, user_friendly_error};
