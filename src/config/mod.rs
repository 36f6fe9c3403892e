//! Configuration management for anchor
//!
//! Anchor reads a single optional user-wide file, `~/.anchor/config.toml`
//! (see [`GlobalConfig`]). Command-line flags take precedence over it.

pub mod global;

pub use global::{CONFIG_PATH_ENV, GlobalConfig, RegistryCredentials};
