//! anchor - pin Dockerfiles to image digests and exact package versions
//!
//! anchor rewrites a Dockerfile template into a reproducible Dockerfile:
//!
//! ```dockerfile
//! FROM debian:bookworm
//! RUN apt-get update && apt-get install -y curl
//! ```
//!
//! becomes, for `amd64`,
//!
//! ```dockerfile
//! FROM debian:bookworm@sha256:4f2a...
//! RUN dpkg --add-architecture amd64 && apt-get update && apt-get update && apt-get install -y curl=7.88.1-10+deb12u5
//! ```
//!
//! Everything else in the file, comments and blank lines included, is
//! written back byte for byte.
//!
//! # Modules
//!
//! - [`dockerfile`] - Format-preserving parser, `# anchor` directives, serializer
//! - [`rewrite`] - The rewrite engine ([`rewrite::Anchorer`])
//! - [`resolver`] - Digest and package version lookups behind traits
//! - [`docker`] - Docker CLI invocation with timeouts and cancellation
//! - [`cli`] - Command-line interface
//! - [`config`] - Global configuration (`~/.anchor/config.toml`)
//! - [`core`] - Error types and user-facing error rendering
//! - [`utils`] - File, platform and progress helpers
//!
//! # Directives
//!
//! ```dockerfile
//! # anchor ignore=golang:1.22-bookworm
//! FROM golang:1.22-bookworm
//!
//! # anchor ignore=curl
//! RUN apt-get install -y curl wget
//!
//! # anchor ignore
//! RUN apt-get install -y jq
//! ```
//!
//! A directive applies to the instruction it is attached to: the comment
//! lines directly above it or between its continuation lines.

pub mod cli;
pub mod config;
pub mod core;
pub mod docker;
pub mod dockerfile;
pub mod resolver;
pub mod rewrite;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
