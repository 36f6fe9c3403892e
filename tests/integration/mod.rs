//! Integration test suite for anchor
//!
//! Exercises the public API end to end with in-memory resolvers, and the
//! binary through `assert_cmd`. Nothing here needs docker or network access.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **anchoring**: multi-stage templates, directives and failure handling
//! - **cli**: argument handling of the `anchor` binary
//! - **round_trip**: byte-exact parse and serialize of untouched files

mod anchoring;
mod cli;
mod round_trip;
