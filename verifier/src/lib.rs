//! Provenance verifier library.
//!
//! This crate checks that a package tarball published to an npm-style
//! registry can be reproduced byte-for-byte, at the file manifest level, from
//! the repository and commit recorded in the package's own registry metadata.
//! It is used by the `provenance-verify` CLI binary and can be driven
//! programmatically by injecting alternative process, HTTP, and workspace
//! capabilities.
//!
//! # Modules
//!
//! - [`builder`] - Artifact rebuild with dependency-install fallback
//! - [`cancel`] - Cancellation tokens and deadlines for external calls
//! - [`checkout`] - Shallow fetch and checkout of the source commit
//! - [`cli`] - Command-line argument definitions
//! - [`compare`] - Concurrent manifest acquisition and diffing
//! - [`config`] - Verifier configuration loading
//! - [`descriptor`] - Package descriptor parsing
//! - [`error`] - Top-level error types
//! - [`exec`] - External command execution
//! - [`fallback`] - Ordered fallback strategies
//! - [`http`] - HTTP client abstraction
//! - [`manifest`] - Tarball manifests and manifest diffs
//! - [`output`] - Human and JSON rendering of verification reports
//! - [`progress`] - Stage progress model
//! - [`registry`] - Registry metadata resolution
//! - [`verifier`] - Pipeline orchestration
//! - [`workspace`] - Ephemeral workspace allocation

pub mod builder;
pub mod cancel;
pub mod checkout;
pub mod cli;
pub mod compare;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod exec;
pub mod fallback;
pub mod http;
pub mod manifest;
pub mod output;
pub mod progress;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
pub mod verifier;
pub mod workspace;
