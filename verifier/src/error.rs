//! Error types for the provenance verifier.
//!
//! Stage failures are not errors: they are recorded in the progress report
//! and yield a failed verification. [`VerifierError`] covers everything that
//! prevents a report from being produced or delivered.

use crate::config::ConfigError;
use crate::descriptor::DescriptorError;
use crate::progress::ProgressError;
use thiserror::Error;

/// Errors that stop a verification from producing a usable report.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// The package descriptor is malformed.
    #[error("invalid package descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The orchestrator attempted an illegal stage update.
    #[error("internal error: {0}")]
    Progress(#[from] ProgressError),

    /// The report could not be serialised.
    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using [`VerifierError`].
pub type Result<T> = std::result::Result<T, VerifierError>;
