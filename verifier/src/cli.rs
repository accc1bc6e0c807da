//! CLI argument definitions for the provenance verifier.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use camino::Utf8PathBuf;
use clap::Parser;

/// Check that a published npm package can be rebuilt from its source.
#[derive(Parser, Debug, Default)]
#[command(name = "provenance-verify")]
#[command(version, about)]
#[command(long_about = concat!(
    "Check that a published npm package can be rebuilt from its source.\n\n",
    "The package's registry metadata names the repository and commit it was ",
    "built from. The verifier checks that commit out into a temporary ",
    "workspace, packs it, and compares every file of the result with the ",
    "published tarball.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Verify the latest release:\n",
    "    $ provenance-verify left-pad\n\n",
    "  Verify a scoped package at a version range:\n",
    "    $ provenance-verify '@acme/widget@^2.1'\n\n",
    "  Emit a JSON report against a mirror:\n",
    "    $ provenance-verify --json --registry https://npm.example.org widget@1.0.0",
))]
pub struct Cli {
    /// Package to verify: [@scope/]name[@version|tag|range].
    #[arg(value_name = "DESCRIPTOR")]
    pub descriptor: String,

    /// Print the report, including every stage transition, as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Configuration file [default: platform config dir].
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Registry URL, overriding configuration and environment.
    #[arg(long, value_name = "URL")]
    pub registry: Option<String>,

    /// Abandon the verification after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Suppress live progress output (the report is still shown).
    #[arg(short, long)]
    pub quiet: bool,
}
