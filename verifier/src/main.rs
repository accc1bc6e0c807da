//! Provenance verifier CLI entrypoint.
//!
//! This binary resolves a package against its registry, rebuilds the
//! published tarball from the recorded source, and prints the stage report.
//! It exits non-zero unless the rebuilt files match the published ones.

use clap::Parser;
use provenance_verifier::cancel::CancellationToken;
use provenance_verifier::cli::Cli;
use provenance_verifier::config::{ConfigDirs, SystemConfigDirs, VerifierConfig};
use provenance_verifier::descriptor::PackageDescriptor;
use provenance_verifier::error::{Result, VerifierError};
use provenance_verifier::exec::{CommandExecutor, SystemCommandExecutor};
use provenance_verifier::http::{HttpClient, UreqHttpClient};
use provenance_verifier::output::{render_human, render_json, render_transition, write_stderr_line};
use provenance_verifier::verifier::{Verification, Verifier};
use provenance_verifier::workspace::{TempDirAllocator, WorkspaceAllocator};
use std::io::Write;
use std::time::Duration;

/// External capabilities used by one CLI run.
struct Capabilities<'a> {
    executor: &'a dyn CommandExecutor,
    http: &'a dyn HttpClient,
    allocator: &'a dyn WorkspaceAllocator,
    dirs: &'a dyn ConfigDirs,
}

fn main() {
    let cli = Cli::parse();
    let allocator = TempDirAllocator::default();
    let capabilities = Capabilities {
        executor: &SystemCommandExecutor,
        http: &UreqHttpClient,
        allocator: &allocator,
        dirs: &SystemConfigDirs,
    };
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &capabilities, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Verify the package named on the command line.
///
/// Returns whether verification passed.
fn run(
    cli: &Cli,
    capabilities: &Capabilities<'_>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<bool> {
    let descriptor = PackageDescriptor::parse(&cli.descriptor)?;
    let config = load_config(cli, capabilities.dirs)?;
    let cancel = cancellation_for(cli.timeout);
    let verifier = Verifier::new(
        capabilities.executor,
        capabilities.http,
        capabilities.allocator,
        &config,
    );

    let verification = if cli.quiet || cli.json {
        verifier.verify(&descriptor, &cancel)?
    } else {
        verifier.verify_observed(&descriptor, &cancel, &mut |transition| {
            write_stderr_line(stderr, render_transition(transition));
        })?
    };

    write_report(cli, &verification, stdout)?;
    Ok(verification.passed)
}

/// Load configuration, then apply the environment and `--registry`.
fn load_config(cli: &Cli, dirs: &dyn ConfigDirs) -> Result<VerifierConfig> {
    Ok(VerifierConfig::load(cli.config.as_deref(), dirs)?
        .with_environment()
        .with_registry(cli.registry.clone()))
}

fn cancellation_for(timeout: Option<u64>) -> CancellationToken {
    let token = CancellationToken::new();
    match timeout {
        Some(secs) => token.with_timeout(Duration::from_secs(secs)),
        None => token,
    }
}

fn write_report(cli: &Cli, verification: &Verification, stdout: &mut dyn Write) -> Result<()> {
    let text = if cli.json {
        render_json(verification)?
    } else {
        render_human(&cli.descriptor, verification)
    };
    writeln!(stdout, "{text}").map_err(|source| VerifierError::WriteFailed { source })
}

fn exit_code_for_run_result(result: Result<bool>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            write_stderr_line(stderr, err);
            1
        }
    }
}

#[cfg(test)]
mod tests;
