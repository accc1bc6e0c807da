//! Output formatting for the verifier CLI.
//!
//! Reports are rendered either as an aligned table followed by the verdict,
//! or as a JSON document for scripting.

use crate::progress::{Stage, StageStatus, Transition};
use crate::verifier::Verification;
use std::fmt::Write as _;
use std::io::Write;

/// Width of the status column in human output.
const STATUS_WIDTH: usize = 7;

/// Width of the stage title column in human output.
const TITLE_WIDTH: usize = 26;

/// Render one live progress line for `transition`.
///
/// # Example
///
/// ```
/// use provenance_verifier::output::render_transition;
/// use provenance_verifier::progress::{StageKey, StageStatus, Transition};
///
/// let line = render_transition(&Transition {
///     key: StageKey::Checkout,
///     from: StageStatus::Working,
///     to: StageStatus::Pass,
///     message: Some("fetched 0123456".to_owned()),
/// });
/// assert_eq!(line, "[pass] Check out source: fetched 0123456");
/// ```
#[must_use]
pub fn render_transition(transition: &Transition) -> String {
    let title = transition.key.title();
    match &transition.message {
        Some(message) => format!("[{}] {title}: {message}", transition.to),
        None => format!("[{}] {title}", transition.to),
    }
}

/// Render the full report and verdict for a terminal.
#[must_use]
pub fn render_human(descriptor: &str, verification: &Verification) -> String {
    let mut out = String::new();
    for stage in verification.report.stages() {
        push_stage_line(&mut out, stage);
    }

    if let Some(diff) = verification.diff.as_ref().filter(|diff| !diff.is_empty()) {
        out.push('\n');
        let lists = [
            ('+', &diff.added),
            ('-', &diff.removed),
            ('~', &diff.modified),
        ];
        for (marker, paths) in lists {
            for path in paths {
                let _ = writeln!(out, "  {marker} {path}");
            }
        }
    }

    out.push('\n');
    out.push_str(&verdict(descriptor, verification));
    out
}

fn push_stage_line(out: &mut String, stage: &Stage) {
    let status = status_label(stage.status);
    let _ = match &stage.message {
        Some(message) => writeln!(
            out,
            "{status:<STATUS_WIDTH$} {:<TITLE_WIDTH$} {message}",
            stage.title
        ),
        None => writeln!(out, "{status:<STATUS_WIDTH$} {}", stage.title),
    };
}

const fn status_label(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "-",
        StageStatus::Working => "...",
        StageStatus::Pass => "ok",
        StageStatus::Fail => "FAIL",
        StageStatus::Warn => "warn",
        StageStatus::Skipped => "skip",
    }
}

fn verdict(descriptor: &str, verification: &Verification) -> String {
    let subject = verification.metadata.as_ref().map_or_else(
        || descriptor.to_owned(),
        |metadata| format!("{}@{}", metadata.name, metadata.resolved_version),
    );
    if verification.passed {
        return format!("{subject}: published tarball matches its source");
    }
    match verification.report.failed_stage() {
        Some(stage) => format!("{subject}: verification failed at '{}'", stage.key),
        None => format!("{subject}: verification incomplete"),
    }
}

/// Render the verification as pretty-printed JSON.
///
/// # Errors
///
/// Returns the serialiser's error, which does not occur for well-formed
/// reports.
pub fn render_json(verification: &Verification) -> serde_json::Result<String> {
    serde_json::to_string_pretty(verification)
}

/// Write `message` and a newline to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}
