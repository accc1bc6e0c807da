//! Stage progress model.
//!
//! A [`ProgressReport`] holds one [`Stage`] per pipeline step in execution
//! order, plus an append-only log of every [`Transition`]. The report enforces
//! the allowed status changes and refuses all changes once a stage has
//! failed, so the orchestrator cannot advance a stage past `pending` after a
//! fatal error.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Identifies a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StageKey {
    /// Fetch the package document and resolve the version.
    Registry,
    /// Extract and normalise the repository URL.
    Repo,
    /// Check the recorded source commit.
    GitHead,
    /// Fetch and check out the source.
    Checkout,
    /// Install dependencies when a direct pack fails.
    Install,
    /// Produce the local artifact.
    Pack,
    /// Diff the local and published manifests.
    Compare,
}

impl StageKey {
    /// Every stage, in execution order.
    pub const ALL: [Self; 7] = [
        Self::Registry,
        Self::Repo,
        Self::GitHead,
        Self::Checkout,
        Self::Install,
        Self::Pack,
        Self::Compare,
    ];

    /// Return the stable identifier used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Repo => "repo",
            Self::GitHead => "gitHead",
            Self::Checkout => "checkout",
            Self::Install => "install",
            Self::Pack => "pack",
            Self::Compare => "compare",
        }
    }

    /// Return the human-readable stage title.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Registry => "Resolve registry metadata",
            Self::Repo => "Locate source repository",
            Self::GitHead => "Check recorded commit",
            Self::Checkout => "Check out source",
            Self::Install => "Install dependencies",
            Self::Pack => "Pack artifact",
            Self::Compare => "Compare manifests",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Not yet visited.
    Pending,
    /// Currently running.
    Working,
    /// Finished successfully.
    Pass,
    /// Finished with a fatal error.
    Fail,
    /// Finished with a non-fatal problem.
    Warn,
    /// Not needed for this run.
    Skipped,
}

impl StageStatus {
    /// Return the lowercase status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Working => "working",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Warn => "warn",
            Self::Skipped => "skipped",
        }
    }

    /// Return `true` for statuses that end a stage.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Pass | Self::Fail | Self::Warn | Self::Skipped)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pipeline stage and its current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    /// Stage identifier.
    pub key: StageKey,
    /// Human-readable title.
    pub title: &'static str,
    /// Current status.
    pub status: StageStatus,
    /// Latest diagnostic message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Stage {
    fn pending(key: StageKey) -> Self {
        Self {
            key,
            title: key.title(),
            status: StageStatus::Pending,
            message: None,
        }
    }
}

/// A recorded change to a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// Stage that changed.
    pub key: StageKey,
    /// Status before the change.
    pub from: StageStatus,
    /// Status after the change.
    pub to: StageStatus,
    /// Message attached by the change, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A requested change to a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// `pending` to `working`.
    Start,
    /// `working` to `pass`, optionally with a message.
    Pass(Option<String>),
    /// `working` to `fail`.
    Fail(String),
    /// `working` to `warn`.
    Warn(String),
    /// `pending` or `working` to `skipped`.
    Skip(String),
    /// `working` back to `pending` while another stage runs first.
    Defer(String),
    /// Replace the message of a stage that has not finished.
    Note(String),
}

impl Change {
    fn target(&self, from: StageStatus) -> Option<StageStatus> {
        use StageStatus::{Fail, Pass, Pending, Skipped, Warn, Working};
        match (self, from) {
            (Self::Start, Pending) => Some(Working),
            (Self::Pass(_), Working) => Some(Pass),
            (Self::Fail(_), Working) => Some(Fail),
            (Self::Warn(_), Working) => Some(Warn),
            (Self::Skip(_), Pending | Working) => Some(Skipped),
            (Self::Defer(_), Working) => Some(Pending),
            (Self::Note(_), Pending | Working) => Some(from),
            _ => None,
        }
    }

    fn into_message(self) -> Option<String> {
        match self {
            Self::Start | Self::Pass(None) => None,
            Self::Pass(Some(message))
            | Self::Fail(message)
            | Self::Warn(message)
            | Self::Skip(message)
            | Self::Defer(message)
            | Self::Note(message) => Some(message),
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pass(_) => "pass",
            Self::Fail(_) => "fail",
            Self::Warn(_) => "warn",
            Self::Skip(_) => "skip",
            Self::Defer(_) => "defer",
            Self::Note(_) => "note",
        }
    }
}

/// Errors raised by illegal progress updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    /// The change is not allowed from the stage's current status.
    #[error("cannot {change} stage {key} while it is {from}")]
    IllegalTransition {
        /// Stage the change targeted.
        key: StageKey,
        /// The stage's status at the time.
        from: StageStatus,
        /// Name of the rejected change.
        change: &'static str,
    },

    /// A stage has already failed, so no further changes are accepted.
    #[error("cannot update stage {key}: stage {failed} has already failed")]
    Halted {
        /// Stage the change targeted.
        key: StageKey,
        /// The stage that failed.
        failed: StageKey,
    },
}

/// Ordered stages of one verification, with their transition log.
///
/// # Examples
///
/// ```
/// use provenance_verifier::progress::{ProgressReport, StageKey, StageStatus};
///
/// let mut report = ProgressReport::new();
/// report.start(StageKey::Registry)?;
/// report.fail(StageKey::Registry, "registry unreachable")?;
///
/// assert!(report.has_failed());
/// assert!(report.start(StageKey::Repo).is_err());
/// assert_eq!(report.stage(StageKey::Repo).status, StageStatus::Pending);
/// # Ok::<(), provenance_verifier::progress::ProgressError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    stages: Vec<Stage>,
    transitions: Vec<Transition>,
    failed: Option<StageKey>,
}

impl Default for ProgressReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReport {
    /// Create a report with every stage pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: StageKey::ALL.into_iter().map(Stage::pending).collect(),
            transitions: Vec::new(),
            failed: None,
        }
    }

    /// Return the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Return the stage for `key`.
    #[must_use]
    pub fn stage(&self, key: StageKey) -> &Stage {
        &self.stages[key.index()]
    }

    /// Return every transition applied so far.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Return `true` once any stage has failed.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Return the stage that failed, if any.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&Stage> {
        self.failed.map(|key| self.stage(key))
    }

    /// Apply `change` to the stage for `key` and log the transition.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::Halted`] once any stage has failed and
    /// [`ProgressError::IllegalTransition`] when `change` is not allowed from
    /// the stage's current status.
    pub fn apply(&mut self, key: StageKey, change: Change) -> Result<&Transition, ProgressError> {
        if let Some(failed) = self.failed {
            return Err(ProgressError::Halted { key, failed });
        }
        let stage = &mut self.stages[key.index()];
        let from = stage.status;
        let to = change.target(from).ok_or(ProgressError::IllegalTransition {
            key,
            from,
            change: change.label(),
        })?;

        let message = change.into_message();
        stage.status = to;
        if message.is_some() {
            stage.message.clone_from(&message);
        }
        if to == StageStatus::Fail {
            self.failed = Some(key);
        }
        self.transitions.push(Transition {
            key,
            from,
            to,
            message,
        });
        Ok(&self.transitions[self.transitions.len() - 1])
    }

    /// Mark `key` as working.
    ///
    /// # Errors
    ///
    /// See [`Self::apply`].
    pub fn start(&mut self, key: StageKey) -> Result<&Transition, ProgressError> {
        self.apply(key, Change::Start)
    }

    /// Mark `key` as passed.
    ///
    /// # Errors
    ///
    /// See [`Self::apply`].
    pub fn pass(
        &mut self,
        key: StageKey,
        message: Option<String>,
    ) -> Result<&Transition, ProgressError> {
        self.apply(key, Change::Pass(message))
    }

    /// Mark `key` as failed with `message`.
    ///
    /// # Errors
    ///
    /// See [`Self::apply`].
    pub fn fail(
        &mut self,
        key: StageKey,
        message: impl Into<String>,
    ) -> Result<&Transition, ProgressError> {
        self.apply(key, Change::Fail(message.into()))
    }

    /// Mark `key` as passed with a warning.
    ///
    /// # Errors
    ///
    /// See [`Self::apply`].
    pub fn warn(
        &mut self,
        key: StageKey,
        message: impl Into<String>,
    ) -> Result<&Transition, ProgressError> {
        self.apply(key, Change::Warn(message.into()))
    }

    /// Mark `key` as skipped.
    ///
    /// # Errors
    ///
    /// See [`Self::apply`].
    pub fn skip(
        &mut self,
        key: StageKey,
        message: impl Into<String>,
    ) -> Result<&Transition, ProgressError> {
        self.apply(key, Change::Skip(message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn new_report_lists_every_stage_pending_in_order() {
        let report = ProgressReport::new();
        let keys: Vec<&str> = report.stages().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["registry", "repo", "gitHead", "checkout", "install", "pack", "compare"]
        );
        assert!(
            report
                .stages()
                .iter()
                .all(|s| s.status == StageStatus::Pending && s.message.is_none())
        );
        assert!(!report.has_failed());
    }

    #[test]
    fn stage_lifecycle_is_logged() {
        let mut report = ProgressReport::new();
        report.start(StageKey::Registry).expect("start");
        report
            .pass(StageKey::Registry, Some("widget@1.0.0".to_owned()))
            .expect("pass");

        let stage = report.stage(StageKey::Registry);
        assert_eq!(stage.status, StageStatus::Pass);
        assert_eq!(stage.message.as_deref(), Some("widget@1.0.0"));
        assert_eq!(
            report.transitions(),
            &[
                Transition {
                    key: StageKey::Registry,
                    from: StageStatus::Pending,
                    to: StageStatus::Working,
                    message: None,
                },
                Transition {
                    key: StageKey::Registry,
                    from: StageStatus::Working,
                    to: StageStatus::Pass,
                    message: Some("widget@1.0.0".to_owned()),
                },
            ]
        );
    }

    #[test]
    fn warn_does_not_halt() {
        let mut report = ProgressReport::new();
        report.start(StageKey::GitHead).expect("start");
        report.warn(StageKey::GitHead, "no gitHead").expect("warn");
        assert!(!report.has_failed());
        report.start(StageKey::Checkout).expect("later stages still run");
    }

    #[test]
    fn fail_halts_every_later_update() {
        let mut report = ProgressReport::new();
        report.start(StageKey::Repo).expect("start");
        report.fail(StageKey::Repo, "no repository").expect("fail");

        assert!(report.has_failed());
        assert_eq!(
            report.failed_stage().map(|s| s.key),
            Some(StageKey::Repo)
        );
        let err = report.start(StageKey::Checkout).expect_err("halted");
        assert_eq!(
            err,
            ProgressError::Halted {
                key: StageKey::Checkout,
                failed: StageKey::Repo,
            }
        );
        assert!(
            report.stages()[StageKey::Checkout.index()..]
                .iter()
                .all(|s| s.status == StageStatus::Pending)
        );
    }

    #[test]
    fn defer_returns_a_working_stage_to_pending() {
        let mut report = ProgressReport::new();
        report.start(StageKey::Pack).expect("start");
        report
            .apply(StageKey::Pack, Change::Defer("waiting for install".to_owned()))
            .expect("defer");
        let stage = report.stage(StageKey::Pack);
        assert_eq!(stage.status, StageStatus::Pending);
        assert_eq!(stage.message.as_deref(), Some("waiting for install"));
        report.start(StageKey::Pack).expect("restart");
    }

    #[test]
    fn note_keeps_status() {
        let mut report = ProgressReport::new();
        report.start(StageKey::Install).expect("start");
        report
            .apply(StageKey::Install, Change::Note("npm ci".to_owned()))
            .expect("note");
        let stage = report.stage(StageKey::Install);
        assert_eq!(stage.status, StageStatus::Working);
        assert_eq!(stage.message.as_deref(), Some("npm ci"));
    }

    #[rstest]
    #[case::pass_before_start(Change::Pass(None), StageStatus::Pending)]
    #[case::fail_before_start(Change::Fail("x".to_owned()), StageStatus::Pending)]
    #[case::warn_before_start(Change::Warn("x".to_owned()), StageStatus::Pending)]
    #[case::restart_finished(Change::Start, StageStatus::Pass)]
    #[case::skip_finished(Change::Skip("x".to_owned()), StageStatus::Pass)]
    #[case::note_finished(Change::Note("x".to_owned()), StageStatus::Pass)]
    fn illegal_changes_are_rejected(#[case] change: Change, #[case] from: StageStatus) {
        let mut report = ProgressReport::new();
        if from == StageStatus::Pass {
            report.start(StageKey::Compare).expect("start");
            report.pass(StageKey::Compare, None).expect("pass");
        }
        let err = report
            .apply(StageKey::Compare, change)
            .expect_err("illegal change");
        assert!(matches!(err, ProgressError::IllegalTransition { from: f, .. } if f == from));
        assert!(!report.has_failed());
    }

    #[test]
    fn report_serialises_stage_keys_and_statuses() {
        let mut report = ProgressReport::new();
        report.start(StageKey::GitHead).expect("start");
        report.warn(StageKey::GitHead, "missing").expect("warn");

        let json = serde_json::to_value(&report).expect("serialise");
        assert_eq!(json["stages"][2]["key"], "gitHead");
        assert_eq!(json["stages"][2]["status"], "warn");
        assert_eq!(json["stages"][2]["message"], "missing");
        assert!(json["stages"][0].get("message").is_none());
        assert!(json["failed"].is_null());
    }

    #[test]
    fn report_serialises_the_transition_log() {
        let mut report = ProgressReport::new();
        report.start(StageKey::Registry).expect("start");
        report
            .pass(StageKey::Registry, Some("widget@1.0.0".to_owned()))
            .expect("pass");

        let json = serde_json::to_value(&report).expect("serialise");
        assert_eq!(
            json["transitions"],
            serde_json::json!([
                { "key": "registry", "from": "pending", "to": "working" },
                { "key": "registry", "from": "working", "to": "pass", "message": "widget@1.0.0" },
            ])
        );
    }
}
