//! Pipeline orchestration.
//!
//! [`Verifier`] drives the stages `registry`, `repo`, `gitHead`, `checkout`,
//! `install`, `pack` and `compare` in order, recording every step in a
//! [`ProgressReport`]. A stage failure ends the run with a failed
//! [`Verification`] rather than an error. The workspace allocated for the
//! checkout is removed before `verify` returns, whichever way the run ended.

use crate::builder::{ArtifactBuilder, BuildError, BuildEvent, BuiltArtifact, InstallStep};
use crate::cancel::CancellationToken;
use crate::checkout::{Checkout, CheckoutRequest};
use crate::compare::Comparator;
use crate::config::VerifierConfig;
use crate::descriptor::PackageDescriptor;
use crate::error::Result;
use crate::exec::CommandExecutor;
use crate::http::HttpClient;
use crate::manifest::ManifestDiff;
use crate::progress::{Change, ProgressError, ProgressReport, StageKey, StageStatus, Transition};
use crate::registry::{
    RegistryError, RegistryMetadata, RegistryResolver, commit_hash, source_repository,
};
use crate::workspace::{Workspace, WorkspaceAllocator};
use camino::Utf8Path;
use log::{debug, warn};
use serde::Serialize;
use std::fmt;

/// Outcome of one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    /// `true` when the rebuilt manifest matches the published one.
    pub passed: bool,
    /// Final state of every stage.
    pub report: ProgressReport,
    /// Registry metadata, once the registry and repo stages passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RegistryMetadata>,
    /// Manifest differences, once the comparison ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<ManifestDiff>,
}

/// Verifies packages using injected process, HTTP and workspace capabilities.
///
/// # Examples
///
/// ```no_run
/// use provenance_verifier::cancel::CancellationToken;
/// use provenance_verifier::config::VerifierConfig;
/// use provenance_verifier::exec::SystemCommandExecutor;
/// use provenance_verifier::http::UreqHttpClient;
/// use provenance_verifier::verifier::Verifier;
/// use provenance_verifier::workspace::TempDirAllocator;
///
/// let config = VerifierConfig::default();
/// let allocator = TempDirAllocator::default();
/// let verifier = Verifier::new(&SystemCommandExecutor, &UreqHttpClient, &allocator, &config);
/// let verification = verifier.verify_str("left-pad@1.3.0", &CancellationToken::new())?;
/// assert!(verification.passed);
/// # Ok::<(), provenance_verifier::error::VerifierError>(())
/// ```
pub struct Verifier<'a> {
    executor: &'a dyn CommandExecutor,
    http: &'a dyn HttpClient,
    allocator: &'a dyn WorkspaceAllocator,
    config: &'a VerifierConfig,
}

impl<'a> Verifier<'a> {
    /// Create a verifier.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        http: &'a dyn HttpClient,
        allocator: &'a dyn WorkspaceAllocator,
        config: &'a VerifierConfig,
    ) -> Self {
        Self {
            executor,
            http,
            allocator,
            config,
        }
    }

    /// Parse `descriptor` and verify the package it names.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::VerifierError::Descriptor`] before any stage
    /// runs when the descriptor is malformed, and the errors of
    /// [`Self::verify`] otherwise.
    pub fn verify_str(&self, descriptor: &str, cancel: &CancellationToken) -> Result<Verification> {
        let descriptor = PackageDescriptor::parse(descriptor)?;
        self.verify(&descriptor, cancel)
    }

    /// Verify the package named by `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::VerifierError::Progress`] when the pipeline
    /// attempts an illegal stage update. Stage failures are reported through
    /// [`Verification::passed`] instead.
    pub fn verify(
        &self,
        descriptor: &PackageDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Verification> {
        self.verify_observed(descriptor, cancel, &mut |_| {})
    }

    /// Verify `descriptor`, passing every stage transition to `observer`.
    ///
    /// # Errors
    ///
    /// See [`Self::verify`].
    pub fn verify_observed(
        &self,
        descriptor: &PackageDescriptor,
        cancel: &CancellationToken,
        observer: &mut dyn FnMut(&Transition),
    ) -> Result<Verification> {
        debug!("verifying {descriptor}");
        let mut run = Run {
            verifier: self,
            cancel,
            observer,
            report: ProgressReport::new(),
            metadata: None,
            diff: None,
        };

        match run.execute(descriptor) {
            Ok(()) | Err(Interrupt::Halted) => {}
            Err(Interrupt::Internal(e)) => return Err(e.into()),
        }

        let passed = !run.report.has_failed()
            && run.report.stage(StageKey::Compare).status == StageStatus::Pass;
        Ok(Verification {
            passed,
            report: run.report,
            metadata: run.metadata,
            diff: run.diff,
        })
    }
}

impl fmt::Debug for Verifier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

/// Why the pipeline stopped early.
enum Interrupt {
    /// A stage failed and was recorded.
    Halted,
    /// The progress model rejected an update.
    Internal(ProgressError),
}

impl From<ProgressError> for Interrupt {
    fn from(error: ProgressError) -> Self {
        Self::Internal(error)
    }
}

type Step<T> = std::result::Result<T, Interrupt>;

/// State of one `verify` call.
struct Run<'v, 'o> {
    verifier: &'v Verifier<'v>,
    cancel: &'v CancellationToken,
    observer: &'o mut dyn FnMut(&Transition),
    report: ProgressReport,
    metadata: Option<RegistryMetadata>,
    diff: Option<ManifestDiff>,
}

impl Run<'_, '_> {
    fn execute(&mut self, descriptor: &PackageDescriptor) -> Step<()> {
        let metadata = self.resolve(descriptor)?;
        self.metadata = Some(metadata.clone());

        self.apply(StageKey::Checkout, Change::Start)?;
        let mut workspace = match self.verifier.allocator.allocate() {
            Ok(workspace) => workspace,
            Err(e) => {
                let message = format!("could not allocate workspace: {e}");
                return Err(self.fail(StageKey::Checkout, message));
            }
        };

        let outcome = self.in_workspace(&workspace, &metadata);
        release(&mut workspace);
        outcome
    }

    /// Run the `registry`, `repo` and `gitHead` stages.
    fn resolve(&mut self, descriptor: &PackageDescriptor) -> Step<RegistryMetadata> {
        let verifier = self.verifier;
        let cancel = self.cancel;
        let resolver = RegistryResolver::new(verifier.http, &verifier.config.registry_url);

        self.apply(StageKey::Registry, Change::Start)?;
        let published = self.require_registry(resolver.locate(descriptor, cancel))?;
        self.apply(StageKey::Registry, Change::Pass(Some(published.to_string())))?;

        self.apply(StageKey::Repo, Change::Start)?;
        let repo_url = self.require_registry(source_repository(&published.record))?;
        self.apply(StageKey::Repo, Change::Pass(Some(repo_url.clone())))?;

        self.apply(StageKey::GitHead, Change::Start)?;
        let git_head = match commit_hash(&published.record) {
            Ok(hash) => {
                self.apply(StageKey::GitHead, Change::Pass(Some(hash.short().to_owned())))?;
                Some(hash)
            }
            Err(issue) => {
                warn!("{published}: {issue}");
                self.apply(StageKey::GitHead, Change::Warn(issue.to_string()))?;
                None
            }
        };

        Ok(published.into_metadata(repo_url, git_head))
    }

    /// Run the `checkout`, `install`, `pack` and `compare` stages.
    fn in_workspace(&mut self, workspace: &Workspace, metadata: &RegistryMetadata) -> Step<()> {
        let verifier = self.verifier;
        let cancel = self.cancel;
        let path = workspace.path();
        let request = CheckoutRequest {
            repo_url: &metadata.repo_url,
            commit: metadata.git_head.as_ref(),
            version: &metadata.resolved_version,
        };
        let checkout = Checkout::new(verifier.executor, &verifier.config.git_program, cancel);
        let fetched = self.require(StageKey::Checkout, checkout.run(path, &request))?;
        self.apply(StageKey::Checkout, Change::Pass(Some(format!("fetched {fetched}"))))?;

        let artifact = self.build(path)?;

        self.apply(StageKey::Compare, Change::Start)?;
        let diff = self.require(
            StageKey::Compare,
            Comparator::new(verifier.http, cancel).compare(&artifact.path, &metadata.tarball_uri),
        )?;
        let change = if diff.is_empty() {
            Change::Pass(Some("manifests match".to_owned()))
        } else {
            Change::Fail(diff.summary())
        };
        self.diff = Some(diff);
        self.apply(StageKey::Compare, change)?;
        if self.report.has_failed() {
            return Err(Interrupt::Halted);
        }
        Ok(())
    }

    /// Run the `install` and `pack` stages.
    fn build(&mut self, workspace: &Utf8Path) -> Step<BuiltArtifact> {
        let verifier = self.verifier;
        let cancel = self.cancel;
        self.apply(StageKey::Pack, Change::Start)?;

        let mut rejected: Option<ProgressError> = None;
        let result = ArtifactBuilder::new(verifier.executor, verifier.config, cancel).build(
            workspace,
            &mut |event| {
                if rejected.is_none() {
                    rejected = self.on_build_event(event).err();
                }
            },
        );
        if let Some(e) = rejected {
            return Err(Interrupt::Internal(e));
        }

        match result {
            Ok(artifact) => {
                if artifact.install == InstallStep::Skipped {
                    let skipped = Change::Skip("direct pack succeeded".to_owned());
                    self.apply(StageKey::Install, skipped)?;
                }
                let name = artifact.path.file_name().unwrap_or(artifact.path.as_str()).to_owned();
                self.apply(StageKey::Pack, Change::Pass(Some(name)))?;
                Ok(artifact)
            }
            Err(e @ BuildError::InstallFailed { .. }) => {
                Err(self.fail(StageKey::Install, e.to_string()))
            }
            Err(e) => Err(self.fail(StageKey::Pack, e.to_string())),
        }
    }

    fn on_build_event(&mut self, event: BuildEvent) -> std::result::Result<(), ProgressError> {
        match event {
            BuildEvent::DirectPackFailed { reason } => {
                let first_line = reason.lines().next().unwrap_or_default();
                let message =
                    format!("direct pack failed ({first_line}); installing dependencies");
                self.apply(StageKey::Pack, Change::Defer(message))
            }
            BuildEvent::InstallStarted { command } => {
                self.apply(StageKey::Install, Change::Start)?;
                self.apply(StageKey::Install, Change::Note(format!("running {command}")))
            }
            BuildEvent::InstallFinished { command } => {
                self.apply(StageKey::Install, Change::Pass(Some(command)))?;
                self.apply(StageKey::Pack, Change::Start)
            }
        }
    }

    /// Return the value of `result`, failing `key` with its error otherwise.
    fn require<T, E: fmt::Display>(
        &mut self,
        key: StageKey,
        result: std::result::Result<T,
        E>,
    ) -> Step<T> {
        result.map_err(|e| self.fail(key, e.to_string()))
    }

    /// Like [`Self::require`], failing the stage the registry error names.
    fn require_registry<T>(&mut self, result: std::result::Result<T, RegistryError>) -> Step<T> {
        result.map_err(|e| self.fail(e.stage(), e.to_string()))
    }

    fn fail(&mut self, key: StageKey, message: String) -> Interrupt {
        match self.apply(key, Change::Fail(message)) {
            Ok(()) => Interrupt::Halted,
            Err(e) => Interrupt::Internal(e),
        }
    }

    fn apply(&mut self, key: StageKey, change: Change) -> std::result::Result<(), ProgressError> {
        let transition = self.report.apply(key, change)?;
        debug!("{key}: {} -> {}", transition.from, transition.to);
        (self.observer)(transition);
        Ok(())
    }
}

fn release(workspace: &mut Workspace) {
    if let Err(e) = workspace.cleanup() {
        warn!("could not remove workspace {}: {e}", workspace.path());
    }
}
