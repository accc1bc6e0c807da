//! Artifact rebuild with dependency-install fallback.
//!
//! The distributable tarball is first packed straight from the checked-out
//! tree. Packages whose pack step needs installed dependencies fail that
//! attempt, so the builder installs dependencies with a clean, lockfile
//! respecting installer and packs again. The installer depends on the
//! package tool's version: releases below the configured threshold lack
//! `npm ci` and use the standalone legacy installer instead.

use crate::cancel::CancellationToken;
use crate::config::VerifierConfig;
use crate::exec::{CommandExecutor, ExecError, render_command, run_checked};
use crate::fallback::{Strategy, first_success_observed};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use semver::Version;
use std::cell::RefCell;
use std::fmt;
use thiserror::Error;

/// Name of the strategy that packs without installing.
pub const DIRECT_PACK: &str = "direct-pack";

/// Name of the strategy that installs dependencies before packing.
pub const INSTALL_THEN_PACK: &str = "install-then-pack";

/// Dependency installer flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installer {
    /// The standalone legacy installer binary.
    Legacy,
    /// The package tool's own clean install command.
    CleanInstall,
}

impl Installer {
    /// Choose the installer for the package tool version `raw`.
    ///
    /// Versions below `threshold` select [`Installer::Legacy`]. Versions at
    /// or above it, and versions that cannot be parsed, select
    /// [`Installer::CleanInstall`].
    ///
    /// # Examples
    ///
    /// ```
    /// use provenance_verifier::builder::Installer;
    /// use semver::Version;
    ///
    /// let threshold = Version::new(5, 7, 0);
    /// assert_eq!(Installer::for_tool_version("5.6.0", &threshold), Installer::Legacy);
    /// assert_eq!(Installer::for_tool_version("5.7.0\n", &threshold), Installer::CleanInstall);
    /// ```
    #[must_use]
    pub fn for_tool_version(raw: &str, threshold: &Version) -> Self {
        let trimmed = raw.trim();
        match Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)) {
            Ok(version) if version < *threshold => Self::Legacy,
            Ok(_) => Self::CleanInstall,
            Err(e) => {
                warn!("cannot parse package tool version '{trimmed}' ({e}); using clean install");
                Self::CleanInstall
            }
        }
    }

    fn command(self, config: &VerifierConfig) -> (&str, &'static [&'static str]) {
        match self {
            Self::Legacy => (config.legacy_installer.as_str(), &[]),
            Self::CleanInstall => (config.package_tool.as_str(), &["ci"]),
        }
    }
}

/// Progress reported while building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// Packing straight from the tree failed; dependencies will be installed.
    DirectPackFailed {
        /// Why the direct pack failed.
        reason: String,
    },
    /// The dependency install is starting.
    InstallStarted {
        /// Rendered installer command line.
        command: String,
    },
    /// The dependency install succeeded and packing is being retried.
    InstallFinished {
        /// Rendered installer command line.
        command: String,
    },
}

/// Whether dependencies were installed before the successful pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStep {
    /// The direct pack succeeded.
    Skipped,
    /// The given installer command ran.
    Ran {
        /// Rendered installer command line.
        command: String,
    },
}

/// A locally produced tarball.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltArtifact {
    /// Absolute path of the tarball.
    pub path: Utf8PathBuf,
    /// How dependencies were handled.
    pub install: InstallStep,
}

/// Errors from rebuilding the artifact.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The dependency installer failed.
    #[error("dependency install failed: {source}")]
    InstallFailed {
        /// Rendered installer command line.
        command: String,
        /// Underlying failure.
        #[source]
        source: ExecError,
    },

    /// Packing failed.
    #[error("pack failed: {0}")]
    PackFailed(#[source] ExecError),

    /// The pack command printed no artifact name.
    #[error("pack reported no artifact")]
    NoArtifact,

    /// The pack command named a file that does not exist.
    #[error("pack reported {path}, which does not exist")]
    MissingArtifact {
        /// The reported path, resolved against the workspace.
        path: Utf8PathBuf,
    },
}

/// Rebuilds the distributable tarball in a workspace.
pub struct ArtifactBuilder<'a> {
    executor: &'a dyn CommandExecutor,
    config: &'a VerifierConfig,
    cancel: &'a CancellationToken,
}

impl<'a> ArtifactBuilder<'a> {
    /// Create a builder using the tools named in `config`.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        config: &'a VerifierConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            executor,
            config,
            cancel,
        }
    }

    /// Produce the artifact, installing dependencies if a direct pack fails.
    ///
    /// `observer` receives [`BuildEvent`]s as the fallback unfolds.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InstallFailed`] when the installer fails and the
    /// pack error of the retry otherwise.
    pub fn build(
        &self,
        workspace: &Utf8Path,
        observer: &mut dyn FnMut(BuildEvent),
    ) -> Result<BuiltArtifact, BuildError> {
        let observer = RefCell::new(observer);
        let notify = |event: BuildEvent| {
            let mut callback = observer.borrow_mut();
            (*callback)(event);
        };

        let strategies = vec![
            Strategy::new(DIRECT_PACK, || {
                self.pack(workspace).map(|path| BuiltArtifact {
                    path,
                    install: InstallStep::Skipped,
                })
            }),
            Strategy::new(INSTALL_THEN_PACK, || {
                let command = self.install(workspace, &notify)?;
                notify(BuildEvent::InstallFinished {
                    command: command.clone(),
                });
                self.pack(workspace).map(|path| BuiltArtifact {
                    path,
                    install: InstallStep::Ran { command },
                })
            }),
        ];

        let outcome = first_success_observed(strategies, |attempt| {
            debug!("{} failed: {}", attempt.name, attempt.error);
            if attempt.name == DIRECT_PACK {
                notify(BuildEvent::DirectPackFailed {
                    reason: attempt.error.to_string(),
                });
            }
        });
        match outcome {
            Ok(success) => Ok(success.value),
            Err(exhausted) => Err(exhausted
                .attempts
                .into_iter()
                .last()
                .map_or(BuildError::NoArtifact, |attempt| attempt.error)),
        }
    }

    fn install(
        &self,
        workspace: &Utf8Path,
        notify: &dyn Fn(BuildEvent),
    ) -> Result<String, BuildError> {
        let installer = self.select_installer(workspace);
        let (program, args) = installer.command(self.config);
        let command = render_command(program, args);
        notify(BuildEvent::InstallStarted {
            command: command.clone(),
        });
        match run_checked(self.executor, program, args, workspace, self.cancel) {
            Ok(_) => Ok(command),
            Err(source) => Err(BuildError::InstallFailed { command, source }),
        }
    }

    fn select_installer(&self, workspace: &Utf8Path) -> Installer {
        let tool = self.config.package_tool.as_str();
        match run_checked(self.executor, tool, &["--version"], workspace, self.cancel) {
            Ok(raw) => Installer::for_tool_version(&raw, &self.config.clean_install_threshold),
            Err(e) => {
                warn!("cannot determine {tool} version ({e}); using clean install");
                Installer::CleanInstall
            }
        }
    }

    fn pack(&self, workspace: &Utf8Path) -> Result<Utf8PathBuf, BuildError> {
        let stdout = run_checked(
            self.executor,
            &self.config.package_tool,
            &["pack"],
            workspace,
            self.cancel,
        )
        .map_err(BuildError::PackFailed)?;
        let path = artifact_path(workspace, &stdout).ok_or(BuildError::NoArtifact)?;
        if !path.is_file() {
            return Err(BuildError::MissingArtifact { path });
        }
        debug!("packed {path}");
        Ok(path)
    }
}

impl fmt::Debug for ArtifactBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactBuilder")
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

/// Resolve the artifact named by the last non-empty line of pack output.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use provenance_verifier::builder::artifact_path;
///
/// let output = "npm notice package: widget@1.0.0\nwidget-1.0.0.tgz\n\n";
/// assert_eq!(
///     artifact_path(Utf8Path::new("/work"), output).as_deref(),
///     Some(Utf8Path::new("/work/widget-1.0.0.tgz"))
/// );
/// ```
#[must_use]
pub fn artifact_path(workspace: &Utf8Path, output: &str) -> Option<Utf8PathBuf> {
    output
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(|name| workspace.join(name))
}
