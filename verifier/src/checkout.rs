//! Shallow fetch and checkout of the recorded source.
//!
//! The workspace becomes a fresh git repository with the package's source as
//! `origin`. A single commit is then fetched at depth one, trying the
//! recorded commit when one is known and the release tags otherwise, and
//! checked out as a detached head. Every command runs with the workspace as
//! its explicit working directory.

use crate::cancel::CancellationToken;
use crate::exec::{CommandExecutor, ExecError, run_checked};
use crate::fallback::{Exhausted, Strategy, first_success};
use crate::registry::CommitHash;
use camino::Utf8Path;
use log::debug;
use std::fmt;
use thiserror::Error;

/// Name of the remote the source is fetched from.
const REMOTE: &str = "origin";

/// A single fetch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRef {
    /// A recorded commit.
    Commit(CommitHash),
    /// A release tag name.
    Tag(String),
}

impl FetchRef {
    /// Return the refspec passed to `git fetch`.
    #[must_use]
    pub fn refspec(&self) -> String {
        match self {
            Self::Commit(hash) => hash.as_str().to_owned(),
            Self::Tag(tag) => format!("tags/{tag}"),
        }
    }
}

impl fmt::Display for FetchRef {
    /// Commits are shown abbreviated; tags as their refspec.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit(hash) => f.write_str(hash.short()),
            Self::Tag(_) => f.write_str(&self.refspec()),
        }
    }
}

/// Return the fetch targets to try, in order.
///
/// A known commit is the only target; the release tags are not consulted
/// because they may point elsewhere. Without a commit, `v<version>` is tried
/// before `<version>`.
///
/// # Examples
///
/// ```
/// use provenance_verifier::checkout::fetch_plan;
///
/// let plan: Vec<String> = fetch_plan(None, "1.0.0").iter().map(ToString::to_string).collect();
/// assert_eq!(plan, ["tags/v1.0.0", "tags/1.0.0"]);
/// ```
#[must_use]
pub fn fetch_plan(commit: Option<&CommitHash>, version: &str) -> Vec<FetchRef> {
    match commit {
        Some(hash) => vec![FetchRef::Commit(hash.clone())],
        None => vec![
            FetchRef::Tag(format!("v{version}")),
            FetchRef::Tag(version.to_owned()),
        ],
    }
}

/// What to check out.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutRequest<'a> {
    /// Canonical repository URL.
    pub repo_url: &'a str,
    /// Recorded commit, if usable.
    pub commit: Option<&'a CommitHash>,
    /// Resolved package version, used for tag lookup.
    pub version: &'a str,
}

/// Errors from checking out the source.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// `git init` failed.
    #[error("could not initialise repository: {0}")]
    Init(#[source] ExecError),

    /// `git remote add` failed.
    #[error("could not add remote {url}: {source}")]
    AddRemote {
        /// Repository URL.
        url: String,
        /// Underlying failure.
        #[source]
        source: ExecError,
    },

    /// Every fetch target failed.
    #[error("could not fetch {} from {url}: {reason}", .attempted.join(" or "))]
    FetchExhausted {
        /// Repository URL.
        url: String,
        /// Every target tried, as displayed by [`FetchRef`].
        attempted: Vec<String>,
        /// Failure of the last attempt.
        reason: String,
    },

    /// `git checkout FETCH_HEAD` failed.
    #[error("could not check out fetched revision: {0}")]
    Checkout(#[source] ExecError),
}

/// Checks out package sources into a workspace.
pub struct Checkout<'a> {
    executor: &'a dyn CommandExecutor,
    git: &'a str,
    cancel: &'a CancellationToken,
}

impl<'a> Checkout<'a> {
    /// Create a checkout runner using the `git` program.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        git: &'a str,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            executor,
            git,
            cancel,
        }
    }

    /// Initialise `workspace`, fetch the source, and check it out.
    ///
    /// Returns the fetch target that succeeded.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckoutError`] for the first step that fails.
    pub fn run(
        &self,
        workspace: &Utf8Path,
        request: &CheckoutRequest<'_>,
    ) -> Result<FetchRef, CheckoutError> {
        self.git(workspace, &["init", "--quiet"])
            .map_err(CheckoutError::Init)?;
        self.git(workspace, &["remote", "add", REMOTE, request.repo_url])
            .map_err(|source| CheckoutError::AddRemote {
                url: request.repo_url.to_owned(),
                source,
            })?;

        let fetched = self.fetch(workspace, request)?;
        self.git(workspace, &["checkout", "--quiet", "FETCH_HEAD"])
            .map_err(CheckoutError::Checkout)?;
        debug!("checked out {fetched} from {}", request.repo_url);
        Ok(fetched)
    }

    fn fetch(
        &self,
        workspace: &Utf8Path,
        request: &CheckoutRequest<'_>,
    ) -> Result<FetchRef, CheckoutError> {
        let strategies = fetch_plan(request.commit, request.version)
            .into_iter()
            .map(|target| {
                Strategy::new(target.to_string(), move || {
                    let refspec = target.refspec();
                    self.git(workspace, &["fetch", "--depth", "1", REMOTE, &refspec])
                        .map(|()| target)
                })
            })
            .collect();

        first_success(strategies)
            .map(|success| success.value)
            .map_err(|exhausted: Exhausted<ExecError>| CheckoutError::FetchExhausted {
                url: request.repo_url.to_owned(),
                attempted: exhausted.names().into_iter().map(str::to_owned).collect(),
                reason: exhausted
                    .last()
                    .map_or_else(|| "nothing to fetch".to_owned(), |a| a.error.to_string()),
            })
    }

    fn git(&self, workspace: &Utf8Path, args: &[&str]) -> Result<(), ExecError> {
        run_checked(self.executor, self.git, args, workspace, self.cancel).map(drop)
    }
}

impl fmt::Debug for Checkout<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkout")
            .field("git", &self.git)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ExpectedCall, StubExecutor};
    use rstest::{fixture, rstest};

    const URL: &str = "https://github.com/acme/widget.git";
    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";
    const WORKSPACE: &str = "/tmp/provenance-test";

    #[fixture]
    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    fn setup_calls() -> Vec<ExpectedCall> {
        vec![
            ExpectedCall::succeeds("git", &["init", "--quiet"], ""),
            ExpectedCall::succeeds("git", &["remote", "add", "origin", URL], ""),
        ]
    }

    fn run(
        executor: &StubExecutor,
        cancel: &CancellationToken,
        commit: Option<&CommitHash>,
    ) -> Result<FetchRef, CheckoutError> {
        Checkout::new(executor, "git", cancel).run(
            Utf8Path::new(WORKSPACE),
            &CheckoutRequest {
                repo_url: URL,
                commit,
                version: "1.0.0",
            },
        )
    }

    #[rstest]
    fn known_commit_is_fetched_directly(cancel: CancellationToken) {
        let hash = CommitHash::try_from(SHA).expect("sha");
        let mut calls = setup_calls();
        calls.push(ExpectedCall::succeeds("git", &["fetch", "--depth", "1", "origin", SHA], ""));
        calls.push(ExpectedCall::succeeds("git", &["checkout", "--quiet", "FETCH_HEAD"], ""));
        let executor = StubExecutor::new(calls);

        let fetched = run(&executor, &cancel, Some(&hash)).expect("checkout");

        assert_eq!(fetched, FetchRef::Commit(hash));
        executor.assert_finished();
        assert_eq!(executor.working_dirs(), vec![Utf8Path::new(WORKSPACE).to_owned()]);
    }

    #[rstest]
    fn unprefixed_tag_is_tried_after_v_tag(cancel: CancellationToken) {
        let mut calls = setup_calls();
        calls.push(ExpectedCall::fails(
            "git",
            &["fetch", "--depth", "1", "origin", "tags/v1.0.0"],
            "fatal: couldn't find remote ref tags/v1.0.0",
        ));
        calls.push(ExpectedCall::succeeds(
            "git",
            &["fetch", "--depth", "1", "origin", "tags/1.0.0"],
            "",
        ));
        calls.push(ExpectedCall::succeeds("git", &["checkout", "--quiet", "FETCH_HEAD"], ""));
        let executor = StubExecutor::new(calls);

        let fetched = run(&executor, &cancel, None).expect("checkout");

        assert_eq!(fetched, FetchRef::Tag("1.0.0".to_owned()));
        executor.assert_finished();
    }

    #[rstest]
    fn exhausted_tags_are_both_named(cancel: CancellationToken) {
        let mut calls = setup_calls();
        for tag in ["tags/v1.0.0", "tags/1.0.0"] {
            calls.push(ExpectedCall::fails(
                "git",
                &["fetch", "--depth", "1", "origin", tag],
                "fatal: couldn't find remote ref",
            ));
        }
        let executor = StubExecutor::new(calls);

        let err = run(&executor, &cancel, None).expect_err("no tags");

        let message = err.to_string();
        assert!(message.contains("tags/v1.0.0"), "{message}");
        assert!(message.contains("tags/1.0.0"), "{message}");
        assert!(matches!(
            err,
            CheckoutError::FetchExhausted { ref attempted, .. } if attempted.len() == 2
        ));
        executor.assert_finished();
    }

    #[cfg(unix)]
    #[rstest]
    fn failed_commit_fetch_names_short_hash(cancel: CancellationToken) {
        let hash = CommitHash::try_from(SHA).expect("sha");
        let mut calls = setup_calls();
        calls.push(ExpectedCall::fails(
            "git",
            &["fetch", "--depth", "1", "origin", SHA],
            "fatal: remote error: upload-pack: not our ref",
        ));
        let executor = StubExecutor::new(calls);

        let err = run(&executor, &cancel, Some(&hash)).expect_err("commit missing");

        assert_eq!(
            err.to_string(),
            "could not fetch 0123456 from https://github.com/acme/widget.git: \
             `git fetch --depth 1 origin 0123456789abcdef0123456789abcdef01234567` failed \
             (exit status: 1): fatal: remote error: upload-pack: not our ref"
        );
        executor.assert_finished();
    }

    #[rstest]
    fn init_failure_stops_before_fetching(cancel: CancellationToken) {
        let executor = StubExecutor::new(vec![ExpectedCall::fails(
            "git",
            &["init", "--quiet"],
            "permission denied",
        )]);

        let err = run(&executor, &cancel, None).expect_err("init fails");

        assert!(matches!(err, CheckoutError::Init(_)));
        executor.assert_finished();
    }

    #[rstest]
    fn remote_failure_is_reported(cancel: CancellationToken) {
        let executor = StubExecutor::new(vec![
            ExpectedCall::succeeds("git", &["init", "--quiet"], ""),
            ExpectedCall::fails(
                "git",
                &["remote", "add", "origin", URL],
                "error: remote origin already exists.",
            ),
        ]);

        let err = run(&executor, &cancel, None).expect_err("remote fails");

        assert!(matches!(err, CheckoutError::AddRemote { .. }));
        executor.assert_finished();
    }

    #[rstest]
    fn checkout_failure_is_reported(cancel: CancellationToken) {
        let mut calls = setup_calls();
        calls.push(ExpectedCall::succeeds(
            "git",
            &["fetch", "--depth", "1", "origin", "tags/v1.0.0"],
            "",
        ));
        calls.push(ExpectedCall::fails(
            "git",
            &["checkout", "--quiet", "FETCH_HEAD"],
            "error: pathspec",
        ));
        let executor = StubExecutor::new(calls);

        let err = run(&executor, &cancel, None).expect_err("checkout fails");

        assert!(matches!(err, CheckoutError::Checkout(_)));
        executor.assert_finished();
    }

    #[test]
    fn plan_with_commit_skips_tags() {
        let hash = CommitHash::try_from(SHA).expect("sha");
        let plan = fetch_plan(Some(&hash), "1.0.0");
        assert_eq!(plan, vec![FetchRef::Commit(hash)]);
        assert_eq!(plan[0].to_string(), "0123456");
        assert_eq!(plan[0].refspec(), SHA);
    }
}
