//! Registry metadata resolution.
//!
//! Fetches a package document from an npm-style registry and extracts what
//! the rest of the pipeline needs: the resolved version, the canonical source
//! repository, the recorded commit, and the published tarball location.
//!
//! The work is split along the stages it reports to:
//! [`RegistryResolver::locate`] for `registry`, [`source_repository`] for
//! `repo`, and [`commit_hash`] for `gitHead`. [`RegistryResolver::resolve`]
//! runs all three.
//!
//! # Sub-modules
//!
//! - `commit` - Git commit hash newtype (`CommitHash`).
//! - `document` - Package document model and version resolution.
//! - `repository` - Repository declaration checks and URL normalisation.

mod commit;
mod document;
mod repository;

pub use commit::{CommitHash, CommitHashError, SHORT_LEN};
pub use document::{
    DEFAULT_TAG, Dist, DistInfo, PackageDocument, VersionRecord, dist_info, resolve_version,
    version_record,
};
pub use repository::{RepositoryError, normalize_repository_url, repository_url};

use crate::cancel::CancellationToken;
use crate::descriptor::PackageDescriptor;
use crate::http::{HttpClient, HttpError, fetch_json};
use crate::progress::StageKey;
use log::debug;
use serde::Serialize;
use thiserror::Error;

/// Default public registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Errors from registry resolution, each attributable to one stage.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The package document could not be fetched or decoded.
    #[error("failed to fetch package document: {0}")]
    Fetch(#[from] HttpError),

    /// No version was requested and the document has no `latest` tag.
    #[error("no version requested and no '{DEFAULT_TAG}' dist-tag published")]
    NoLatestTag,

    /// The requested tag, version, or range matches nothing published.
    #[error("no published version matches '{spec}'")]
    UnknownVersion {
        /// The requested version spec.
        spec: String,
    },

    /// The resolved version has no record in the document.
    #[error("version {version} has no record in the package document")]
    MissingVersionRecord {
        /// The resolved version.
        version: String,
    },

    /// The version record does not say where its tarball lives.
    #[error("version {version} has no dist.tarball")]
    MissingTarball {
        /// The resolved version.
        version: String,
    },

    /// The repository declaration is missing or unusable.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RegistryError {
    /// Return the stage this failure belongs to.
    #[must_use]
    pub const fn stage(&self) -> StageKey {
        match self {
            Self::Repository(_) => StageKey::Repo,
            _ => StageKey::Registry,
        }
    }
}

/// Why a recorded commit cannot be used.
///
/// Never fatal: the checkout falls back to tag lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitHeadIssue {
    /// The version record has no `gitHead`.
    #[error("no gitHead recorded; falling back to tag lookup")]
    Missing,

    /// The recorded `gitHead` is not a commit hash.
    #[error("recorded gitHead is unusable ({0}); falling back to tag lookup")]
    Malformed(#[source] CommitHashError),
}

/// Return the commit a version claims to have been built from.
///
/// # Errors
///
/// Returns a [`GitHeadIssue`] when the commit is absent or malformed.
pub fn commit_hash(record: &VersionRecord) -> Result<CommitHash, GitHeadIssue> {
    let raw = record
        .git_head
        .as_deref()
        .map(str::trim)
        .filter(|sha| !sha.is_empty())
        .ok_or(GitHeadIssue::Missing)?;
    CommitHash::try_from(raw).map_err(GitHeadIssue::Malformed)
}

/// Return the canonical HTTPS URL of the repository `record` was built from.
///
/// # Errors
///
/// Returns [`RegistryError::Repository`] when the declaration is missing,
/// not a git repository, or not a recognisable URL.
pub fn source_repository(record: &VersionRecord) -> Result<String, RegistryError> {
    let declared = repository_url(record.repository.as_ref())?;
    Ok(normalize_repository_url(declared)?)
}

/// A published version found in the registry.
#[derive(Debug, Clone)]
pub struct PublishedVersion {
    /// Package path under the registry, including any scope.
    pub name: String,
    /// Concrete version the descriptor resolved to.
    pub version: String,
    /// The version's record in the package document.
    pub record: VersionRecord,
    /// Where the published tarball lives.
    pub dist: DistInfo,
}

impl PublishedVersion {
    /// Combine with the `repo` and `gitHead` results into the metadata.
    #[must_use]
    pub fn into_metadata(self, repo_url: String, git_head: Option<CommitHash>) -> RegistryMetadata {
        RegistryMetadata {
            name: self.name,
            resolved_version: self.version,
            repo_url,
            git_head,
            shasum: self.dist.shasum,
            tarball_uri: self.dist.tarball,
        }
    }
}

impl std::fmt::Display for PublishedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Everything the pipeline needs from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMetadata {
    /// Package path under the registry, including any scope.
    pub name: String,
    /// Concrete version being verified.
    pub resolved_version: String,
    /// Canonical HTTPS repository URL.
    pub repo_url: String,
    /// Recorded source commit, if usable.
    pub git_head: Option<CommitHash>,
    /// SHA-1 of the published tarball, if recorded.
    pub shasum: Option<String>,
    /// Download location of the published tarball.
    pub tarball_uri: String,
}

/// Resolves package metadata against one registry.
///
/// # Examples
///
/// ```no_run
/// use provenance_verifier::cancel::CancellationToken;
/// use provenance_verifier::http::UreqHttpClient;
/// use provenance_verifier::registry::{DEFAULT_REGISTRY_URL, RegistryResolver};
///
/// let client = UreqHttpClient;
/// let resolver = RegistryResolver::new(&client, DEFAULT_REGISTRY_URL);
/// let metadata = resolver.resolve(&"left-pad@1.3.0".parse()?, &CancellationToken::new())?;
/// println!("{} from {}", metadata.resolved_version, metadata.repo_url);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RegistryResolver<'a> {
    client: &'a dyn HttpClient,
    registry_url: String,
}

impl<'a> RegistryResolver<'a> {
    /// Create a resolver for the registry rooted at `registry_url`.
    #[must_use]
    pub fn new(client: &'a dyn HttpClient, registry_url: &str) -> Self {
        Self {
            client,
            registry_url: registry_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Return the document URL for `descriptor`.
    #[must_use]
    pub fn document_url(&self, descriptor: &PackageDescriptor) -> String {
        format!("{}/{}", self.registry_url, descriptor.registry_path())
    }

    /// Fetch and decode the package document.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Fetch`] on network or decode failure.
    pub fn fetch_document(
        &self,
        descriptor: &PackageDescriptor,
        cancel: &CancellationToken,
    ) -> Result<PackageDocument, RegistryError> {
        let url = self.document_url(descriptor);
        debug!("fetching package document {url}");
        Ok(fetch_json(self.client, &url, cancel)?)
    }

    /// Find the published version `descriptor` names.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] belonging to the `registry` stage when the
    /// document cannot be fetched, no version matches, or the version has no
    /// tarball.
    pub fn locate(
        &self,
        descriptor: &PackageDescriptor,
        cancel: &CancellationToken,
    ) -> Result<PublishedVersion, RegistryError> {
        let mut document = self.fetch_document(descriptor, cancel)?;
        let version = resolve_version(&document, descriptor.version_spec())?;
        let dist = dist_info(version_record(&document, &version)?, &version)?;
        let record = document.versions.remove(&version).unwrap_or_default();
        Ok(PublishedVersion {
            name: descriptor.registry_path(),
            version,
            record,
            dist,
        })
    }

    /// Run every registry step and assemble the metadata.
    ///
    /// An unusable `gitHead` is not an error; it leaves
    /// [`RegistryMetadata::git_head`] empty.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`]; see [`RegistryError::stage`].
    pub fn resolve(
        &self,
        descriptor: &PackageDescriptor,
        cancel: &CancellationToken,
    ) -> Result<RegistryMetadata, RegistryError> {
        let published = self.locate(descriptor, cancel)?;
        let repo_url = source_repository(&published.record)?;
        let git_head = commit_hash(&published.record)
            .inspect_err(|issue| debug!("{published}: {issue}"))
            .ok();
        Ok(published.into_metadata(repo_url, git_head))
    }
}

impl std::fmt::Debug for RegistryResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryResolver")
            .field("registry_url", &self.registry_url)
            .finish_non_exhaustive()
    }
}
