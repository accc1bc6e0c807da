//! Tarball manifests and manifest diffs.
//!
//! A [`Manifest`] maps each regular file in a packaged artifact to the
//! SHA-256 digest of its contents. Two manifests are compared by path into a
//! [`ManifestDiff`].
//!
//! # Sub-modules
//!
//! - `digest` - SHA-256 content fingerprints (`Sha256Digest`).
//! - `extraction` - Reading manifests out of `.tgz` archives.

mod digest;
mod extraction;

pub use digest::Sha256Digest;
pub use extraction::{ManifestError, read_tarball, read_tarball_file};

use serde::Serialize;
use std::collections::BTreeMap;

/// Files of a packaged artifact keyed by normalised relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    files: BTreeMap<String, Sha256Digest>,
}

impl Manifest {
    /// Create an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` with `digest`, replacing any earlier entry.
    pub fn insert(&mut self, path: impl Into<String>, digest: Sha256Digest) {
        self.files.insert(path.into(), digest);
    }

    /// Return the digest recorded for `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Sha256Digest> {
        self.files.get(path)
    }

    /// Return the number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Return `true` when the manifest has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Compare this manifest (the local build) against `published`.
    ///
    /// # Examples
    ///
    /// ```
    /// use provenance_verifier::manifest::{Manifest, Sha256Digest};
    ///
    /// let local: Manifest = [("index.js", b"a".as_slice()), ("extra.js", b"b")]
    ///     .into_iter()
    ///     .map(|(path, data)| (path.to_owned(), Sha256Digest::of_bytes(data)))
    ///     .collect();
    /// let published: Manifest = [("index.js", b"a".as_slice())]
    ///     .into_iter()
    ///     .map(|(path, data)| (path.to_owned(), Sha256Digest::of_bytes(data)))
    ///     .collect();
    ///
    /// let diff = local.diff(&published);
    /// assert_eq!(diff.added, ["extra.js"]);
    /// assert_eq!(diff.summary(), "1 added, 0 removed, 0 modified");
    /// ```
    #[must_use]
    pub fn diff(&self, published: &Self) -> ManifestDiff {
        let mut diff = ManifestDiff::default();
        for (path, digest) in &self.files {
            match published.files.get(path) {
                None => diff.added.push(path.clone()),
                Some(other) if other != digest => diff.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        diff.removed = published
            .files
            .keys()
            .filter(|path| !self.files.contains_key(*path))
            .cloned()
            .collect();
        diff
    }
}

impl FromIterator<(String, Sha256Digest)> for Manifest {
    /// Later entries replace earlier ones with the same path.
    fn from_iter<I: IntoIterator<Item = (String, Sha256Digest)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// Path-level differences between a local and a published manifest.
///
/// Every list is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestDiff {
    /// Paths only in the local build.
    pub added: Vec<String>,
    /// Paths only in the published tarball.
    pub removed: Vec<String>,
    /// Paths in both whose contents differ.
    pub modified: Vec<String>,
}

impl ManifestDiff {
    /// Return `true` when the manifests match.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Return the count summary, e.g. `2 added, 0 removed, 1 modified`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} added, {} removed, {} modified",
            self.added.len(),
            self.removed.len(),
            self.modified.len()
        )
    }
}
