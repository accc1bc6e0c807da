//! Manifest comparison between the rebuilt and the published tarball.
//!
//! The local manifest is read on a scoped worker thread while the published
//! tarball is downloaded and read on the calling thread. Both must finish
//! before either result is inspected.

use crate::cancel::CancellationToken;
use crate::http::{HttpClient, HttpError};
use crate::manifest::{Manifest, ManifestDiff, ManifestError, read_tarball, read_tarball_file};
use camino::Utf8Path;
use log::debug;
use std::fmt;
use std::thread;
use thiserror::Error;

/// Errors from acquiring either manifest.
#[derive(Debug, Error)]
pub enum CompareError {
    /// The rebuilt tarball could not be read.
    #[error("could not read rebuilt tarball: {0}")]
    Local(#[source] ManifestError),

    /// The published tarball could not be downloaded.
    #[error("could not download published tarball: {0}")]
    RemoteFetch(#[source] HttpError),

    /// The published tarball could not be read.
    #[error("could not read published tarball: {0}")]
    Remote(#[source] ManifestError),
}

/// Compares a rebuilt tarball against the published one.
pub struct Comparator<'a> {
    http: &'a dyn HttpClient,
    cancel: &'a CancellationToken,
}

impl<'a> Comparator<'a> {
    /// Create a comparator downloading through `http`.
    #[must_use]
    pub fn new(http: &'a dyn HttpClient, cancel: &'a CancellationToken) -> Self {
        Self { http, cancel }
    }

    /// Diff the tarball at `local` against the one served at `remote_uri`.
    ///
    /// The full diff is logged at debug level whatever its outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`CompareError`] when either manifest cannot be produced.
    /// When both fail, the local failure is reported.
    pub fn compare(
        &self,
        local: &Utf8Path,
        remote_uri: &str,
    ) -> Result<ManifestDiff, CompareError> {
        let (local_manifest, published) = thread::scope(|scope| {
            let worker = scope.spawn(|| read_tarball_file(local));
            let published = self.published_manifest(remote_uri);
            let local_manifest = match worker.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (local_manifest, published)
        });

        let local_manifest = local_manifest.map_err(CompareError::Local)?;
        let published = published?;
        debug!(
            "comparing {} rebuilt file(s) with {} published file(s)",
            local_manifest.len(),
            published.len()
        );

        let diff = local_manifest.diff(&published);
        log_diff(&diff);
        Ok(diff)
    }

    fn published_manifest(&self, remote_uri: &str) -> Result<Manifest, CompareError> {
        let body = self
            .http
            .get(remote_uri, self.cancel)
            .map_err(CompareError::RemoteFetch)?;
        read_tarball(body.as_slice()).map_err(CompareError::Remote)
    }
}

impl fmt::Debug for Comparator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparator").finish_non_exhaustive()
    }
}

fn log_diff(diff: &ManifestDiff) {
    debug!("manifest diff: {}", diff.summary());
    let lists = [
        ("added", &diff.added),
        ("removed", &diff.removed),
        ("modified", &diff.modified),
    ];
    for (label, paths) in lists {
        for path in paths {
            debug!("  {label}: {path}");
        }
    }
}
