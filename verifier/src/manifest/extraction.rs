//! Manifest extraction from gzip-compressed tarballs.
//!
//! Only regular file members are recorded. Member paths are normalised to a
//! relative `/`-separated key with the leading directory (`package/` in npm
//! tarballs) removed, and members that would escape the archive root are
//! rejected.

use super::{Manifest, Sha256Digest};
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Component, Path};
use thiserror::Error;

/// Errors arising from reading a tarball manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The tarball file could not be opened.
    #[error("could not open {path}: {source}")]
    Open {
        /// Path of the tarball.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The archive is corrupt or could not be read.
    #[error("could not read archive: {0}")]
    Archive(#[from] std::io::Error),

    /// A member path is absolute or contains `..`.
    #[error("archive member escapes the archive root: {path}")]
    PathTraversal {
        /// The offending member path.
        path: String,
    },

    /// A member path is not valid UTF-8.
    #[error("archive member path is not valid UTF-8: {path}")]
    NonUtf8Path {
        /// Lossy rendering of the path.
        path: String,
    },
}

/// Build a manifest from a gzip-compressed tar stream.
///
/// # Errors
///
/// Returns [`ManifestError::Archive`] for corrupt input and
/// [`ManifestError::PathTraversal`] for unsafe member paths.
///
/// # Examples
///
/// ```
/// use provenance_verifier::manifest::read_tarball;
///
/// // An empty gzip stream holds an empty archive.
/// let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
/// std::io::Write::write_all(&mut encoder, &[0u8; 1024])?;
/// let manifest = read_tarball(encoder.finish()?.as_slice())?;
/// assert!(manifest.is_empty());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn read_tarball<R: Read>(reader: R) -> Result<Manifest, ManifestError> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut manifest = Manifest::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let raw_path = entry.path()?.into_owned();
        let Some(key) = normalise_member_path(&raw_path)? else {
            continue;
        };
        let digest = Sha256Digest::from_reader(&mut entry)?;
        manifest.insert(key, digest);
    }

    Ok(manifest)
}

/// Build a manifest from the tarball at `path`.
///
/// # Errors
///
/// Returns [`ManifestError::Open`] when the file cannot be opened, and the
/// errors of [`read_tarball`] otherwise.
pub fn read_tarball_file(path: &Utf8Path) -> Result<Manifest, ManifestError> {
    let file = std::fs::File::open(path).map_err(|source| ManifestError::Open {
        path: path.to_owned(),
        source,
    })?;
    read_tarball(std::io::BufReader::new(file))
}

/// Normalise an archive member path to a manifest key.
///
/// Returns `None` for paths with no components left, such as `./`.
fn normalise_member_path(path: &Path) -> Result<Option<String>, ManifestError> {
    let traversal = || ManifestError::PathTraversal {
        path: path.display().to_string(),
    };
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| ManifestError::NonUtf8Path {
                    path: path.display().to_string(),
                })?;
                segments.push(segment);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(traversal());
            }
        }
    }

    let relative = match segments.as_slice() {
        [] => return Ok(None),
        [single] => vec![*single],
        [_, rest @ ..] => rest.to_vec(),
    };
    Ok(Some(relative.join("/")))
}
