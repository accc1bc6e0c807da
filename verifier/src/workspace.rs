//! Ephemeral workspace allocation.
//!
//! A [`Workspace`] is the scratch directory a single verification checks the
//! source out into and rebuilds the artifact in. Only the orchestrator
//! allocates and destroys workspaces; other components receive the path.

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use tempfile::TempDir;

/// Default prefix for workspace directory names.
const WORKSPACE_PREFIX: &str = "provenance-";

/// Allocates fresh, empty workspaces.
pub trait WorkspaceAllocator {
    /// Create a new empty workspace directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created or its path is
    /// not valid UTF-8.
    fn allocate(&self) -> std::io::Result<Workspace>;
}

/// Allocates workspaces as temporary directories.
///
/// # Examples
///
/// ```
/// use provenance_verifier::workspace::{TempDirAllocator, WorkspaceAllocator};
///
/// let mut workspace = TempDirAllocator::default().allocate()?;
/// let path = workspace.path().to_owned();
/// assert!(path.is_dir());
///
/// workspace.cleanup()?;
/// assert!(!path.exists());
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct TempDirAllocator {
    parent: Option<Utf8PathBuf>,
}

impl TempDirAllocator {
    /// Allocate workspaces under `parent` instead of the system temp dir.
    #[must_use]
    pub fn within(parent: impl Into<Utf8PathBuf>) -> Self {
        Self {
            parent: Some(parent.into()),
        }
    }
}

impl WorkspaceAllocator for TempDirAllocator {
    fn allocate(&self) -> std::io::Result<Workspace> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match &self.parent {
            Some(parent) => builder.tempdir_in(parent.as_std_path())?,
            None => builder.tempdir()?,
        };
        Workspace::from_temp_dir(dir)
    }
}

/// An exclusively owned scratch directory.
///
/// The directory is removed by [`Workspace::cleanup`], or on drop if cleanup
/// was never called. Cleanup is idempotent.
#[derive(Debug)]
pub struct Workspace {
    path: Utf8PathBuf,
    dir: Option<TempDir>,
}

impl Workspace {
    /// Take ownership of a temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::ErrorKind::InvalidData`] when the path is not valid
    /// UTF-8. The directory is removed in that case.
    pub fn from_temp_dir(dir: TempDir) -> std::io::Result<Self> {
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).map_err(|path| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("workspace path {} is not valid UTF-8", path.display()),
            )
        })?;
        debug!("allocated workspace {path}");
        Ok(Self {
            path,
            dir: Some(dir),
        })
    }

    /// Return the workspace root.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Return `true` once the directory has been removed.
    #[must_use]
    pub fn is_cleaned_up(&self) -> bool {
        self.dir.is_none()
    }

    /// Remove the workspace directory and everything in it.
    ///
    /// Calling this again after a successful or failed cleanup is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from removing the directory tree.
    pub fn cleanup(&mut self) -> std::io::Result<()> {
        match self.dir.take() {
            Some(dir) => {
                debug!("removing workspace {}", self.path);
                dir.close()
            }
            None => Ok(()),
        }
    }
}
