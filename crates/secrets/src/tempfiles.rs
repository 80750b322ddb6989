//! Ephemeral files for file-tagged secrets
//!
//! Every file created through a [`TempFileFactory`] is tracked and removed by
//! [`TempFileFactory::cleanup`], which also runs when the factory is dropped,
//! so early returns and unwinding still clean up.

use crate::{Result, SecretError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Shared-memory filesystem preferred for secret files when available
#[cfg(target_os = "linux")]
const SHARED_MEMORY_DIR: &str = "/dev/shm";

/// One tracked temporary file
#[derive(Debug)]
pub struct TempFileEntry {
    path: TempPath,
    owner: String,
}

impl TempFileEntry {
    /// Location of the file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the secret the file holds
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Allocates and tracks temporary secret files for one invocation.
#[derive(Debug)]
pub struct TempFileFactory {
    directory: PathBuf,
    files: Vec<TempFileEntry>,
}

impl TempFileFactory {
    /// Create a factory writing into [`TempFileFactory::default_directory`]
    #[must_use]
    pub fn new() -> Self {
        Self::in_dir(Self::default_directory())
    }

    /// Create a factory writing into `directory`
    #[must_use]
    pub fn in_dir(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            files: Vec::new(),
        }
    }

    /// `/dev/shm` when present, otherwise the system temporary directory
    #[must_use]
    pub fn default_directory() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            let shm = Path::new(SHARED_MEMORY_DIR);
            if shm.is_dir() {
                return shm.to_path_buf();
            }
        }
        std::env::temp_dir()
    }

    /// Directory new files are created in
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create a uniquely named file holding `contents` and return its path.
    ///
    /// Files are created readable and writable by the owner only.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::TempFileIo`] if the file cannot be created or written.
    pub fn push(&mut self, owner: &str, contents: &[u8]) -> Result<PathBuf> {
        let to_error = |source| SecretError::TempFileIo {
            name: owner.to_string(),
            source,
        };

        let mut file = tempfile::Builder::new()
            .prefix(".conjure-")
            .tempfile_in(&self.directory)
            .map_err(to_error)?;
        file.write_all(contents).map_err(to_error)?;
        file.flush().map_err(to_error)?;

        let path = file.into_temp_path();
        let location = path.to_path_buf();
        tracing::debug!(secret = %owner, path = %location.display(), "Created secret file");

        self.files.push(TempFileEntry {
            path,
            owner: owner.to_string(),
        });
        Ok(location)
    }

    /// Tracked files, in creation order
    #[must_use]
    pub fn entries(&self) -> &[TempFileEntry] {
        &self.files
    }

    /// Number of tracked files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files are tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Remove every tracked file.
    ///
    /// Failures are logged and never returned; the primary result of the run
    /// takes precedence.
    pub fn cleanup(&mut self) {
        for entry in self.files.drain(..) {
            let location = entry.path.to_path_buf();
            if let Err(e) = entry.path.close() {
                tracing::warn!(
                    secret = %entry.owner,
                    path = %location.display(),
                    error = %e,
                    "Failed to remove secret file"
                );
            }
        }
    }
}

impl Default for TempFileFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempFileFactory {
    fn drop(&mut self) {
        self.cleanup();
    }
}
