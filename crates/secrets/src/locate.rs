//! Upward manifest discovery

use crate::{Result, SecretError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Find `filename` in `start` or the closest ancestor directory containing it.
///
/// The search walks from `start` up to the filesystem root and returns the
/// first match. `filename` must be relative; absolute names are rejected
/// before anything on disk is inspected.
///
/// # Errors
///
/// - [`SecretError::AbsolutePathRejected`] if `filename` is absolute
/// - [`SecretError::ManifestNotFound`] if the root is reached without a match
/// - [`SecretError::ManifestLookup`] for any other filesystem failure
pub fn find_in_parent_tree(filename: &str, start: &Path) -> Result<PathBuf> {
    let wanted = Path::new(filename);
    if wanted.is_absolute() {
        return Err(SecretError::AbsolutePathRejected {
            path: filename.to_string(),
        });
    }

    let mut current = absolute_start(start, filename)?;

    loop {
        let candidate = current.join(wanted);
        match std::fs::metadata(&candidate) {
            Ok(_) => {
                tracing::debug!(path = %candidate.display(), "Found manifest");
                return Ok(candidate);
            }
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {}
            Err(source) => {
                return Err(SecretError::ManifestLookup {
                    filename: filename.to_string(),
                    source,
                });
            }
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => {
                return Err(SecretError::ManifestNotFound {
                    filename: filename.to_string(),
                });
            }
        }
    }
}

fn absolute_start(start: &Path, filename: &str) -> Result<PathBuf> {
    if start.is_absolute() {
        return Ok(start.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(start))
        .map_err(|source| SecretError::ManifestLookup {
            filename: filename.to_string(),
            source,
        })
}
