//! PathPair - one validated source -> destination mapping

use super::MirrorError;
use std::fs;
use std::path::{Path, PathBuf};

/// A validated (source, destination) directory pair.
///
/// Both paths are canonical, existing directories and neither contains the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPair {
    source: PathBuf,
    destination: PathBuf,
}

impl PathPair {
    /// Validate and build a pair
    ///
    /// # Errors
    /// * `MirrorError::MissingDirectory` if either side is not a directory (symlinks are not followed)
    /// * `MirrorError::OverlappingPaths` if one path is an ancestor of (or equal to) the other
    pub fn new(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<Self, MirrorError> {
        let source = source.as_ref();
        let destination = destination.as_ref();

        if !is_real_dir(source) || !is_real_dir(destination) {
            return Err(MirrorError::MissingDirectory {
                src: source.to_path_buf(),
                dst: destination.to_path_buf(),
            });
        }

        let missing = |_| MirrorError::MissingDirectory {
            src: source.to_path_buf(),
            dst: destination.to_path_buf(),
        };
        let source = fs::canonicalize(source).map_err(missing)?;
        let destination = fs::canonicalize(destination).map_err(missing)?;

        if source.starts_with(&destination) || destination.starts_with(&source) {
            return Err(MirrorError::OverlappingPaths {
                src: source,
                dst: destination,
            });
        }

        Ok(Self {
            source,
            destination,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

/// Validate a whole path list, rejecting it on the first bad pair.
pub fn validate_pairs<S, D>(pairs: &[(S, D)]) -> Result<Vec<PathPair>, MirrorError>
where
    S: AsRef<Path>,
    D: AsRef<Path>,
{
    if pairs.is_empty() {
        return Err(MirrorError::NoPaths);
    }

    pairs
        .iter()
        .map(|(source, destination)| PathPair::new(source, destination))
        .collect()
}

fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}
