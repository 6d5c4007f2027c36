//! Error types for backmirror

use std::path::PathBuf;
use thiserror::Error;

/// Error types for backmirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Standard IO error (automatically converted via #[from])
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// `set_paths` was given an empty list
    #[error("No backup paths were specified")]
    NoPaths,

    /// One side of a pair is not an existing directory
    #[error("Paths do not point to existing directories: {src} -> {dst}")]
    MissingDirectory { src: PathBuf, dst: PathBuf },

    /// Source and destination contain each other
    #[error("Paths contain each other: {src} -> {dst}")]
    OverlappingPaths { src: PathBuf, dst: PathBuf },

    /// The storage device behind a path could not be identified
    #[error("Cannot resolve storage device of {path}: {source}")]
    UnresolvableDevice {
        path: PathBuf,
        source: std::io::Error,
    },

    /// `execute` was called while a run is in flight
    #[error("A backup run is already in progress")]
    AlreadyRunning,

    /// A scheduled task did not produce a result
    #[error("Backup task failed: {0}")]
    TaskFailed(String),
}

impl MirrorError {
    /// Check if this error is a rejected configuration (bad paths or settings)
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            MirrorError::Config(_)
                | MirrorError::NoPaths
                | MirrorError::MissingDirectory { .. }
                | MirrorError::OverlappingPaths { .. }
        )
    }

    /// Check if this error came from device classification
    pub fn is_device_error(&self) -> bool {
        matches!(self, MirrorError::UnresolvableDevice { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_automatic_conversion() {
        let io_error = IoError::new(ErrorKind::NotFound, "file not found");
        let error: MirrorError = io_error.into();

        assert!(matches!(error, MirrorError::Io(_)));
        assert!(error.to_string().contains("IO error"));
    }

    #[test]
    fn test_io_error_from_function() {
        fn returns_io_error() -> Result<(), MirrorError> {
            let _file = std::fs::File::open("/nonexistent/path/file.txt")?;
            Ok(())
        }

        let result = returns_io_error();
        assert!(matches!(result, Err(MirrorError::Io(_))));
    }

    #[test]
    fn test_bad_path_variants_are_configuration_errors() {
        let missing = MirrorError::MissingDirectory {
            src: PathBuf::from("/a"),
            dst: PathBuf::from("/b"),
        };
        let overlapping = MirrorError::OverlappingPaths {
            src: PathBuf::from("/a"),
            dst: PathBuf::from("/a/b"),
        };

        assert!(missing.is_configuration_error());
        assert!(overlapping.is_configuration_error());
        assert!(MirrorError::NoPaths.is_configuration_error());
        assert!(MirrorError::Config("bad".to_string()).is_configuration_error());
        assert!(!MirrorError::AlreadyRunning.is_configuration_error());

        assert!(overlapping.to_string().contains("/a/b"));
    }

    #[test]
    fn test_unresolvable_device_keeps_source() {
        use std::error::Error;

        let error = MirrorError::UnresolvableDevice {
            path: PathBuf::from("/mnt/gone"),
            source: IoError::new(ErrorKind::NotFound, "gone"),
        };

        assert!(error.is_device_error());
        assert!(!error.is_configuration_error());
        assert!(error.to_string().contains("/mnt/gone"));
        assert!(error.source().is_some());
    }
}
