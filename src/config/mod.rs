//! Configuration management

mod cli;

pub use cli::Cli;

use crate::types::{CompareMode, MirrorError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine settings for backmirror
///
/// Path pairs are not part of the configuration; they are handed to the
/// engine separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Policy deciding whether a destination file is already up to date
    pub compare_mode: CompareMode,

    /// Copy entries whose name starts with a dot
    pub copy_hidden: bool,

    /// Worker pool size (0 = number of logical CPUs)
    pub workers: usize,

    /// Seconds between liveness messages while joining
    pub join_poll_interval_secs: u64,

    /// Per-run log file, truncated at every run
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compare_mode: CompareMode::default(),
            copy_hidden: true,
            workers: 0,
            join_poll_interval_secs: 60,
            log_file: None,
        }
    }
}

impl Config {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, MirrorError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| MirrorError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, MirrorError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::Config(format!(
                "Cannot read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.join_poll_interval_secs == 0 {
            return Err(MirrorError::Config(
                "join_poll_interval_secs must be at least 1".to_string(),
            ));
        }

        if let Some(log_file) = &self.log_file {
            if log_file.as_os_str().is_empty() {
                return Err(MirrorError::Config("log_file must not be empty".to_string()));
            }
        }

        Ok(())
    }

    /// Worker pool size with the CPU-count default applied
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    pub fn join_poll_interval(&self) -> Duration {
        Duration::from_secs(self.join_poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.compare_mode, CompareMode::Content);
        assert!(config.copy_hidden);
        assert!(config.effective_workers() >= 1);
        assert_eq!(config.join_poll_interval(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            compare_mode = "modified-time-and-size"
            workers = 3
            "#,
        )
        .expect("parse config");

        assert_eq!(config.compare_mode, CompareMode::ModifiedTimeAndSize);
        assert_eq!(config.effective_workers(), 3);
        assert!(config.copy_hidden);
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = Config::from_toml_str("join_poll_interval_secs = 0").expect_err("zero interval");
        assert!(err.is_configuration_error());

        let err = Config::from_toml_str("compare_mode = \"checksum\"").expect_err("unknown mode");
        assert!(err.to_string().contains("Invalid configuration"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = dir.path().join("backmirror.toml");
        std::fs::write(&path, "copy_hidden = false\nlog_file = \"run.log\"\n")
            .expect("write config");

        let config = Config::load(&path).expect("load config");
        assert!(!config.copy_hidden);
        assert_eq!(config.log_file, Some(PathBuf::from("run.log")));

        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }
}
