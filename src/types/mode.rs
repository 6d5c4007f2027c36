//! CompareMode - which comparison policy decides "already backed up"

use serde::{Deserialize, Serialize};

/// Equivalence policy between a source file and its destination counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CompareMode {
    /// Byte-for-byte content (symlinks: equal targets)
    #[default]
    Content,

    /// Last modification time only
    ModifiedTime,

    /// Last modification time and size
    ModifiedTimeAndSize,
}

impl CompareMode {
    /// Label shown to users picking a backup type
    pub fn backup_type(self) -> &'static str {
        match self {
            CompareMode::Content => "Mirror",
            CompareMode::ModifiedTime => "Mirror (modification time)",
            CompareMode::ModifiedTimeAndSize => "Mirror (modification time and size)",
        }
    }
}
