//! Statistics - per-run outcome counters

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome categories counted during a mirror run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    CopiedFiles,
    FailedCopies,
    CreatedDirs,
    FailedDirCreations,
    RemovedFiles,
    UnvisitedFiles,
    UnvisitedDirs,
    FailedRemovals,
    RemovedDirs,
    FailedDirRemovals,
}

impl StatKind {
    /// Number of categories
    pub const COUNT: usize = 10;

    /// All categories in reporting order
    pub const ALL: [StatKind; Self::COUNT] = [
        StatKind::CopiedFiles,
        StatKind::FailedCopies,
        StatKind::CreatedDirs,
        StatKind::FailedDirCreations,
        StatKind::RemovedFiles,
        StatKind::UnvisitedFiles,
        StatKind::UnvisitedDirs,
        StatKind::FailedRemovals,
        StatKind::RemovedDirs,
        StatKind::FailedDirRemovals,
    ];

    /// Whether a non-zero count in this category marks the run unsuccessful
    pub fn is_error(self) -> bool {
        !matches!(
            self,
            StatKind::CopiedFiles
                | StatKind::CreatedDirs
                | StatKind::RemovedFiles
                | StatKind::RemovedDirs
        )
    }

    /// Human-readable label used in summary lines
    pub fn label(self) -> &'static str {
        match self {
            StatKind::CopiedFiles => "Copied files",
            StatKind::FailedCopies => "Files not copied",
            StatKind::CreatedDirs => "Created directories",
            StatKind::FailedDirCreations => "Directories not created",
            StatKind::RemovedFiles => "Removed files",
            StatKind::UnvisitedFiles => "Files not visited",
            StatKind::UnvisitedDirs => "Directories not visited",
            StatKind::FailedRemovals => "Files not removed",
            StatKind::RemovedDirs => "Removed directories",
            StatKind::FailedDirRemovals => "Directories not removed",
        }
    }

    /// Stable snake_case key, used for JSON output
    pub fn key(self) -> &'static str {
        match self {
            StatKind::CopiedFiles => "copied_files",
            StatKind::FailedCopies => "failed_copies",
            StatKind::CreatedDirs => "created_dirs",
            StatKind::FailedDirCreations => "failed_dir_creations",
            StatKind::RemovedFiles => "removed_files",
            StatKind::UnvisitedFiles => "unvisited_files",
            StatKind::UnvisitedDirs => "unvisited_dirs",
            StatKind::FailedRemovals => "failed_removals",
            StatKind::RemovedDirs => "removed_dirs",
            StatKind::FailedDirRemovals => "failed_dir_removals",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Fixed vector of outcome counters for one or more path pairs.
///
/// One instance is owned by the worker mirroring a single pair; instances
/// from different workers only meet through [`Statistics::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    counts: [u64; StatKind::COUNT],
}

impl Statistics {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment one counter
    pub fn increment(&mut self, kind: StatKind) {
        self.add(kind, 1);
    }

    /// Add `amount` to one counter
    pub fn add(&mut self, kind: StatKind, amount: u64) {
        let slot = &mut self.counts[kind.index()];
        *slot = slot.saturating_add(amount);
    }

    /// Read one counter
    pub fn get(&self, kind: StatKind) -> u64 {
        self.counts[kind.index()]
    }

    /// Element-wise sum of two optional statistics.
    ///
    /// A missing operand counts as all zeros, so merging with `None` is the identity.
    pub fn merge(a: Option<Statistics>, b: Option<Statistics>) -> Statistics {
        let mut merged = a.unwrap_or_default();
        if let Some(other) = b {
            merged.combine(&other);
        }
        merged
    }

    /// Add every counter of `other` into `self`
    pub fn combine(&mut self, other: &Statistics) {
        for kind in StatKind::ALL {
            self.add(kind, other.get(kind));
        }
    }

    /// True iff every error category is zero
    pub fn is_successful(&self) -> bool {
        StatKind::ALL
            .iter()
            .all(|kind| !kind.is_error() || self.get(*kind) == 0)
    }

    /// Summary line for one category, e.g. `Copied files: 3`
    pub fn message(&self, kind: StatKind) -> String {
        format!("{}: {}", kind.label(), self.get(kind))
    }

    /// Iterate over (category, count) in reporting order
    pub fn iter(&self) -> impl Iterator<Item = (StatKind, u64)> + '_ {
        StatKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    /// Total of all error categories
    pub fn error_count(&self) -> u64 {
        self.iter()
            .filter(|(kind, _)| kind.is_error())
            .map(|(_, count)| count)
            .sum()
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = StatKind::ALL
            .iter()
            .map(|kind| self.message(*kind))
            .collect::<Vec<_>>()
            .join("\n");
        f.write_str(&lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with(pairs: &[(StatKind, u64)]) -> Statistics {
        let mut stats = Statistics::new();
        for (kind, amount) in pairs {
            stats.add(*kind, *amount);
        }
        stats
    }

    #[test]
    fn test_new_statistics_are_empty_and_successful() {
        let stats = Statistics::new();
        assert!(stats.iter().all(|(_, count)| count == 0));
        assert!(stats.is_successful());
        assert_eq!(stats.error_count(), 0);
    }

    #[test]
    fn test_all_lists_every_category_once_in_index_order() {
        for (position, kind) in StatKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), position);
        }
    }

    #[test]
    fn test_increment_touches_only_one_counter() {
        let mut stats = Statistics::new();
        stats.increment(StatKind::RemovedFiles);
        stats.increment(StatKind::RemovedFiles);

        assert_eq!(stats.get(StatKind::RemovedFiles), 2);
        assert_eq!(stats.iter().map(|(_, c)| c).sum::<u64>(), 2);
    }

    #[test]
    fn test_error_categories_mark_failure() {
        for kind in StatKind::ALL {
            let mut stats = Statistics::new();
            stats.increment(kind);
            assert_eq!(stats.is_successful(), !kind.is_error(), "{:?}", kind);
        }
    }

    #[test]
    fn test_merge_with_none_is_identity() {
        let stats = stats_with(&[(StatKind::CopiedFiles, 3), (StatKind::FailedCopies, 1)]);

        assert_eq!(Statistics::merge(Some(stats), None), stats);
        assert_eq!(Statistics::merge(None, Some(stats)), stats);
        assert_eq!(Statistics::merge(None, None), Statistics::new());
    }

    #[test]
    fn test_merge_is_commutative_and_associative() {
        let a = stats_with(&[(StatKind::CopiedFiles, 1), (StatKind::CreatedDirs, 4)]);
        let b = stats_with(&[(StatKind::RemovedDirs, 2), (StatKind::CopiedFiles, 5)]);
        let c = stats_with(&[(StatKind::UnvisitedFiles, 7)]);

        assert_eq!(
            Statistics::merge(Some(a), Some(b)),
            Statistics::merge(Some(b), Some(a))
        );

        let left = Statistics::merge(Some(Statistics::merge(Some(a), Some(b))), Some(c));
        let right = Statistics::merge(Some(a), Some(Statistics::merge(Some(b), Some(c))));
        assert_eq!(left, right);
        assert_eq!(left.get(StatKind::CopiedFiles), 6);
        assert_eq!(left.get(StatKind::UnvisitedFiles), 7);
    }

    #[test]
    fn test_message_and_display() {
        let stats = stats_with(&[(StatKind::CopiedFiles, 2)]);
        assert_eq!(stats.message(StatKind::CopiedFiles), "Copied files: 2");

        let rendered = stats.to_string();
        assert_eq!(rendered.lines().count(), StatKind::COUNT);
        assert!(rendered.contains("Removed directories: 0"));
    }

    #[test]
    fn test_serialization() {
        let stats = stats_with(&[(StatKind::FailedRemovals, 9)]);
        let json = serde_json::to_string(&stats).expect("serialize statistics");
        let back: Statistics = serde_json::from_str(&json).expect("deserialize statistics");
        assert_eq!(stats, back);
    }
}
