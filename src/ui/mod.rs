//! Terminal output

mod progress;

pub use progress::BackupProgress;
