//! Executor module: the task scheduler and single-entry file operations

pub mod copy;
pub mod pool;

pub use copy::{copy_entry, copy_file_atomic, copy_symlink, remove_entry};
pub use pool::Scheduler;
