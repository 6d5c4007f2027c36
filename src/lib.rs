//! # backmirror - device-aware mirror backups
//!
//! Mirrors a list of source directories into destination directories.
//! Pairs that share a pair of storage devices run one after another, while
//! pairs on distinct devices run in parallel.

// Module declarations
pub mod commands;
pub mod config;
pub mod device;
pub mod diff;
pub mod engine;
pub mod events;
pub mod executor;
pub mod logging;
pub mod scanner;
pub mod types;
pub mod ui;

// Re-export commonly used types
pub use config::Config;
pub use engine::{MirrorEngine, RunState, StopHandle};
pub use events::{Event, EventBus, Topic};
pub use types::{CompareMode, MirrorError, PathPair, StatKind, Statistics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
