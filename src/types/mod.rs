//! Core type definitions for backmirror

mod error;
mod mode;
mod pair;
mod stats;

pub use error::MirrorError;
pub use mode::CompareMode;
pub use pair::{validate_pairs, PathPair};
pub use stats::{StatKind, Statistics};
