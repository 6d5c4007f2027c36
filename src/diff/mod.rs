//! Diff engine - comparison policies and the mirroring pass

mod compare;
mod mirror;

pub use compare::{files_equivalent, is_same_file_type, EntryKind};
pub use mirror::{leaf_for, mirror_pair};
