//! Directory scanning logic

mod size;

pub use size::path_size;
