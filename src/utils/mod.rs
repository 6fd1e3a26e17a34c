//! Utility modules.

pub mod file;
pub mod progress;

pub use file::{discover_input_files, sort_shards};
pub use progress::Progress;
