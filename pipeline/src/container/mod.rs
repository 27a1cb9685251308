//! Input and output containers.
//!
//! A pipeline reads its input from a [`Source`] and writes through the single
//! [`OutputWriter`] created by an [`Output`]. Two implementations ship with the crate: an
//! in-memory one for tests and embedding, and a JSON Lines record file.

mod base;
pub mod file;
pub mod memory;
mod paths;

pub use base::{Output, OutputWriter, Source};
pub use file::{RecordFileOutput, RecordFileSource};
pub use memory::{MemoryOutput, MemorySource};
pub use paths::map_paths;
