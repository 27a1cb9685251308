//! Configuration for record pipelines.
//!
//! Holds the runtime [`environment::Environment`], the hierarchical file and environment
//! variable [`load`]er, and the [`shared`] configuration types consumed by the pipeline
//! library and the runner binary.

pub mod environment;
pub mod load;
pub mod shared;

pub use load::{Config, LoadConfigError, load_config, load_config_from};
