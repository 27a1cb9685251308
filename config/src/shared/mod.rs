//! Shared configuration types for record pipelines.

mod base;
mod filter;
mod pipeline;
mod runner;
mod transform;

pub use base::ValidationError;
pub use filter::FilterConfig;
pub use pipeline::{OutputOrdering, PipelineConfig};
pub use runner::RunnerConfig;
pub use transform::TransformConfig;
