//! Background workers of a pipeline run.
//!
//! A run has any number of [`transform::TransformWorker`]s, owned by a
//! [`pool::TransformWorkerPool`], and exactly one [`writer::WriterWorker`].

pub mod base;
pub mod pool;
pub mod transform;
pub mod writer;
