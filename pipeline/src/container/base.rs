use std::future::Future;

use crate::error::PipelineResult;
use crate::types::{Record, Schema};

/// Forward-only source of input records.
///
/// Records are read exactly once, in order. The pipeline never asks for random access.
pub trait Source: Send + 'static {
    /// Returns the next record, or [`None`] once the source is exhausted.
    fn next_record(&mut self) -> impl Future<Output = PipelineResult<Option<Record>>> + Send;
}

/// Destination of a pipeline run.
///
/// An output is a cheap handle on the underlying container: the pipeline clones it to keep
/// the ability to [`Output::delete`] the container while the writer owns the
/// [`Output::Writer`].
pub trait Output: Clone + Send + Sync + 'static {
    type Writer: OutputWriter;

    /// Creates (or truncates) the container, declaring the schema of the records to come.
    fn create(&self, schema: &Schema) -> impl Future<Output = PipelineResult<Self::Writer>> + Send;

    /// Removes the container. Removing a container that does not exist succeeds.
    fn delete(&self) -> impl Future<Output = PipelineResult<()>> + Send;

    /// Returns whether the container currently exists.
    fn exists(&self) -> impl Future<Output = PipelineResult<bool>> + Send;
}

/// Appending handle on a created output.
///
/// Exactly one writer exists per run, so implementations need no internal locking for
/// ordering guarantees.
pub trait OutputWriter: Send + 'static {
    fn append(&mut self, record: Record) -> impl Future<Output = PipelineResult<()>> + Send;

    /// Flushes and closes the container.
    fn finish(self) -> impl Future<Output = PipelineResult<()>> + Send;
}
