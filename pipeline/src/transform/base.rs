use crate::error::PipelineResult;
use crate::types::{Record, Schema};

/// Outputs of one transform call, produced lazily.
///
/// An `Err` item fails the whole input record: outputs already yielded for it are
/// discarded by the worker.
pub type RecordIter = Box<dyn Iterator<Item = PipelineResult<Record>> + Send>;

/// Single-record transformation supplied by the caller.
///
/// Transforms run on blocking threads, one call at a time per worker, and must not rely on
/// state shared with other workers.
pub trait Transform: Send + Sync + 'static {
    /// Shape of the records produced by [`Transform::transform`].
    fn schema(&self) -> Schema;

    /// Transforms one input record.
    ///
    /// Malformed input is reported with an [`crate::error::ErrorKind::TransformError`] item.
    fn transform(&self, record: Record) -> RecordIter;
}
