//! Values flowing through a pipeline.

mod record;
mod schema;
mod stats;

pub(crate) use record::lookup_segment;
pub use record::Record;
pub use schema::{FieldSchema, FieldType, Schema};
pub use stats::Stats;

/// Position of a record in its input stream, assigned from 0 in reading order.
pub type SequenceId = u64;
