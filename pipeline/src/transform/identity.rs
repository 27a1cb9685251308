use std::iter;

use crate::transform::{RecordIter, Transform};
use crate::types::{Record, Schema};

/// Passes every record through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl IdentityTransform {
    /// Name under which the transform is registered.
    pub const NAME: &'static str = "identity";
}

impl Transform for IdentityTransform {
    fn schema(&self) -> Schema {
        Schema::open(Self::NAME)
    }

    fn transform(&self, record: Record) -> RecordIter {
        Box::new(iter::once(Ok(record)))
    }
}
