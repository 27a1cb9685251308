use std::sync::Arc;
use std::time::Duration;

use crate::error::{ErrorKind, PipelineResult};
use crate::test_utils::records::{ID_FIELD, record_id};
use crate::transform::{RecordIter, Transform, TransformRegistry};
use crate::types::{FieldSchema, FieldType, Record, Schema};
use crate::{bail, pipeline_error};

pub const DOUBLING: &str = "doubling";
pub const FAILING: &str = "failing";
pub const SLOW: &str = "slow";
pub const PANICKING: &str = "panicking";
/// Name of a transform whose factory always fails.
pub const BROKEN: &str = "broken";

/// Delay of the transform registered as [`SLOW`].
pub const SLOW_DELAY: Duration = Duration::from_millis(20);

/// Emits two copies of every record, tagged with `copy` 0 and 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoublingTransform;

impl Transform for DoublingTransform {
    fn schema(&self) -> Schema {
        Schema::new(
            DOUBLING,
            vec![
                FieldSchema::new(ID_FIELD, FieldType::Long, false),
                FieldSchema::new("copy", FieldType::Long, false),
            ],
        )
    }

    fn transform(&self, record: Record) -> RecordIter {
        Box::new((0..2u64).map(move |copy| Ok(record.clone().with("copy", copy))))
    }
}

/// Fails every record whose id is odd and passes the others through.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingTransform;

impl FailingTransform {
    pub fn fails(record: &Record) -> bool {
        record_id(record).is_some_and(|id| id % 2 == 1)
    }
}

impl Transform for FailingTransform {
    fn schema(&self) -> Schema {
        Schema::open(FAILING)
    }

    fn transform(&self, record: Record) -> RecordIter {
        if Self::fails(&record) {
            return Box::new(std::iter::once(Err(pipeline_error!(
                ErrorKind::TransformError,
                "Odd ids are rejected",
                record
            ))));
        }

        Box::new(std::iter::once(Ok(record)))
    }
}

/// Passes records through after blocking for a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct SlowTransform {
    delay: Duration,
}

impl SlowTransform {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Transform for SlowTransform {
    fn schema(&self) -> Schema {
        Schema::open(SLOW)
    }

    fn transform(&self, record: Record) -> RecordIter {
        // Transforms run on blocking threads, so a blocking sleep models real work.
        std::thread::sleep(self.delay);

        Box::new(std::iter::once(Ok(record)))
    }
}

/// Panics on records with an even id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingTransform;

impl Transform for PanickingTransform {
    fn schema(&self) -> Schema {
        Schema::open(PANICKING)
    }

    fn transform(&self, record: Record) -> RecordIter {
        if record_id(&record).is_some_and(|id| id % 2 == 0) {
            panic!("transform panicked on {record}");
        }

        Box::new(std::iter::once(Ok(record)))
    }
}

/// Registry with the builtins and every test transform.
pub fn test_registry() -> TransformRegistry {
    let mut registry = TransformRegistry::with_builtins();
    registry
        .register(DOUBLING, || Ok(Arc::new(DoublingTransform)))
        .register(FAILING, || Ok(Arc::new(FailingTransform)))
        .register(SLOW, || Ok(Arc::new(SlowTransform::new(SLOW_DELAY))))
        .register(PANICKING, || Ok(Arc::new(PanickingTransform)))
        .register(BROKEN, broken_factory);

    registry
}

/// Registry where [`SLOW`] waits `delay` per record.
pub fn slow_registry(delay: Duration) -> TransformRegistry {
    let mut registry = test_registry();
    registry.register(SLOW, move || Ok(Arc::new(SlowTransform::new(delay))));

    registry
}

fn broken_factory() -> PipelineResult<Arc<dyn Transform>> {
    bail!(
        ErrorKind::InvalidConfiguration,
        "Transform cannot be built",
        "the broken test transform never builds"
    )
}
