use config::shared::{OutputOrdering, PipelineConfig, TransformConfig};

use crate::container::{MemorySource, Output};
use crate::pipeline::Pipeline;
use crate::test_utils::records::records_with_ids;
use crate::test_utils::transforms::test_registry;

/// Pipeline configuration with `workers` workers and test-friendly timings.
///
/// The startup grace is generous because workers build their transform on a blocking
/// pool which can be slow to spin up on loaded CI machines.
pub fn test_pipeline_config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        queue_capacity: None,
        progress_interval: 1,
        startup_grace_ms: 5_000,
        shutdown_grace_ms: 1_000,
        ordering: OutputOrdering::Arrival,
    }
}

/// Creates a pipeline running the builtin test transform `transform` over records with
/// ids `0..records`.
pub fn create_pipeline<O>(
    workers: usize,
    transform: &str,
    records: u64,
    output: O,
) -> Pipeline<MemorySource, O>
where
    O: Output,
{
    Pipeline::new(
        test_pipeline_config(workers),
        TransformConfig::builtin(transform),
        test_registry(),
        MemorySource::new(records_with_ids(records)),
        output,
    )
}
