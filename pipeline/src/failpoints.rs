//! Named fault injection points, active only with the `failpoints` feature.

use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, PipelineResult};

/// Fails the writer before it appends the records of a successful task.
pub const WRITER_BEFORE_APPEND: &str = "writer.before_append";

/// Crashes a transform worker after it received a task and before it runs it.
pub const TRANSFORM_WORKER_BEFORE_TASK: &str = "transform_worker.before_task";

/// Fails the coordinator right before it enqueues a task.
pub const COORDINATOR_BEFORE_ENQUEUE: &str = "coordinator.before_enqueue";

/// Evaluates the fail point `name`, returning an error when it is configured to fire.
///
/// The optional fail point argument is copied into the error detail.
pub fn pipeline_fail_point(name: &str) -> PipelineResult<()> {
    fail_point!(name, |parameter| {
        bail!(
            ErrorKind::InjectedFailure,
            "An error occurred in a fail point",
            format!(
                "The failpoint '{name}' returned an error{}",
                parameter.map(|p| format!(": {p}")).unwrap_or_default()
            )
        );
    });

    Ok(())
}
