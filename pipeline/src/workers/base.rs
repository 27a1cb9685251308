use std::fmt;
use std::future::Future;

use crate::error::PipelineResult;

/// Kind of a background worker, used to label logs and errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkerType {
    /// Worker applying the transform to tasks from the work queue.
    Transform {
        /// Index of the worker within its pool.
        worker_id: usize,
    },
    /// Single worker writing results to the output.
    Writer,
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerType::Transform { worker_id } => write!(f, "transform worker {worker_id}"),
            WorkerType::Writer => f.write_str("writer"),
        }
    }
}

/// Background worker which can be started once.
///
/// `H` is the handle returned on start and `S` the state observable through it.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error type returned when the worker cannot be started.
    type Error;

    /// Starts the worker in the background and returns a handle to it.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// Handle to a running worker.
pub trait WorkerHandle<S> {
    /// Returns a snapshot of the worker state.
    ///
    /// The snapshot may be stale by the time the caller looks at it.
    fn state(&self) -> S;

    /// Waits for the worker to stop and returns its final state.
    fn wait(self) -> impl Future<Output = PipelineResult<S>> + Send;
}
