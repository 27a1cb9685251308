use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::{self, JoinSet};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;

/// Outcome of one transform worker task.
pub type WorkerExit = (usize, PipelineResult<()>);

#[derive(Debug)]
struct TransformWorkerPoolInner {
    /// Owns all spawned worker tasks.
    join_set: JoinSet<WorkerExit>,
    /// Worker index of every task still in the join set, used to attribute panics.
    workers: HashMap<task::Id, usize>,
}

impl TransformWorkerPoolInner {
    fn new() -> Self {
        Self {
            join_set: JoinSet::new(),
            workers: HashMap::new(),
        }
    }
}

/// Pool owning the transform worker tasks of one run.
///
/// Clones share the same tasks.
#[derive(Debug, Clone)]
pub struct TransformWorkerPool {
    inner: Arc<Mutex<TransformWorkerPoolInner>>,
}

impl TransformWorkerPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TransformWorkerPoolInner::new())),
        }
    }

    /// Spawns the task of worker `worker_id` into the pool.
    pub async fn spawn<F>(&self, worker_id: usize, future: F)
    where
        F: Future<Output = PipelineResult<()>> + Send + 'static,
    {
        let mut inner = self.inner.lock().await;

        let abort_handle = inner.join_set.spawn(async move {
            let result = future.await;
            (worker_id, result)
        });
        inner.workers.insert(abort_handle.id(), worker_id);

        debug!(worker_id, "spawned transform worker in pool");
    }

    /// Returns the number of worker tasks that were not joined yet.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.join_set.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Waits for the next worker task to end.
    ///
    /// Returns [`None`] once every task was joined. A task that panicked or was aborted
    /// is reported as an [`ErrorKind::WorkerCrash`] of its worker.
    ///
    /// Cancel safe: dropping the future before it completes loses no exit.
    pub async fn join_next(&self) -> Option<WorkerExit> {
        let mut inner = self.inner.lock().await;

        let joined = inner.join_set.join_next_with_id().await?;
        let exit = match joined {
            Ok((id, exit)) => {
                inner.workers.remove(&id);
                exit
            }
            Err(err) => {
                let worker_id = inner.workers.remove(&err.id()).unwrap_or_default();
                let error = if err.is_cancelled() {
                    pipeline_error!(
                        ErrorKind::WorkerCrash,
                        "Transform worker was aborted",
                        format!("worker {worker_id}")
                    )
                } else {
                    pipeline_error!(
                        ErrorKind::WorkerCrash,
                        "Transform worker panicked",
                        format!("worker {worker_id}: {err}")
                    )
                };

                (worker_id, Err(error))
            }
        };

        Some(exit)
    }

    /// Waits for all worker tasks to end, aggregating their errors.
    pub async fn wait_all(&self) -> PipelineResult<()> {
        let mut errors = Vec::new();

        while let Some((worker_id, result)) = self.join_next().await {
            match result {
                Ok(()) => debug!(worker_id, "transform worker completed"),
                Err(err) => {
                    warn!(worker_id, error = %err, "transform worker completed with error");
                    errors.push(err);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }

    /// Aborts every worker task still running.
    pub async fn abort_all(&self) {
        self.inner.lock().await.join_set.abort_all();
    }

    /// Aborts every worker task and waits up to `grace` for them to wind down.
    pub async fn shutdown(&self, grace: Duration) {
        self.abort_all().await;

        let drained = timeout(grace, async {
            while self.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            let remaining = self.len().await;
            warn!(remaining, "transform workers did not stop within the grace period");
            // Tasks blocked in a transform call cannot be interrupted, they are detached.
            self.inner.lock().await.join_set.detach_all();
        }
    }
}

impl Default for TransformWorkerPool {
    fn default() -> Self {
        Self::new()
    }
}
