use std::sync::Arc;

use config::shared::TransformConfig;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info};

use crate::error::{ErrorKind, PipelineError, PipelineResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{TRANSFORM_WORKER_BEFORE_TASK, pipeline_fail_point};
use crate::queue::{ResultMessage, ResultTx, Task, WorkMessage, WorkRx};
use crate::transform::{Transform, TransformRegistry};
use crate::types::{Record, Schema};
use crate::workers::base::{Worker, WorkerHandle, WorkerType};
use crate::workers::pool::TransformWorkerPool;
use crate::{bail, pipeline_error};

/// Lifecycle of a transform worker.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformWorkerState {
    /// Building the transform.
    Starting,
    /// Transform built, processing tasks.
    Ready { schema: Schema },
    /// The transform could not be built, no task was processed.
    Failed { reason: String },
    /// Received its stop message, or the work queue was closed.
    Stopped,
}

impl TransformWorkerState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransformWorkerState::Failed { .. } | TransformWorkerState::Stopped
        )
    }
}

/// Handle to a spawned [`TransformWorker`].
#[derive(Debug)]
pub struct TransformWorkerHandle {
    worker_id: usize,
    state_rx: watch::Receiver<TransformWorkerState>,
}

impl TransformWorkerHandle {
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Waits until the worker has built its transform and returns the output schema.
    ///
    /// Fails with [`ErrorKind::WorkerStartupFailure`] when the worker could not build the
    /// transform or ended before reporting.
    pub async fn wait_ready(&mut self) -> PipelineResult<Schema> {
        let worker_id = self.worker_id;
        let state = self
            .state_rx
            .wait_for(|state| !matches!(state, TransformWorkerState::Starting))
            .await
            .map_err(|_| {
                pipeline_error!(
                    ErrorKind::WorkerStartupFailure,
                    "Transform worker ended before reporting ready",
                    format!("worker {worker_id}")
                )
            })?;

        match &*state {
            TransformWorkerState::Ready { schema } => Ok(schema.clone()),
            TransformWorkerState::Failed { reason } => bail!(
                ErrorKind::WorkerStartupFailure,
                "Transform worker failed to start",
                format!("worker {worker_id}: {reason}")
            ),
            other => bail!(
                ErrorKind::WorkerStartupFailure,
                "Transform worker stopped before reporting ready",
                format!("worker {worker_id} is {other:?}")
            ),
        }
    }
}

impl WorkerHandle<TransformWorkerState> for TransformWorkerHandle {
    fn state(&self) -> TransformWorkerState {
        self.state_rx.borrow().clone()
    }

    /// Waits for the worker to stop.
    ///
    /// The task result itself is collected by the [`TransformWorkerPool`].
    async fn wait(mut self) -> PipelineResult<TransformWorkerState> {
        let worker_id = self.worker_id;
        let state = self
            .state_rx
            .wait_for(TransformWorkerState::is_terminal)
            .await
            .map_err(|_| {
                pipeline_error!(
                    ErrorKind::WorkerCrash,
                    "Transform worker ended without stopping",
                    format!("worker {worker_id}")
                )
            })?;

        Ok(state.clone())
    }
}

/// Worker pulling tasks from the work queue and pushing their results to the result queue.
///
/// Each worker builds its own transform from the [`TransformConfig`], so no transform
/// state is ever shared between workers. Transform calls run on the blocking thread pool.
#[derive(Debug)]
pub struct TransformWorker {
    worker_id: usize,
    registry: Arc<TransformRegistry>,
    transform_config: TransformConfig,
    work_rx: WorkRx,
    result_tx: ResultTx,
    pool: TransformWorkerPool,
}

impl TransformWorker {
    pub fn new(
        worker_id: usize,
        registry: Arc<TransformRegistry>,
        transform_config: TransformConfig,
        work_rx: WorkRx,
        result_tx: ResultTx,
        pool: TransformWorkerPool,
    ) -> Self {
        Self {
            worker_id,
            registry,
            transform_config,
            work_rx,
            result_tx,
            pool,
        }
    }

    async fn run(self, state_tx: watch::Sender<TransformWorkerState>) -> PipelineResult<()> {
        let worker_id = self.worker_id;

        let registry = self.registry.clone();
        let transform_config = self.transform_config.clone();
        let built = tokio::task::spawn_blocking(move || registry.build(&transform_config))
            .await
            .unwrap_or_else(|err| {
                Err(pipeline_error!(
                    ErrorKind::WorkerStartupFailure,
                    "Transform construction panicked",
                    err
                ))
            });

        let transform = match built {
            Ok(transform) => transform,
            Err(err) => {
                error!(worker_id, error = %err, "failed to build transform");
                state_tx.send_replace(TransformWorkerState::Failed {
                    reason: describe(&err),
                });
                // The writer counts this worker as done even though it never ran.
                let _ = self
                    .result_tx
                    .send(ResultMessage::WorkerDone { worker_id })
                    .await;

                return Err(pipeline_error!(
                    ErrorKind::WorkerStartupFailure,
                    "Transform worker failed to start",
                    format!("worker {worker_id}"),
                    source: err
                ));
            }
        };

        let schema = Arc::new(transform.schema());
        state_tx.send_replace(TransformWorkerState::Ready {
            schema: schema.as_ref().clone(),
        });
        debug!(worker_id, schema = %schema.name, "transform worker ready");

        let mut processed = 0u64;
        loop {
            let task = match self.work_rx.recv().await {
                Some(WorkMessage::Task(task)) => task,
                Some(WorkMessage::Stop) => {
                    debug!(worker_id, "transform worker received stop message");
                    break;
                }
                None => {
                    debug!(worker_id, "work queue closed");
                    break;
                }
            };

            #[cfg(feature = "failpoints")]
            pipeline_fail_point(TRANSFORM_WORKER_BEFORE_TASK)?;

            let result = process_task(transform.clone(), schema.clone(), task).await;
            processed += 1;

            self.send_result(result).await?;
        }

        state_tx.send_replace(TransformWorkerState::Stopped);
        self.send_result(ResultMessage::WorkerDone { worker_id }).await?;

        info!(worker_id, processed, "transform worker completed");

        Ok(())
    }

    async fn send_result(&self, message: ResultMessage) -> PipelineResult<()> {
        if self.result_tx.send(message).await.is_err() {
            bail!(
                ErrorKind::WriterFailure,
                "Result queue closed while the worker was running",
                format!("worker {}", self.worker_id)
            );
        }

        Ok(())
    }
}

impl Worker<TransformWorkerHandle, TransformWorkerState> for TransformWorker {
    type Error = PipelineError;

    async fn start(self) -> Result<TransformWorkerHandle, Self::Error> {
        let worker_id = self.worker_id;
        let (state_tx, state_rx) = watch::channel(TransformWorkerState::Starting);

        let span = tracing::debug_span!(
            "transform_worker",
            worker_id,
            transform = %self.transform_config
        );
        let pool = self.pool.clone();
        pool.spawn(worker_id, self.run(state_tx).instrument(span.or_current()))
            .await;

        let worker_type = WorkerType::Transform { worker_id };
        debug!(worker = %worker_type, "worker started");

        Ok(TransformWorkerHandle {
            worker_id,
            state_rx,
        })
    }
}

/// Runs the transform on one task and turns the outcome into a result message.
///
/// Outputs are validated against `schema`. An error item, a schema violation or a panic
/// inside the transform fails the whole task and discards the outputs produced so far.
async fn process_task(
    transform: Arc<dyn Transform>,
    schema: Arc<Schema>,
    task: Task,
) -> ResultMessage {
    let Task {
        sequence_id,
        record,
    } = task;

    let outcome = tokio::task::spawn_blocking(move || -> PipelineResult<Vec<Record>> {
        let mut outputs = Vec::new();
        for output in transform.transform(record) {
            let output = output?;
            schema.validate(&output)?;
            outputs.push(output);
        }

        Ok(outputs)
    })
    .await;

    let error = match outcome {
        Ok(Ok(outputs)) => {
            return ResultMessage::Success {
                sequence_id,
                outputs,
            };
        }
        Ok(Err(err)) => err,
        Err(join_err) => pipeline_error!(
            ErrorKind::TransformError,
            "Transform panicked",
            join_err
        ),
    };

    ResultMessage::Failure { sequence_id, error }
}

/// Short rendering of an error without location and backtrace.
fn describe(err: &PipelineError) -> String {
    match err.detail() {
        Some(detail) => format!("{}: {detail}", err.description()),
        None => err.description().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::queue::{result_queue, work_queue};
    use crate::test_utils::transforms::{DOUBLING, FAILING, PANICKING, test_registry};
    use crate::test_utils::records::record_with_id;

    struct Harness {
        handle: TransformWorkerHandle,
        work_tx: crate::queue::WorkTx,
        result_rx: crate::queue::ResultRx,
        pool: TransformWorkerPool,
    }

    async fn start(transform: &str) -> Harness {
        let (work_tx, work_rx) = work_queue(16);
        let (result_tx, result_rx) = result_queue(16);
        let pool = TransformWorkerPool::new();

        let handle = TransformWorker::new(
            7,
            Arc::new(test_registry()),
            TransformConfig::builtin(transform),
            work_rx,
            result_tx,
            pool.clone(),
        )
        .start()
        .await
        .unwrap();

        Harness {
            handle,
            work_tx,
            result_rx,
            pool,
        }
    }

    fn task(id: u64) -> WorkMessage {
        WorkMessage::Task(Task {
            sequence_id: id,
            record: record_with_id(id),
        })
    }

    #[tokio::test]
    async fn processes_tasks_until_stopped() {
        let mut harness = start(DOUBLING).await;
        let schema = harness.handle.wait_ready().await.unwrap();
        assert_eq!(schema.name, DOUBLING);

        harness.work_tx.send(task(0)).await.unwrap();
        harness.work_tx.send(WorkMessage::Stop).await.unwrap();

        match harness.result_rx.recv().await.unwrap() {
            ResultMessage::Success {
                sequence_id,
                outputs,
            } => {
                assert_eq!(sequence_id, 0);
                assert_eq!(outputs.len(), 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            harness.result_rx.recv().await,
            Some(ResultMessage::WorkerDone { worker_id: 7 })
        ));

        assert_eq!(
            harness.handle.wait().await.unwrap(),
            TransformWorkerState::Stopped
        );
        harness.pool.wait_all().await.unwrap();
    }

    #[tokio::test]
    async fn failing_records_do_not_stop_the_worker() {
        let mut harness = start(FAILING).await;
        harness.handle.wait_ready().await.unwrap();

        // Odd ids fail.
        harness.work_tx.send(task(1)).await.unwrap();
        harness.work_tx.send(task(2)).await.unwrap();
        harness.work_tx.send(WorkMessage::Stop).await.unwrap();

        let first = harness.result_rx.recv().await.unwrap();
        let second = harness.result_rx.recv().await.unwrap();

        match first {
            ResultMessage::Failure { sequence_id, error } => {
                assert_eq!(sequence_id, 1);
                assert_eq!(error.kind(), ErrorKind::TransformError);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(second, ResultMessage::Success { sequence_id: 2, .. }));
        harness.pool.wait_all().await.unwrap();
    }

    #[tokio::test]
    async fn panics_inside_the_transform_fail_the_task() {
        let mut harness = start(PANICKING).await;
        harness.handle.wait_ready().await.unwrap();

        harness.work_tx.send(task(0)).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), harness.result_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            result,
            ResultMessage::Failure { error, .. } if error.kind() == ErrorKind::TransformError
        ));

        harness.work_tx.send(WorkMessage::Stop).await.unwrap();
        harness.pool.wait_all().await.unwrap();
    }

    #[tokio::test]
    async fn construction_failures_report_done() {
        let mut harness = start("broken").await;

        let err = harness.handle.wait_ready().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WorkerStartupFailure);
        assert!(matches!(
            harness.handle.state(),
            TransformWorkerState::Failed { .. }
        ));
        assert!(matches!(
            harness.result_rx.recv().await,
            Some(ResultMessage::WorkerDone { worker_id: 7 })
        ));

        let err = harness.pool.wait_all().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WorkerStartupFailure);
    }
}
