//! The coordinator of a pipeline run.
//!
//! A [`Pipeline`] streams records from a [`Source`] to a pool of transform workers over the
//! bounded work queue, and a single writer drains the result queue into an [`Output`].
//!
//! ```text
//! source ──► work queue ──► worker 0..N ──► result queue ──► writer ──► output
//! ```
//!
//! A clean run stops each worker with one stop message once the input is exhausted and
//! waits for the writer to report the final [`Stats`]. A run that is interrupted, loses a
//! worker or fails to write aborts every task and deletes the partial output.

use std::future::Future;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use config::shared::{PipelineConfig, TransformConfig};
use metrics::gauge;
use tokio::sync::watch;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::container::{Output, Source};
use crate::error::{ErrorKind, PipelineError, PipelineResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{COORDINATOR_BEFORE_ENQUEUE, pipeline_fail_point};
use crate::metrics::{PIPELINE_ACTIVE_WORKERS, TRANSFORM_LABEL};
use crate::queue::{Task, WorkMessage, WorkTx, queue_capacity, result_queue, work_queue};
use crate::transform::TransformRegistry;
use crate::types::{Schema, SequenceId, Stats};
use crate::workers::base::Worker;
use crate::workers::pool::TransformWorkerPool;
use crate::workers::transform::{TransformWorker, TransformWorkerHandle};
use crate::workers::writer::{WriterWorker, WriterWorkerHandle};
use crate::{bail, pipeline_error};

/// Time given to the writer to report its error once a worker saw the result queue close.
const WRITER_ERROR_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started {
        pool: TransformWorkerPool,
        writer: WriterWorkerHandle,
        work_tx: WorkTx,
    },
}

/// One run over one input and one output.
#[derive(Debug)]
pub struct Pipeline<S, O> {
    config: Arc<PipelineConfig>,
    transform_config: TransformConfig,
    registry: Arc<TransformRegistry>,
    source: S,
    output: O,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
    // Subscribed on creation, so a shutdown sent before `wait` is not missed.
    shutdown_rx: ShutdownRx,
    progress_tx: Arc<watch::Sender<Stats>>,
}

impl<S, O> Pipeline<S, O>
where
    S: Source,
    O: Output,
{
    pub fn new(
        config: PipelineConfig,
        transform_config: TransformConfig,
        registry: TransformRegistry,
        source: S,
        output: O,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let (progress_tx, _) = watch::channel(Stats::default());

        Self {
            config: Arc::new(config),
            transform_config,
            registry: Arc::new(registry),
            source,
            output,
            state: PipelineState::NotStarted,
            shutdown_tx,
            shutdown_rx,
            progress_tx: Arc::new(progress_tx),
        }
    }

    /// Replaces the shutdown channel with one shared by several pipelines.
    ///
    /// Only shutdowns sent after this call interrupt the run.
    pub fn with_shutdown_tx(mut self, shutdown_tx: ShutdownTx) -> Self {
        self.shutdown_rx = shutdown_tx.subscribe();
        self.shutdown_tx = shutdown_tx;
        self
    }

    /// Returns a transmitter which interrupts the run when used.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Subscribes to the progress snapshots published by the writer.
    pub fn subscribe_progress(&self) -> watch::Receiver<Stats> {
        self.progress_tx.subscribe()
    }

    /// Spawns the transform workers and the writer.
    ///
    /// Fails with [`ErrorKind::WorkerStartupFailure`] naming the failed workers when any of
    /// them cannot build its transform within the startup grace period. In that case no
    /// record is read and the output is never created.
    pub async fn start(&mut self) -> PipelineResult<()> {
        if !matches!(self.state, PipelineState::NotStarted) {
            bail!(ErrorKind::InvalidState, "Pipeline was already started");
        }

        self.config.validate()?;
        self.registry.check(&self.transform_config)?;

        let workers = self.config.workers;
        let capacity = self
            .config
            .queue_capacity
            .unwrap_or_else(|| queue_capacity(workers));

        info!(
            workers,
            capacity,
            transform = %self.transform_config,
            ordering = ?self.config.ordering,
            "starting pipeline"
        );

        let (work_tx, work_rx) = work_queue(capacity);
        let (result_tx, result_rx) = result_queue(capacity);
        let pool = TransformWorkerPool::new();

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let handle = TransformWorker::new(
                worker_id,
                self.registry.clone(),
                self.transform_config.clone(),
                work_rx.clone(),
                result_tx.clone(),
                pool.clone(),
            )
            .start()
            .await?;

            handles.push(handle);
        }

        // Workers hold the only senders, so the writer notices if all of them vanish.
        drop(result_tx);

        let schema = match self.wait_workers_ready(&mut handles).await {
            Ok(schema) => schema,
            Err(err) => {
                pool.shutdown(self.config.shutdown_grace()).await;
                return Err(err);
            }
        };

        let output_writer = match self.output.create(&schema).await {
            Ok(output_writer) => output_writer,
            Err(err) => {
                error!(error = %err, "failed to create the output");
                pool.shutdown(self.config.shutdown_grace()).await;
                self.delete_output().await;
                return Err(err);
            }
        };

        let writer = WriterWorker::new(
            workers,
            result_rx,
            output_writer,
            self.config.ordering,
            self.config.progress_interval,
            self.progress_tx.clone(),
            self.transform_config.to_string(),
        )
        .start()
        .await?;

        self.set_active_workers(workers);
        self.state = PipelineState::Started {
            pool,
            writer,
            work_tx,
        };

        Ok(())
    }

    /// Streams the input through the workers and waits for the run to complete.
    ///
    /// On success returns the final [`Stats`] of the writer. On interruption returns
    /// [`ErrorKind::Interrupted`] after aborting all tasks and deleting the partial
    /// output. Worker crashes, writer failures and input read failures are cleaned up the
    /// same way.
    pub async fn wait(mut self) -> PipelineResult<Stats> {
        let PipelineState::Started {
            pool,
            mut writer,
            work_tx,
        } = std::mem::replace(&mut self.state, PipelineState::NotStarted)
        else {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline was not started",
                "`start` must complete before `wait`"
            );
        };

        let result = self.drive(&pool, &mut writer, work_tx).await;
        let result = match result {
            Ok(stats) => {
                info!(%stats, "pipeline completed");
                Ok(stats)
            }
            Err(err) => {
                self.abort_run(&pool, &mut writer, &err).await;
                Err(err)
            }
        };

        self.set_active_workers(0);

        result
    }

    /// Starts the pipeline and waits for it to complete.
    pub async fn run(mut self) -> PipelineResult<Stats> {
        self.start().await?;
        self.wait().await
    }

    /// Requests the run to stop. The pending [`Pipeline::wait`] returns
    /// [`ErrorKind::Interrupted`].
    pub fn shutdown(&self) {
        info!("trying to shut down the pipeline");

        if let Err(err) = self.shutdown_tx.shutdown() {
            error!("failed to send shutdown signal to the pipeline: {}", err);
            return;
        }

        info!("shut down signal successfully sent");
    }

    pub async fn shutdown_and_wait(self) -> PipelineResult<Stats> {
        self.shutdown();
        self.wait().await
    }

    async fn wait_workers_ready(
        &self,
        handles: &mut [TransformWorkerHandle],
    ) -> PipelineResult<Schema> {
        let grace = self.config.startup_grace();
        let deadline = Instant::now() + grace;

        let mut schema = None;
        let mut failed = Vec::new();
        let mut errors = Vec::new();

        for handle in handles.iter_mut() {
            let worker_id = handle.worker_id();
            match timeout_at(deadline, handle.wait_ready()).await {
                Ok(Ok(worker_schema)) => {
                    schema.get_or_insert(worker_schema);
                }
                Ok(Err(err)) => {
                    failed.push(worker_id);
                    errors.push(err);
                }
                Err(_) => {
                    failed.push(worker_id);
                    errors.push(pipeline_error!(
                        ErrorKind::WorkerStartupFailure,
                        "Transform worker did not become ready in time",
                        format!("worker {worker_id} after {grace:?}")
                    ));
                }
            }
        }

        if !failed.is_empty() {
            let failed = failed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            error!(failed_workers = %failed, "transform workers failed to start");

            bail!(
                ErrorKind::WorkerStartupFailure,
                "Transform workers failed to start",
                format!("failed workers: [{failed}]"),
                source: PipelineError::from(errors)
            );
        }

        schema.ok_or_else(|| {
            pipeline_error!(ErrorKind::InvalidState, "No transform worker reported ready")
        })
    }

    async fn drive(
        &mut self,
        pool: &TransformWorkerPool,
        writer: &mut WriterWorkerHandle,
        work_tx: WorkTx,
    ) -> PipelineResult<Stats> {
        let workers = self.config.workers;
        let writer_done = pin!(writer.join());
        let mut supervisor = Supervisor {
            shutdown_rx: self.shutdown_rx.clone(),
            writer: writer_done,
            writer_stats: None,
            pool,
            stopping: false,
            stopped_workers: 0,
        };

        let mut sequence_id: SequenceId = 0;
        loop {
            let record = supervisor
                .run(self.source.next_record())
                .await?
                .map_err(|err| input_read_failed(err, sequence_id))?;

            let Some(record) = record else {
                break;
            };

            #[cfg(feature = "failpoints")]
            pipeline_fail_point(COORDINATOR_BEFORE_ENQUEUE)?;

            let message = WorkMessage::Task(Task {
                sequence_id,
                record,
            });
            supervisor
                .run(work_tx.send(message))
                .await?
                .map_err(|_| work_queue_closed())?;

            sequence_id += 1;
        }

        debug!(records = sequence_id, "input exhausted, stopping workers");

        supervisor.stopping = true;
        for _ in 0..workers {
            supervisor
                .run(work_tx.send(WorkMessage::Stop))
                .await?
                .map_err(|_| work_queue_closed())?;
        }
        drop(work_tx);

        supervisor.join_workers(workers).await?;
        debug!("all transform workers stopped, waiting for the writer");

        supervisor.writer_stats().await
    }

    async fn abort_run(
        &self,
        pool: &TransformWorkerPool,
        writer: &mut WriterWorkerHandle,
        err: &PipelineError,
    ) {
        if err.kind() == ErrorKind::Interrupted {
            info!("pipeline interrupted, aborting workers");
        } else {
            error!(error = %err, "pipeline failed, aborting workers");
        }

        let grace = self.config.shutdown_grace();

        writer.abort();
        pool.shutdown(grace).await;
        if timeout(grace, writer.join()).await.is_err() {
            warn!("writer did not stop within the grace period");
        }

        self.delete_output().await;
    }

    /// Deletes the output, logging instead of failing so the original error is kept.
    async fn delete_output(&self) {
        match self.output.delete().await {
            Ok(()) => info!("partial output deleted"),
            Err(err) => warn!(error = %err, "failed to delete partial output"),
        }
    }

    fn set_active_workers(&self, workers: usize) {
        gauge!(PIPELINE_ACTIVE_WORKERS, TRANSFORM_LABEL => self.transform_config.to_string())
            .set(workers as f64);
    }
}

/// Watches everything that can end a run while the coordinator waits on one operation.
struct Supervisor<'a, F> {
    shutdown_rx: ShutdownRx,
    writer: Pin<&'a mut F>,
    writer_stats: Option<Stats>,
    pool: &'a TransformWorkerPool,
    /// Set once stop messages are being sent, from then on workers may end normally.
    stopping: bool,
    stopped_workers: usize,
}

impl<F> Supervisor<'_, F>
where
    F: Future<Output = PipelineResult<Stats>>,
{
    /// Completes `operation` unless the run is interrupted or a worker or the writer ends
    /// abnormally first.
    async fn run<T>(&mut self, operation: impl Future<Output = T>) -> PipelineResult<T> {
        let mut operation = pin!(operation);

        loop {
            tokio::select! {
                biased;

                Ok(()) = self.shutdown_rx.changed() => {
                    bail!(ErrorKind::Interrupted, "Pipeline run was interrupted");
                }
                result = self.writer.as_mut(), if self.writer_stats.is_none() => {
                    self.writer_done(result)?;
                }
                Some((worker_id, result)) = self.pool.join_next() => {
                    self.worker_exited(worker_id, result).await?;
                }
                value = &mut operation => return Ok(value),
            }
        }
    }

    fn writer_done(&mut self, result: PipelineResult<Stats>) -> PipelineResult<()> {
        let stats = result?;
        if !self.stopping {
            bail!(
                ErrorKind::WriterFailure,
                "Writer stopped before the input was exhausted"
            );
        }
        self.writer_stats = Some(stats);

        Ok(())
    }

    /// Counts a worker that ended after its stop message, any other exit fails the run.
    async fn worker_exited(
        &mut self,
        worker_id: usize,
        result: PipelineResult<()>,
    ) -> PipelineResult<()> {
        match result {
            Ok(()) if self.stopping => {
                self.stopped_workers += 1;
                debug!(worker_id, "transform worker stopped");
                Ok(())
            }
            result => Err(self.worker_exit_error(worker_id, result).await),
        }
    }

    /// Builds the error for a worker that ended while it was still needed.
    ///
    /// Workers fail with [`ErrorKind::WriterFailure`] once the result queue is closed, in
    /// which case the writer's own error is returned if it arrives in time.
    async fn worker_exit_error(
        &mut self,
        worker_id: usize,
        result: PipelineResult<()>,
    ) -> PipelineError {
        let err = early_exit(worker_id, result);
        if err.kind() != ErrorKind::WriterFailure || self.writer_stats.is_some() {
            return err;
        }

        match timeout(WRITER_ERROR_GRACE, self.writer.as_mut()).await {
            Ok(Err(writer_err)) => writer_err,
            _ => err,
        }
    }

    /// Waits until `workers` workers have ended normally.
    ///
    /// Some of them may already have been counted while stop messages were sent.
    async fn join_workers(&mut self, workers: usize) -> PipelineResult<()> {
        while self.stopped_workers < workers {
            tokio::select! {
                biased;

                Ok(()) = self.shutdown_rx.changed() => {
                    bail!(ErrorKind::Interrupted, "Pipeline run was interrupted");
                }
                result = self.writer.as_mut(), if self.writer_stats.is_none() => {
                    self.writer_done(result)?;
                }
                joined = self.pool.join_next() => match joined {
                    Some((worker_id, result)) => self.worker_exited(worker_id, result).await?,
                    None => bail!(
                        ErrorKind::WorkerCrash,
                        "Transform workers are missing from the pool",
                        format!("{} of {workers} workers stopped", self.stopped_workers)
                    ),
                },
            }
        }

        Ok(())
    }

    async fn writer_stats(&mut self) -> PipelineResult<Stats> {
        if let Some(stats) = self.writer_stats.take() {
            return Ok(stats);
        }

        tokio::select! {
            biased;

            Ok(()) = self.shutdown_rx.changed() => {
                bail!(ErrorKind::Interrupted, "Pipeline run was interrupted")
            }
            result = self.writer.as_mut() => result,
        }
    }
}

/// Error for a worker that ended while the coordinator still needed it.
fn early_exit(worker_id: usize, result: PipelineResult<()>) -> PipelineError {
    match result {
        Err(err) if matches!(err.kind(), ErrorKind::WorkerCrash | ErrorKind::WriterFailure) => err,
        Err(err) => pipeline_error!(
            ErrorKind::WorkerCrash,
            "Transform worker failed during the run",
            format!("worker {worker_id}"),
            source: err
        ),
        Ok(()) => pipeline_error!(
            ErrorKind::WorkerCrash,
            "Transform worker stopped before the input was exhausted",
            format!("worker {worker_id}")
        ),
    }
}

fn input_read_failed(err: PipelineError, records: SequenceId) -> PipelineError {
    if err.kind() == ErrorKind::InputReadFailed {
        return err;
    }

    pipeline_error!(
        ErrorKind::InputReadFailed,
        "Failed to read the next input record",
        format!("after {records} records"),
        source: err
    )
}

fn work_queue_closed() -> PipelineError {
    pipeline_error!(
        ErrorKind::WorkerCrash,
        "Work queue closed while the coordinator was sending"
    )
}
