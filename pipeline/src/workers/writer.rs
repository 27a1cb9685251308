use std::collections::BTreeMap;
use std::sync::Arc;

use config::shared::OutputOrdering;
use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

#[cfg(feature = "failpoints")]
use crate::failpoints::{WRITER_BEFORE_APPEND, pipeline_fail_point};

use crate::container::OutputWriter;
use crate::error::{ErrorKind, PipelineError, PipelineResult};
use crate::metrics::{
    PIPELINE_RECORDS_ERROR_TOTAL, PIPELINE_RECORDS_INPUT_TOTAL, PIPELINE_RECORDS_OUTPUT_TOTAL,
    TRANSFORM_LABEL,
};
use crate::queue::{ResultMessage, ResultRx};
use crate::types::{SequenceId, Stats};
use crate::workers::base::{Worker, WorkerHandle, WorkerType};
use crate::{bail, pipeline_error};

/// Handle to the spawned [`WriterWorker`].
#[derive(Debug)]
pub struct WriterWorkerHandle {
    handle: Option<JoinHandle<PipelineResult<Stats>>>,
    progress_rx: watch::Receiver<Stats>,
}

impl WriterWorkerHandle {
    /// Waits for the writer to complete, without consuming the handle.
    ///
    /// Cancel safe. Once the writer was joined, further calls fail with
    /// [`ErrorKind::InvalidState`].
    pub async fn join(&mut self) -> PipelineResult<Stats> {
        let Some(handle) = self.handle.as_mut() else {
            bail!(ErrorKind::InvalidState, "Writer was already joined");
        };

        let result = handle.await;
        self.handle = None;

        result.map_err(|err| {
            if err.is_cancelled() {
                pipeline_error!(ErrorKind::WriterFailure, "Writer was aborted", err)
            } else {
                pipeline_error!(ErrorKind::WriterFailure, "Writer panicked", err)
            }
        })?
    }

    /// Aborts the writer task at its next suspension point.
    pub fn abort(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

impl WorkerHandle<Stats> for WriterWorkerHandle {
    /// Returns the last progress snapshot.
    fn state(&self) -> Stats {
        *self.progress_rx.borrow()
    }

    async fn wait(mut self) -> PipelineResult<Stats> {
        self.join().await
    }
}

/// Single consumer of the result queue.
///
/// The writer is the only component appending to the output and the only one mutating
/// the run [`Stats`]. It stops once every transform worker has reported done, then
/// finishes the output.
#[derive(Debug)]
pub struct WriterWorker<W> {
    worker_count: usize,
    result_rx: ResultRx,
    writer: W,
    ordering: OutputOrdering,
    progress_interval: u64,
    progress_tx: Arc<watch::Sender<Stats>>,
    transform: String,
}

impl<W> WriterWorker<W>
where
    W: OutputWriter,
{
    pub fn new(
        worker_count: usize,
        result_rx: ResultRx,
        writer: W,
        ordering: OutputOrdering,
        progress_interval: u64,
        progress_tx: Arc<watch::Sender<Stats>>,
        transform: String,
    ) -> Self {
        Self {
            worker_count,
            result_rx,
            writer,
            ordering,
            progress_interval: progress_interval.max(1),
            progress_tx,
            transform,
        }
    }

    async fn run(mut self) -> PipelineResult<Stats> {
        let mut stats = Stats::default();
        let mut done_workers = 0;
        let mut reorder = ReorderBuffer::default();

        while done_workers < self.worker_count {
            let Some(message) = self.result_rx.recv().await else {
                bail!(
                    ErrorKind::WriterFailure,
                    "Result queue closed before every worker was done",
                    format!("{done_workers} of {} workers done", self.worker_count)
                );
            };

            match message {
                ResultMessage::WorkerDone { worker_id } => {
                    done_workers += 1;
                    debug!(worker_id, done_workers, "transform worker done");
                }
                message => match self.ordering {
                    OutputOrdering::Arrival => self.apply(message, &mut stats).await?,
                    OutputOrdering::Input => {
                        for message in reorder.push(message) {
                            self.apply(message, &mut stats).await?;
                        }
                    }
                },
            }
        }

        if !reorder.is_empty() {
            warn!(
                pending = reorder.len(),
                "results missing from the sequence, writing the remaining ones in order"
            );
            for message in reorder.drain() {
                self.apply(message, &mut stats).await?;
            }
        }

        self.writer.finish().await.map_err(writer_failure)?;
        self.progress_tx.send_replace(stats);

        info!(%stats, "writer completed");

        Ok(stats)
    }

    async fn apply(&mut self, message: ResultMessage, stats: &mut Stats) -> PipelineResult<()> {
        let delta = message.stats();

        match message {
            ResultMessage::Success { outputs, .. } => {
                #[cfg(feature = "failpoints")]
                pipeline_fail_point(WRITER_BEFORE_APPEND).map_err(writer_failure)?;

                for record in outputs {
                    self.writer.append(record).await.map_err(writer_failure)?;
                }
            }
            ResultMessage::Failure { sequence_id, error } => {
                error!(sequence_id, error = %error, "failed to transform record");
            }
            ResultMessage::WorkerDone { .. } => {}
        }

        *stats += delta;
        self.record_metrics(&delta);

        if stats.count_input % self.progress_interval == 0 {
            info!(
                input = stats.count_input,
                output = stats.count_output,
                error = stats.count_error,
                "progress"
            );
            self.progress_tx.send_replace(*stats);
        }

        Ok(())
    }

    fn record_metrics(&self, delta: &Stats) {
        let transform = self.transform.clone();
        counter!(PIPELINE_RECORDS_INPUT_TOTAL, TRANSFORM_LABEL => transform.clone())
            .increment(delta.count_input);
        counter!(PIPELINE_RECORDS_OUTPUT_TOTAL, TRANSFORM_LABEL => transform.clone())
            .increment(delta.count_output);
        counter!(PIPELINE_RECORDS_ERROR_TOTAL, TRANSFORM_LABEL => transform)
            .increment(delta.count_error);
    }
}

impl<W> Worker<WriterWorkerHandle, Stats> for WriterWorker<W>
where
    W: OutputWriter,
{
    type Error = PipelineError;

    async fn start(self) -> Result<WriterWorkerHandle, Self::Error> {
        let progress_rx = self.progress_tx.subscribe();
        let span = tracing::info_span!(
            "writer",
            transform = %self.transform,
            workers = self.worker_count
        );

        let handle = tokio::spawn(self.run().instrument(span.or_current()));
        debug!(worker = %WorkerType::Writer, "worker started");

        Ok(WriterWorkerHandle {
            handle: Some(handle),
            progress_rx,
        })
    }
}

fn writer_failure(err: PipelineError) -> PipelineError {
    let detail = match err.detail() {
        Some(detail) => format!("{}: {detail}", err.description()),
        None => err.description().to_string(),
    };

    pipeline_error!(
        ErrorKind::WriterFailure,
        "Writer failed to write the output",
        detail,
        source: err
    )
}

/// Buffers results arriving out of order and releases them in sequence order.
#[derive(Debug, Default)]
struct ReorderBuffer {
    next: SequenceId,
    pending: BTreeMap<SequenceId, ResultMessage>,
}

impl ReorderBuffer {
    /// Adds a result and returns every result that is now in order.
    fn push(&mut self, message: ResultMessage) -> Vec<ResultMessage> {
        let Some(sequence_id) = message.sequence_id() else {
            return vec![message];
        };
        self.pending.insert(sequence_id, message);

        let mut ready = Vec::new();
        while let Some(message) = self.pending.remove(&self.next) {
            ready.push(message);
            self.next += 1;
        }

        ready
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn drain(&mut self) -> impl Iterator<Item = ResultMessage> + '_ {
        std::mem::take(&mut self.pending).into_values()
    }
}
