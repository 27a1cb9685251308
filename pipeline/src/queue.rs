//! Bounded channels connecting the coordinator, the transform workers and the writer.
//!
//! Every message is an explicit variant, so control messages can never be mistaken for a
//! payload. Both queues share one capacity, which is the only bound on memory growth: a
//! producer blocks on send once the queue is full.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::error::PipelineError;
use crate::types::{Record, SequenceId, Stats};

/// Lower bound of the queue capacity.
pub const MIN_QUEUE_CAPACITY: usize = 100;

/// Queue slots reserved per worker.
pub const QUEUE_SLOTS_PER_WORKER: usize = 10;

/// Default capacity of both queues for a run with `workers` workers.
pub fn queue_capacity(workers: usize) -> usize {
    MIN_QUEUE_CAPACITY.max(workers.saturating_mul(QUEUE_SLOTS_PER_WORKER))
}

/// A record tagged with its position in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub sequence_id: SequenceId,
    pub record: Record,
}

/// Message placed on the work queue.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkMessage {
    Task(Task),
    /// Tells the receiving worker to stop reading the queue.
    Stop,
}

/// Message placed on the result queue.
#[derive(Debug, Clone)]
pub enum ResultMessage {
    Success {
        sequence_id: SequenceId,
        outputs: Vec<Record>,
    },
    Failure {
        sequence_id: SequenceId,
        error: PipelineError,
    },
    /// Sent exactly once by every worker when it stops.
    WorkerDone { worker_id: usize },
}

impl ResultMessage {
    /// Contribution of this message to the run counters.
    pub fn stats(&self) -> Stats {
        match self {
            ResultMessage::Success { outputs, .. } => Stats::success(outputs.len()),
            ResultMessage::Failure { .. } => Stats::failure(),
            ResultMessage::WorkerDone { .. } => Stats::default(),
        }
    }

    /// Sequence id of the task this message reports on.
    pub fn sequence_id(&self) -> Option<SequenceId> {
        match self {
            ResultMessage::Success { sequence_id, .. }
            | ResultMessage::Failure { sequence_id, .. } => Some(*sequence_id),
            ResultMessage::WorkerDone { .. } => None,
        }
    }
}

pub type WorkTx = mpsc::Sender<WorkMessage>;

/// Receiving side of the work queue, shared by all workers.
///
/// Only one worker waits on the channel at a time. The others wait on the lock, which
/// keeps each message delivered to exactly one worker.
#[derive(Debug, Clone)]
pub struct WorkRx {
    inner: Arc<Mutex<mpsc::Receiver<WorkMessage>>>,
}

impl WorkRx {
    /// Receives the next message, or [`None`] once every sender is gone.
    pub async fn recv(&self) -> Option<WorkMessage> {
        self.inner.lock().await.recv().await
    }
}

pub type ResultTx = mpsc::Sender<ResultMessage>;

pub type ResultRx = mpsc::Receiver<ResultMessage>;

/// Creates the work queue.
pub fn work_queue(capacity: usize) -> (WorkTx, WorkRx) {
    let (tx, rx) = mpsc::channel(capacity);

    (
        tx,
        WorkRx {
            inner: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Creates the result queue.
pub fn result_queue(capacity: usize) -> (ResultTx, ResultRx) {
    mpsc::channel(capacity)
}
