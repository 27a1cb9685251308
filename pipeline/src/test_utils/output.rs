use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::container::memory::MemoryOutputWriter;
use crate::container::{MemoryOutput, Output, OutputWriter};
use crate::error::PipelineResult;
use crate::test_utils::notify::TimedNotify;
use crate::types::{Record, Schema};

#[derive(Debug, Default)]
struct Conditions {
    written: usize,
    waiting: Vec<(usize, Arc<Notify>)>,
}

/// [`MemoryOutput`] that notifies once a number of records was written.
#[derive(Debug, Clone, Default)]
pub struct NotifyingOutput {
    output: MemoryOutput,
    conditions: Arc<Mutex<Conditions>>,
}

impl NotifyingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wrapped output, sharing its storage.
    pub fn inner(&self) -> &MemoryOutput {
        &self.output
    }

    pub async fn records(&self) -> Vec<Record> {
        self.output.records().await
    }

    /// Returns a notification fired once at least `count` records were written.
    pub async fn notify_on_records(&self, count: usize) -> TimedNotify {
        let notify = Arc::new(Notify::new());

        let mut conditions = self.conditions.lock().await;
        if conditions.written >= count {
            notify.notify_one();
        } else {
            conditions.waiting.push((count, notify.clone()));
        }

        TimedNotify::new(notify)
    }
}

impl Output for NotifyingOutput {
    type Writer = NotifyingOutputWriter;

    async fn create(&self, schema: &Schema) -> PipelineResult<Self::Writer> {
        let writer = self.output.create(schema).await?;

        Ok(NotifyingOutputWriter {
            writer,
            conditions: self.conditions.clone(),
        })
    }

    async fn delete(&self) -> PipelineResult<()> {
        self.output.delete().await
    }

    async fn exists(&self) -> PipelineResult<bool> {
        self.output.exists().await
    }
}

/// Writer half of a [`NotifyingOutput`].
#[derive(Debug)]
pub struct NotifyingOutputWriter {
    writer: MemoryOutputWriter,
    conditions: Arc<Mutex<Conditions>>,
}

impl OutputWriter for NotifyingOutputWriter {
    async fn append(&mut self, record: Record) -> PipelineResult<()> {
        self.writer.append(record).await?;

        let mut conditions = self.conditions.lock().await;
        conditions.written += 1;

        let written = conditions.written;
        conditions.waiting.retain(|(count, notify)| {
            if written >= *count {
                notify.notify_one();
                false
            } else {
                true
            }
        });

        Ok(())
    }

    async fn finish(self) -> PipelineResult<()> {
        self.writer.finish().await
    }
}
