use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::container::{Output, OutputWriter, Source};
use crate::error::PipelineResult;
use crate::types::{Record, Schema};

/// In-memory input, yielding the records it was built with.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: VecDeque<Record>,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl Source for MemorySource {
    async fn next_record(&mut self) -> PipelineResult<Option<Record>> {
        Ok(self.records.pop_front())
    }
}

#[derive(Debug, Default)]
struct Inner {
    schema: Option<Schema>,
    records: Vec<Record>,
    exists: bool,
    finished: bool,
}

/// In-memory output for tests and embedding.
///
/// Clones share the same storage, so a test keeps one clone to inspect what the pipeline
/// wrote through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the records written so far.
    pub async fn records(&self) -> Vec<Record> {
        self.inner.lock().await.records.clone()
    }

    /// Returns the schema declared on creation.
    pub async fn schema(&self) -> Option<Schema> {
        self.inner.lock().await.schema.clone()
    }

    /// Returns `true` once the writer was finished.
    pub async fn is_finished(&self) -> bool {
        self.inner.lock().await.finished
    }
}

impl Output for MemoryOutput {
    type Writer = MemoryOutputWriter;

    async fn create(&self, schema: &Schema) -> PipelineResult<Self::Writer> {
        let mut inner = self.inner.lock().await;
        *inner = Inner {
            schema: Some(schema.clone()),
            records: Vec::new(),
            exists: true,
            finished: false,
        };

        Ok(MemoryOutputWriter {
            inner: self.inner.clone(),
        })
    }

    async fn delete(&self) -> PipelineResult<()> {
        let mut inner = self.inner.lock().await;
        debug!(records = inner.records.len(), "deleting memory output");
        *inner = Inner::default();

        Ok(())
    }

    async fn exists(&self) -> PipelineResult<bool> {
        Ok(self.inner.lock().await.exists)
    }
}

/// Writer half of a [`MemoryOutput`].
#[derive(Debug)]
pub struct MemoryOutputWriter {
    inner: Arc<Mutex<Inner>>,
}

impl OutputWriter for MemoryOutputWriter {
    async fn append(&mut self, record: Record) -> PipelineResult<()> {
        self.inner.lock().await.records.push(record);

        Ok(())
    }

    async fn finish(self) -> PipelineResult<()> {
        self.inner.lock().await.finished = true;

        Ok(())
    }
}
