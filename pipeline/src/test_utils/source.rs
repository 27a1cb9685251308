use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::container::{MemorySource, Source};
use crate::error::PipelineResult;
use crate::types::Record;

/// Memory source counting how many records were pulled from it.
///
/// The counter is shared, so a test keeps a [`CountingSource::pulled`] handle while the
/// pipeline owns the source.
#[derive(Debug)]
pub struct CountingSource {
    inner: MemorySource,
    pulled: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            inner: MemorySource::new(records),
            pulled: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pulled(&self) -> PulledRecords {
        PulledRecords(self.pulled.clone())
    }
}

impl Source for CountingSource {
    async fn next_record(&mut self) -> PipelineResult<Option<Record>> {
        let record = self.inner.next_record().await?;
        if record.is_some() {
            self.pulled.fetch_add(1, Ordering::SeqCst);
        }

        Ok(record)
    }
}

/// Read side of the counter of a [`CountingSource`].
#[derive(Debug, Clone)]
pub struct PulledRecords(Arc<AtomicUsize>);

impl PulledRecords {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
