use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Order in which the writer appends transformed records to the output.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OutputOrdering {
    /// Records are written as results arrive from workers.
    #[default]
    Arrival,
    /// Results are buffered and written in input sequence order.
    Input,
}

/// Configuration for a single pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Number of parallel transform workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Capacity of the work and result queues.
    ///
    /// When unset, the capacity is derived from the worker count.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// Number of processed tasks between two progress snapshots.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    /// Time, in milliseconds, workers have to report ready after being spawned.
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,
    /// Time, in milliseconds, aborted workers get to wind down before cleanup proceeds.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Output record ordering.
    #[serde(default)]
    pub ordering: OutputOrdering,
}

impl PipelineConfig {
    /// Default number of tasks between progress snapshots.
    pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1000;

    /// Default startup grace period in milliseconds.
    pub const DEFAULT_STARTUP_GRACE_MS: u64 = 500;

    /// Default shutdown grace period in milliseconds.
    pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 1000;

    /// Creates a configuration with defaults and the given worker count.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Validates pipeline configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::WorkersZero);
        }

        if self.queue_capacity == Some(0) {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.queue_capacity".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.progress_interval == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.progress_interval".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: None,
            progress_interval: default_progress_interval(),
            startup_grace_ms: default_startup_grace_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            ordering: OutputOrdering::default(),
        }
    }
}

/// Half of the available cores, with a floor of one worker.
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|cores| cores.get() / 2)
        .unwrap_or(1)
        .max(1)
}

fn default_progress_interval() -> u64 {
    PipelineConfig::DEFAULT_PROGRESS_INTERVAL
}

fn default_startup_grace_ms() -> u64 {
    PipelineConfig::DEFAULT_STARTUP_GRACE_MS
}

fn default_shutdown_grace_ms() -> u64 {
    PipelineConfig::DEFAULT_SHUTDOWN_GRACE_MS
}
