//! Metric names emitted by the pipeline.
//!
//! The library only records values through the [`metrics`] facade; installing an exporter
//! is left to the embedding process.

/// Label carrying the transform identifier.
pub const TRANSFORM_LABEL: &str = "transform";

/// Counter of tasks taken off the work queue and accounted by the writer.
pub const PIPELINE_RECORDS_INPUT_TOTAL: &str = "pipeline_records_input_total";

/// Counter of records appended to the output.
pub const PIPELINE_RECORDS_OUTPUT_TOTAL: &str = "pipeline_records_output_total";

/// Counter of tasks whose transform failed.
pub const PIPELINE_RECORDS_ERROR_TOTAL: &str = "pipeline_records_error_total";

/// Gauge of transform workers currently running.
pub const PIPELINE_ACTIVE_WORKERS: &str = "pipeline_active_workers";
