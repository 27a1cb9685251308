//! Helpers for testing pipelines, enabled with the `test-utils` feature.
//!
//! - [`transforms`] registers canned transforms (doubling, failing, slow, panicking and a
//!   transform that cannot be built) under stable names.
//! - [`output`] wraps a memory output with notifications on written record counts.
//! - [`notify`] bounds every wait so a broken test fails instead of hanging.
//! - [`pipeline`] builds pipelines with test-friendly configuration.
//! - [`source`] counts the records a pipeline pulled from its input.

#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod records;
pub mod source;
pub mod transforms;
