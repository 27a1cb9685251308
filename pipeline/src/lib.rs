//! Bounded multi-worker record pipeline.
//!
//! A [`pipeline::Pipeline`] reads records from a [`container::Source`], fans them out to
//! parallel transform workers over a bounded queue and funnels every result through one
//! writer into a [`container::Output`]. The [`filter`] module provides the Bloom filter
//! and URL dedup helpers used to skip work recorded by earlier runs.

pub mod concurrency;
pub mod container;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod filter;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod queue;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transform;
pub mod types;
pub mod workers;
