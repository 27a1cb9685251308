//! Concurrency primitives shared by the coordinator and its workers.

pub mod shutdown;
