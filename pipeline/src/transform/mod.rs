//! Per-record transformations.
//!
//! A [`Transform`] turns one input record into zero or more output records. Workers never
//! share a transform instance with the coordinator: each one builds its own from a
//! serializable [`config::shared::TransformConfig`] through the [`TransformRegistry`].

mod base;
mod identity;
mod registry;
pub mod script;

pub use base::{RecordIter, Transform};
pub use identity::IdentityTransform;
pub use registry::{TransformFactory, TransformRegistry};
pub use script::ScriptTransform;
