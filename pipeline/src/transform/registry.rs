use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use config::shared::TransformConfig;

use crate::bail;
use crate::error::{ErrorKind, PipelineResult};
use crate::transform::{IdentityTransform, ScriptTransform, Transform};

/// Builds a fresh transform instance.
///
/// Factories run on a worker's blocking thread, so they may perform expensive setup.
pub type TransformFactory = Arc<dyn Fn() -> PipelineResult<Arc<dyn Transform>> + Send + Sync>;

/// Named transform factories.
///
/// The coordinator resolves a [`TransformConfig`] against the registry up front, so that
/// an unknown name fails the run before any worker is spawned. Each worker then builds
/// its own instance from the same configuration.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    factories: BTreeMap<String, TransformFactory>,
}

impl TransformRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the transforms shipped with the crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(IdentityTransform::NAME, || Ok(Arc::new(IdentityTransform)));

        registry
    }

    /// Registers `factory` under `name`, replacing any previous factory with that name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> PipelineResult<Arc<dyn Transform>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Returns the registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Verifies that `config` refers to something this registry can build.
    ///
    /// Scripts are only loaded by the workers, so their path and entry point are checked
    /// there.
    pub fn check(&self, config: &TransformConfig) -> PipelineResult<()> {
        match config {
            TransformConfig::Builtin { name } => self.factory(name).map(|_| ()),
            TransformConfig::Script { .. } => Ok(()),
        }
    }

    /// Builds a new transform instance for `config`.
    pub fn build(&self, config: &TransformConfig) -> PipelineResult<Arc<dyn Transform>> {
        match config {
            TransformConfig::Builtin { name } => (self.factory(name)?)(),
            TransformConfig::Script { path, entry_point } => {
                Ok(Arc::new(ScriptTransform::load(path, entry_point)?))
            }
        }
    }

    fn factory(&self, name: &str) -> PipelineResult<&TransformFactory> {
        let Some(factory) = self.factories.get(name) else {
            bail!(
                ErrorKind::UnknownTransform,
                "Unknown transform",
                format!(
                    "`{name}` is not registered, available transforms: {}",
                    self.names().collect::<Vec<_>>().join(", ")
                )
            );
        };

        Ok(factory)
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::types::Record;

    use super::*;

    #[test]
    fn builds_registered_transforms() {
        let registry = TransformRegistry::with_builtins();
        let config = TransformConfig::builtin(IdentityTransform::NAME);

        registry.check(&config).unwrap();
        let transform = registry.build(&config).unwrap();

        let outputs = transform
            .transform(Record::new().with("id", 1))
            .collect::<PipelineResult<Vec<_>>>()
            .unwrap();
        assert_eq!(outputs, vec![Record::new().with("id", 1)]);
    }

    #[test]
    fn unknown_names_list_the_registered_ones() {
        let mut registry = TransformRegistry::with_builtins();
        registry.register("upper", || Ok(Arc::new(IdentityTransform)));

        let err = registry
            .check(&TransformConfig::builtin("lower"))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnknownTransform);
        assert_eq!(
            err.detail(),
            Some("`lower` is not registered, available transforms: identity, upper")
        );
    }

    #[test]
    fn factory_errors_surface_on_build() {
        let mut registry = TransformRegistry::new();
        registry.register("broken", || {
            bail!(ErrorKind::InvalidConfiguration, "Model weights are missing")
        });

        let config = TransformConfig::builtin("broken");

        assert!(registry.check(&config).is_ok());
        assert_eq!(
            registry.build(&config).err().map(|err| err.kind()),
            Some(ErrorKind::InvalidConfiguration)
        );
    }

    #[test]
    fn scripts_are_checked_lazily() {
        let registry = TransformRegistry::new();
        let config = TransformConfig::script("/does/not/exist.json", "products");

        assert!(registry.check(&config).is_ok());
        assert_eq!(
            registry.build(&config).err().map(|err| err.kind()),
            Some(ErrorKind::InvalidConfiguration)
        );
    }
}
