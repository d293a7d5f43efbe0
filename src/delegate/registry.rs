//! Delegate lookup by identifier.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ConfigError, DispatchConfig};
use crate::delegate::{BundleDelegate, DelegateError, ResourceDelegate};

/// Identifier used when the configuration names no delegate.
pub const DEFAULT_DELEGATE: &str = "bundle";

pub type DelegateFactory =
    Arc<dyn Fn(&DispatchConfig) -> Result<Arc<dyn ResourceDelegate>, DelegateError> + Send + Sync>;

/// Mapping from identifier to delegate factory, filled at startup.
#[derive(Clone, Default)]
pub struct DelegateRegistry {
    factories: HashMap<String, DelegateFactory>,
}

impl DelegateRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the delegates shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_DELEGATE, |config: &DispatchConfig| {
            Ok(Arc::new(BundleDelegate::from_config(config)) as Arc<dyn ResourceDelegate>)
        });
        registry
    }

    /// Register (or replace) a factory.
    pub fn register<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(&DispatchConfig) -> Result<Arc<dyn ResourceDelegate>, DelegateError> + Send + Sync + 'static,
    {
        self.factories.insert(id.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Build the delegate named by `config.dispatch.delegate`.
    pub fn create(&self, config: &DispatchConfig) -> Result<Arc<dyn ResourceDelegate>, ConfigError> {
        let id = match config.dispatch.delegate.trim() {
            "" => DEFAULT_DELEGATE,
            id => id,
        };
        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| ConfigError::UnknownDelegate(id.to_string()))?;

        let delegate = factory(config).map_err(|e| ConfigError::DelegateInit {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!(delegate = %delegate.name(), "Resource delegate created");
        Ok(delegate)
    }
}
