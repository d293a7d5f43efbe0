//! Management registration.
//!
//! # Responsibilities
//! - Register each configuration store under a computed name at startup
//! - Serve the registered stores over the admin HTTP surface
//!
//! # Design Decisions
//! - Registration is best-effort: failures are logged, serving carries on
//! - The admin surface has its own listener and bearer-token auth

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};
use dashmap::DashMap;
use thiserror::Error;

use crate::config::{ConfigStore, DispatchConfig};
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Errors from management registration and the admin surface.
#[derive(Debug, Error)]
pub enum ManagementError {
    #[error("A configuration is already registered as '{0}'")]
    AlreadyRegistered(String),

    #[error("No configuration registered as '{0}'")]
    NotFound(String),
}

/// Named configuration stores exposed to management.
#[derive(Default)]
pub struct ManagementRegistry {
    stores: DashMap<String, Arc<ConfigStore>>,
}

impl ManagementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, store: Arc<ConfigStore>) -> Result<(), ManagementError> {
        match self.stores.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ManagementError::AlreadyRegistered(name.to_string())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(store);
                Ok(())
            }
        }
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<ConfigStore>> {
        self.stores.remove(name).map(|(_, store)| store)
    }

    pub fn get(&self, name: &str) -> Result<Arc<ConfigStore>, ManagementError> {
        self.stores
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ManagementError::NotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

/// Name under which the configuration of a deployment is registered.
///
/// `[management].name` wins; otherwise `wro-` plus the context path without
/// its leading `/`, or `wro-ROOT` for the root context.
pub fn registration_name(config: &DispatchConfig) -> String {
    if let Some(name) = config.management.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    let context_path = config.dispatch.context_path.trim();
    let context_path = context_path.strip_prefix('/').unwrap_or(context_path);
    if context_path.is_empty() {
        "wro-ROOT".to_string()
    } else {
        format!("wro-{context_path}")
    }
}

/// Register `store` if management is enabled. Never fails the caller.
pub fn register_at_startup(
    registry: &ManagementRegistry,
    config: &DispatchConfig,
    store: Arc<ConfigStore>,
) -> Option<String> {
    if !store.snapshot().management_enabled {
        tracing::debug!("Management registration disabled");
        return None;
    }
    let name = registration_name(config);
    match registry.register(&name, store) {
        Ok(()) => {
            tracing::info!(name = %name, "Configuration registered for management");
            Some(name)
        }
        Err(e) => {
            tracing::error!(name = %name, error = %e, "Management registration failed");
            None
        }
    }
}

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<ManagementRegistry>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/configs", get(list_configs))
        .route("/admin/configs/{name}", get(get_config))
        .route("/admin/configs/{name}/{field}", put(set_field))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeSettings;

    #[test]
    fn test_registration_name() {
        let mut config = DispatchConfig::default();
        assert_eq!(registration_name(&config), "wro-ROOT");

        config.dispatch.context_path = "/shop".into();
        assert_eq!(registration_name(&config), "wro-shop");

        config.dispatch.context_path = "shop/v2".into();
        assert_eq!(registration_name(&config), "wro-shop/v2");

        config.management.name = Some("custom".into());
        assert_eq!(registration_name(&config), "custom");
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = ManagementRegistry::new();
        let store = Arc::new(ConfigStore::new(RuntimeSettings::default()));
        registry.register("wro-ROOT", store.clone()).unwrap();
        assert!(matches!(
            registry.register("wro-ROOT", store),
            Err(ManagementError::AlreadyRegistered(_))
        ));
        assert_eq!(registry.names(), vec!["wro-ROOT".to_string()]);
    }

    #[test]
    fn test_register_at_startup_is_best_effort() {
        let registry = ManagementRegistry::new();
        let config = DispatchConfig::default();
        let store = Arc::new(ConfigStore::new(RuntimeSettings::default()));

        assert_eq!(register_at_startup(&registry, &config, store.clone()).as_deref(), Some("wro-ROOT"));
        assert_eq!(register_at_startup(&registry, &config, store), None);
    }

    #[test]
    fn test_register_at_startup_respects_toggle() {
        let registry = ManagementRegistry::new();
        let settings = RuntimeSettings {
            management_enabled: false,
            ..RuntimeSettings::default()
        };
        let store = Arc::new(ConfigStore::new(settings));
        assert_eq!(register_at_startup(&registry, &DispatchConfig::default(), store), None);
        assert!(registry.names().is_empty());
    }
}
