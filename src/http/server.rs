//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared [`AppState`] (store, header policy, delegate)
//! - Wire configuration observers to header recomputation and delegate scheduling
//! - Recompute headers when the delegate reports a cache change
//! - Layer the dispatcher in front of the hosting pipeline's next stage
//! - Wire up middleware (tracing, timeout, request ID)
//! - Serve until shutdown, applying reloaded configuration meanwhile

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::watcher::apply_updates;
use crate::config::{
    ConfigError, ConfigStore, ControlMatch, DispatchConfig, Field, FieldChange, FieldValue, NextStageConfig,
    ObserverError,
};
use crate::delegate::{DelegateRegistry, ResourceDelegate};
use crate::headers::{HeaderError, HeaderPolicy};
use crate::http::context::ContextTracker;
use crate::http::dispatch::{dispatch_middleware, ProcessedEvent};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Header configuration error: {0}")]
    Header(#[from] HeaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub headers: Arc<HeaderPolicy>,
    pub delegate: Arc<dyn ResourceDelegate>,
    pub contexts: Arc<ContextTracker>,
    pub control_match: ControlMatch,
    processed: broadcast::Sender<ProcessedEvent>,
}

impl AppState {
    /// Compute the initial header set and register the observers that keep
    /// it, and the delegate's scheduling, in step with the store.
    pub fn new(
        store: Arc<ConfigStore>,
        delegate: Arc<dyn ResourceDelegate>,
        control_match: ControlMatch,
    ) -> Result<Self, HeaderError> {
        let headers = Arc::new(HeaderPolicy::new(&store.snapshot())?);
        let (processed, _) = broadcast::channel(64);
        let state = Self {
            store,
            headers,
            delegate,
            contexts: Arc::new(ContextTracker::new()),
            control_match,
            processed,
        };
        state.register_observers();
        Ok(state)
    }

    fn register_observers(&self) {
        let store = Arc::downgrade(&self.store);
        let headers = self.headers.clone();
        let refresh_headers = move || -> Result<(), ObserverError> {
            let Some(store) = store.upgrade() else {
                return Ok(());
            };
            let set = headers.refresh_from(&store)?;
            tracing::debug!(generation = set.generation(), "Header values recomputed");
            Ok(())
        };

        let refresh = refresh_headers.clone();
        self.store
            .register_shared(&[Field::Debug, Field::Header], Arc::new(move |_: &FieldChange| refresh()));

        let refresh = refresh_headers.clone();
        self.delegate.on_cache_change(Arc::new(move || {
            if let Err(e) = refresh() {
                tracing::error!(error = %e, "Header recomputation after cache change failed");
            }
        }));

        let delegate = self.delegate.clone();
        self.store.register_shared(
            &[Field::CacheUpdatePeriod, Field::ModelUpdatePeriod],
            Arc::new(move |change: &FieldChange| {
                // Reset headers so browsers do not hold on to stale artifacts.
                refresh_headers()?;
                if let (Some(hooks), FieldValue::Period(period)) = (delegate.scheduling(), &change.new) {
                    match change.field {
                        Field::CacheUpdatePeriod => hooks.on_cache_period_changed(*period),
                        _ => hooks.on_model_period_changed(*period),
                    }
                }
                Ok(())
            }),
        );
        tracing::debug!("Cache, model and header change listeners were registered");
    }

    /// Subscribe to completed normal-processing requests.
    pub fn subscribe_processed(&self) -> broadcast::Receiver<ProcessedEvent> {
        self.processed.subscribe()
    }

    pub(crate) fn notify_processed(&self, event: ProcessedEvent) {
        // No subscribers is the common case.
        let _ = self.processed.send(event);
    }
}

/// Put the dispatcher in front of `next_stage`.
///
/// Anything the dispatcher passes through is answered by `next_stage`.
pub fn attach(next_stage: Router, state: AppState) -> Router {
    next_stage.layer(middleware::from_fn_with_state(state, dispatch_middleware))
}

/// The standalone next stage: a static directory, or a bare 404.
pub fn next_stage_router(config: &NextStageConfig) -> Router {
    match &config.static_dir {
        Some(dir) => Router::new().fallback_service(ServeDir::new(dir)),
        None => Router::new().fallback(not_found),
    }
}

async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

/// HTTP server for the dispatcher.
pub struct HttpServer {
    router: Router,
    config: DispatchConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a server using the built-in delegates.
    pub fn new(config: DispatchConfig) -> Result<Self, ServerError> {
        Self::with_registry(config, &DelegateRegistry::with_builtins())
    }

    /// Create a server, resolving the delegate through `registry`.
    pub fn with_registry(config: DispatchConfig, registry: &DelegateRegistry) -> Result<Self, ServerError> {
        let delegate = registry.create(&config)?;
        let store = Arc::new(ConfigStore::new(config.runtime.clone()));
        Self::from_parts(config, store, delegate)
    }

    /// Create a server around an existing store and delegate.
    pub fn from_parts(
        config: DispatchConfig,
        store: Arc<ConfigStore>,
        delegate: Arc<dyn ResourceDelegate>,
    ) -> Result<Self, ServerError> {
        let state = AppState::new(store, delegate, config.dispatch.control_match)?;
        let router = Self::build_router(&config, state.clone());
        Ok(Self { router, config, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DispatchConfig, state: AppState) -> Router {
        attach(next_stage_router(&config.next_stage), state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Reloaded configurations arriving on `updates` are applied to the
    /// store while serving.
    pub async fn run(
        self,
        listener: TcpListener,
        updates: mpsc::UnboundedReceiver<DispatchConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            delegate = %self.state.delegate.name(),
            "HTTP server starting"
        );

        tokio::spawn(apply_updates(self.state.store.clone(), updates, shutdown.resubscribe()));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        self.state.store.clear_observers();
        self.state.delegate.destroy();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// A clone of the fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}
