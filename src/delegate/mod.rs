//! Resource processing delegate boundary.
//!
//! # Data Flow
//! ```text
//! [dispatch] selects delegate id
//!     → registry.rs (id → factory, populated at startup)
//!     → Arc<dyn ResourceDelegate>
//!
//! Per request:
//!     reload-cache  → reload_cache()
//!     reload-model  → reload_model()
//!     normal        → process(&mut RequestContext) → Body
//! ```
//!
//! # Design Decisions
//! - The delegate owns caching, grouping and transformation of resources;
//!   this crate only decides when to call it
//! - Scheduling hooks are an optional capability, discovered through
//!   `scheduling()` instead of a downcast
//! - Delegates that cache may report cache changes through a listener, so
//!   the published Last-Modified/Expires follow the artifacts

pub mod bundle;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use thiserror::Error;

use crate::http::context::RequestContext;

pub use bundle::BundleDelegate;
pub use registry::{DelegateFactory, DelegateRegistry, DEFAULT_DELEGATE};

/// Called by a delegate whenever its cached artifacts change.
pub type CacheChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Errors raised by a delegate. Every one of them sends the request to
/// the next stage of the hosting pipeline.
#[derive(Debug, Error)]
pub enum DelegateError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid model: {0}")]
    Model(String),

    #[error("{0}")]
    Other(String),
}

/// The operations the dispatcher needs from a resource pipeline.
#[async_trait]
pub trait ResourceDelegate: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Drop every cached artifact.
    async fn reload_cache(&self) -> Result<(), DelegateError>;

    /// Re-read the resource model.
    async fn reload_model(&self) -> Result<(), DelegateError>;

    /// Resolve the request into a response body.
    ///
    /// Headers and status may be adjusted through `ctx.response_mut()`.
    async fn process(&self, ctx: &mut RequestContext) -> Result<Body, DelegateError>;

    /// Scheduling capability, if the delegate refreshes on its own.
    fn scheduling(&self) -> Option<&dyn SchedulingHooks> {
        None
    }

    /// Register a listener for cache changes. Delegates without a cache
    /// ignore it.
    fn on_cache_change(&self, _listener: CacheChangeListener) {}

    /// Release everything the delegate holds. Called once at shutdown.
    fn destroy(&self) {}
}

/// Implemented by delegates that adjust internal scheduling when refresh
/// periods change at runtime.
pub trait SchedulingHooks: Send + Sync {
    fn on_cache_period_changed(&self, period: Duration);

    fn on_model_period_changed(&self, period: Duration);
}
