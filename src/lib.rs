//! Resource dispatcher for a web hosting pipeline.
//!
//! Sits in front of the pipeline's next stage, answers control-plane
//! reload calls in debug mode, applies the configured response headers and
//! hands resource requests to a pluggable delegate. Anything it cannot
//! process passes through untouched.

pub mod config;
pub mod delegate;
pub mod headers;
pub mod http;
pub mod lifecycle;
pub mod management;
pub mod observability;
pub mod transform;

pub use config::{ConfigStore, DispatchConfig};
pub use delegate::{DelegateRegistry, ResourceDelegate};
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
