//! HTTP handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → request.rs (x-request-id)
//!     → dispatch.rs (enter context, classify)
//!         → control plane: delegate reload hook, no-cache headers, 200
//!         → processing: apply header set, delegate.process
//!         → failure: fallback.rs hands the request to the next stage
//!     → context.rs (exit context)
//!     → Send to client
//! ```

pub mod context;
pub mod dispatch;
pub mod fallback;
pub mod request;
pub mod server;

pub use context::{ContextTracker, RequestContext, RequestInfo, ResponseHead};
pub use dispatch::{Dispatch, ProcessedEvent, API_RELOAD_CACHE, API_RELOAD_MODEL};
pub use request::X_REQUEST_ID;
pub use server::{attach, AppState, HttpServer, ServerError};
