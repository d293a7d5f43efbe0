//! Pass-through on processing failure.
//!
//! When a request cannot be processed, this component produces no error
//! response of its own. The original request goes to the next stage of
//! the hosting pipeline, which answers as if the dispatcher were absent
//! (typically with its own 404). Response headers computed for the failed
//! attempt are discarded.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;

use crate::delegate::DelegateError;
use crate::http::context::RequestContext;
use crate::observability::metrics;

/// Why a request is being passed through.
#[derive(Debug)]
pub enum Failure {
    /// The delegate (or one of its hooks) returned an error.
    Delegate(DelegateError),
    /// Dispatch or the delegate panicked.
    Panic(String),
}

impl Failure {
    pub fn reason(&self) -> &'static str {
        match self {
            Failure::Delegate(_) => "delegate_error",
            Failure::Panic(_) => "panic",
        }
    }

    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Failure::Panic(panic_message(payload.as_ref()))
    }
}

/// Extract a printable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Hand the request to `next`. Never fails.
pub async fn pass_through(ctx: RequestContext, failure: Failure, next: Next) -> Response {
    match &failure {
        Failure::Delegate(e) => {
            tracing::debug!(request_id = %ctx.request_id(), error = %e, "Processing failed");
        }
        Failure::Panic(msg) => {
            tracing::error!(request_id = %ctx.request_id(), panic_message = %msg, "Processing panicked");
        }
    }
    metrics::record_fallback(failure.reason());

    let request_id = ctx.request_id().to_string();
    let (request, _discarded) = ctx.into_parts();
    tracing::debug!(request_id = %request_id, "Cannot process. Proceeding with chain execution.");

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            // Nothing downstream produced a response; this is the last resort.
            tracing::error!(
                request_id = %request_id,
                panic_message = %panic_message(payload.as_ref()),
                "Error while chaining the request"
            );
            metrics::record_fallback("chain_error");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
