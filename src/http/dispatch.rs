//! Request classification and the dispatch middleware.
//!
//! # Responsibilities
//! - Classify each request as reload-cache, reload-model or normal processing
//! - Run the control-plane action or apply headers and call the delegate
//! - Route every failure to the pass-through fallback
//!
//! # Design Decisions
//! - Control-plane calls exist only in debug mode
//! - Matching is case-insensitive; by default the token may appear anywhere
//!   in the path (see [`ControlMatch`])
//! - Reload-cache is checked before reload-model

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::FutureExt;

use crate::config::ControlMatch;
use crate::delegate::DelegateError;
use crate::headers::policy;
use crate::http::context::{self, ContextScope, RequestContext};
use crate::http::fallback::{self, Failure};
use crate::http::request::request_id;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Path segment introducing the control-plane API.
pub const PATH_API: &str = "wroAPI";
pub const API_RELOAD_CACHE: &str = "wroAPI/reloadCache";
pub const API_RELOAD_MODEL: &str = "wroAPI/reloadModel";

/// What a request is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    ReloadCache,
    ReloadModel,
    Process,
}

impl Dispatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dispatch::ReloadCache => "reload_cache",
            Dispatch::ReloadModel => "reload_model",
            Dispatch::Process => "process",
        }
    }
}

/// Emitted after a normal-processing request completed successfully.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub request_id: String,
    pub path: String,
    pub status: StatusCode,
}

/// Whether `path` addresses the control-plane call `token`.
pub fn matches_api(path: &str, token: &str, mode: ControlMatch) -> bool {
    let path = path.to_ascii_lowercase();
    let token = token.to_ascii_lowercase();
    match mode {
        ControlMatch::Substring => path.contains(&token),
        ControlMatch::Suffix => path.strip_suffix('/').unwrap_or(&path).ends_with(&token),
    }
}

/// Decide how to handle a request.
pub fn classify(path: &str, debug: bool, mode: ControlMatch) -> Dispatch {
    if debug && matches_api(path, API_RELOAD_CACHE, mode) {
        Dispatch::ReloadCache
    } else if debug && matches_api(path, API_RELOAD_MODEL, mode) {
        Dispatch::ReloadModel
    } else {
        Dispatch::Process
    }
}

/// Middleware entry point. Never fails: every error becomes a pass-through.
pub async fn dispatch_middleware(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let request_id = request_id(request.headers());
    let scope = state.contexts.enter(request, state.store.snapshot(), request_id);
    let info = scope.context().info();

    context::scope(info, handle(state, scope, next, start)).await
}

async fn handle(state: AppState, mut scope: ContextScope, next: Next, start: Instant) -> Response {
    let kind = {
        let ctx = scope.context();
        classify(ctx.path(), ctx.config().debug, state.control_match)
    };
    tracing::debug!(
        request_id = %scope.context().request_id(),
        path = %scope.context().path(),
        kind = kind.as_str(),
        "Dispatching request"
    );

    let outcome = AssertUnwindSafe(run(&state, kind, scope.context_mut()))
        .catch_unwind()
        .await;
    let ctx = scope.exit();

    match outcome {
        Ok(Ok(body)) => {
            let request_id = ctx.request_id().to_string();
            let path = ctx.path().to_string();
            let (_, head) = ctx.into_parts();
            let response = head.into_response(body);
            metrics::record_request(kind.as_str(), response.status().as_u16(), start);
            if kind == Dispatch::Process {
                state.notify_processed(ProcessedEvent {
                    request_id,
                    path,
                    status: response.status(),
                });
            }
            response
        }
        Ok(Err(e)) => fallback::pass_through(ctx, Failure::Delegate(e), next).await,
        Err(payload) => fallback::pass_through(ctx, Failure::from_panic(payload), next).await,
    }
}

async fn run(state: &AppState, kind: Dispatch, ctx: &mut RequestContext) -> Result<Body, DelegateError> {
    match kind {
        Dispatch::ReloadCache => {
            tracing::info!(request_id = %ctx.request_id(), "Reloading cache");
            state.delegate.reload_cache().await?;
            control_plane_done(ctx);
            Ok(Body::empty())
        }
        Dispatch::ReloadModel => {
            tracing::info!(request_id = %ctx.request_id(), "Reloading model");
            state.delegate.reload_model().await?;
            control_plane_done(ctx);
            Ok(Body::empty())
        }
        Dispatch::Process => {
            let headers = state.headers.current();
            policy::apply(&mut ctx.response_mut().headers, &headers);
            state.delegate.process(ctx).await
        }
    }
}

fn control_plane_done(ctx: &mut RequestContext) {
    let head = ctx.response_mut();
    policy::apply_no_cache(&mut head.headers);
    head.status = StatusCode::OK;
}
