//! Request-scoped context.
//!
//! # Responsibilities
//! - Bind the request, the response being built and the settings snapshot
//! - Expose a read-only view to code that is not handed the context
//! - Guarantee release on every exit path
//!
//! # Design Decisions
//! - The context is passed explicitly (`&mut RequestContext`) to the
//!   delegate; nothing shares it across tasks
//! - A task-local [`RequestInfo`] mirrors the identifying fields for
//!   collaborators further down the call stack
//! - [`ContextScope`] releases on drop, so early returns, errors and
//!   panics all close the scope exactly once

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;

use crate::config::RuntimeSettings;
use crate::observability::metrics;

tokio::task_local! {
    static CURRENT: RequestInfo;
}

/// Identifying fields of the request being handled by the current task.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub debug: bool,
}

/// The request being handled by the current task, if any.
pub fn current() -> Option<RequestInfo> {
    CURRENT.try_with(Clone::clone).ok()
}

/// Run `fut` with `info` bound as the current request.
pub async fn scope<F: Future>(info: RequestInfo, fut: F) -> F::Output {
    CURRENT.scope(info, fut).await
}

/// Status and headers of the response under construction.
#[derive(Debug, Default)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Combine with a body into a response.
    pub fn into_response(self, body: Body) -> Response {
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Everything one request's handling may touch.
#[derive(Debug)]
pub struct RequestContext {
    request: Request<Body>,
    response: ResponseHead,
    config: Arc<RuntimeSettings>,
    request_id: String,
}

impl RequestContext {
    pub fn new(request: Request<Body>, config: Arc<RuntimeSettings>, request_id: String) -> Self {
        Self {
            request,
            response: ResponseHead::default(),
            config,
            request_id,
        }
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    pub fn response(&self) -> &ResponseHead {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseHead {
        &mut self.response
    }

    /// Settings as they were when the request entered.
    pub fn config(&self) -> &RuntimeSettings {
        &self.config
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            request_id: self.request_id.clone(),
            method: self.request.method().clone(),
            path: self.path().to_string(),
            debug: self.config.debug,
        }
    }

    /// Give back the request and the response head.
    pub fn into_parts(self) -> (Request<Body>, ResponseHead) {
        (self.request, self.response)
    }
}

/// Counts open contexts; shared by every request of a server.
#[derive(Debug, Default)]
pub struct ContextTracker {
    active: AtomicUsize,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a context for `request`. Must happen before any dispatch logic.
    pub fn enter(
        self: &Arc<Self>,
        request: Request<Body>,
        config: Arc<RuntimeSettings>,
        request_id: String,
    ) -> ContextScope {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_contexts(active);
        ContextScope {
            tracker: self.clone(),
            context: Some(RequestContext::new(request, config, request_id)),
        }
    }

    /// Contexts entered and not yet exited.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn release(&self) {
        let active = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_active_contexts(active);
    }
}

/// An open request context. Dropping it exits the context.
pub struct ContextScope {
    tracker: Arc<ContextTracker>,
    context: Option<RequestContext>,
}

impl ContextScope {
    // `context` is only taken by `exit`, which consumes the scope.
    pub fn context(&self) -> &RequestContext {
        self.context.as_ref().unwrap_or_else(|| unreachable!("context taken before exit"))
    }

    pub fn context_mut(&mut self) -> &mut RequestContext {
        self.context.as_mut().unwrap_or_else(|| unreachable!("context taken before exit"))
    }

    /// Close the scope and hand back what the request owned.
    pub fn exit(mut self) -> RequestContext {
        self.context
            .take()
            .unwrap_or_else(|| unreachable!("context taken before exit"))
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        self.tracker.release();
    }
}
