//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use wro_dispatch::config::{ConfigStore, ControlMatch, RuntimeSettings};
use wro_dispatch::delegate::{CacheChangeListener, DelegateError, ResourceDelegate, SchedulingHooks};
use wro_dispatch::http::{attach, AppState, RequestContext};

pub const NEXT_STAGE_BODY: &str = "next stage";

/// How the mock delegate answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
}

/// Delegate that counts its calls and answers per [`Behavior`].
pub struct MockDelegate {
    behavior: Mutex<Behavior>,
    pub reload_cache_calls: AtomicUsize,
    pub reload_model_calls: AtomicUsize,
    pub process_calls: AtomicUsize,
    pub destroy_calls: AtomicUsize,
    listeners: Mutex<Vec<CacheChangeListener>>,
    pub cache_periods: Mutex<Vec<Duration>>,
    pub model_periods: Mutex<Vec<Duration>>,
}

impl MockDelegate {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            reload_cache_calls: AtomicUsize::new(0),
            reload_model_calls: AtomicUsize::new(0),
            process_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
            listeners: Mutex::new(Vec::new()),
            cache_periods: Mutex::new(Vec::new()),
            model_periods: Mutex::new(Vec::new()),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    fn outcome(&self, what: &str) -> Result<(), DelegateError> {
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(DelegateError::Other(format!("{what} failed"))),
            Behavior::Panic => panic!("{what} exploded"),
        }
    }
}

#[async_trait]
impl ResourceDelegate for MockDelegate {
    fn name(&self) -> &str {
        "mock"
    }

    async fn reload_cache(&self) -> Result<(), DelegateError> {
        self.reload_cache_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome("reload_cache")?;
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener();
        }
        Ok(())
    }

    async fn reload_model(&self) -> Result<(), DelegateError> {
        self.reload_model_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome("reload_model")
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<Body, DelegateError> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        ctx.response_mut()
            .headers
            .insert("x-delegate", HeaderValue::from_static("touched"));
        self.outcome("process")?;
        Ok(Body::from(format!("processed {}", ctx.path())))
    }

    fn scheduling(&self) -> Option<&dyn SchedulingHooks> {
        Some(self)
    }

    fn on_cache_change(&self, listener: CacheChangeListener) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn destroy(&self) {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl SchedulingHooks for MockDelegate {
    fn on_cache_period_changed(&self, period: Duration) {
        self.cache_periods.lock().unwrap().push(period);
    }

    fn on_model_period_changed(&self, period: Duration) {
        self.model_periods.lock().unwrap().push(period);
    }
}

/// A dispatcher in front of a next stage that counts its hits.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub delegate: Arc<MockDelegate>,
    pub next_stage_hits: Arc<AtomicUsize>,
}

impl TestApp {
    pub fn new(settings: RuntimeSettings, behavior: Behavior) -> Self {
        Self::with_match(settings, behavior, ControlMatch::Substring)
    }

    pub fn with_match(settings: RuntimeSettings, behavior: Behavior, control_match: ControlMatch) -> Self {
        let delegate = MockDelegate::new(behavior);
        let store = Arc::new(ConfigStore::new(settings));
        let state = AppState::new(store, delegate.clone(), control_match).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let next_stage = Router::new().fallback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (StatusCode::NOT_FOUND, NEXT_STAGE_BODY)
            }
        });

        Self {
            router: attach(next_stage, state.clone()),
            state,
            delegate,
            next_stage_hits: hits,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.state.store
    }

    pub fn hits(&self) -> usize {
        self.next_stage_hits.load(Ordering::SeqCst)
    }

    pub async fn get(&self, path: &str) -> Response {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn settings(debug: bool, header: Option<&str>) -> RuntimeSettings {
    RuntimeSettings {
        debug,
        header: header.map(str::to_string),
        ..RuntimeSettings::default()
    }
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
