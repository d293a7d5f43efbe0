//! Built-in delegate serving concatenated resource groups.
//!
//! A model file lists named groups of files:
//!
//! ```toml
//! [groups]
//! all = ["js/jquery.js", "js/app.js", "css/reset.css"]
//! ```
//!
//! A request whose last path segment is `all.js` answers with every `.js`
//! file of group `all`, in model order, joined by newlines. Artifacts are
//! cached until `reload_cache`, or until the configured cache period
//! elapses. The model is likewise re-read after the model period. Every
//! cache clear, and every rebuild of an expired artifact, is reported to the
//! registered cache-change listeners.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_TYPE};
use dashmap::DashMap;
use serde::Deserialize;

use crate::config::DispatchConfig;
use crate::delegate::{CacheChangeListener, DelegateError, ResourceDelegate, SchedulingHooks, DEFAULT_DELEGATE};
use crate::http::context::RequestContext;

#[derive(Debug, Default, Deserialize)]
struct ModelFile {
    #[serde(default)]
    groups: HashMap<String, Vec<String>>,
}

struct LoadedModel {
    groups: HashMap<String, Vec<String>>,
    loaded_at: Instant,
}

#[derive(Clone)]
struct Artifact {
    content: String,
    content_type: &'static str,
    created: Instant,
}

/// Delegate concatenating files of a group into one artifact.
pub struct BundleDelegate {
    model_path: PathBuf,
    resource_root: PathBuf,
    model: ArcSwapOption<LoadedModel>,
    cache: DashMap<String, Artifact>,
    cache_period_secs: AtomicU64,
    model_period_secs: AtomicU64,
    listeners: RwLock<Vec<CacheChangeListener>>,
}

impl BundleDelegate {
    pub fn new(model_path: impl Into<PathBuf>, resource_root: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            resource_root: resource_root.into(),
            model: ArcSwapOption::empty(),
            cache: DashMap::new(),
            cache_period_secs: AtomicU64::new(0),
            model_period_secs: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Build from configuration. The model is read lazily on first use.
    pub fn from_config(config: &DispatchConfig) -> Self {
        let delegate = Self::new(&config.bundle.model_path, &config.bundle.resource_root);
        delegate.on_cache_period_changed(config.runtime.cache_update_period());
        delegate.on_model_period_changed(config.runtime.model_update_period());
        delegate
    }

    /// Number of cached artifacts.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn cache_changed(&self) {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner()).clone();
        for listener in listeners {
            listener();
        }
    }

    async fn load_model(&self) -> Result<Arc<LoadedModel>, DelegateError> {
        let raw = tokio::fs::read_to_string(&self.model_path)
            .await
            .map_err(|source| DelegateError::Io {
                path: self.model_path.display().to_string(),
                source,
            })?;
        let file: ModelFile = toml::from_str(&raw).map_err(|e| DelegateError::Model(e.to_string()))?;

        let model = Arc::new(LoadedModel {
            groups: file.groups,
            loaded_at: Instant::now(),
        });
        self.model.store(Some(model.clone()));
        tracing::info!(path = %self.model_path.display(), groups = model.groups.len(), "Model loaded");
        Ok(model)
    }

    async fn current_model(&self) -> Result<Arc<LoadedModel>, DelegateError> {
        let period = period(&self.model_period_secs);
        match self.model.load_full() {
            Some(model) if !expired(model.loaded_at, period) => Ok(model),
            _ => self.load_model().await,
        }
    }

    async fn build(&self, files: &[String], ext: &str) -> Result<String, DelegateError> {
        let mut parts = Vec::new();
        for file in files.iter().filter(|f| extension(f) == Some(ext)) {
            let path = self.resource_root.join(file);
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| DelegateError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
            parts.push(content);
        }
        if parts.is_empty() {
            return Err(DelegateError::NotFound(format!("no .{ext} resources")));
        }
        Ok(parts.join("\n"))
    }
}

fn period(secs: &AtomicU64) -> Duration {
    Duration::from_secs(secs.load(Ordering::Relaxed))
}

fn expired(since: Instant, period: Duration) -> bool {
    !period.is_zero() && since.elapsed() >= period
}

fn extension(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|e| e.to_str())
}

fn content_type(ext: &str) -> Option<&'static str> {
    match ext {
        "js" => Some("application/javascript"),
        "css" => Some("text/css"),
        _ => None,
    }
}

#[async_trait]
impl ResourceDelegate for BundleDelegate {
    fn name(&self) -> &str {
        DEFAULT_DELEGATE
    }

    async fn reload_cache(&self) -> Result<(), DelegateError> {
        let dropped = self.cache.len();
        self.cache.clear();
        tracing::info!(dropped, "Artifact cache cleared");
        self.cache_changed();
        Ok(())
    }

    async fn reload_model(&self) -> Result<(), DelegateError> {
        self.load_model().await?;
        // Groups may have changed, so every artifact is suspect.
        self.cache.clear();
        self.cache_changed();
        Ok(())
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<Body, DelegateError> {
        let requested = ctx.path().rsplit('/').next().unwrap_or_default().to_string();
        let (group, ext) = requested
            .rsplit_once('.')
            .ok_or_else(|| DelegateError::NotFound(requested.clone()))?;
        let content_type = content_type(ext).ok_or_else(|| DelegateError::NotFound(requested.clone()))?;

        let cached = self.cache.get(&requested).map(|entry| entry.value().clone());
        let stale = cached
            .as_ref()
            .is_some_and(|artifact| expired(artifact.created, period(&self.cache_period_secs)));
        let cached = cached.filter(|_| !stale);

        let artifact = match cached {
            Some(artifact) => artifact,
            None => {
                let model = self.current_model().await?;
                let files = model
                    .groups
                    .get(group)
                    .ok_or_else(|| DelegateError::NotFound(format!("group '{group}'")))?;
                let artifact = Artifact {
                    content: self.build(files, ext).await?,
                    content_type,
                    created: Instant::now(),
                };
                self.cache.insert(requested.clone(), artifact.clone());
                tracing::debug!(group, ext, "Artifact built");
                if stale {
                    self.cache_changed();
                }
                artifact
            }
        };

        ctx.response_mut()
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(artifact.content_type));
        Ok(Body::from(artifact.content))
    }

    fn scheduling(&self) -> Option<&dyn SchedulingHooks> {
        Some(self)
    }

    fn on_cache_change(&self, listener: CacheChangeListener) {
        self.listeners.write().unwrap_or_else(|e| e.into_inner()).push(listener);
    }

    fn destroy(&self) {
        self.cache.clear();
        self.model.store(None);
        self.listeners.write().unwrap_or_else(|e| e.into_inner()).clear();
        tracing::debug!("Bundle delegate destroyed");
    }
}

impl SchedulingHooks for BundleDelegate {
    fn on_cache_period_changed(&self, period: Duration) {
        self.cache_period_secs.store(period.as_secs(), Ordering::Relaxed);
        tracing::debug!(period_secs = period.as_secs(), "Cache period updated");
    }

    fn on_model_period_changed(&self, period: Duration) {
        self.model_period_secs.store(period.as_secs(), Ordering::Relaxed);
        tracing::debug!(period_secs = period.as_secs(), "Model period updated");
    }
}
