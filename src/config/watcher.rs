//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_config;
use crate::config::schema::DispatchConfig;
use crate::config::store::ConfigStore;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<DispatchConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<DispatchConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = %path.display(), "Config file change detected, reloading");
                        reload(&path, &tx);
                    }
                }
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Load `path` and forward it. Returns whether an update was sent.
///
/// A file that fails to load is logged and dropped.
fn reload(path: &Path, tx: &mpsc::UnboundedSender<DispatchConfig>) -> bool {
    match load_config(path) {
        Ok(new_config) => tx.send(new_config).is_ok(),
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to reload config; keeping current configuration"
            );
            false
        }
    }
}

/// Apply reloaded files to the live store until shutdown.
///
/// Only the `[runtime]` section takes effect; other sections need a restart.
pub async fn apply_updates(
    store: Arc<ConfigStore>,
    mut updates: mpsc::UnboundedReceiver<DispatchConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                match store.apply_runtime(&config.runtime) {
                    Ok(changed) if changed.is_empty() => {
                        tracing::info!("Reloaded config has no runtime changes; other sections apply on restart");
                    }
                    Ok(changed) => {
                        tracing::info!(fields = ?changed, "Runtime configuration reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Reloaded runtime configuration rejected");
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!("Config update loop stopped");
}
