//! wro-dispatch server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ TraceLayer → request id → timeout → dispatcher ──┐
//!                                                                      │
//!              ┌────────────────────────┬──────────────────────────────┤
//!              ▼                        ▼                              ▼
//!       control plane            resource delegate              next stage
//!      (reload hooks)        (headers + processing)       (static dir or 404)
//!
//!     ConfigStore ◀── admin API (separate listener)
//!                 ◀── config file watcher
//!                 ──▶ observers: header recomputation, delegate scheduling
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use wro_dispatch::config::loader::load_config;
use wro_dispatch::config::watcher::ConfigWatcher;
use wro_dispatch::config::DispatchConfig;
use wro_dispatch::http::HttpServer;
use wro_dispatch::lifecycle::{signals, Shutdown};
use wro_dispatch::management::{self, AdminState, ManagementRegistry};
use wro_dispatch::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "wro-dispatch", version, about = "Resource dispatcher server")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "WRO_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => DispatchConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wro-dispatch starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        debug = config.runtime.debug,
        delegate = %config.dispatch.delegate,
        request_timeout_secs = config.listener.request_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let admin_listener = TcpListener::bind(&config.management.bind_address).await?;
    let server = HttpServer::new(config.clone())?;

    let shutdown = Arc::new(Shutdown::new());

    let registry = Arc::new(ManagementRegistry::new());
    management::register_at_startup(&registry, &config, server.state().store.clone());
    let admin = management::setup_admin_router(AdminState {
        registry,
        api_key: Arc::from(config.management.api_key.as_str()),
    });
    tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
    let mut admin_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let result = axum::serve(admin_listener, admin)
            .with_graceful_shutdown(async move {
                let _ = admin_shutdown.recv().await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Admin API failed");
        }
    });

    // The watcher stays alive until main returns.
    let (updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to watch configuration file");
                    (updates, None)
                }
            }
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move { signals::forward(&signal_shutdown).await });

    server.run(listener, updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
