//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dispatcher.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatchConfig {
    /// Listener configuration (bind address, timeouts).
    pub listener: ListenerConfig,

    /// Runtime settings, mutable while the process runs.
    pub runtime: RuntimeSettings,

    /// Control-plane and delegate selection.
    pub dispatch: DispatchSettings,

    /// Settings for the built-in bundle delegate.
    pub bundle: BundleConfig,

    /// What the hosting pipeline does with requests passed through.
    pub next_stage: NextStageConfig,

    /// Management registration and admin surface.
    pub management: ManagementConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Settings held by the live [`ConfigStore`](crate::config::ConfigStore).
///
/// These are the only values that change without a restart, either through
/// the admin surface or through a config file reload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Development mode: enables the control-plane API and disables caching.
    pub debug: bool,

    /// Header template, `Name: Value | Name: Value`.
    pub header: Option<String>,

    /// How often the delegate refreshes cached artifacts (0 = never).
    pub cache_update_period_secs: u64,

    /// How often the delegate reloads its model (0 = never).
    pub model_update_period_secs: u64,

    /// Register the configuration with the management agent at startup.
    pub management_enabled: bool,
}

impl RuntimeSettings {
    pub fn cache_update_period(&self) -> Duration {
        Duration::from_secs(self.cache_update_period_secs)
    }

    pub fn model_update_period(&self) -> Duration {
        Duration::from_secs(self.model_update_period_secs)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            debug: true,
            header: None,
            cache_update_period_secs: 0,
            model_update_period_secs: 0,
            management_enabled: true,
        }
    }
}

/// How control-plane tokens are matched against the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlMatch {
    /// The token may appear anywhere in the path.
    #[default]
    Substring,
    /// The token must end the path (an optional trailing `/` is allowed).
    Suffix,
}

/// Dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Delegate registry identifier. Empty means the default delegate.
    pub delegate: String,

    /// Control-plane path matching mode.
    pub control_match: ControlMatch,

    /// Deployment context path (e.g. "/shop"), used for naming.
    pub context_path: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            delegate: String::new(),
            control_match: ControlMatch::Substring,
            context_path: String::new(),
        }
    }
}

/// Built-in bundle delegate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Path to the group model file (TOML).
    pub model_path: String,

    /// Directory the model's file paths are relative to.
    pub resource_root: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            model_path: "wro.toml".to_string(),
            resource_root: ".".to_string(),
        }
    }
}

/// Next stage of the hosting pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NextStageConfig {
    /// Directory served for requests passed through. `None` answers 404.
    pub static_dir: Option<String>,
}

/// Management registration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagementConfig {
    /// Explicit registration name. Derived from the context path when absent.
    pub name: Option<String>,

    /// Admin surface bind address.
    pub bind_address: String,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            name: None,
            bind_address: "127.0.0.1:8081".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
