//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DispatchConfig (startup sections)
//!     → store.rs ConfigStore (runtime section, shared via Arc)
//!
//! On change (admin API or file reload):
//!     ConfigStore::set(field, value)
//!     → atomic swap of Arc<RuntimeSettings>
//!     → field observers run (header recomputation, delegate scheduling)
//! ```
//!
//! # Design Decisions
//! - Only the runtime section is mutable; everything else needs a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{
    BundleConfig, ControlMatch, DispatchConfig, DispatchSettings, ListenerConfig, ManagementConfig,
    NextStageConfig, ObservabilityConfig, RuntimeSettings,
};
pub use store::{ConfigStore, Field, FieldChange, FieldValue, ObserverError};
