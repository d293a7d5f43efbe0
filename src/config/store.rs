//! Live, observable runtime configuration.
//!
//! # Responsibilities
//! - Hold the mutable [`RuntimeSettings`] shared by every request
//! - Apply field mutations and notify per-field observers
//! - Keep observer failures from affecting the committed value
//!
//! # Design Decisions
//! - Settings are published through `ArcSwap`; readers never block
//! - Writers are serialized, then observers run with no lock held, so an
//!   observer may read or write the store again
//! - Setting a field to its current value does not notify

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::json;
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::config::schema::RuntimeSettings;
use crate::headers::{template, HeaderError};

/// A mutable runtime field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Debug,
    Header,
    CacheUpdatePeriod,
    ModelUpdatePeriod,
    ManagementEnabled,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Debug,
        Field::Header,
        Field::CacheUpdatePeriod,
        Field::ModelUpdatePeriod,
        Field::ManagementEnabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Debug => "debug",
            Field::Header => "header",
            Field::CacheUpdatePeriod => "cache_update_period",
            Field::ModelUpdatePeriod => "model_update_period",
            Field::ManagementEnabled => "management_enabled",
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Field::Debug | Field::ManagementEnabled => "bool",
            Field::Header => "text",
            Field::CacheUpdatePeriod | Field::ModelUpdatePeriod => "period",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownField(s.to_string()))
    }
}

/// A value held by a [`Field`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Bool(bool),
    Text(Option<String>),
    Period(Duration),
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Text(_) => "text",
            FieldValue::Period(_) => "period",
        }
    }

    /// Parse a command-line style value for `field`.
    ///
    /// Periods are whole seconds; an empty header text clears the template.
    pub fn parse(field: Field, raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field,
            reason: reason.to_string(),
        };
        match field.kind() {
            "bool" => raw
                .trim()
                .parse::<bool>()
                .map(FieldValue::Bool)
                .map_err(|_| invalid("expected true or false")),
            "period" => raw
                .trim()
                .parse::<u64>()
                .map(|secs| FieldValue::Period(Duration::from_secs(secs)))
                .map_err(|_| invalid("expected a number of seconds")),
            _ => Ok(FieldValue::Text(Some(raw.to_string()).filter(|s| !s.trim().is_empty()))),
        }
    }

    /// Convert a JSON value sent to the admin surface.
    pub fn from_json(field: Field, value: &serde_json::Value) -> Result<Self, ConfigError> {
        match (field.kind(), value) {
            ("bool", serde_json::Value::Bool(b)) => Ok(FieldValue::Bool(*b)),
            ("period", serde_json::Value::Number(n)) => n
                .as_u64()
                .map(|secs| FieldValue::Period(Duration::from_secs(secs)))
                .ok_or_else(|| ConfigError::InvalidValue {
                    field,
                    reason: "expected a non-negative number of seconds".to_string(),
                }),
            ("text", serde_json::Value::Null) => Ok(FieldValue::Text(None)),
            ("text", serde_json::Value::String(s)) => Ok(FieldValue::Text(Some(s.clone()))),
            _ => Err(ConfigError::TypeMismatch {
                field,
                expected: field.kind(),
            }),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Bool(b) => json!(b),
            FieldValue::Text(t) => json!(t),
            FieldValue::Period(d) => json!(d.as_secs()),
        }
    }
}

/// A committed mutation, handed to observers.
#[derive(Debug, Clone)]
pub struct FieldChange {
    pub field: Field,
    pub old: FieldValue,
    pub new: FieldValue,
}

/// Failure reported by an observer. Logged, never propagated to the writer.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ObserverError(pub String);

impl From<HeaderError> for ObserverError {
    fn from(e: HeaderError) -> Self {
        Self(e.to_string())
    }
}

impl From<ConfigError> for ObserverError {
    fn from(e: ConfigError) -> Self {
        Self(e.to_string())
    }
}

pub type Observer = Arc<dyn Fn(&FieldChange) -> Result<(), ObserverError> + Send + Sync>;

/// Observable store of the runtime settings.
pub struct ConfigStore {
    settings: ArcSwap<RuntimeSettings>,
    observers: RwLock<HashMap<Field, Vec<Observer>>>,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            settings: ArcSwap::from_pointee(settings),
            observers: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// A consistent view of every field.
    pub fn snapshot(&self) -> Arc<RuntimeSettings> {
        self.settings.load_full()
    }

    pub fn is_debug(&self) -> bool {
        self.settings.load().debug
    }

    pub fn get(&self, field: Field) -> FieldValue {
        read_field(&self.settings.load(), field)
    }

    /// Commit `value` to `field`, then notify its observers.
    ///
    /// Returns `Ok(false)` when the value was already current. Values of the
    /// wrong kind and malformed header templates are rejected before commit.
    pub fn set(&self, field: Field, value: FieldValue) -> Result<bool, ConfigError> {
        if field.kind() != value.kind() {
            return Err(ConfigError::TypeMismatch {
                field,
                expected: field.kind(),
            });
        }
        if let FieldValue::Text(Some(raw)) = &value {
            if !template::is_blank(Some(raw)) {
                template::parse(raw)?;
            }
        }

        let change = {
            let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            let current = self.settings.load_full();
            let old = read_field(&current, field);
            if old == value {
                return Ok(false);
            }
            let mut next = (*current).clone();
            write_field(&mut next, field, &value);
            self.settings.store(Arc::new(next));
            FieldChange {
                field,
                old,
                new: value,
            }
        };

        tracing::info!(
            field = %field,
            old = ?change.old,
            new = ?change.new,
            "Configuration changed"
        );
        self.notify(&change);
        Ok(true)
    }

    /// Apply every differing field of `settings`, one `set` at a time.
    ///
    /// Returns the fields that changed. Stops at the first rejected value;
    /// fields applied before it stay applied.
    pub fn apply_runtime(&self, settings: &RuntimeSettings) -> Result<Vec<Field>, ConfigError> {
        let mut changed = Vec::new();
        for field in Field::ALL {
            if self.set(field, read_field(settings, field))? {
                changed.push(field);
            }
        }
        Ok(changed)
    }

    /// Register `observer` for mutations of `field`.
    pub fn register_observer<F>(&self, field: Field, observer: F)
    where
        F: Fn(&FieldChange) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.register_shared(&[field], Arc::new(observer));
    }

    /// Register one observer for several fields.
    pub fn register_shared(&self, fields: &[Field], observer: Observer) {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        for field in fields {
            observers.entry(*field).or_default().push(observer.clone());
        }
    }

    pub fn observer_count(&self, field: Field) -> usize {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&field)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Drop every observer. Called on shutdown.
    pub fn clear_observers(&self) {
        self.observers.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn notify(&self, change: &FieldChange) {
        let observers: Vec<Observer> = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&change.field)
            .cloned()
            .unwrap_or_default();

        for observer in observers {
            match catch_unwind(AssertUnwindSafe(|| observer(change))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(field = %change.field, error = %e, "Configuration observer failed");
                }
                Err(_) => {
                    tracing::error!(field = %change.field, "Configuration observer panicked");
                }
            }
        }
    }
}

fn read_field(settings: &RuntimeSettings, field: Field) -> FieldValue {
    match field {
        Field::Debug => FieldValue::Bool(settings.debug),
        Field::Header => FieldValue::Text(settings.header.clone()),
        Field::CacheUpdatePeriod => FieldValue::Period(settings.cache_update_period()),
        Field::ModelUpdatePeriod => FieldValue::Period(settings.model_update_period()),
        Field::ManagementEnabled => FieldValue::Bool(settings.management_enabled),
    }
}

// Callers have already checked that the value kind matches the field.
fn write_field(settings: &mut RuntimeSettings, field: Field, value: &FieldValue) {
    match (field, value) {
        (Field::Debug, FieldValue::Bool(b)) => settings.debug = *b,
        (Field::ManagementEnabled, FieldValue::Bool(b)) => settings.management_enabled = *b,
        (Field::Header, FieldValue::Text(t)) => settings.header = t.clone(),
        (Field::CacheUpdatePeriod, FieldValue::Period(d)) => settings.cache_update_period_secs = d.as_secs(),
        (Field::ModelUpdatePeriod, FieldValue::Period(d)) => settings.model_update_period_secs = d.as_secs(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> ConfigStore {
        ConfigStore::new(RuntimeSettings::default())
    }

    #[test]
    fn test_set_and_get() {
        let store = store();
        assert!(store.set(Field::Debug, FieldValue::Bool(false)).unwrap());
        assert_eq!(store.get(Field::Debug), FieldValue::Bool(false));
        assert!(!store.is_debug());

        store
            .set(Field::CacheUpdatePeriod, FieldValue::Period(Duration::from_secs(30)))
            .unwrap();
        assert_eq!(store.snapshot().cache_update_period_secs, 30);
    }

    #[test]
    fn test_observer_receives_old_and_new() {
        let store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        store.register_observer(Field::Debug, move |change| {
            s.lock().unwrap().push((change.old.clone(), change.new.clone()));
            Ok(())
        });

        store.set(Field::Debug, FieldValue::Bool(false)).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[(FieldValue::Bool(true), FieldValue::Bool(false))]);
    }

    #[test]
    fn test_unchanged_value_does_not_notify() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        store.register_observer(Field::Debug, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(!store.set(Field::Debug, FieldValue::Bool(true)).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_observer_failure_does_not_roll_back() {
        let store = store();
        let later = Arc::new(AtomicUsize::new(0));
        store.register_observer(Field::Debug, |_| Err(ObserverError("boom".into())));
        store.register_observer(Field::Debug, |_| panic!("observer panic"));
        let l = later.clone();
        store.register_observer(Field::Debug, move |_| {
            l.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(store.set(Field::Debug, FieldValue::Bool(false)).is_ok());
        assert!(!store.is_debug());
        assert_eq!(later.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_can_reenter_store() {
        let store = Arc::new(store());
        let inner = store.clone();
        store.register_observer(Field::Debug, move |change| {
            if change.new == FieldValue::Bool(false) {
                inner.set(Field::CacheUpdatePeriod, FieldValue::Period(Duration::from_secs(5)))?;
            }
            Ok(())
        });

        store.set(Field::Debug, FieldValue::Bool(false)).unwrap();
        assert_eq!(store.snapshot().cache_update_period_secs, 5);
    }

    #[test]
    fn test_rejects_wrong_kind_and_bad_template() {
        let store = store();
        assert!(matches!(
            store.set(Field::Debug, FieldValue::Text(None)),
            Err(ConfigError::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.set(Field::Header, FieldValue::Text(Some("broken".into()))),
            Err(ConfigError::InvalidHeader(_))
        ));
        assert_eq!(store.get(Field::Header), FieldValue::Text(None));
    }

    #[test]
    fn test_apply_runtime_reports_changes() {
        let store = store();
        let next = RuntimeSettings {
            debug: false,
            header: Some("A: 1".into()),
            ..Default::default()
        };
        let changed = store.apply_runtime(&next).unwrap();
        assert_eq!(changed, vec![Field::Debug, Field::Header]);
        assert_eq!(*store.snapshot(), next);
    }

    #[test]
    fn test_field_names_and_parsing() {
        assert_eq!("Cache_Update_Period".parse::<Field>().unwrap(), Field::CacheUpdatePeriod);
        assert!("nope".parse::<Field>().is_err());
        assert_eq!(FieldValue::parse(Field::Debug, "false").unwrap(), FieldValue::Bool(false));
        assert_eq!(
            FieldValue::parse(Field::ModelUpdatePeriod, "12").unwrap(),
            FieldValue::Period(Duration::from_secs(12))
        );
        assert_eq!(FieldValue::parse(Field::Header, "").unwrap(), FieldValue::Text(None));
        assert!(FieldValue::parse(Field::Debug, "maybe").is_err());
    }

    #[test]
    fn test_clear_observers() {
        let store = store();
        store.register_shared(&[Field::Debug, Field::Header], Arc::new(|_: &FieldChange| Ok::<(), ObserverError>(())));
        assert_eq!(store.observer_count(Field::Header), 1);
        store.clear_observers();
        assert_eq!(store.observer_count(Field::Debug), 0);
    }
}
