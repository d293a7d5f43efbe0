//! Response header policy.
//!
//! # Responsibilities
//! - Derive the process-wide [`HeaderSet`] from runtime settings
//! - Publish new sets atomically
//! - Write a set onto a response, forcing no-cache in debug mode

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, Months, TimeDelta, Utc};

use crate::config::{ConfigStore, RuntimeSettings};
use crate::headers::{template, HeaderError, HeaderSet};
use crate::observability::metrics;

/// Long-lived cache directive used outside debug mode.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=315360000";

const NO_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";
const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Format a timestamp as an HTTP date (IMF-fixdate).
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Build a fresh header set for the given settings, as of now.
pub fn recompute(settings: &RuntimeSettings) -> Result<HeaderSet, HeaderError> {
    recompute_at(settings, Utc::now())
}

/// Build a fresh header set for the given settings at a fixed instant.
pub fn recompute_at(settings: &RuntimeSettings, now: DateTime<Utc>) -> Result<HeaderSet, HeaderError> {
    let mut set = HeaderSet::new();
    set.set_no_cache(settings.debug);

    if !settings.debug {
        let expires = now
            .checked_add_months(Months::new(12))
            .unwrap_or(now + TimeDelta::days(365));
        set.insert(header::CACHE_CONTROL, HeaderValue::from_static(DEFAULT_CACHE_CONTROL));
        set.insert(header::LAST_MODIFIED, date_value(now));
        set.insert(header::EXPIRES, date_value(expires));
    }

    if let Some(raw) = settings.header.as_deref().filter(|t| !template::is_blank(Some(*t))) {
        // Template entries overwrite defaults; among themselves the first wins.
        let mut seen: HashSet<HeaderName> = HashSet::new();
        for decl in template::parse(raw)? {
            if seen.insert(decl.name.clone()) {
                set.insert(decl.name, decl.value);
            }
        }
    }

    tracing::debug!(headers = ?set, "Header values computed");
    Ok(set)
}

fn date_value(at: DateTime<Utc>) -> HeaderValue {
    HeaderValue::from_str(&http_date(at)).unwrap_or_else(|_| HeaderValue::from_static(EXPIRED))
}

/// Write every entry of `set` onto `headers`.
///
/// When the set was built in debug mode, no-cache directives are written
/// last and override anything the set carried.
pub fn apply(headers: &mut HeaderMap, set: &HeaderSet) {
    for (name, value) in set.iter() {
        headers.insert(name.clone(), value.clone());
    }
    if set.no_cache() {
        headers.remove(header::LAST_MODIFIED);
        apply_no_cache(headers);
    }
}

/// Force the response to never be cached.
pub fn apply_no_cache(headers: &mut HeaderMap) {
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE_CONTROL));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static(EXPIRED));
}

/// Holder of the currently published header set.
pub struct HeaderPolicy {
    current: ArcSwap<HeaderSet>,
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
}

impl HeaderPolicy {
    /// Compute the initial set. A malformed template fails construction.
    pub fn new(settings: &RuntimeSettings) -> Result<Self, HeaderError> {
        let mut initial = recompute(settings)?;
        initial.set_generation(1);
        Ok(Self {
            current: ArcSwap::from_pointee(initial),
            generation: AtomicU64::new(1),
            refresh_lock: Mutex::new(()),
        })
    }

    /// The set every response in flight should use.
    pub fn current(&self) -> Arc<HeaderSet> {
        self.current.load_full()
    }

    /// Recompute from `settings` and publish the result.
    ///
    /// On error the previously published set stays in place.
    pub fn refresh(&self, settings: &RuntimeSettings) -> Result<Arc<HeaderSet>, HeaderError> {
        let _guard = self.refresh_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.publish(settings)
    }

    /// Recompute from the store's live settings and publish the result.
    ///
    /// The snapshot is taken under the refresh lock, so the last refresh to
    /// finish always reflects the last committed mutation.
    pub fn refresh_from(&self, store: &ConfigStore) -> Result<Arc<HeaderSet>, HeaderError> {
        let _guard = self.refresh_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.publish(&store.snapshot())
    }

    // Callers hold `refresh_lock`.
    fn publish(&self, settings: &RuntimeSettings) -> Result<Arc<HeaderSet>, HeaderError> {
        let mut next = recompute(settings)?;
        next.set_generation(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
        let next = Arc::new(next);
        self.current.store(next.clone());
        metrics::record_header_recomputation();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings(debug: bool, header: Option<&str>) -> RuntimeSettings {
        RuntimeSettings {
            debug,
            header: header.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_http_date_format() {
        let at = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(http_date(at), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_defaults_outside_debug() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let set = recompute_at(&settings(false, None), now).unwrap();

        assert_eq!(set.get("cache-control").unwrap(), DEFAULT_CACHE_CONTROL);
        assert_eq!(set.get("last-modified").unwrap(), "Fri, 01 Mar 2024 12:00:00 GMT");
        assert_eq!(set.get("expires").unwrap(), "Sat, 01 Mar 2025 12:00:00 GMT");
        assert!(!set.no_cache());
    }

    #[test]
    fn test_debug_has_no_defaults() {
        let set = recompute(&settings(true, None)).unwrap();
        assert!(set.is_empty());
        assert!(set.no_cache());
    }

    #[test]
    fn test_template_keys_case_insensitive() {
        let set = recompute(&settings(true, Some("A: 1 | B: 2"))).unwrap();
        assert_eq!(set.get("a").unwrap(), "1");
        assert_eq!(set.get("b").unwrap(), "2");

        let set = recompute(&settings(true, Some("x-Custom: 1 | X-CUSTOM-two: 2"))).unwrap();
        assert_eq!(set.get("x-custom").unwrap(), "1");
        assert_eq!(set.get("x-custom-two").unwrap(), "2");
    }

    #[test]
    fn test_first_duplicate_wins() {
        let set = recompute(&settings(true, Some("A: 1 | A: 2"))).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").unwrap(), "1");
    }

    #[test]
    fn test_template_overrides_defaults() {
        let set = recompute(&settings(false, Some("Cache-Control: private | cache-control: public"))).unwrap();
        assert_eq!(set.get("cache-control").unwrap(), "private");
        assert!(set.contains("expires"));
    }

    #[test]
    fn test_malformed_template_fails() {
        assert!(matches!(
            recompute(&settings(false, Some("no separator here"))),
            Err(HeaderError::Template { .. })
        ));
    }

    #[test]
    fn test_apply_debug_forces_no_cache() {
        let set = recompute(&settings(true, Some("Cache-Control: public, max-age=60 | X-Extra: yes"))).unwrap();
        let mut headers = HeaderMap::new();
        apply(&mut headers, &set);

        assert_eq!(headers[header::CACHE_CONTROL], NO_CACHE_CONTROL);
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], EXPIRED);
        assert_eq!(headers["x-extra"], "yes");
    }

    #[test]
    fn test_apply_production() {
        let set = recompute(&settings(false, None)).unwrap();
        let mut headers = HeaderMap::new();
        apply(&mut headers, &set);

        assert_eq!(headers[header::CACHE_CONTROL], DEFAULT_CACHE_CONTROL);
        assert!(headers.contains_key(header::LAST_MODIFIED));
        assert!(!headers.contains_key(header::PRAGMA));
    }

    #[test]
    fn test_refresh_publishes_new_generation() {
        let policy = HeaderPolicy::new(&settings(false, None)).unwrap();
        let first = policy.current();
        assert_eq!(first.generation(), 1);

        let next = policy.refresh(&settings(true, Some("A: 1"))).unwrap();
        assert_eq!(next.generation(), 2);
        assert_eq!(policy.current().generation(), 2);
        // The old Arc is untouched.
        assert!(first.contains("cache-control"));
    }

    #[test]
    fn test_refresh_from_tracks_concurrent_writers() {
        use crate::config::{Field, FieldValue};
        use std::thread;

        let store = Arc::new(ConfigStore::new(settings(true, None)));
        let policy = Arc::new(HeaderPolicy::new(&store.snapshot()).unwrap());

        for _ in 0..20 {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = store.clone();
                    let policy = policy.clone();
                    thread::spawn(move || {
                        for j in 0..50 {
                            store.set(Field::Debug, FieldValue::Bool((i + j) % 2 == 0)).unwrap();
                            policy.refresh_from(&store).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            assert_eq!(policy.current().no_cache(), store.is_debug());
        }
    }

    #[test]
    fn test_failed_refresh_keeps_previous() {
        let policy = HeaderPolicy::new(&settings(false, Some("A: 1"))).unwrap();
        assert!(policy.refresh(&settings(false, Some("broken"))).is_err());
        assert_eq!(policy.current().get("a").unwrap(), "1");
        assert_eq!(policy.current().generation(), 1);
    }
}
