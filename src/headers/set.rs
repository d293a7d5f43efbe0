//! Case-insensitive, insertion-ordered header mapping.

use axum::http::header::{HeaderName, HeaderValue};

use crate::headers::HeaderError;

/// Ordered mapping from header name to value.
///
/// Keys are trimmed and lower-cased on the way in, so two spellings of the
/// same header always land on the same entry. Re-inserting an existing key
/// replaces the value in place and keeps the original position.
#[derive(Debug, Clone, Default)]
pub struct HeaderSet {
    entries: Vec<(HeaderName, HeaderValue)>,
    no_cache: bool,
    generation: u64,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a raw header name into its canonical key.
    pub fn normalize_key(name: &str) -> Result<HeaderName, HeaderError> {
        let key = name.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(HeaderError::EmptyName {
                segment: name.to_string(),
            });
        }
        HeaderName::from_bytes(key.as_bytes()).map_err(|_| HeaderError::InvalidName { name: key })
    }

    /// Insert a typed entry, returning the value it replaced.
    pub fn insert(&mut self, name: HeaderName, value: HeaderValue) -> Option<HeaderValue> {
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    /// Insert from raw strings, normalizing the key.
    pub fn insert_str(&mut self, name: &str, value: &str) -> Result<Option<HeaderValue>, HeaderError> {
        let key = Self::normalize_key(name)?;
        let value = HeaderValue::from_str(value.trim()).map_err(|_| HeaderError::InvalidValue {
            name: key.to_string(),
        })?;
        Ok(self.insert(key, value))
    }

    /// Look up a value by any spelling of its name.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        let key = name.trim().to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether responses using this set must carry no-cache directives.
    pub fn no_cache(&self) -> bool {
        self.no_cache
    }

    pub(crate) fn set_no_cache(&mut self, no_cache: bool) {
        self.no_cache = no_cache;
    }

    /// Publication number, increasing with every recomputation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut set = HeaderSet::new();
        set.insert_str("  Cache-Control ", "public").unwrap();
        let replaced = set.insert_str("CACHE-CONTROL", "private").unwrap();

        assert_eq!(replaced.unwrap(), "public");
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("cache-control").unwrap(), "private");
        assert_eq!(set.get("Cache-Control").unwrap(), "private");
    }

    #[test]
    fn test_replacement_keeps_position() {
        let mut set = HeaderSet::new();
        set.insert_str("a", "1").unwrap();
        set.insert_str("b", "2").unwrap();
        set.insert_str("A", "3").unwrap();

        let names: Vec<_> = set.iter().map(|(k, _)| k.as_str().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(set.get("a").unwrap(), "3");
    }

    #[test]
    fn test_rejects_bad_names() {
        let mut set = HeaderSet::new();
        assert!(matches!(set.insert_str("   ", "x"), Err(HeaderError::EmptyName { .. })));
        assert!(matches!(set.insert_str("bad name", "x"), Err(HeaderError::InvalidName { .. })));
        assert!(matches!(set.insert_str("x-ok", "line\nbreak"), Err(HeaderError::InvalidValue { .. })));
        assert!(set.is_empty());
    }
}
