//! Pack/unpack text transform boundary.
//!
//! The transform algorithm itself is supplied by the embedder; this module
//! only defines the seam and the array-enclosure normalization some
//! transforms expect around their input.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Transform failed: {0}")]
    Failed(String),
}

/// A reversible text transform.
pub trait Transform: Send + Sync {
    fn pack(&self, input: &str) -> Result<String, TransformError>;
    fn unpack(&self, input: &str) -> Result<String, TransformError>;
}

/// Makes an inner transform see its input enclosed in `[`...`]`.
///
/// Input that is not already enclosed is wrapped before the inner call, and
/// the first `[` and last `]` of the result are removed. Leading whitespace
/// is allowed before the opening bracket; nothing may follow the closing one.
pub struct ArrayEnclosed<T> {
    inner: T,
}

impl<T: Transform> ArrayEnclosed<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn enclosed(input: &str, open: &str, close: &str) -> bool {
    let body = input.trim_start();
    body.len() >= open.len() + close.len() && body.starts_with(open) && body.ends_with(close)
}

// Each bracket is removed only if present.
fn strip_enclosure(mut output: String) -> String {
    if let Some(start) = output.find('[') {
        output.remove(start);
    }
    if let Some(end) = output.rfind(']') {
        output.remove(end);
    }
    output
}

fn wrapped<F>(input: &str, open: &str, close: &str, f: F) -> Result<String, TransformError>
where
    F: FnOnce(&str) -> Result<String, TransformError>,
{
    if enclosed(input, open, close) {
        f(input)
    } else {
        f(&format!("[{input}]")).map(strip_enclosure)
    }
}

impl<T: Transform> Transform for ArrayEnclosed<T> {
    fn pack(&self, input: &str) -> Result<String, TransformError> {
        wrapped(input, "[", "]", |s| self.inner.pack(s))
    }

    fn unpack(&self, input: &str) -> Result<String, TransformError> {
        wrapped(input, "[[", "]]", |s| self.inner.unpack(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records what it was given and returns it unchanged.
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    impl Transform for Recording {
        fn pack(&self, input: &str) -> Result<String, TransformError> {
            self.seen.lock().unwrap().push(input.to_string());
            Ok(input.to_string())
        }

        fn unpack(&self, input: &str) -> Result<String, TransformError> {
            self.pack(input)
        }
    }

    struct Broken;

    impl Transform for Broken {
        fn pack(&self, _input: &str) -> Result<String, TransformError> {
            Ok("no brackets".into())
        }

        fn unpack(&self, _input: &str) -> Result<String, TransformError> {
            Err(TransformError::Failed("bad input".into()))
        }
    }

    #[test]
    fn test_pack_wraps_bare_input() {
        let t = ArrayEnclosed::new(Recording::default());
        assert_eq!(t.pack("1,2,3").unwrap(), "1,2,3");
        assert_eq!(t.into_inner().seen.into_inner().unwrap(), vec!["[1,2,3]"]);
    }

    #[test]
    fn test_pack_keeps_enclosed_input() {
        let t = ArrayEnclosed::new(Recording::default());
        assert_eq!(t.pack("  [1,2]").unwrap(), "  [1,2]");
        assert_eq!(t.into_inner().seen.into_inner().unwrap(), vec!["  [1,2]"]);
    }

    #[test]
    fn test_unpack_requires_double_brackets() {
        let t = ArrayEnclosed::new(Recording::default());
        assert_eq!(t.unpack("[1,2]").unwrap(), "[1,2]");
        assert_eq!(t.unpack("[[1,2]]").unwrap(), "[[1,2]]");
        assert_eq!(
            t.into_inner().seen.into_inner().unwrap(),
            vec!["[[1,2]]", "[[1,2]]"]
        );
    }

    #[test]
    fn test_trailing_whitespace_is_not_enclosed() {
        let t = ArrayEnclosed::new(Recording::default());
        assert_eq!(t.pack("[1] ").unwrap(), "[1] ");
        assert_eq!(t.into_inner().seen.into_inner().unwrap(), vec!["[[1] ]"]);
    }

    #[test]
    fn test_output_without_brackets_is_kept() {
        let t = ArrayEnclosed::new(Broken);
        assert_eq!(t.pack("x").unwrap(), "no brackets");
        assert!(matches!(t.unpack("x"), Err(TransformError::Failed(_))));
    }
}
