//! Header policy subsystem.
//!
//! # Data Flow
//! ```text
//! RuntimeSettings (debug, header template)
//!     → template.rs (parse `Name: Value | ...`)
//!     → policy.rs (defaults + template → HeaderSet)
//!     → atomic publish of Arc<HeaderSet>
//!     → apply() on every normal-processing response
//! ```
//!
//! # Design Decisions
//! - The set is rebuilt in full on every relevant change, never patched
//! - Readers load one Arc per request, so a response never mixes generations
//! - A malformed template is an error at recomputation time

pub mod policy;
pub mod set;
pub mod template;

use thiserror::Error;

pub use policy::{HeaderPolicy, DEFAULT_CACHE_CONTROL};
pub use set::HeaderSet;

/// Errors raised while building a header set.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// A template segment has no `:` separator.
    #[error("header declaration '{segment}' has no ':' separator")]
    MissingColon { segment: String },

    /// A declaration has nothing before its colon.
    #[error("header declaration '{segment}' has an empty name")]
    EmptyName { segment: String },

    /// The name is not a valid HTTP header name.
    #[error("invalid header name '{name}'")]
    InvalidName { name: String },

    /// The value contains bytes not allowed in a header value.
    #[error("invalid value for header '{name}'")]
    InvalidValue { name: String },

    /// Wraps a declaration error with the template it came from.
    #[error(
        "invalid header template '{template}': {source}. \
         Expected '<NAME1>: <VALUE1> | <NAME2>: <VALUE2>', \
         e.g. 'Expires: Thu, 15 Apr 2010 20:00:00 GMT | cache-control: public'"
    )]
    Template {
        template: String,
        #[source]
        source: Box<HeaderError>,
    },
}
