//! Header template parsing.
//!
//! Grammar: `Decl ("|" Decl)*` where `Decl = Name ":" Value`. The name ends
//! at the first colon; the value is everything after it and may contain
//! further colons (dates, URLs).

use axum::http::header::{HeaderName, HeaderValue};

use crate::headers::{HeaderError, HeaderSet};

/// A single parsed `Name: Value` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDecl {
    pub name: HeaderName,
    pub value: HeaderValue,
}

/// Whether a template is effectively absent.
pub fn is_blank(template: Option<&str>) -> bool {
    template.map(|t| t.trim().is_empty()).unwrap_or(true)
}

/// Parse every declaration of a template, in order, duplicates included.
pub fn parse(template: &str) -> Result<Vec<HeaderDecl>, HeaderError> {
    template
        .split('|')
        .map(parse_decl)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| HeaderError::Template {
            template: template.to_string(),
            source: Box::new(source),
        })
}

fn parse_decl(segment: &str) -> Result<HeaderDecl, HeaderError> {
    let (name, value) = segment
        .split_once(':')
        .ok_or_else(|| HeaderError::MissingColon {
            segment: segment.trim().to_string(),
        })?;

    let name = HeaderSet::normalize_key(name)?;
    let value = HeaderValue::from_str(value.trim()).map_err(|_| HeaderError::InvalidValue {
        name: name.to_string(),
    })?;

    Ok(HeaderDecl { name, value })
}
