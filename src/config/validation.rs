//! Semantic validation of a parsed configuration.
//!
//! Serde handles syntax; this catches values that parse but cannot run:
//! unparseable addresses and header templates.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::DispatchConfig;
use crate::headers::template;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{section}.bind_address '{value}' is not a socket address")]
    BindAddress { section: &'static str, value: String },

    #[error("runtime.header: {0}")]
    Header(String),

    #[error("management.api_key must not be empty")]
    EmptyApiKey,
}

/// Check every section, collecting all problems rather than the first.
pub fn validate_config(config: &DispatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener", &config.listener.bind_address);
    check_addr(&mut errors, "management", &config.management.bind_address);
    if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability", &config.observability.metrics_address);
    }

    if let Some(raw) = config.runtime.header.as_deref() {
        if !template::is_blank(Some(raw)) {
            if let Err(e) = template::parse(raw) {
                errors.push(ValidationError::Header(e.to_string()));
            }
        }
    }

    if config.management.api_key.trim().is_empty() {
        errors.push(ValidationError::EmptyApiKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, section: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress {
            section,
            value: value.to_string(),
        });
    }
}
