//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, key length)
//! - Check that addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShieldConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ShieldConfig;

/// Minimum app key length in bytes.
pub const MIN_APP_KEY_BYTES: usize = 32;

/// One semantic problem in a configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("app_key must be at least {} bytes", MIN_APP_KEY_BYTES)]
    AppKeyTooShort,

    #[error("{field} is not a socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("rate_limit.per_minute ({per_minute}) is lower than rate_limit.per_second ({per_second})")]
    MinuteBelowSecond { per_second: u32, per_minute: u32 },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.app_key.len() < MIN_APP_KEY_BYTES {
        errors.push(ValidationError::AppKeyTooShort);
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }

    if config.cookies.max_header_bytes == 0 {
        errors.push(ValidationError::Zero("cookies.max_header_bytes"));
    }

    if config.cookies.session_cookie.is_empty() {
        errors.push(ValidationError::Empty("cookies.session_cookie"));
    }

    if config.csrf.enabled {
        if config.csrf.header.is_empty() {
            errors.push(ValidationError::Empty("csrf.header"));
        }
        if config.csrf.encrypted_header.is_empty() {
            errors.push(ValidationError::Empty("csrf.encrypted_header"));
        }
        if config.csrf.form_field.is_empty() {
            errors.push(ValidationError::Empty("csrf.form_field"));
        }
    }

    let limits = &config.rate_limit;
    if limits.enabled {
        if limits.per_second == 0 {
            errors.push(ValidationError::Zero("rate_limit.per_second"));
        }
        if limits.per_minute == 0 {
            errors.push(ValidationError::Zero("rate_limit.per_minute"));
        }
        if limits.per_minute < limits.per_second {
            errors.push(ValidationError::MinuteBelowSecond {
                per_second: limits.per_second,
                per_minute: limits.per_minute,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
