//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the request shield.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShieldConfig {
    /// Secret key material for cookie, CSRF and XSRF cryptography.
    pub app_key: String,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Encrypted cookie transport.
    pub cookies: CookieConfig,

    /// CSRF token validation.
    pub csrf: CsrfConfig,

    /// Distributed rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            app_key: "CHANGE_ME_IN_PRODUCTION_32_BYTES_MINIMUM".to_string(),
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            cookies: CookieConfig::default(),
            csrf: CsrfConfig::default(),
            rate_limit: RateLimitConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Encrypted cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Cookie names that are never encrypted or decrypted.
    pub ignore: Vec<String>,

    /// Maximum size of one serialized `Set-Cookie` header.
    pub max_header_bytes: usize,

    /// Name of the session identifier cookie.
    pub session_cookie: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            ignore: vec![
                "shield_session".to_string(),
                "XSRF-TOKEN".to_string(),
                "debugbar".to_string(),
                "XDEBUG_SESSION".to_string(),
            ],
            max_header_bytes: 4096,
            session_cookie: "shield_session".to_string(),
        }
    }
}

/// CSRF validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Enable CSRF validation.
    pub enabled: bool,

    /// Header carrying the plain token.
    pub header: String,

    /// Header carrying the encrypted XSRF token.
    pub encrypted_header: String,

    /// Form field carrying the plain token.
    pub form_field: String,

    /// Largest urlencoded body read when looking for the form field.
    pub max_form_bytes: usize,

    /// Path prefixes that skip validation.
    pub exempt_paths: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header: "X-CSRF-TOKEN".to_string(),
            encrypted_header: "X-XSRF-TOKEN".to_string(),
            form_field: "_token".to_string(),
            max_form_bytes: 1024 * 1024,
            exempt_paths: vec!["/health".to_string()],
        }
    }
}

/// Which rate limiter implementation to run.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// Shared counter store with an atomic script.
    Store,
    /// Always allow. For environments without a shared store.
    Noop,
}

/// What to answer when the counter store cannot produce a decision.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Allow the request (availability first).
    Open,
    /// Block the request (admission control first).
    Closed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Implementation selector.
    pub backend: RateLimitBackend,

    /// Prefix prepended to every identity to form the store key.
    pub key_prefix: String,

    /// Default maximum requests per second per identity.
    pub per_second: u32,

    /// Default maximum requests per minute per identity.
    pub per_minute: u32,

    /// Behavior when the store fails twice or answers garbage.
    pub failure_policy: FailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RateLimitBackend::Store,
            key_prefix: "rate-limit:".to_string(),
            per_second: 10,
            per_minute: 300,
            failure_policy: FailurePolicy::Open,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
