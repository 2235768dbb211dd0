//! # Error Handling Module
//!
//! Crate-wide error type built with `thiserror`. Every public operation returns
//! [`ServiceResult`], and each variant carries enough context for the API layer
//! to pick a status code and a message without inspecting strings.
//!
//! ## Taxonomy
//! - `Validation` - missing or out-of-range parameters, surfaced as 4xx
//! - `NotFound` - a referenced entity is absent from the store, surfaced as 404
//! - `Store` - the authoritative datastore failed, surfaced as 5xx
//! - `CacheTier` - a cache tier failed; the read path and the invalidation
//!   coordinator catch these, so callers only see them from direct tier calls
//! - `DependencyUpdate` - a cross-entity side effect failed after its primary
//!   write was rolled back

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the crate
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error type for every cache, store, catalog and predictor operation
#[derive(Debug, Error, Clone)]
pub enum ServiceError {
    /// Missing or out-of-range input (rank absent, year outside 2000-2030, ...)
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    /// Referenced entity is absent from the store
    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    /// Authoritative datastore failure (network, timeout, query error)
    #[error("Store error: {message}")]
    Store { message: String },

    /// Local or shared cache tier unavailable
    #[error("Cache tier error ({tier}): {message}")]
    CacheTier { tier: String, message: String },

    /// A cross-entity side effect failed and the primary write was rolled back
    #[error("Dependency update failed: {message}")]
    DependencyUpdate { message: String },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A bounded store or cache call ran out of time
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl ServiceError {
    /// Create a validation error for a named field
    pub fn validation<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error for an entity and its key
    pub fn not_found<E: Into<String>, K: Into<String>>(entity: E, key: K) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Create a store error with a custom message
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a cache tier error
    pub fn cache_tier<T: Into<String>, S: Into<String>>(tier: T, message: S) -> Self {
        Self::CacheTier {
            tier: tier.into(),
            message: message.into(),
        }
    }

    /// Create a dependency update error
    pub fn dependency_update<S: Into<String>>(message: S) -> Self {
        Self::DependencyUpdate {
            message: message.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a timeout error for a named operation
    pub fn timeout<S: Into<String>>(operation: S, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// HTTP status code the API layer should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CacheTier { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::DependencyUpdate { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller may retry the same operation
    ///
    /// Validation, not-found and dependency failures are permanent for the
    /// given input; store failures and timeouts are usually transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Timeout { .. })
    }

    /// True for errors the client caused (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Store { .. } => "store_error",
            Self::CacheTier { .. } => "cache_tier_error",
            Self::DependencyUpdate { .. } => "dependency_update_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Timeout { .. } => "timeout",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
            Self::Io { .. } => "io_error",
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ServiceError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Lets the HTTP layer return a `ServiceError` straight from a handler.
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
                "retryable": self.is_retryable(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

/// Convenience macro for creating store errors
///
/// Usage: `store_error!("range fetch failed at offset {}", offset)`
#[macro_export]
macro_rules! store_error {
    ($($arg:tt)*) => {
        $crate::core::error::ServiceError::store(format!($($arg)*))
    };
}
