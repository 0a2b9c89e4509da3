//! Error types for the migration engine.
//!
//! Every failure the engine can observe maps to one variant here. Per-item
//! failures are folded into a `failed` [`MigrationResult`](crate::models::MigrationResult)
//! by the batch orchestrator, so most of these end up as detail strings in a
//! summary rather than aborting a run.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::EntityKind;

/// Main error type for sisync.
#[derive(Debug, Error)]
pub enum SisyncError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Unauthorized (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // Identity errors
    #[error("{kind} '{name}' not found")]
    NotFound { kind: EntityKind, name: String },

    #[error("{kind} name '{name}' is ambiguous: {count} matches")]
    Ambiguous {
        kind: EntityKind,
        name: String,
        count: usize,
    },

    // Data model errors
    #[error("Connection '{connection_id}' for provider '{provider}' not found in target")]
    ConnectionNotFound {
        provider: String,
        connection_id: String,
    },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Migration state errors
    #[error("{failed} of {total} items failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("Inconsistent state for {entity_id} during {phase}: {message}")]
    InconsistentState {
        entity_id: String,
        phase: String,
        message: String,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for sisync operations.
pub type Result<T> = std::result::Result<T, SisyncError>;

impl From<std::io::Error> for SisyncError {
    fn from(err: std::io::Error) -> Self {
        SisyncError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SisyncError {
    fn from(err: serde_json::Error) -> Self {
        SisyncError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_yaml::Error> for SisyncError {
    fn from(err: serde_yaml::Error) -> Self {
        SisyncError::Config {
            message: format!("Invalid YAML: {}", err),
        }
    }
}

impl From<reqwest::Error> for SisyncError {
    fn from(err: reqwest::Error) -> Self {
        // The configured timeout is unknown here; HttpRemoteClient reports
        // its own timeouts as `Timeout`.
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        SisyncError::Network {
            message,
            cause: err.url().map(|u| u.to_string()),
        }
    }
}

impl SisyncError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SisyncError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        SisyncError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for a `Validation` error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SisyncError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SisyncError::Network { .. } | SisyncError::Timeout(_) | SisyncError::RateLimited { .. }
        )
    }

    /// Short machine-readable category, used in result details and logs.
    pub fn category(&self) -> &'static str {
        match self {
            SisyncError::Network { .. }
            | SisyncError::Timeout(_)
            | SisyncError::RateLimited { .. } => "network",
            SisyncError::Unauthorized { .. } => "unauthorized",
            SisyncError::Api { .. } => "api",
            SisyncError::NotFound { .. } => "not_found",
            SisyncError::Ambiguous { .. } => "ambiguous",
            SisyncError::ConnectionNotFound { .. } => "connection_not_found",
            SisyncError::Validation { .. } => "validation",
            SisyncError::PartialFailure { .. } => "partial_failure",
            SisyncError::InconsistentState { .. } => "inconsistent_state",
            SisyncError::Json { .. } => "json",
            SisyncError::Io { .. } => "io",
            SisyncError::Config { .. } => "config",
            SisyncError::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SisyncError::not_found(EntityKind::Dashboard, "Sales");
        assert_eq!(err.to_string(), "dashboard 'Sales' not found");

        let err = SisyncError::Ambiguous {
            kind: EntityKind::DataModel,
            name: "Finance".into(),
            count: 2,
        };
        assert_eq!(err.to_string(), "datamodel name 'Finance' is ambiguous: 2 matches");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SisyncError::Timeout(std::time::Duration::from_secs(5)).is_retryable());
        assert!(SisyncError::Network {
            message: "reset".into(),
            cause: None
        }
        .is_retryable());
        assert!(!SisyncError::not_found(EntityKind::User, "jane").is_retryable());
        assert!(!SisyncError::Unauthorized {
            status: 403,
            message: "forbidden".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            SisyncError::ConnectionNotFound {
                provider: "Databricks".into(),
                connection_id: "c-1".into()
            }
            .category(),
            "connection_not_found"
        );
        assert_eq!(
            SisyncError::PartialFailure { failed: 1, total: 5 }.category(),
            "partial_failure"
        );
    }
}
