//! Error types for the Storage Replication Operator
//!
//! Provides structured error types for the composite-ID codec, the system
//! registry, the array client adapters and the replication/snapshot
//! orchestrators, plus the status-code taxonomy surfaced to callers.

use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Caller Errors
    // =========================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // System Registry Errors
    // =========================================================================
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("System not configured: {system_id}")]
    SystemNotConfigured { system_id: String },

    // =========================================================================
    // Array Client Errors
    // =========================================================================
    #[error("Array request failed: {0}")]
    ArrayRequest(#[from] reqwest::Error),

    #[error("Array API error on {operation}: {message} (http {http_status}, code {error_code})")]
    ArrayApi {
        operation: String,
        http_status: u16,
        error_code: i64,
        message: String,
    },

    #[error("Array object not found: {kind}/{id}")]
    ArrayObjectNotFound { kind: String, id: String },

    #[error("Array object already exists: {kind}/{name}")]
    ArrayObjectExists { kind: String, name: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Status code reported to callers of the extension operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Malformed or missing caller input
    InvalidArgument,
    /// A well-formed ID the array confirms does not exist
    NotFound,
    /// Array-side failure or unexpected array response
    Internal,
    /// Array could not be reached or authenticated against
    Unavailable,
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::InvalidArgument => write!(f, "InvalidArgument"),
            StatusCode::NotFound => write!(f, "NotFound"),
            StatusCode::Internal => write!(f, "Internal"),
            StatusCode::Unavailable => write!(f, "Unavailable"),
        }
    }
}

impl Error {
    /// Status code this error is reported with
    pub fn code(&self) -> StatusCode {
        match self {
            Error::InvalidArgument(_) | Error::Configuration(_) => StatusCode::InvalidArgument,

            Error::NotFound(_) => StatusCode::NotFound,

            Error::Unavailable(_) | Error::SystemNotConfigured { .. } => StatusCode::Unavailable,

            // Raw array failures reaching the caller unwrapped are still
            // array-side failures
            Error::ArrayRequest(_)
            | Error::ArrayApi { .. }
            | Error::ArrayObjectNotFound { .. }
            | Error::ArrayObjectExists { .. } => StatusCode::Internal,

            Error::Internal(_) | Error::JsonParse(_) | Error::YamlParse(_) | Error::Io(_) => {
                StatusCode::Internal
            }
        }
    }

    /// Human readable message without the variant prefix
    pub fn message(&self) -> String {
        match self {
            Error::InvalidArgument(m)
            | Error::NotFound(m)
            | Error::Internal(m)
            | Error::Unavailable(m)
            | Error::Configuration(m) => m.clone(),
            other => other.to_string(),
        }
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::ArrayRequest(e) => e.is_connect() || e.is_timeout(),
            Error::Unavailable(_) => true,
            Error::ArrayApi { http_status, .. } => *http_status >= 500,
            _ => false,
        }
    }

    /// Check if this error reports a missing array object
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ArrayObjectNotFound { .. } | Error::NotFound(_) => true,
            Error::ArrayApi { http_status, .. } => *http_status == 404,
            _ => false,
        }
    }

    /// Wrap an array-side failure with the step that produced it
    pub fn internal(context: impl std::fmt::Display, source: Error) -> Error {
        Error::Internal(format!("{}: {}", context, source.message()))
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = Error::InvalidArgument("volume ID is required".into());
        assert_eq!(err.code(), StatusCode::InvalidArgument);

        let err = Error::SystemNotConfigured {
            system_id: "sysA".into(),
        };
        assert_eq!(err.code(), StatusCode::Unavailable);

        let err = Error::ArrayObjectNotFound {
            kind: "Volume".into(),
            id: "v1".into(),
        };
        assert_eq!(err.code(), StatusCode::Internal);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_internal_wraps_context() {
        let source = Error::ArrayApi {
            operation: "createReplicationPair".into(),
            http_status: 500,
            error_code: 6,
            message: "Replication Pair name already in use".into(),
        };
        assert!(source.is_transient());

        let err = Error::internal("can't create replication pair", source);
        assert_eq!(err.code(), StatusCode::Internal);
        assert!(err
            .message()
            .starts_with("can't create replication pair: Array API error"));
    }

    #[test]
    fn test_message_strips_prefix() {
        let err = Error::InvalidArgument("empty parameters list".into());
        assert_eq!(err.message(), "empty parameters list");
        assert_eq!(err.to_string(), "Invalid argument: empty parameters list");
    }
}
