//! Error types for registry operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The registry did not answer within the request timeout.
    #[error("Registry request to {url} timed out")]
    Timeout {
        /// Request URL.
        url: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message.
        message: String,
    },

    /// Catalog entry not found.
    #[error("Registry entry not found: {registry_id}")]
    NotFound {
        /// Registry-assigned identifier.
        registry_id: String,
    },

    /// HTTP error from registry.
    #[error("HTTP error from registry: {status} - {message}")]
    HttpError {
        /// HTTP status code (0 when no response was received).
        status: u16,
        /// Error message.
        message: String,
    },

    /// The registry answered with a body that could not be decoded.
    #[error("Invalid registry response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    JsonError {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid URL.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },

    /// TLS material could not be loaded.
    #[error("Invalid TLS configuration: {message}")]
    InvalidTls {
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("File I/O error at {path}: {source}")]
    IoError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl RegistryError {
    /// Returns true for transient failures worth retrying: connection
    /// failures, timeouts, throttling and server-side errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } => true,
            Self::HttpError { status, .. } => *status == 0 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map_or_else(|| "unknown".to_string(), ToString::to_string);
        if err.is_timeout() {
            Self::Timeout { url }
        } else if err.is_connect() {
            Self::ConnectionFailed { url, source: err }
        } else if err.is_decode() {
            Self::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            Self::HttpError {
                status: err.status().map_or(0, |s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError { source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = RegistryError::NotFound {
            registry_id: "reg-0011223344556677".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Registry entry not found: reg-0011223344556677"
        );
    }

    #[test]
    fn test_error_display_auth_failed() {
        let err = RegistryError::AuthenticationFailed {
            message: "invalid token".to_string(),
        };
        assert_eq!(err.to_string(), "Authentication failed: invalid token");
    }

    #[test]
    fn test_retryable_classification() {
        let http = |status| RegistryError::HttpError {
            status,
            message: String::new(),
        };
        assert!(http(503).is_retryable());
        assert!(http(429).is_retryable());
        assert!(http(0).is_retryable());
        assert!(!http(400).is_retryable());
        assert!(!http(409).is_retryable());
        assert!(RegistryError::Timeout {
            url: "https://registry.example.com".to_string()
        }
        .is_retryable());
        assert!(!RegistryError::AuthenticationFailed {
            message: String::new()
        }
        .is_retryable());
    }
}
