//! Error types for Bazaar core operations.
//!
//! This module defines the error types used throughout the `bazaar-core` crate.

use thiserror::Error;

use crate::service::ServiceStatus;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Bazaar core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Specification file could not be loaded.
    #[error("Failed to load specification from {path}: {source}")]
    SpecLoadError {
        /// Path to the specification file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Specification document could not be parsed.
    #[error("Failed to parse specification: {reason}")]
    SpecParseError {
        /// Reason for the parse failure.
        reason: String,
    },

    /// A status transition that the state machine does not allow.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid input provided.
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Reason the input is invalid.
        reason: String,
    },
}

/// Rejection of a status change by the service state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    /// The requested transition is not in the transition table.
    #[error("illegal status transition from '{from}' to '{to}'")]
    IllegalTransition {
        /// Current status.
        from: ServiceStatus,
        /// Requested status.
        to: ServiceStatus,
    },

    /// The service is already in a terminal status.
    #[error("service is in terminal status '{status}'")]
    Terminal {
        /// The terminal status.
        status: ServiceStatus,
    },
}
