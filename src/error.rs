//! Error types for notegraph operations.
//!
//! This module provides the crate-wide error hierarchy using `thiserror`.
//! Variants correspond to the failure kinds the engine distinguishes:
//! missing entities, identity conflicts, malformed input, timeouts,
//! downstream collaborator failures, state conflicts, and cancellation.

use thiserror::Error;

/// Result type alias for notegraph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds for engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A file, chunk, workflow, or link does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing entity (e.g. `"chunk 3f9a…"`).
        what: String,
    },

    /// An identity that must be unique already exists.
    #[error("already exists: {what}")]
    AlreadyExists {
        /// Description of the conflicting entity.
        what: String,
    },

    /// Malformed markdown, bad front-matter, or an unusable parameter.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input.
        message: String,
    },

    /// An operation exceeded its deadline.
    #[error("timed out after {seconds} seconds: {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        seconds: u64,
    },

    /// A downstream collaborator (database, object store, embedding
    /// provider) failed.
    #[error("dependency failure: {0}")]
    Dependency(String),

    /// An operation was attempted against an object in the wrong state
    /// (e.g. starting a non-pending workflow).
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the state conflict.
        message: String,
    },

    /// The operation was cancelled before completion.
    #[error("cancelled: {operation}")]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
    },
}

impl Error {
    /// Builds a [`Error::NotFound`] from anything displayable.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound {
            what: what.to_string(),
        }
    }

    /// Builds a [`Error::InvalidInput`] from anything displayable.
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    /// Builds a [`Error::Conflict`] from anything displayable.
    pub fn conflict(message: impl std::fmt::Display) -> Self {
        Self::Conflict {
            message: message.to_string(),
        }
    }

    /// Short machine-readable kind tag, used in structured CLI errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Timeout { .. } => "timeout",
            Self::Dependency(_) => "dependency",
            Self::Conflict { .. } => "conflict",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

// Downstream collaborator failures all map to Dependency.

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Dependency(format!("database: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Dependency(format!("serialization: {err}"))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::InvalidInput {
            message: format!("front-matter: {err}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Dependency(format!("I/O: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("chunk abc123");
        assert_eq!(err.to_string(), "not found: chunk abc123");

        let err = Error::Timeout {
            operation: "step ingest".to_string(),
            seconds: 30,
        };
        assert_eq!(err.to_string(), "timed out after 30 seconds: step ingest");
    }

    #[test]
    fn test_error_kind_tags() {
        assert_eq!(Error::not_found("x").kind(), "not_found");
        assert_eq!(Error::invalid_input("x").kind(), "invalid_input");
        assert_eq!(Error::conflict("x").kind(), "conflict");
        assert_eq!(Error::Dependency("x".to_string()).kind(), "dependency");
        assert_eq!(
            Error::Cancelled {
                operation: "x".to_string()
            }
            .kind(),
            "cancelled"
        );
        assert_eq!(
            Error::AlreadyExists {
                what: "x".to_string()
            }
            .kind(),
            "already_exists"
        );
    }

    #[test]
    fn test_from_rusqlite_error() {
        let err: Error = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, Error::Dependency(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("bogus").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Dependency(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Dependency(_)));
    }

    #[test]
    fn test_from_yaml_error_is_invalid_input() {
        let yaml_err = serde_yaml::from_str::<i32>("{unclosed").unwrap_err();
        let err: Error = yaml_err.into();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }
}
