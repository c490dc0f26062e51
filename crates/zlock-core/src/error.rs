//! Error types for zlock-core
//!
//! Callers only ever see the lock taxonomy below. Transient coordination
//! failures are absorbed by the engine's retry loop and surface as
//! `ConnectionLoss` only once the retry policy or the caller's deadline is
//! exhausted.

use std::time::Duration;

use thiserror::Error;

/// Core error type for lock operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The caller's deadline elapsed while waiting for the lock
    #[error("timed out after {timeout:?} waiting for lock '{path}'")]
    Timeout {
        /// Lock path that was being acquired
        path: String,
        /// The deadline the caller asked for
        timeout: Duration,
    },

    /// The coordination session died; any candidate node it owned is gone
    #[error("coordination session expired while using lock '{path}'")]
    SessionExpired {
        /// Lock path the session was working on
        path: String,
    },

    /// A non-blocking attempt found another holder
    #[error("lock '{path}' is held by '{holder}'")]
    NotAvailable {
        /// Lock path that was probed
        path: String,
        /// Candidate node name of the current holder
        holder: String,
    },

    /// Release called by an identity that does not hold the lock
    #[error("lock '{path}' is not held by '{owner}'")]
    NotHeld {
        /// Lock path that was released
        path: String,
        /// Identity that attempted the release
        owner: String,
    },

    /// Connectivity did not recover within the retry budget
    #[error("connection to coordination service lost during {operation} after {attempts} attempt(s)")]
    ConnectionLoss {
        /// Service operation that kept failing
        operation: &'static str,
        /// Number of attempts made
        attempts: u32,
    },

    /// The lock's parent path was removed from the coordination tree
    #[error("lock path '{path}' does not exist in the coordination tree")]
    LockPathMissing {
        /// The missing parent path
        path: String,
    },

    /// A lock path failed validation
    #[error("invalid lock path '{path}': {reason}")]
    InvalidPath {
        /// The rejected path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Configuration failed validation or could not be read
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed data (config file, node payload, node name)
    #[error("parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Stable machine-readable code for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "LOCK_TIMEOUT",
            Self::SessionExpired { .. } => "LOCK_SESSION_EXPIRED",
            Self::NotAvailable { .. } => "LOCK_NOT_AVAILABLE",
            Self::NotHeld { .. } => "LOCK_NOT_HELD",
            Self::ConnectionLoss { .. } => "CONNECTION_LOSS",
            Self::LockPathMissing { .. } => "LOCK_PATH_MISSING",
            Self::InvalidPath { .. } => "INVALID_PATH",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Parse(_) => "PARSE_ERROR",
        }
    }

    /// Whether retrying the same call later may succeed without the caller
    /// changing anything.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionLoss { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(format!("Failed to parse config: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result type alias for lock operations
pub type Result<T> = std::result::Result<T, Error>;
