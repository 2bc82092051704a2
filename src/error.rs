//! Error types for livemirror.
//!
//! Errors are strongly typed using thiserror. Host access failures
//! (`AccessorError`) are usually swallowed and logged at the call site,
//! while persistence failures propagate to the caller as typed values.

use std::path::PathBuf;

use thiserror::Error;

/// Failures resolving or invoking a named member on the host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessorError {
    #[error("Host type not found: {namespace}.{class_name}")]
    TypeNotFound {
        namespace: String,
        class_name: String,
    },

    #[error("Member '{member}' not found on host type {type_name}")]
    MemberNotFound {
        type_name: String,
        member: String,
    },

    #[error("Invocation of '{member}' failed: {reason}")]
    InvocationFailed {
        member: String,
        reason: String,
    },

    #[error("Member '{member}' returned {actual}, expected {expected}")]
    UnexpectedValue {
        member: String,
        expected: &'static str,
        actual: String,
    },
}

/// Failures reading or writing a definitions file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Config file missing: {path}")]
    ConfigFileMissing {
        path: PathBuf,
    },

    #[error("Config file corrupted: {path}: {reason}")]
    ConfigFileCorrupted {
        path: PathBuf,
        reason: String,
    },

    #[error("Config file empty: {path}")]
    ConfigFileEmpty {
        path: PathBuf,
    },

    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid {
        reason: String,
    },
}

/// Failures scheduling or waiting on work.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Queue full: {path} (capacity {capacity})")]
    QueueFull {
        path: String,
        capacity: usize,
    },

    #[error("Host main loop is not running")]
    HostNotRunning,
}

/// Top-level error type for livemirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Accessor error: {0}")]
    Accessor(#[from] AccessorError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl MirrorError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a `ConfigurationInvalid` persistence error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::Persistence(PersistenceError::ConfigurationInvalid {
            reason: reason.into(),
        })
    }

    /// Returns true if this is a host accessor error.
    #[must_use]
    pub const fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor(_))
    }

    /// Returns true if this is a persistence error.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            // The host shape will not change between attempts.
            Self::Accessor(_) => false,
            Self::Persistence(_) => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. }
                    | ExecutionError::QueueFull { .. }
                    | ExecutionError::HostNotRunning
            ),
            Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for livemirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;
