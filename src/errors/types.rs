//! # Error Types
//!
//! Error taxonomy for driftsync using `thiserror`.
//!
//! The variants map one-to-one onto the failure classes of the engine:
//! configuration problems are never retried, provider failures surface as-is,
//! and a corrupt expiration ledger is fatal by design (silently resetting it
//! would churn every tracked secret).

use crate::model::VariableKind;

/// Custom result type for driftsync operations
pub type Result<T> = std::result::Result<T, DriftsyncError>;

/// Main error type for driftsync
#[derive(thiserror::Error, Debug)]
pub enum DriftsyncError {
    /// Bad or ambiguous specification. Never retried.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A secret provider failed to resolve a value.
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// The same (name, kind) pair was resolved twice within one pass.
    #[error("Duplicate variable '{name}' ({kind})")]
    DuplicateVariable { name: String, kind: VariableKind },

    /// Missing secret key, SSH key, or remote resource.
    #[error("Resource not found: {resource_type} '{id}'")]
    NotFound { resource_type: String, id: String },

    /// The persisted expiration ledger could not be parsed.
    #[error("Corrupt state: {message}")]
    CorruptState { message: String },

    /// A polling phase exceeded its elapsed-time budget.
    #[error("Operation timed out: {operation} after {elapsed_secs}s")]
    Timeout { operation: String, elapsed_secs: u64 },

    /// The remote reported a terminal failure state for a plan or apply.
    #[error("{operation} reached terminal state '{status}'")]
    RemoteTerminal { operation: String, status: String },

    /// Network/API failure during any remote call. Propagated immediately.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// An operation precondition was not met (e.g. remote execution disabled).
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },
}

impl DriftsyncError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a provider error
    pub fn provider<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    /// Create a duplicate variable error
    pub fn duplicate<S: Into<String>>(name: S, kind: VariableKind) -> Self {
        Self::DuplicateVariable { name: name.into(), kind }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a corrupt state error
    pub fn corrupt_state<S: Into<String>>(message: S) -> Self {
        Self::CorruptState { message: message.into() }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, elapsed: std::time::Duration) -> Self {
        Self::Timeout { operation: operation.into(), elapsed_secs: elapsed.as_secs() }
    }

    /// Create a remote terminal state error
    pub fn remote_terminal<O: Into<String>, S: Into<String>>(operation: O, status: S) -> Self {
        Self::RemoteTerminal { operation: operation.into(), status: status.into() }
    }

    /// Create a transport error without an underlying cause
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport { message: message.into(), source: None }
    }

    /// Create a precondition error
    pub fn precondition<S: Into<String>>(message: S) -> Self {
        Self::Precondition { message: message.into() }
    }

    /// Wrap an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Wrap a serialization error with context
    pub fn serialization<S: Into<String>>(source: serde_json::Error, context: S) -> Self {
        Self::Serialization { source, context: context.into() }
    }
}

impl From<reqwest::Error> for DriftsyncError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport { message: error.to_string(), source: Some(error) }
    }
}

impl From<std::io::Error> for DriftsyncError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for DriftsyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}
