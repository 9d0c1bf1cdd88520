//! Error types for policy status aggregation

use thiserror::Error;

/// Main error type for knmstate operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Write rejected because the presented resource version is stale
    #[error("conflict: {0}")]
    Conflict(String),

    /// Requested object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Store failure that is neither a conflict nor a missing object
    #[error("store error: {0}")]
    Store(String),

    /// Reading the policy, its enactments or the eligible nodes failed
    #[error("{context}: {source}")]
    Read {
        /// What was being read
        context: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Persisting the policy status failed for a reason other than a conflict
    #[error("{context}: {source}")]
    Write {
        /// What was being written
        context: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Every attempt in the retry budget ended in a conflict
    #[error("status update still conflicting after {attempts} attempts: {source}")]
    ConflictRetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Conflict returned by the last attempt
        #[source]
        source: Box<Error>,
    },

    /// Validation error for configuration or CRD content
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a conflict error with the given message
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a generic store error with the given message
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Wrap a failure that happened while reading cluster state
    pub fn read(context: impl Into<String>, source: Error) -> Self {
        Self::Read {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a failure that happened while persisting status
    pub fn write(context: impl Into<String>, source: Error) -> Self {
        Self::Write {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Returns true if the store rejected a write because of a stale resource version.
    ///
    /// Covers both the in-memory store's `Conflict` and Kubernetes 409 responses.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Kube(kube::Error::Api(ae)) => ae.code == 409,
            _ => false,
        }
    }

    /// Returns true if this error came from reading cluster state
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Self::Read { .. })
    }
}
