use thiserror::Error;

/// Canonical error type for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store call failed (transient I/O).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A write landed at the I/O layer but a subsequent read did not
    /// reflect it.
    #[error("{operation} verification failed for {entity} `{id}`")]
    Verification {
        /// Operation being verified (e.g. `"save"`, `"deletion"`).
        operation: &'static str,
        /// Entity noun (e.g. `"prompt"`).
        entity: &'static str,
        /// Identifier of the record whose mutation did not land.
        id: String,
    },

    /// All retry attempts were exhausted.
    #[error("{operation} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Logical operation name.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// Message of the last underlying failure.
        message: String,
    },

    /// The write queue discarded the operation before it ran.
    #[error("write queue discarded the operation before it ran")]
    QueueTeardown,

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error occurred.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// I/O error from the local filesystem backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Creates a `Backend` variant.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Whether a retry of the failed operation could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Backend(_) | Self::Verification { .. } | Self::Io(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() || err.is_syntax() || err.is_data() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

/// Convenient result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
