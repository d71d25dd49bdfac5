use vouch_types::Digest;

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested digest is not in the store. Terminal: never retried.
    #[error("content not found: {0}")]
    ContentNotFound(Digest),

    /// Stored or incoming bytes disagree with their digest: either the hash
    /// function is broken or a write was corrupted.
    #[error("integrity fault for {digest}: {reason}")]
    IntegrityFault { digest: Digest, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
