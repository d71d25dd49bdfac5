use vouch_types::Digest;

/// Errors from hashing, tree construction, and proof checking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("batch must contain at least one leaf")]
    EmptyBatch,

    #[error("leaf index {index} out of range for batch of {len}")]
    LeafIndexOutOfRange { index: usize, len: usize },

    #[error("proof does not match the committed root: expected {expected}, computed {computed}")]
    ProofVerificationFailed { expected: Digest, computed: Digest },

    #[error("serialization error: {0}")]
    Serialization(String),
}
