use vouch_types::{ChainHash, EntityId};

/// Failure reported by a ledger source or anchor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Transient failure (node unreachable, rate limited). Retryable.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The requested block, transaction, or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The ledger refused the request.
    #[error("rejected by ledger: {0}")]
    Rejected(String),
}

impl SourceError {
    /// Whether the retry policy may try the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}

/// Errors produced by ledger queries and audit-trail reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable after {attempts} attempts: {reason}")]
    LedgerUnavailable { attempts: u32, reason: String },

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("entity {0} has no recorded history")]
    NoHistory(EntityId),

    #[error("entity {entity_id}: transfer in {tx_hash} precedes issuance")]
    TransferBeforeIssue {
        entity_id: EntityId,
        tx_hash: ChainHash,
    },

    #[error("deadline exceeded")]
    Timeout,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl LedgerError {
    /// Whether the error came from running out of time rather than from the
    /// ledger itself.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LedgerError::Timeout)
    }
}
