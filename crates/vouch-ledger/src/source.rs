use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vouch_types::{ChainHash, Digest, EntityId};

use crate::error::SourceError;
use crate::event::{BlockHeader, BlockRef, RawLedgerEvent};

/// Read boundary to the ledger.
///
/// Implementations may return events in any order and may fail
/// transiently; ordering and retries are the caller's job.
#[async_trait]
pub trait LedgerEventSource: Send + Sync {
    /// Number of the most recent block known to the source.
    async fn latest_block(&self) -> Result<u64, SourceError>;

    /// All registry events referencing `entity_id` in `[from_block, to_block]`.
    async fn query_events(
        &self,
        entity_id: EntityId,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLedgerEvent>, SourceError>;

    async fn get_block(&self, block: BlockRef) -> Result<BlockHeader, SourceError>;

    /// The anchor record for `batch_id`, if the batch was ever anchored.
    async fn query_anchor(&self, batch_id: &str) -> Result<Option<AnchorRecord>, SourceError>;
}

/// Write boundary for committing batch roots.
///
/// Signing, fees, and confirmation handling live behind this trait.
#[async_trait]
pub trait LedgerAnchor: Send + Sync {
    async fn submit_batch(
        &self,
        batch_id: &str,
        root: Digest,
        metadata: &AnchorMetadata,
    ) -> Result<ChainHash, SourceError>;
}

/// Descriptive data submitted alongside a batch root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorMetadata {
    /// Human label for the batch, e.g. the credential programme.
    pub label: String,
    pub leaf_count: usize,
}

/// An anchored batch root as recorded on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRecord {
    pub batch_id: String,
    pub root: Digest,
    pub label: String,
    pub leaf_count: usize,
    pub tx_hash: ChainHash,
    pub block_number: u64,
    pub block_hash: ChainHash,
}
