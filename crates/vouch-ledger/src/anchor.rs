use serde::{Deserialize, Serialize};
use tracing::info;
use vouch_crypto::{Batch, InclusionReceipt};
use vouch_types::{ChainHash, Digest};

use crate::error::LedgerError;
use crate::retry::RetryPolicy;
use crate::source::{AnchorMetadata, AnchorRecord, LedgerAnchor, LedgerEventSource};

/// Result of checking a receipt against the root anchored for its batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AnchorVerdict {
    Verified { record: AnchorRecord },
    /// The proof does not recombine to the anchored root.
    Mismatch {
        anchored_root: Digest,
        computed_root: Digest,
    },
    /// No root was ever anchored under the receipt's batch id.
    NotAnchored,
}

impl AnchorVerdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, AnchorVerdict::Verified { .. })
    }
}

/// Submit `batch`'s root to the ledger.
///
/// Submission is not retried: a resubmitted batch is rejected by the ledger,
/// so retrying a call whose outcome is unknown would report a false failure.
pub async fn anchor_batch<A>(anchor: &A, batch: &Batch, label: &str) -> Result<ChainHash, LedgerError>
where
    A: LedgerAnchor + ?Sized,
{
    let metadata = AnchorMetadata {
        label: label.to_string(),
        leaf_count: batch.len(),
    };
    let tx_hash = anchor
        .submit_batch(batch.batch_id(), batch.root(), &metadata)
        .await?;
    info!(
        batch_id = batch.batch_id(),
        root = %batch.root(),
        leaves = batch.len(),
        tx = %tx_hash,
        "anchored batch"
    );
    Ok(tx_hash)
}

/// Verify `receipt` against the root the ledger holds for its batch.
///
/// The receipt's own `root` field is ignored: only the anchored root counts.
pub async fn verify_anchored<S>(
    source: &S,
    receipt: &InclusionReceipt,
    policy: &RetryPolicy,
) -> Result<AnchorVerdict, LedgerError>
where
    S: LedgerEventSource + ?Sized,
{
    let record = policy
        .run("query_anchor", None, || source.query_anchor(&receipt.batch_id))
        .await?;
    let Some(record) = record else {
        return Ok(AnchorVerdict::NotAnchored);
    };
    let computed_root = receipt.proof.compute_root();
    if computed_root == record.root {
        Ok(AnchorVerdict::Verified { record })
    } else {
        Ok(AnchorVerdict::Mismatch {
            anchored_root: record.root,
            computed_root,
        })
    }
}
