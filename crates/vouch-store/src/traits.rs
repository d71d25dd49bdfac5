use serde_json::Value;
use vouch_crypto::canonical_json;
use vouch_types::Digest;

use crate::error::{StoreError, StoreResult};

/// Write-once, content-addressed byte store.
///
/// All implementations must satisfy these invariants:
/// - The key of every payload is the hash of the payload itself.
/// - `put` is idempotent: the same bytes always return the same digest and
///   never create a second record.
/// - Records are never overwritten and never deleted. A `put` whose bytes
///   differ from an existing record under the same digest is an
///   [`StoreError::IntegrityFault`].
/// - Concurrent `put`s of the same payload converge to one record.
/// - Absent content is reported as [`StoreError::ContentNotFound`].
pub trait ContentStore: Send + Sync {
    /// Store `bytes` under their digest and return the digest.
    fn put(&self, bytes: &[u8]) -> StoreResult<Digest>;

    /// Read the payload stored under `digest`.
    fn get(&self, digest: &Digest) -> StoreResult<Vec<u8>>;

    /// Check whether a payload exists.
    fn contains(&self, digest: &Digest) -> StoreResult<bool>;

    /// Store several payloads, returning their digests in input order.
    fn put_batch(&self, payloads: &[Vec<u8>]) -> StoreResult<Vec<Digest>> {
        payloads.iter().map(|bytes| self.put(bytes)).collect()
    }

    /// Store a credential in canonical JSON form.
    ///
    /// The returned digest equals `ContentHasher::hash_json(value)`, so it
    /// can be used directly as a Merkle leaf.
    fn put_json(&self, value: &Value) -> StoreResult<Digest> {
        let bytes = canonical_json(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put(&bytes)
    }

    /// Read a payload and decode it as JSON.
    fn get_json(&self, digest: &Digest) -> StoreResult<Value> {
        let bytes = self.get(digest)?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}
