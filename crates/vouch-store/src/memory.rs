use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;
use vouch_types::Digest;

use crate::error::{StoreError, StoreResult};
use crate::record::ContentRecord;
use crate::traits::ContentStore;

/// In-memory, HashMap-based content store.
///
/// Intended for tests and embedding. Records are held behind a `RwLock`;
/// payloads are hashed before the lock is taken, so writers of distinct
/// digests only contend for the short map insertion.
pub struct InMemoryContentStore {
    records: RwLock<HashMap<Digest, ContentRecord>>,
}

impl InMemoryContentStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }

    /// Total payload bytes across all records.
    pub fn total_bytes(&self) -> u64 {
        self.records
            .read()
            .expect("lock poisoned")
            .values()
            .map(ContentRecord::size)
            .sum()
    }

    /// Return a sorted list of all stored digests.
    pub fn digests(&self) -> Vec<Digest> {
        let map = self.records.read().expect("lock poisoned");
        let mut digests: Vec<Digest> = map.keys().copied().collect();
        digests.sort();
        digests
    }

    /// Overwrite a record's bytes in place, bypassing every check.
    #[cfg(test)]
    pub(crate) fn corrupt(&self, digest: &Digest, bytes: Vec<u8>) {
        let mut map = self.records.write().expect("lock poisoned");
        if let Some(record) = map.get_mut(digest) {
            record.bytes = bytes;
        }
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for InMemoryContentStore {
    fn put(&self, bytes: &[u8]) -> StoreResult<Digest> {
        let record = ContentRecord::new(bytes.to_vec());
        let digest = record.digest;
        let mut map = self.records.write().expect("lock poisoned");
        match map.entry(digest) {
            Entry::Occupied(existing) => {
                if existing.get().bytes != bytes {
                    return Err(StoreError::IntegrityFault {
                        digest,
                        reason: "different bytes already stored under this digest".into(),
                    });
                }
            }
            Entry::Vacant(slot) => {
                debug!(digest = %digest.short_hex(), size = record.size(), "stored content");
                slot.insert(record);
            }
        }
        Ok(digest)
    }

    fn get(&self, digest: &Digest) -> StoreResult<Vec<u8>> {
        let map = self.records.read().expect("lock poisoned");
        let record = map
            .get(digest)
            .ok_or(StoreError::ContentNotFound(*digest))?;
        if !record.is_intact() {
            return Err(StoreError::IntegrityFault {
                digest: *digest,
                reason: "stored bytes no longer match their digest".into(),
            });
        }
        Ok(record.bytes.clone())
    }

    fn contains(&self, digest: &Digest) -> StoreResult<bool> {
        let map = self.records.read().expect("lock poisoned");
        Ok(map.contains_key(digest))
    }
}

impl std::fmt::Debug for InMemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentStore")
            .field("record_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vouch_crypto::ContentHasher;

    // -----------------------------------------------------------------------
    // Put / get
    // -----------------------------------------------------------------------

    #[test]
    fn put_then_get_roundtrip() {
        let store = InMemoryContentStore::new();
        let digest = store.put(b"hello world").unwrap();
        assert_eq!(digest, Digest::of(b"hello world"));
        assert_eq!(store.get(&digest).unwrap(), b"hello world");
    }

    #[test]
    fn empty_payload_roundtrip() {
        let store = InMemoryContentStore::new();
        let digest = store.put(&[]).unwrap();
        assert!(store.get(&digest).unwrap().is_empty());
    }

    #[test]
    fn large_payload_roundtrip() {
        let store = InMemoryContentStore::new();
        let payload: Vec<u8> = (0..4 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let digest = store.put(&payload).unwrap();
        assert_eq!(store.get(&digest).unwrap(), payload);
        assert_eq!(store.total_bytes(), payload.len() as u64);
    }

    #[test]
    fn get_missing_is_content_not_found() {
        let store = InMemoryContentStore::new();
        let missing = Digest::of(b"never stored");
        match store.get(&missing) {
            Err(StoreError::ContentNotFound(d)) => assert_eq!(d, missing),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Idempotence and integrity
    // -----------------------------------------------------------------------

    #[test]
    fn put_is_idempotent() {
        let store = InMemoryContentStore::new();
        let first = store.put(b"idempotent").unwrap();
        let second = store.put(b"idempotent").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn distinct_payloads_get_distinct_records() {
        let store = InMemoryContentStore::new();
        let a = store.put(b"aaa").unwrap();
        let b = store.put(b"bbb").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.digests().len(), 2);
    }

    #[test]
    fn corrupted_record_is_an_integrity_fault_on_get() {
        let store = InMemoryContentStore::new();
        let digest = store.put(b"original").unwrap();
        store.corrupt(&digest, b"tampered".to_vec());
        assert!(matches!(
            store.get(&digest),
            Err(StoreError::IntegrityFault { .. })
        ));
    }

    #[test]
    fn mismatched_put_never_overwrites() {
        let store = InMemoryContentStore::new();
        let digest = store.put(b"original").unwrap();
        store.corrupt(&digest, b"tampered".to_vec());
        let err = store.put(b"original").unwrap_err();
        assert!(matches!(err, StoreError::IntegrityFault { digest: d, .. } if d == digest));
    }

    #[test]
    fn contains_reports_presence() {
        let store = InMemoryContentStore::new();
        let digest = store.put(b"present").unwrap();
        assert!(store.contains(&digest).unwrap());
        assert!(!store.contains(&Digest::of(b"absent")).unwrap());
    }

    // -----------------------------------------------------------------------
    // Batches and JSON
    // -----------------------------------------------------------------------

    #[test]
    fn put_batch_preserves_order() {
        let store = InMemoryContentStore::new();
        let payloads = vec![b"one".to_vec(), b"two".to_vec(), b"one".to_vec()];
        let digests = store.put_batch(&payloads).unwrap();
        assert_eq!(digests.len(), 3);
        assert_eq!(digests[0], digests[2]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn put_json_uses_canonical_digest() {
        let store = InMemoryContentStore::new();
        let credential = json!({"name": "student1", "degree": "Blockchain 101", "year": 2024});
        let digest = store.put_json(&credential).unwrap();
        assert_eq!(digest, ContentHasher::hash_json(&credential).unwrap());
        assert_eq!(store.get_json(&digest).unwrap(), credential);
    }

    #[test]
    fn get_json_on_binary_payload_fails() {
        let store = InMemoryContentStore::new();
        let digest = store.put(&[0xff, 0x00, 0x13]).unwrap();
        assert!(matches!(
            store.get_json(&digest),
            Err(StoreError::Serialization(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_puts_of_same_payload_converge() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryContentStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.put(b"shared payload").unwrap())
            })
            .collect();

        let digests: Vec<Digest> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        assert!(digests.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&digests[0]).unwrap(), b"shared payload");
    }

    #[test]
    fn debug_format() {
        let store = InMemoryContentStore::new();
        store.put(b"x").unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryContentStore"));
        assert!(debug.contains("record_count"));
    }
}
