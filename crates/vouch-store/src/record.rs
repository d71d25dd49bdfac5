use serde::{Deserialize, Serialize};
use vouch_crypto::ContentHasher;
use vouch_types::Digest;

/// An immutable payload and the digest it is stored under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub digest: Digest,
    pub bytes: Vec<u8>,
}

impl ContentRecord {
    /// Hash `bytes` and wrap them in a record.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            digest: ContentHasher::hash(&bytes),
            bytes,
        }
    }

    /// Size of the payload in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Returns `true` if the payload still hashes to the recorded digest.
    pub fn is_intact(&self) -> bool {
        ContentHasher::verify(&self.bytes, &self.digest)
    }
}
