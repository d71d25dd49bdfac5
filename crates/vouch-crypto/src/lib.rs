//! Integrity primitives for Vouch.
//!
//! Provides BLAKE3 content hashing with canonical JSON encoding for
//! credentials, closed Merkle batches over ordered leaf digests, and
//! inclusion proofs that verify without access to the tree.
//!
//! All hashing wraps the `blake3` crate; there is no custom cryptography.

pub mod error;
pub mod hasher;
pub mod merkle;
pub mod proof;

pub use error::CryptoError;
pub use hasher::{canonical_json, ContentHasher};
pub use merkle::{Batch, MerkleTree};
pub use proof::{InclusionReceipt, MerkleProof, Position, ProofStep, ProofVerifier};
