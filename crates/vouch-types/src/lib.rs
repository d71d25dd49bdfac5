//! Foundation types for Vouch.
//!
//! Every other Vouch crate depends on `vouch-types`.
//!
//! # Key Types
//!
//! - [`Digest`]: BLAKE3 content digest, the identity of leaves and stored payloads
//! - [`ChainHash`]: opaque transaction or block hash produced by the ledger
//! - [`Address`]: credential holder account
//! - [`EntityId`]: credential identifier assigned by the on-chain registry

pub mod chain;
pub mod digest;
pub mod error;

pub use chain::{Address, ChainHash, EntityId};
pub use digest::{Digest, DIGEST_LEN};
pub use error::TypeError;
