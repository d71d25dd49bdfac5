//! Content-addressed payload storage for Vouch.
//!
//! Credential payloads are stored as immutable records keyed by the BLAKE3
//! digest of their own bytes. The store is append-only: there is no delete,
//! and a record is never overwritten.
//!
//! # Design Rules
//!
//! 1. The key of a record is always the hash of its bytes.
//! 2. `put` is idempotent; concurrent writers of the same payload converge.
//! 3. Bytes that disagree with their digest are an integrity fault, never content.
//! 4. The store never interprets payloads; JSON helpers only encode and decode.
//!
//! Persistence and transport wrappers (disk, network) implement
//! [`ContentStore`] outside this crate; [`InMemoryContentStore`] serves tests
//! and embedding.

pub mod error;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryContentStore;
pub use record::ContentRecord;
pub use traits::ContentStore;
