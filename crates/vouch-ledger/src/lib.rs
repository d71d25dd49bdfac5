//! Ledger-facing side of Vouch.
//!
//! This crate connects credential batches to the distributed ledger. It provides:
//! - `LedgerEventSource` / `LedgerAnchor` async trait boundaries
//! - Event shapes decoded once into closed per-kind variants
//! - A `RetryPolicy` shared by every ledger call
//! - `AuditTrailReconstructor`, which merges an entity's events into an
//!   ordered, chain-checked, annotated `EntityHistory`
//! - Anchor submission and verification of receipts against anchored roots
//! - `InMemoryLedger`, a simulated hash-linked chain for tests and demos

pub mod anchor;
pub mod config;
pub mod error;
pub mod event;
pub mod history;
pub mod memory;
pub mod reconstruct;
pub mod retry;
pub mod source;

pub use anchor::{anchor_batch, verify_anchored, AnchorVerdict};
pub use config::{PreIssuePolicy, ReconstructorConfig};
pub use error::{LedgerError, SourceError};
pub use event::{ArgValue, BlockHeader, BlockRef, EventArgs, EventKind, RawLedgerEvent};
pub use history::{
    Anomaly, AnomalyKind, ChainBreak, Degraded, EntityHistory, HistoryEntry, Lifecycle,
    LifecycleState, Payload,
};
pub use memory::InMemoryLedger;
pub use reconstruct::AuditTrailReconstructor;
pub use retry::RetryPolicy;
pub use source::{AnchorMetadata, AnchorRecord, LedgerAnchor, LedgerEventSource};
