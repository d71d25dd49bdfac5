//! Reconstructed entity histories and the annotations attached to them.
//!
//! A history is a value recomputed on demand; nothing here is persisted.
//! Anything the reconstructor could not fully verify is recorded next to the
//! events instead of being dropped or silently accepted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vouch_types::{Address, ChainHash, Digest, EntityId};

use crate::event::{EventArgs, EventKind};

/// Lifecycle state derived by folding an entity's events in order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Unissued,
    Issued,
    Revoked,
}

/// Payload bytes fetched from the content store for an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "lowercase")]
pub enum Payload {
    Json(Value),
    /// Non-JSON bytes, hex encoded.
    Binary(String),
}

impl Payload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Binary(hex::encode(bytes)),
        }
    }
}

/// One event of a reconstructed history, with resolved block metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub kind: EventKind,
    pub tx_hash: ChainHash,
    pub block_number: u64,
    pub block_hash: ChainHash,
    /// `None` when neither the event nor a block lookup supplied it.
    pub parent_hash: Option<ChainHash>,
    pub timestamp: Option<u64>,
    pub log_index: u32,
    pub args: EventArgs,
    /// Content referenced by the event, or `None` when absent or not resolved.
    pub payload: Option<Payload>,
}

/// Lifecycle or decoding problem attached to a single event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AnomalyKind {
    TransferBeforeIssue,
    RevokeBeforeIssue,
    DuplicateIssue,
    /// A transfer or a second revocation after the entity was revoked.
    EventAfterRevoke,
    /// A transfer whose `from` is not the current owner.
    OwnerMismatch { expected: Address, found: Address },
    /// The event was dropped from the history.
    MalformedEvent { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub tx_hash: ChainHash,
    pub block_number: u64,
    pub kind: AnomalyKind,
}

/// Something the reconstructor could not fetch or could not verify.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Degraded {
    /// Events in this block range were never retrieved.
    RangeGap {
        from_block: u64,
        to_block: u64,
        reason: String,
    },
    BlockLookup {
        block_hash: ChainHash,
        reason: String,
    },
    /// The parent chain between two blocks could not be walked.
    UnverifiedLink {
        from_block: u64,
        to_block: u64,
        reason: String,
    },
    Payload { digest: Digest, reason: String },
}

/// A point where the block chain behind the events does not link up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBreak {
    pub block_number: u64,
    pub block_hash: ChainHash,
    pub reason: String,
}

/// Ordered, annotated history of one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityHistory {
    pub entity_id: EntityId,
    /// Sorted by block number, then by log index within a block.
    pub events: Vec<HistoryEntry>,
    pub possible_reorg: bool,
    /// Some data was not retrieved (failed range, deadline).
    pub partial: bool,
    pub state: LifecycleState,
    /// Last known holder; `None` until the first accepted transfer.
    pub owner: Option<Address>,
    pub anomalies: Vec<Anomaly>,
    pub degraded: Vec<Degraded>,
    pub reorg_points: Vec<ChainBreak>,
}

impl EntityHistory {
    pub fn empty(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            events: Vec::new(),
            possible_reorg: false,
            partial: false,
            state: LifecycleState::Unissued,
            owner: None,
            anomalies: Vec::new(),
            degraded: Vec::new(),
            reorg_points: Vec::new(),
        }
    }

    /// Every range was scanned and every link and lookup resolved.
    pub fn is_complete(&self) -> bool {
        !self.partial && self.degraded.is_empty()
    }

    /// Complete, with no anomalies and no chain breaks.
    pub fn is_clean(&self) -> bool {
        self.is_complete() && self.anomalies.is_empty() && !self.possible_reorg
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Derived `Unissued -> Issued -> {Transferred}* -> [Revoked]` machine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub state: LifecycleState,
    pub owner: Option<Address>,
}

impl Lifecycle {
    /// Apply one event. An anomalous event leaves the lifecycle untouched and
    /// reports what was wrong with it.
    pub fn apply(&mut self, args: &EventArgs) -> Option<AnomalyKind> {
        match (self.state, args) {
            (LifecycleState::Unissued, EventArgs::Issued { .. }) => {
                self.state = LifecycleState::Issued;
                None
            }
            (LifecycleState::Issued, EventArgs::Issued { .. }) => Some(AnomalyKind::DuplicateIssue),
            (LifecycleState::Unissued, EventArgs::Transferred { .. }) => {
                Some(AnomalyKind::TransferBeforeIssue)
            }
            (LifecycleState::Issued, EventArgs::Transferred { from, to, .. }) => match self.owner {
                Some(owner) if owner != *from => Some(AnomalyKind::OwnerMismatch {
                    expected: owner,
                    found: *from,
                }),
                _ => {
                    self.owner = Some(*to);
                    None
                }
            },
            (LifecycleState::Unissued, EventArgs::Revoked { .. }) => {
                Some(AnomalyKind::RevokeBeforeIssue)
            }
            (LifecycleState::Issued, EventArgs::Revoked { .. }) => {
                self.state = LifecycleState::Revoked;
                None
            }
            (LifecycleState::Revoked, _) => Some(AnomalyKind::EventAfterRevoke),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(seed: u8) -> Address {
        Address::new([seed; 20])
    }

    fn issued() -> EventArgs {
        EventArgs::Issued {
            entity_id: 1,
            payload_digest: Digest::of(b"payload"),
        }
    }

    fn transferred(from: u8, to: u8) -> EventArgs {
        EventArgs::Transferred {
            entity_id: 1,
            from: addr(from),
            to: addr(to),
        }
    }

    fn revoked() -> EventArgs {
        EventArgs::Revoked { entity_id: 1 }
    }

    #[test]
    fn happy_path_lifecycle() {
        let mut life = Lifecycle::default();
        assert_eq!(life.apply(&issued()), None);
        assert_eq!(life.apply(&transferred(1, 2)), None);
        assert_eq!(life.apply(&transferred(2, 3)), None);
        assert_eq!(life.owner, Some(addr(3)));
        assert_eq!(life.apply(&revoked()), None);
        assert_eq!(life.state, LifecycleState::Revoked);
    }

    #[test]
    fn transfer_before_issue_is_flagged_without_effect() {
        let mut life = Lifecycle::default();
        assert_eq!(
            life.apply(&transferred(1, 2)),
            Some(AnomalyKind::TransferBeforeIssue)
        );
        assert_eq!(life, Lifecycle::default());
    }

    #[test]
    fn revoke_before_issue_is_flagged() {
        let mut life = Lifecycle::default();
        assert_eq!(life.apply(&revoked()), Some(AnomalyKind::RevokeBeforeIssue));
        assert_eq!(life.state, LifecycleState::Unissued);
    }

    #[test]
    fn duplicate_issue_is_flagged() {
        let mut life = Lifecycle::default();
        life.apply(&issued());
        assert_eq!(life.apply(&issued()), Some(AnomalyKind::DuplicateIssue));
    }

    #[test]
    fn revoked_is_terminal() {
        let mut life = Lifecycle::default();
        life.apply(&issued());
        life.apply(&transferred(1, 2));
        life.apply(&revoked());
        assert_eq!(
            life.apply(&transferred(2, 3)),
            Some(AnomalyKind::EventAfterRevoke)
        );
        assert_eq!(life.apply(&revoked()), Some(AnomalyKind::EventAfterRevoke));
        assert_eq!(life.owner, Some(addr(2)));
    }

    #[test]
    fn transfer_from_wrong_owner_is_flagged() {
        let mut life = Lifecycle::default();
        life.apply(&issued());
        life.apply(&transferred(1, 2));
        assert_eq!(
            life.apply(&transferred(9, 4)),
            Some(AnomalyKind::OwnerMismatch {
                expected: addr(2),
                found: addr(9)
            })
        );
        assert_eq!(life.owner, Some(addr(2)));
    }

    #[test]
    fn payload_decoding() {
        assert_eq!(
            Payload::from_bytes(br#"{"name":"student1"}"#),
            Payload::Json(serde_json::json!({"name": "student1"}))
        );
        assert_eq!(
            Payload::from_bytes(&[0xff, 0x00]),
            Payload::Binary("ff00".into())
        );
    }

    #[test]
    fn history_serializes_camel_case() {
        let mut history = EntityHistory::empty(7);
        history.degraded.push(Degraded::RangeGap {
            from_block: 0,
            to_block: 9,
            reason: "down".into(),
        });
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json["entityId"], 7);
        assert_eq!(json["possibleReorg"], false);
        assert_eq!(json["state"], "unissued");
        assert_eq!(json["degraded"][0]["type"], "rangeGap");
        assert_eq!(json["degraded"][0]["fromBlock"], 0);
        assert!(!history.is_complete());
    }
}
