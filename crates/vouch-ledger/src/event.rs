//! Ledger event shapes as consumed from the registry program.
//!
//! Events arrive as [`RawLedgerEvent`]s whose `args` are loosely typed,
//! order-dependent values. They are decoded exactly once, at this boundary,
//! into the closed [`EventArgs`] variant for their kind.

use std::fmt;

use serde::{Deserialize, Serialize};
use vouch_types::{Address, ChainHash, Digest, EntityId};

use crate::error::LedgerError;

/// Kind of registry event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Issued,
    Transferred,
    Revoked,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Issued => "Issued",
            EventKind::Transferred => "Transferred",
            EventKind::Revoked => "Revoked",
        };
        f.write_str(name)
    }
}

/// A single untyped log argument.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ArgValue {
    Uint(u64),
    Address(Address),
    Bytes32([u8; 32]),
    String(String),
    Bool(bool),
}

impl ArgValue {
    fn type_name(&self) -> &'static str {
        match self {
            ArgValue::Uint(_) => "uint",
            ArgValue::Address(_) => "address",
            ArgValue::Bytes32(_) => "bytes32",
            ArgValue::String(_) => "string",
            ArgValue::Bool(_) => "bool",
        }
    }
}

/// An event exactly as the ledger source reports it.
///
/// `parent_hash` and `timestamp` are optional: many sources only attach the
/// block hash and number to a log, leaving the rest to a block lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLedgerEvent {
    pub kind: EventKind,
    pub entity_id: EntityId,
    pub tx_hash: ChainHash,
    pub block_hash: ChainHash,
    pub parent_hash: Option<ChainHash>,
    pub block_number: u64,
    pub log_index: u32,
    pub timestamp: Option<u64>,
    pub args: Vec<ArgValue>,
}

/// Decoded event arguments, one variant per event kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all_fields = "camelCase")]
pub enum EventArgs {
    Issued {
        entity_id: EntityId,
        payload_digest: Digest,
    },
    Transferred {
        entity_id: EntityId,
        from: Address,
        to: Address,
    },
    Revoked {
        entity_id: EntityId,
    },
}

impl EventArgs {
    /// Decode the positional arguments of a `kind` event.
    ///
    /// Layouts:
    /// - `Issued`: `(uint entityId, bytes32|hex-string payloadDigest)`
    /// - `Transferred`: `(uint entityId, address from, address to)`
    /// - `Revoked`: `(uint entityId)`
    pub fn decode(kind: EventKind, args: &[ArgValue]) -> Result<Self, LedgerError> {
        match (kind, args) {
            (EventKind::Issued, [id, digest]) => Ok(EventArgs::Issued {
                entity_id: expect_uint(kind, 0, id)?,
                payload_digest: expect_digest(kind, 1, digest)?,
            }),
            (EventKind::Transferred, [id, from, to]) => Ok(EventArgs::Transferred {
                entity_id: expect_uint(kind, 0, id)?,
                from: expect_address(kind, 1, from)?,
                to: expect_address(kind, 2, to)?,
            }),
            (EventKind::Revoked, [id]) => Ok(EventArgs::Revoked {
                entity_id: expect_uint(kind, 0, id)?,
            }),
            _ => Err(LedgerError::MalformedEvent(format!(
                "{kind} expects {} args, got {}",
                arity(kind),
                args.len()
            ))),
        }
    }

    /// Positional form, as the registry program emits it.
    pub fn encode(&self) -> Vec<ArgValue> {
        match self {
            EventArgs::Issued {
                entity_id,
                payload_digest,
            } => vec![
                ArgValue::Uint(*entity_id),
                ArgValue::Bytes32(*payload_digest.as_bytes()),
            ],
            EventArgs::Transferred {
                entity_id,
                from,
                to,
            } => vec![
                ArgValue::Uint(*entity_id),
                ArgValue::Address(*from),
                ArgValue::Address(*to),
            ],
            EventArgs::Revoked { entity_id } => vec![ArgValue::Uint(*entity_id)],
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            EventArgs::Issued { .. } => EventKind::Issued,
            EventArgs::Transferred { .. } => EventKind::Transferred,
            EventArgs::Revoked { .. } => EventKind::Revoked,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        match self {
            EventArgs::Issued { entity_id, .. }
            | EventArgs::Transferred { entity_id, .. }
            | EventArgs::Revoked { entity_id } => *entity_id,
        }
    }

    /// The content digest carried by the event, if any.
    pub fn payload_digest(&self) -> Option<Digest> {
        match self {
            EventArgs::Issued { payload_digest, .. } => Some(*payload_digest),
            _ => None,
        }
    }
}

fn arity(kind: EventKind) -> usize {
    match kind {
        EventKind::Issued => 2,
        EventKind::Transferred => 3,
        EventKind::Revoked => 1,
    }
}

fn mismatch(kind: EventKind, index: usize, expected: &str, found: &ArgValue) -> LedgerError {
    LedgerError::MalformedEvent(format!(
        "{kind} arg {index}: expected {expected}, found {}",
        found.type_name()
    ))
}

fn expect_uint(kind: EventKind, index: usize, value: &ArgValue) -> Result<u64, LedgerError> {
    match value {
        ArgValue::Uint(v) => Ok(*v),
        other => Err(mismatch(kind, index, "uint", other)),
    }
}

fn expect_address(kind: EventKind, index: usize, value: &ArgValue) -> Result<Address, LedgerError> {
    match value {
        ArgValue::Address(a) => Ok(*a),
        other => Err(mismatch(kind, index, "address", other)),
    }
}

fn expect_digest(kind: EventKind, index: usize, value: &ArgValue) -> Result<Digest, LedgerError> {
    match value {
        ArgValue::Bytes32(bytes) => Ok(Digest::from_hash(*bytes)),
        ArgValue::String(s) => Digest::from_hex(s)
            .map_err(|e| LedgerError::MalformedEvent(format!("{kind} arg {index}: {e}"))),
        other => Err(mismatch(kind, index, "bytes32", other)),
    }
}

/// Block header fields the reconstructor needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub hash: ChainHash,
    pub parent_hash: ChainHash,
    pub number: u64,
    pub timestamp: u64,
}

/// How to address a block in a lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockRef {
    Hash(ChainHash),
    Number(u64),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Hash(hash) => write!(f, "{hash}"),
            BlockRef::Number(number) => write!(f, "#{number}"),
        }
    }
}
