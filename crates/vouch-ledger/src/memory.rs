use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use vouch_types::{Address, ChainHash, Digest, EntityId};

use crate::error::SourceError;
use crate::event::{ArgValue, BlockHeader, BlockRef, EventArgs, EventKind, RawLedgerEvent};
use crate::source::{AnchorMetadata, AnchorRecord, LedgerAnchor, LedgerEventSource};

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const BLOCK_INTERVAL_SECS: u64 = 12;

/// Simulated hash-linked ledger for tests, local demos, and embedding.
///
/// Every transaction is mined into its own block. Block and transaction
/// hashes are derived deterministically from the chain contents, so two
/// ledgers fed the same operations produce identical hashes.
pub struct InMemoryLedger {
    inner: RwLock<ChainState>,
    sparse_metadata: bool,
}

struct ChainState {
    blocks: Vec<Block>,
    anchors: HashMap<String, AnchorRecord>,
    next_entity: EntityId,
}

struct Block {
    header: BlockHeader,
    events: Vec<RawLedgerEvent>,
}

impl InMemoryLedger {
    /// A ledger holding only the genesis block.
    pub fn new() -> Self {
        let genesis = BlockHeader {
            hash: derive_hash(b"block", &ChainHash::zero(), 0, &ChainHash::zero()),
            parent_hash: ChainHash::zero(),
            number: 0,
            timestamp: GENESIS_TIMESTAMP,
        };
        Self {
            inner: RwLock::new(ChainState {
                blocks: vec![Block {
                    header: genesis,
                    events: Vec::new(),
                }],
                anchors: HashMap::new(),
                next_entity: 1,
            }),
            sparse_metadata: false,
        }
    }

    /// Report events with only block hash and number, leaving parent hash
    /// and timestamp to block lookups.
    pub fn with_sparse_metadata(mut self) -> Self {
        self.sparse_metadata = true;
        self
    }

    /// Issue a new entity committing to `payload_digest`.
    pub fn issue(&self, payload_digest: Digest) -> (EntityId, ChainHash) {
        let mut state = self.inner.write().expect("lock poisoned");
        let entity_id = state.next_entity;
        state.next_entity += 1;
        let args = EventArgs::Issued {
            entity_id,
            payload_digest,
        };
        let tx_hash = state.mine(Some((EventKind::Issued, entity_id, args.encode())));
        (entity_id, tx_hash)
    }

    pub fn transfer(&self, entity_id: EntityId, from: Address, to: Address) -> ChainHash {
        let args = EventArgs::Transferred {
            entity_id,
            from,
            to,
        };
        self.emit(EventKind::Transferred, entity_id, args.encode())
    }

    pub fn revoke(&self, entity_id: EntityId) -> ChainHash {
        let args = EventArgs::Revoked { entity_id };
        self.emit(EventKind::Revoked, entity_id, args.encode())
    }

    /// Mine an event with arbitrary arguments, well-formed or not.
    pub fn emit(&self, kind: EventKind, entity_id: EntityId, args: Vec<ArgValue>) -> ChainHash {
        let mut state = self.inner.write().expect("lock poisoned");
        state.mine(Some((kind, entity_id, args)))
    }

    /// Mine `count` blocks without transactions.
    pub fn mine_empty(&self, count: u64) {
        let mut state = self.inner.write().expect("lock poisoned");
        for _ in 0..count {
            state.mine(None);
        }
    }

    /// Number of the chain head.
    pub fn latest(&self) -> u64 {
        self.inner.read().expect("lock poisoned").head().number
    }

    pub fn header(&self, number: u64) -> Option<BlockHeader> {
        let state = self.inner.read().expect("lock poisoned");
        usize::try_from(number)
            .ok()
            .and_then(|n| state.blocks.get(n))
            .map(|block| block.header.clone())
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainState {
    fn head(&self) -> &BlockHeader {
        // Genesis is created in `new` and blocks are never removed.
        &self.blocks[self.blocks.len() - 1].header
    }

    /// Append a block, optionally carrying one event, and return the hash of
    /// its transaction (the block hash for an empty block).
    fn mine(&mut self, event: Option<(EventKind, EntityId, Vec<ArgValue>)>) -> ChainHash {
        let parent = self.head().clone();
        let number = parent.number + 1;
        let timestamp = GENESIS_TIMESTAMP + number * BLOCK_INTERVAL_SECS;
        let tx_hash = match &event {
            Some((kind, entity_id, _)) => {
                let label = blake3::hash(format!("{kind}:{entity_id}").as_bytes());
                derive_hash(b"tx", &parent.hash, number, &ChainHash::new(*label.as_bytes()))
            }
            None => ChainHash::zero(),
        };
        let header = BlockHeader {
            hash: derive_hash(b"block", &parent.hash, number, &tx_hash),
            parent_hash: parent.hash,
            number,
            timestamp,
        };
        let events = event
            .map(|(kind, entity_id, args)| RawLedgerEvent {
                kind,
                entity_id,
                tx_hash,
                block_hash: header.hash,
                parent_hash: Some(header.parent_hash),
                block_number: number,
                log_index: 0,
                timestamp: Some(timestamp),
                args,
            })
            .into_iter()
            .collect();
        let block_hash = header.hash;
        self.blocks.push(Block { header, events });
        if tx_hash.is_zero() {
            block_hash
        } else {
            tx_hash
        }
    }

    fn find(&self, block: BlockRef) -> Option<&Block> {
        match block {
            BlockRef::Hash(hash) => self.blocks.iter().find(|b| b.header.hash == hash),
            BlockRef::Number(number) => usize::try_from(number).ok().and_then(|n| self.blocks.get(n)),
        }
    }
}

fn derive_hash(domain: &[u8], parent: &ChainHash, number: u64, body: &ChainHash) -> ChainHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(parent.as_bytes());
    hasher.update(&number.to_le_bytes());
    hasher.update(body.as_bytes());
    ChainHash::new(*hasher.finalize().as_bytes())
}

#[async_trait]
impl LedgerEventSource for InMemoryLedger {
    async fn latest_block(&self) -> Result<u64, SourceError> {
        Ok(self.latest())
    }

    async fn query_events(
        &self,
        entity_id: EntityId,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLedgerEvent>, SourceError> {
        let state = self.inner.read().expect("lock poisoned");
        let events = state
            .blocks
            .iter()
            .filter(|b| (from_block..=to_block).contains(&b.header.number))
            .flat_map(|b| b.events.iter())
            .filter(|e| e.entity_id == entity_id)
            .map(|e| {
                let mut event = e.clone();
                if self.sparse_metadata {
                    event.parent_hash = None;
                    event.timestamp = None;
                }
                event
            })
            .collect();
        Ok(events)
    }

    async fn get_block(&self, block: BlockRef) -> Result<BlockHeader, SourceError> {
        let state = self.inner.read().expect("lock poisoned");
        state
            .find(block)
            .map(|b| b.header.clone())
            .ok_or_else(|| SourceError::NotFound(format!("block {block}")))
    }

    async fn query_anchor(&self, batch_id: &str) -> Result<Option<AnchorRecord>, SourceError> {
        let state = self.inner.read().expect("lock poisoned");
        Ok(state.anchors.get(batch_id).cloned())
    }
}

#[async_trait]
impl LedgerAnchor for InMemoryLedger {
    async fn submit_batch(
        &self,
        batch_id: &str,
        root: Digest,
        metadata: &AnchorMetadata,
    ) -> Result<ChainHash, SourceError> {
        let mut state = self.inner.write().expect("lock poisoned");
        if state.anchors.contains_key(batch_id) {
            return Err(SourceError::Rejected(format!(
                "batch {batch_id} is already anchored"
            )));
        }
        let parent = state.head().clone();
        let number = parent.number + 1;
        let tx_hash = derive_hash(b"anchor", &parent.hash, number, &ChainHash::new(*root.as_bytes()));
        let header = BlockHeader {
            hash: derive_hash(b"block", &parent.hash, number, &tx_hash),
            parent_hash: parent.hash,
            number,
            timestamp: GENESIS_TIMESTAMP + number * BLOCK_INTERVAL_SECS,
        };
        state.anchors.insert(
            batch_id.to_string(),
            AnchorRecord {
                batch_id: batch_id.to_string(),
                root,
                label: metadata.label.clone(),
                leaf_count: metadata.leaf_count,
                tx_hash,
                block_number: number,
                block_hash: header.hash,
            },
        );
        state.blocks.push(Block {
            header,
            events: Vec::new(),
        });
        Ok(tx_hash)
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read().expect("lock poisoned");
        f.debug_struct("InMemoryLedger")
            .field("latest_block", &state.head().number)
            .field("anchors", &state.anchors.len())
            .field("sparse_metadata", &self.sparse_metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(seed: u8) -> Address {
        Address::new([seed; 20])
    }

    #[tokio::test]
    async fn blocks_are_hash_linked() {
        let ledger = InMemoryLedger::new();
        ledger.issue(Digest::of(b"a"));
        ledger.mine_empty(3);
        assert_eq!(ledger.latest(), 4);
        for n in 1..=4 {
            let header = ledger.get_block(BlockRef::Number(n)).await.unwrap();
            let parent = ledger.get_block(BlockRef::Number(n - 1)).await.unwrap();
            assert_eq!(header.parent_hash, parent.hash);
            assert_eq!(header.number, n);
            assert!(header.timestamp > parent.timestamp);
        }
    }

    #[tokio::test]
    async fn lookup_by_hash_matches_lookup_by_number() {
        let ledger = InMemoryLedger::new();
        ledger.mine_empty(2);
        let by_number = ledger.get_block(BlockRef::Number(2)).await.unwrap();
        let by_hash = ledger.get_block(BlockRef::Hash(by_number.hash)).await.unwrap();
        assert_eq!(by_number, by_hash);
        assert!(matches!(
            ledger.get_block(BlockRef::Number(99)).await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn identical_operations_give_identical_hashes() {
        let a = InMemoryLedger::new();
        let b = InMemoryLedger::new();
        assert_eq!(a.issue(Digest::of(b"x")), b.issue(Digest::of(b"x")));
        assert_eq!(a.header(1), b.header(1));
    }

    #[tokio::test]
    async fn query_filters_by_entity_and_range() {
        let ledger = InMemoryLedger::new();
        let (first, _) = ledger.issue(Digest::of(b"one"));
        let (second, _) = ledger.issue(Digest::of(b"two"));
        ledger.transfer(first, addr(1), addr(2));
        ledger.revoke(first);

        let all = ledger.query_events(first, 0, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|e| e.entity_id == first));

        let windowed = ledger.query_events(first, 2, 3).await.unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].kind, EventKind::Transferred);

        assert_eq!(ledger.query_events(second, 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sparse_metadata_omits_parent_and_timestamp() {
        let ledger = InMemoryLedger::new().with_sparse_metadata();
        let (id, _) = ledger.issue(Digest::of(b"one"));
        let events = ledger.query_events(id, 0, 10).await.unwrap();
        assert!(events[0].parent_hash.is_none());
        assert!(events[0].timestamp.is_none());
    }

    #[tokio::test]
    async fn anchors_are_queryable_and_write_once() {
        let ledger = InMemoryLedger::new();
        let root = Digest::of(b"root");
        let metadata = AnchorMetadata {
            label: "BSc 2024".into(),
            leaf_count: 4,
        };
        let tx = ledger.submit_batch("batch-1", root, &metadata).await.unwrap();

        let record = ledger.query_anchor("batch-1").await.unwrap().unwrap();
        assert_eq!(record.root, root);
        assert_eq!(record.tx_hash, tx);
        assert_eq!(record.leaf_count, 4);
        assert_eq!(record.block_number, ledger.latest());

        assert!(matches!(
            ledger.submit_batch("batch-1", root, &metadata).await,
            Err(SourceError::Rejected(_))
        ));
        assert!(ledger.query_anchor("batch-2").await.unwrap().is_none());
    }
}
