//! Audit-trail reconstruction.
//!
//! [`AuditTrailReconstructor::history`] pulls every event referencing an
//! entity from a [`LedgerEventSource`], orders them by block, checks that the
//! blocks behind them form one parent-linked chain, attaches payloads from an
//! optional [`ContentStore`], and folds the lifecycle. Individual failures
//! degrade the result instead of failing it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use vouch_store::{ContentStore, StoreError};
use vouch_types::{ChainHash, EntityId};

use crate::config::{PreIssuePolicy, ReconstructorConfig};
use crate::error::LedgerError;
use crate::event::{BlockHeader, BlockRef, EventArgs, RawLedgerEvent};
use crate::history::{
    Anomaly, AnomalyKind, ChainBreak, Degraded, EntityHistory, HistoryEntry, Lifecycle, Payload,
};
use crate::source::LedgerEventSource;

/// Builds ordered, verified histories from ledger events.
pub struct AuditTrailReconstructor<S: ?Sized> {
    source: Arc<S>,
    store: Option<Arc<dyn ContentStore>>,
    config: ReconstructorConfig,
}

/// Outcome of linking a later block back to an earlier one.
enum Link {
    Linked,
    Broken(String),
    Unverified(String),
}

/// Mutable state of a single `history` call.
struct Pass {
    deadline: Option<Instant>,
    headers: HashMap<ChainHash, BlockHeader>,
    failed_lookups: HashSet<ChainHash>,
    anomalies: Vec<Anomaly>,
    degraded: Vec<Degraded>,
    reorg_points: Vec<ChainBreak>,
    partial: bool,
}

impl Pass {
    fn new(deadline: Option<Instant>) -> Self {
        Self {
            deadline,
            headers: HashMap::new(),
            failed_lookups: HashSet::new(),
            anomalies: Vec::new(),
            degraded: Vec::new(),
            reorg_points: Vec::new(),
            partial: false,
        }
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn gap(&mut self, from_block: u64, to_block: u64, reason: impl Into<String>) {
        self.partial = true;
        self.degraded.push(Degraded::RangeGap {
            from_block,
            to_block,
            reason: reason.into(),
        });
    }

    fn reorg(&mut self, block_number: u64, block_hash: ChainHash, reason: String) {
        warn!(block_number, block = %block_hash, %reason, "possible reorg");
        self.reorg_points.push(ChainBreak {
            block_number,
            block_hash,
            reason,
        });
    }

    fn anomaly(&mut self, event: &RawLedgerEvent, kind: AnomalyKind) {
        self.anomalies.push(Anomaly {
            tx_hash: event.tx_hash,
            block_number: event.block_number,
            kind,
        });
    }
}

impl<S> AuditTrailReconstructor<S>
where
    S: LedgerEventSource + ?Sized,
{
    pub fn new(source: Arc<S>, config: ReconstructorConfig) -> Self {
        Self {
            source,
            store: None,
            config,
        }
    }

    /// Resolve payload digests through `store`.
    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &ReconstructorConfig {
        &self.config
    }

    /// Reconstruct the history of `entity_id`, bounded by the configured
    /// timeout if one is set.
    pub async fn history(&self, entity_id: EntityId) -> Result<EntityHistory, LedgerError> {
        let deadline = self.config.timeout().map(|timeout| Instant::now() + timeout);
        self.history_until(entity_id, deadline).await
    }

    /// Reconstruct with an explicit timeout, overriding the configured one.
    ///
    /// When time runs out, whatever was collected is still ordered, checked,
    /// and returned with `partial` set.
    pub async fn history_with_timeout(
        &self,
        entity_id: EntityId,
        timeout: Duration,
    ) -> Result<EntityHistory, LedgerError> {
        self.history_until(entity_id, Some(Instant::now() + timeout))
            .await
    }

    async fn history_until(
        &self,
        entity_id: EntityId,
        deadline: Option<Instant>,
    ) -> Result<EntityHistory, LedgerError> {
        let mut pass = Pass::new(deadline);
        let from_block = self.config.from_block;

        let to_block = match self.config.to_block {
            Some(to_block) => to_block,
            None => {
                let latest = self
                    .config
                    .retry
                    .run("latest_block", deadline, || self.source.latest_block())
                    .await;
                match latest {
                    Ok(latest) => latest,
                    Err(LedgerError::Timeout) => {
                        pass.gap(from_block, u64::MAX, "deadline exceeded before chain head was known");
                        return Ok(finish(entity_id, Vec::new(), Lifecycle::default(), pass));
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        let raw = self.collect(entity_id, from_block, to_block, &mut pass).await?;
        let mut candidates = self.normalize(entity_id, raw, &mut pass);
        // Log index is the ledger's emission order within a block; the sort
        // is stable, so entries tied on both keep the source's order.
        candidates.sort_by_key(|(event, _)| (event.block_number, event.log_index));

        let mut entries = Vec::with_capacity(candidates.len());
        for (event, args) in candidates {
            let header = self.event_header(&event, &mut pass).await;
            entries.push(HistoryEntry {
                kind: event.kind,
                tx_hash: event.tx_hash,
                block_number: event.block_number,
                block_hash: event.block_hash,
                parent_hash: event.parent_hash.or(header.as_ref().map(|h| h.parent_hash)),
                timestamp: event.timestamp.or(header.as_ref().map(|h| h.timestamp)),
                log_index: event.log_index,
                args,
                payload: None,
            });
        }

        self.check_contiguity(&entries, &mut pass).await;
        self.resolve_payloads(&mut entries, &mut pass);

        let mut lifecycle = Lifecycle::default();
        for entry in &entries {
            let Some(kind) = lifecycle.apply(&entry.args) else {
                continue;
            };
            if kind == AnomalyKind::TransferBeforeIssue
                && self.config.pre_issue_transfer == PreIssuePolicy::Reject
            {
                return Err(LedgerError::TransferBeforeIssue {
                    entity_id,
                    tx_hash: entry.tx_hash,
                });
            }
            pass.anomalies.push(Anomaly {
                tx_hash: entry.tx_hash,
                block_number: entry.block_number,
                kind,
            });
        }

        if entries.is_empty() && pass.anomalies.is_empty() && !pass.partial {
            return Err(LedgerError::NoHistory(entity_id));
        }
        Ok(finish(entity_id, entries, lifecycle, pass))
    }

    /// Query `[from_block, to_block]` window by window.
    async fn collect(
        &self,
        entity_id: EntityId,
        from_block: u64,
        to_block: u64,
        pass: &mut Pass,
    ) -> Result<Vec<RawLedgerEvent>, LedgerError> {
        let window = match self.config.query_window {
            0 => u64::MAX,
            n => n,
        };
        let mut events = Vec::new();
        let mut succeeded = 0usize;
        let mut timed_out = false;
        let mut last_error = None;

        let mut start = from_block;
        while start <= to_block {
            let end = start.saturating_add(window - 1).min(to_block);
            if pass.expired() {
                pass.gap(start, to_block, "deadline exceeded");
                timed_out = true;
                break;
            }
            let result = self
                .config
                .retry
                .run("query_events", pass.deadline, || {
                    self.source.query_events(entity_id, start, end)
                })
                .await;
            match result {
                Ok(mut batch) => {
                    debug!(
                        entity_id,
                        from_block = start,
                        to_block = end,
                        count = batch.len(),
                        "queried events"
                    );
                    succeeded += 1;
                    events.append(&mut batch);
                }
                Err(LedgerError::Timeout) => {
                    pass.gap(start, to_block, "deadline exceeded");
                    timed_out = true;
                    break;
                }
                Err(err) => {
                    warn!(
                        entity_id,
                        from_block = start,
                        to_block = end,
                        error = %err,
                        "event window unavailable"
                    );
                    pass.gap(start, end, err.to_string());
                    last_error = Some(err);
                }
            }
            if end == to_block {
                break;
            }
            start = end + 1;
        }

        if succeeded == 0 && !timed_out {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Ok(events)
    }

    /// Drop repeats, decode arguments, and seed the header cache from events
    /// that carry full block metadata.
    fn normalize(
        &self,
        entity_id: EntityId,
        raw: Vec<RawLedgerEvent>,
        pass: &mut Pass,
    ) -> Vec<(RawLedgerEvent, EventArgs)> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(raw.len());
        for event in raw {
            if !seen.insert((event.block_hash, event.tx_hash, event.log_index)) {
                continue;
            }
            if let (Some(parent_hash), Some(timestamp)) = (event.parent_hash, event.timestamp) {
                pass.headers.entry(event.block_hash).or_insert(BlockHeader {
                    hash: event.block_hash,
                    parent_hash,
                    number: event.block_number,
                    timestamp,
                });
            }
            if event.entity_id != entity_id {
                let reason = format!("event references entity {}", event.entity_id);
                pass.anomaly(&event, AnomalyKind::MalformedEvent { reason });
                continue;
            }
            match EventArgs::decode(event.kind, &event.args) {
                Ok(args) if args.entity_id() != entity_id => {
                    let reason = format!("arguments reference entity {}", args.entity_id());
                    pass.anomaly(&event, AnomalyKind::MalformedEvent { reason });
                }
                Ok(args) => candidates.push((event, args)),
                Err(err) => {
                    pass.anomaly(&event, AnomalyKind::MalformedEvent { reason: err.to_string() });
                }
            }
        }
        candidates
    }

    /// Fetch a header by hash through the per-call cache.
    async fn header(&self, pass: &mut Pass, hash: ChainHash) -> Result<BlockHeader, String> {
        if let Some(header) = pass.headers.get(&hash) {
            return Ok(header.clone());
        }
        if pass.failed_lookups.contains(&hash) {
            return Err("lookup already failed".into());
        }
        if pass.expired() {
            pass.partial = true;
            return Err(LedgerError::Timeout.to_string());
        }
        let result = self
            .config
            .retry
            .run("get_block", pass.deadline, || {
                self.source.get_block(BlockRef::Hash(hash))
            })
            .await;
        match result {
            Ok(header) => {
                pass.headers.insert(hash, header.clone());
                Ok(header)
            }
            Err(err) => {
                if err.is_timeout() {
                    pass.partial = true;
                } else {
                    pass.failed_lookups.insert(hash);
                }
                Err(err.to_string())
            }
        }
    }

    /// Header of the block an event was emitted in, or `None` when it could
    /// not be resolved or disagrees with the event.
    async fn event_header(&self, event: &RawLedgerEvent, pass: &mut Pass) -> Option<BlockHeader> {
        if event.parent_hash.is_some() && event.timestamp.is_some() {
            return None;
        }
        let already_failed = pass.failed_lookups.contains(&event.block_hash);
        match self.header(pass, event.block_hash).await {
            Ok(header) if header.number != event.block_number => {
                let reason = format!(
                    "event reports block {} but its header is at height {}",
                    event.block_number, header.number
                );
                pass.reorg(event.block_number, event.block_hash, reason);
                None
            }
            Ok(header) => Some(header),
            Err(reason) => {
                if !already_failed {
                    warn!(block = %event.block_hash, %reason, "block lookup failed");
                    pass.degraded.push(Degraded::BlockLookup {
                        block_hash: event.block_hash,
                        reason,
                    });
                }
                None
            }
        }
    }

    /// Check that consecutive blocks behind `entries` link by parent hash.
    async fn check_contiguity(&self, entries: &[HistoryEntry], pass: &mut Pass) {
        let mut previous: Option<(u64, ChainHash)> = None;
        for entry in entries {
            let current = (entry.block_number, entry.block_hash);
            let Some((prev_number, prev_hash)) = previous else {
                previous = Some(current);
                continue;
            };
            if current == (prev_number, prev_hash) {
                continue;
            }
            previous = Some(current);

            if entry.block_number == prev_number {
                let reason = format!("block {prev_number} seen with two hashes ({prev_hash} and {})", entry.block_hash);
                pass.reorg(entry.block_number, entry.block_hash, reason);
                continue;
            }

            match self.link(entry, prev_number, prev_hash, pass).await {
                Link::Linked => {}
                Link::Broken(reason) => pass.reorg(entry.block_number, entry.block_hash, reason),
                Link::Unverified(reason) => {
                    debug!(from_block = prev_number, to_block = entry.block_number, %reason, "chain link unverified");
                    pass.degraded.push(Degraded::UnverifiedLink {
                        from_block: prev_number,
                        to_block: entry.block_number,
                        reason,
                    });
                }
            }
        }
    }

    /// Walk parent links back from `entry`'s block to height `prev_number`.
    async fn link(
        &self,
        entry: &HistoryEntry,
        prev_number: u64,
        prev_hash: ChainHash,
        pass: &mut Pass,
    ) -> Link {
        let Some(mut parent) = entry.parent_hash else {
            return Link::Unverified(format!("parent of block {} is unknown", entry.block_number));
        };
        let mut height = entry.block_number - 1;
        let mut walked = 0u64;
        loop {
            if height == prev_number {
                return if parent == prev_hash {
                    Link::Linked
                } else {
                    Link::Broken(format!(
                        "block {} does not descend from {prev_hash} at height {prev_number}",
                        entry.block_number
                    ))
                };
            }
            if walked >= self.config.max_chain_walk {
                return Link::Unverified(format!(
                    "gap of {} blocks exceeds walk limit",
                    entry.block_number - prev_number
                ));
            }
            let header = match self.header(pass, parent).await {
                Ok(header) => header,
                Err(reason) => return Link::Unverified(format!("ancestor {parent}: {reason}")),
            };
            if header.number != height {
                return Link::Broken(format!(
                    "ancestor {parent} is at height {}, expected {height}",
                    header.number
                ));
            }
            parent = header.parent_hash;
            height -= 1;
            walked += 1;
        }
    }

    fn resolve_payloads(&self, entries: &mut [HistoryEntry], pass: &mut Pass) {
        let Some(store) = self.store.as_ref().filter(|_| self.config.resolve_payloads) else {
            return;
        };
        for entry in entries.iter_mut() {
            let Some(digest) = entry.args.payload_digest() else {
                continue;
            };
            match store.get(&digest) {
                Ok(bytes) => entry.payload = Some(Payload::from_bytes(&bytes)),
                Err(err) => {
                    if matches!(err, StoreError::IntegrityFault { .. }) {
                        warn!(digest = %digest.short_hex(), error = %err, "stored payload failed integrity check");
                    }
                    pass.degraded.push(Degraded::Payload {
                        digest,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }
}

fn finish(
    entity_id: EntityId,
    events: Vec<HistoryEntry>,
    lifecycle: Lifecycle,
    pass: Pass,
) -> EntityHistory {
    let history = EntityHistory {
        entity_id,
        events,
        possible_reorg: !pass.reorg_points.is_empty(),
        partial: pass.partial,
        state: lifecycle.state,
        owner: lifecycle.owner,
        anomalies: pass.anomalies,
        degraded: pass.degraded,
        reorg_points: pass.reorg_points,
    };
    info!(
        entity_id,
        events = history.events.len(),
        partial = history.partial,
        possible_reorg = history.possible_reorg,
        anomalies = history.anomalies.len(),
        degraded = history.degraded.len(),
        "reconstructed history"
    );
    history
}
