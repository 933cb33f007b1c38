//! Ordered, idempotent consumption of the event log into derived state.
//!
//! One processor task runs per chain and is the only writer of the derived
//! `bytecode`/`contract` tables for that chain. It drains the log in strict
//! `(block_number, log_index)` order starting just past the derivation
//! cursor: first a full catch-up on startup, then incrementally on bus
//! notices, with a fallback tick covering notices lost to lag or events
//! that arrived through the historical path.
//!
//! # Cursor rules
//!
//! - After a clean batch the cursor advances to the last event's block.
//! - A shape-guard rejection or integrity violation is logged and skipped;
//!   retrying would fail identically, so the cursor moves on.
//! - Any other failure halts the drain with the cursor parked before the
//!   failing event's block; the event stays in the log for the next run.

pub mod decay;
pub mod guards;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::bus::NotifierBus;
use crate::error::Result;
use crate::ports::FullStore;
use crate::types::entities::{
    AutomationApplication, BlockchainEvent, InsertBidApplication,
};
use crate::types::events::CacheEvent;
use crate::types::primitives::{BlockNumber, Wei};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fallback drain cadence when no notices arrive.
///
/// Historical sync and resync do not publish on the bus; this tick keeps
/// the derived state converging on their writes.
const FALLBACK_DRAIN_INTERVAL: Duration = Duration::from_secs(30);

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH OUTCOME
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of processing one window of the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchOutcome {
    /// Every event consumed (processed or deliberately skipped).
    Completed {
        /// Block of the last consumed event, if the window held any.
        last_event_block: Option<BlockNumber>,
    },
    /// A hard failure stopped the drain; the cursor is already parked.
    Halted,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT PROCESSOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-chain consumer of the canonical event log.
pub struct EventProcessor<S> {
    store: Arc<S>,
    bus: NotifierBus,
    block_range: u64,
}

impl<S> std::fmt::Debug for EventProcessor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("block_range", &self.block_range)
            .finish_non_exhaustive()
    }
}

impl<S> EventProcessor<S>
where
    S: FullStore,
{
    /// Create a processor.
    #[must_use]
    pub fn new(store: Arc<S>, bus: NotifierBus, block_range: u64) -> Self {
        Self {
            store,
            bus,
            block_range: block_range.max(1),
        }
    }

    /// Run the per-chain consumer loop until shutdown.
    ///
    /// Subscribes to the bus before the initial drain so no notice is lost;
    /// notices arriving during the backlog drain simply trigger another
    /// (cheap) drain afterwards.
    #[instrument(skip(self, shutdown), fields(chain = %chain_id))]
    pub async fn run(&self, chain_id: Uuid, shutdown: CancellationToken) {
        let mut notices = self.bus.subscribe();

        if let Err(e) = self.drain(chain_id).await {
            error!(error = %e, code = e.code(), "Initial drain failed");
        }
        info!("Initial drain complete, switching to incremental processing");

        let mut fallback = tokio::time::interval(FALLBACK_DRAIN_INTERVAL);
        fallback.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        fallback.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Processor stopping");
                    return;
                }
                notice = notices.recv() => match notice {
                    Ok(notice) if notice.chain_id == chain_id => {
                        debug!(block = %notice.block_number, "Draining on stored-event notice");
                        if let Err(e) = self.drain(chain_id).await {
                            error!(error = %e, code = e.code(), "Drain failed");
                        }
                    }
                    Ok(_) => {} // another chain's notice
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notice stream lagged, draining to catch up");
                        if let Err(e) = self.drain(chain_id).await {
                            error!(error = %e, code = e.code(), "Drain failed");
                        }
                    }
                    Err(RecvError::Closed) => {
                        warn!("Notifier bus closed, processor stopping");
                        return;
                    }
                },
                _ = fallback.tick() => {
                    if let Err(e) = self.drain(chain_id).await {
                        error!(error = %e, code = e.code(), "Fallback drain failed");
                    }
                }
            }
        }
    }

    /// Drain everything between the derivation cursor and the newest stored
    /// event, one block window at a time.
    ///
    /// # Errors
    ///
    /// Returns an error only for storage failures around the drain itself;
    /// per-event failures are handled by the cursor rules.
    pub async fn drain(&self, chain_id: Uuid) -> Result<()> {
        loop {
            let cursor = self.store.get_last_processed_block(chain_id).await?;
            let Some(max_block) = self.store.max_event_block(chain_id).await? else {
                return Ok(());
            };
            if max_block <= cursor {
                return Ok(());
            }

            let window_start = cursor.next();
            let window_end = BlockNumber::new(
                cursor
                    .value()
                    .saturating_add(self.block_range)
                    .min(max_block.value()),
            );

            let events = self
                .store
                .events_in_block_range(chain_id, window_start, window_end)
                .await?;

            match self.process_batch(chain_id, &events).await? {
                BatchOutcome::Halted => return Ok(()),
                BatchOutcome::Completed { last_event_block } => {
                    // An empty window still advances: there is nothing to
                    // consume in those blocks.
                    let new_cursor = last_event_block.unwrap_or(window_end);
                    self.store
                        .update_last_processed_block(chain_id, new_cursor)
                        .await?;
                }
            }
        }
    }

    /// Consume one ordered batch of events.
    async fn process_batch(
        &self,
        chain_id: Uuid,
        events: &[BlockchainEvent],
    ) -> Result<BatchOutcome> {
        let mut last_consumed: Option<BlockNumber> = None;

        for event in events {
            match self.process_event(event).await {
                Ok(()) => {
                    metrics::counter!("indexer_events_processed_total").increment(1);
                    last_consumed = Some(event.block_number);
                }
                Err(e) if e.is_skippable() => {
                    // Retrying an invalid payload or a missing-prerequisite
                    // event would fail identically; record it and move on.
                    warn!(
                        event = %event.event_name,
                        block = %event.block_number,
                        log_index = event.log_index,
                        code = e.code(),
                        error = %e,
                        "Skipping event"
                    );
                    metrics::counter!("indexer_events_skipped_total").increment(1);
                    last_consumed = Some(event.block_number);
                }
                Err(e) => {
                    error!(
                        event = %event.event_name,
                        block = %event.block_number,
                        log_index = event.log_index,
                        tx = %event.transaction_hash,
                        code = e.code(),
                        error = %e,
                        "Event processing failed, halting drain before this event"
                    );
                    // Park the cursor so the failing event is retried; the
                    // monotonic guard ignores a no-op park.
                    let park = BlockNumber::new(event.block_number.value().saturating_sub(1));
                    self.store
                        .update_last_processed_block(chain_id, park)
                        .await?;
                    return Ok(BatchOutcome::Halted);
                }
            }
        }

        Ok(BatchOutcome::Completed {
            last_event_block: last_consumed,
        })
    }

    /// Dispatch one event through its typed handler.
    async fn process_event(&self, event: &BlockchainEvent) -> Result<()> {
        match guards::decode_event(event)? {
            CacheEvent::InsertBid(payload) => {
                let applicable_rate = self.applicable_decay_rate(event).await?;
                #[allow(clippy::cast_sign_loss)] // block timestamps are post-1970
                let timestamp_secs = event.block_timestamp.timestamp().max(0) as u64;
                let actual_bid = decay::actual_bid(payload.bid, timestamp_secs, applicable_rate);

                self.store
                    .apply_insert_bid(&InsertBidApplication {
                        chain_id: event.chain_id,
                        bytecode_hash: payload.codehash,
                        contract_address: payload.program,
                        size: payload.size,
                        actual_bid,
                        bid_plus_decay: payload.bid,
                        block_number: event.block_number,
                        block_timestamp: event.block_timestamp,
                    })
                    .await
            }
            CacheEvent::DeleteBid(payload) => {
                self.store
                    .apply_delete_bid(event.chain_id, &payload.codehash, payload.bid)
                    .await
            }
            CacheEvent::ContractAdded(payload) => {
                self.store
                    .apply_contract_added(&AutomationApplication {
                        chain_id: event.chain_id,
                        contract_address: payload.contract_address,
                        max_bid: payload.max_bid,
                        block_number: event.block_number,
                        block_timestamp: event.block_timestamp,
                    })
                    .await
            }
            CacheEvent::ContractUpdated(payload) => {
                self.store
                    .apply_contract_updated(&AutomationApplication {
                        chain_id: event.chain_id,
                        contract_address: payload.contract_address,
                        max_bid: payload.max_bid,
                        block_number: event.block_number,
                        block_timestamp: event.block_timestamp,
                    })
                    .await
            }
            CacheEvent::SetDecayRate(rate) => {
                // Consumed lazily by the decay lookup; the log row is the record.
                debug!(rate = %rate, block = %event.block_number, "Decay rate change observed");
                Ok(())
            }
            CacheEvent::SetCacheSize(size) => {
                debug!(size, block = %event.block_number, "Cache size change observed");
                Ok(())
            }
            CacheEvent::Pause => {
                debug!(block = %event.block_number, "Bidding paused");
                Ok(())
            }
            CacheEvent::Unpause => {
                debug!(block = %event.block_number, "Bidding resumed");
                Ok(())
            }
            CacheEvent::Initialized => {
                debug!(block = %event.block_number, "CacheManager initialized");
                Ok(())
            }
        }
    }

    /// Decay rate in effect at an event's position.
    ///
    /// Priority: most recent `SetDecayRate` at or before the event, then
    /// the latest on-chain snapshot, then zero.
    async fn applicable_decay_rate(&self, event: &BlockchainEvent) -> Result<Wei> {
        if let Some(rate) = self
            .store
            .decay_rate_at(event.chain_id, event.block_number, event.log_index)
            .await?
        {
            return Ok(rate);
        }

        if let Some(state) = self.store.latest_state(event.chain_id).await? {
            return Ok(state.decay_rate);
        }

        Ok(Wei::ZERO)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;
    use crate::types::entities::{Chain, NewBlockchainEvent};
    use crate::types::events::{ContractName, EventKind};
    use crate::types::primitives::{BytecodeHash, EthAddress};
    use crate::ports::{ChainStore, DerivedStateStore, EventStore};

    fn test_chain() -> Chain {
        Chain {
            id: Uuid::new_v4(),
            name: "test".into(),
            chain_id: 42161,
            rpc_url: "http://localhost:8545".into(),
            fast_sync_rpc_url: None,
            rpc_wss_url: "ws://localhost:8546".into(),
            rpc_wss_url_backup: None,
            cache_manager_address: EthAddress::new([0x51; 20]),
            arb_wasm_cache_address: EthAddress::new([0x72; 20]),
            arb_wasm_address: EthAddress::new([0x71; 20]),
            cache_manager_automation_address: None,
            origin_block: BlockNumber::new(0),
            last_synced_block: BlockNumber::new(0),
            last_processed_block: BlockNumber::new(0),
            enabled: true,
        }
    }

    fn insert_bid_event(
        chain_id: Uuid,
        block: u64,
        log_index: u64,
        bid: &str,
    ) -> NewBlockchainEvent {
        NewBlockchainEvent {
            chain_id,
            contract_name: ContractName::CacheManager,
            contract_address: EthAddress::new([0x51; 20]),
            event_name: EventKind::InsertBid.as_str().into(),
            block_timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            block_number: BlockNumber::new(block),
            transaction_hash: BytecodeHash::new([block as u8; 32]),
            log_index,
            is_real_time: false,
            event_data: json!([
                format!("0x{}", "ab".repeat(32)),
                format!("0x{}", "01".repeat(20)),
                bid,
                "1024",
            ]),
        }
    }

    #[tokio::test]
    async fn drain_processes_insert_bid_and_advances_cursor() {
        let store = Arc::new(MemoryStore::new());
        let chain = test_chain();
        store.insert_chain(&chain).await.unwrap();
        store
            .store_event(&insert_bid_event(chain.id, 100, 0, "1000000000000000000"))
            .await
            .unwrap();

        let processor = EventProcessor::new(Arc::clone(&store), NotifierBus::new(), 50_000);
        processor.drain(chain.id).await.unwrap();

        let bytecode = store
            .get_bytecode(chain.id, &BytecodeHash::new([0xAB; 32]))
            .await
            .unwrap()
            .unwrap();
        assert!(bytecode.is_cached);
        assert_eq!(bytecode.last_bid.to_decimal_string(), "1000000000000000000");

        assert_eq!(
            store.get_last_processed_block(chain.id).await.unwrap(),
            BlockNumber::new(100)
        );
    }

    #[tokio::test]
    async fn invalid_event_data_is_skipped_and_cursor_advances() {
        let store = Arc::new(MemoryStore::new());
        let chain = test_chain();
        store.insert_chain(&chain).await.unwrap();

        let mut broken = insert_bid_event(chain.id, 100, 0, "1000");
        broken.event_data = json!(["garbage"]);
        store.store_event(&broken).await.unwrap();
        store
            .store_event(&insert_bid_event(chain.id, 101, 0, "2000"))
            .await
            .unwrap();

        let processor = EventProcessor::new(Arc::clone(&store), NotifierBus::new(), 50_000);
        processor.drain(chain.id).await.unwrap();

        // The broken event was skipped, the good one applied, cursor at 101.
        assert_eq!(
            store.get_last_processed_block(chain.id).await.unwrap(),
            BlockNumber::new(101)
        );
        let bytecode = store
            .get_bytecode(chain.id, &BytecodeHash::new([0xAB; 32]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bytecode.last_bid.to_decimal_string(), "2000");
    }

    #[tokio::test]
    async fn delete_bid_without_insert_reports_and_continues() {
        let store = Arc::new(MemoryStore::new());
        let chain = test_chain();
        store.insert_chain(&chain).await.unwrap();

        let delete = NewBlockchainEvent {
            chain_id: chain.id,
            contract_name: ContractName::CacheManager,
            contract_address: EthAddress::new([0x51; 20]),
            event_name: EventKind::DeleteBid.as_str().into(),
            block_timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            block_number: BlockNumber::new(50),
            transaction_hash: BytecodeHash::new([0x05; 32]),
            log_index: 0,
            is_real_time: false,
            event_data: json!([format!("0x{}", "cd".repeat(32)), "100", "1024"]),
        };
        store.store_event(&delete).await.unwrap();

        let processor = EventProcessor::new(Arc::clone(&store), NotifierBus::new(), 50_000);
        processor.drain(chain.id).await.unwrap();

        // Integrity violation is reported but the pipeline moves on.
        assert_eq!(
            store.get_last_processed_block(chain.id).await.unwrap(),
            BlockNumber::new(50)
        );
    }

    #[tokio::test]
    async fn decay_rate_from_event_log_applies() {
        let store = Arc::new(MemoryStore::new());
        let chain = test_chain();
        store.insert_chain(&chain).await.unwrap();

        // SetDecayRate at block 90, then an InsertBid at block 100 with
        // timestamp 1_700_000_000: decay = ts * rate.
        let set_rate = NewBlockchainEvent {
            chain_id: chain.id,
            contract_name: ContractName::CacheManager,
            contract_address: EthAddress::new([0x51; 20]),
            event_name: EventKind::SetDecayRate.as_str().into(),
            block_timestamp: Utc.timestamp_opt(1_699_999_000, 0).unwrap(),
            block_number: BlockNumber::new(90),
            transaction_hash: BytecodeHash::new([0x09; 32]),
            log_index: 0,
            is_real_time: false,
            event_data: json!(["1"]),
        };
        store.store_event(&set_rate).await.unwrap();
        store
            .store_event(&insert_bid_event(chain.id, 100, 0, "2000000000000000000"))
            .await
            .unwrap();

        let processor = EventProcessor::new(Arc::clone(&store), NotifierBus::new(), 50_000);
        processor.drain(chain.id).await.unwrap();

        let bytecode = store
            .get_bytecode(chain.id, &BytecodeHash::new([0xAB; 32]))
            .await
            .unwrap()
            .unwrap();
        // actual = 2e18 - 1_700_000_000 * 1
        assert_eq!(
            bytecode.last_bid.to_decimal_string(),
            "1999999998300000000"
        );
        assert_eq!(
            bytecode.bid_plus_decay.to_decimal_string(),
            "2000000000000000000"
        );
    }
}
