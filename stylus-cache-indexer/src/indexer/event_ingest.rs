//! Event ingestion boundary: raw logs in, canonical log rows out.
//!
//! `prepare_events` normalizes decoded logs into [`NewBlockchainEvent`]
//! records, resolving block timestamps (cached, since they are immutable)
//! and inferring contract attribution from the emitting address.
//! `store_events` commits records with per-record isolation: each insert is
//! its own transaction, and a failing record only increments the error
//! count of its batch.

use std::sync::Arc;
use std::time::Duration;

use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use chrono::{DateTime, Utc};
use moka::future::Cache as MokaCache;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::abi::{cache_manager, cache_manager_automation};
use crate::error::{AppError, InfraError, Result};
use crate::ports::EventStore;
use crate::types::entities::{Chain, NewBlockchainEvent, StoreOutcome};
use crate::types::events::{ContractName, EventKind};
use crate::types::primitives::{BlockNumber, BytecodeHash, EthAddress};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Attempts for one block-timestamp lookup.
const BLOCK_FETCH_ATTEMPTS: u32 = 3;

/// Delay between block-timestamp lookup attempts.
const BLOCK_FETCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Maximum number of block timestamps to cache.
const BLOCK_CACHE_MAX_CAPACITY: u64 = 10_000;

/// Time-to-live for cached block timestamps. Timestamps are immutable, so
/// the TTL only bounds memory.
const BLOCK_CACHE_TTL: Duration = Duration::from_secs(3600);

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT INGEST
// ═══════════════════════════════════════════════════════════════════════════════

/// Normalizes and stores blockchain events with exactly-once semantics.
pub struct EventIngest<S> {
    store: Arc<S>,
    storage_batch_size: usize,
    block_cache: MokaCache<(uuid::Uuid, u64), DateTime<Utc>>,
}

impl<S> std::fmt::Debug for EventIngest<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventIngest")
            .field("storage_batch_size", &self.storage_batch_size)
            .field("cached_blocks", &self.block_cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl<S> EventIngest<S>
where
    S: EventStore,
{
    /// Create an ingest boundary over the given store.
    #[must_use]
    pub fn new(store: Arc<S>, storage_batch_size: usize) -> Self {
        let block_cache = MokaCache::builder()
            .max_capacity(BLOCK_CACHE_MAX_CAPACITY)
            .time_to_live(BLOCK_CACHE_TTL)
            .build();

        Self {
            store,
            storage_batch_size,
            block_cache,
        }
    }

    /// Normalize raw logs into storable records.
    ///
    /// Logs with unknown signatures or missing metadata are skipped with a
    /// warning; they cannot carry an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EventProcessingFailed`] when a block-timestamp
    /// lookup exhausts its retries - without a timestamp the record would
    /// be unusable downstream.
    #[instrument(skip(self, chain, logs, provider), fields(chain = %chain.name, logs = logs.len()))]
    pub async fn prepare_events(
        &self,
        chain: &Chain,
        logs: Vec<Log>,
        provider: &DynProvider,
        is_real_time: bool,
    ) -> Result<Vec<NewBlockchainEvent>> {
        let mut records = Vec::with_capacity(logs.len());

        for log in logs {
            let Some(topic0) = log.topics().first() else {
                debug!("Skipping log with no topics");
                continue;
            };
            let Some(kind) = EventKind::from_signature_hash(topic0) else {
                debug!(topic0 = %topic0, "Skipping log with unknown signature");
                continue;
            };

            let (Some(block_number), Some(tx_hash), Some(log_index)) =
                (log.block_number, log.transaction_hash, log.log_index)
            else {
                warn!(event = %kind, "Skipping log with missing metadata");
                continue;
            };

            let event_data = match serialize_event_data(kind, &log) {
                Ok(data) => data,
                Err(e) => {
                    warn!(event = %kind, error = %e, "Failed to decode log payload");
                    continue;
                }
            };

            let block_timestamp = self
                .resolve_block_timestamp(chain.id, block_number, provider)
                .await?;

            let contract_address = EthAddress::from(log.address());
            let contract_name = infer_contract_name(chain, contract_address);
            if contract_name == ContractName::Unknown {
                warn!(
                    address = %contract_address,
                    event = %kind,
                    "Event from unrecognized contract address"
                );
            }

            records.push(NewBlockchainEvent {
                chain_id: chain.id,
                contract_name,
                contract_address,
                event_name: kind.as_str().to_owned(),
                block_timestamp,
                block_number: BlockNumber::new(block_number),
                transaction_hash: BytecodeHash::new(tx_hash.0),
                log_index,
                is_real_time,
                event_data,
            });
        }

        Ok(records)
    }

    /// Store records in isolation batches.
    ///
    /// Each record commits in its own transaction; a failure rolls back that
    /// record alone and the batch continues. Duplicates count as successes.
    #[instrument(skip(self, records), fields(total = records.len()))]
    pub async fn store_events(&self, records: &[NewBlockchainEvent]) -> StoreOutcome {
        let mut outcome = StoreOutcome::default();

        for batch in records.chunks(self.storage_batch_size.max(1)) {
            for record in batch {
                match self.store.store_event(record).await {
                    Ok(_) => outcome.success_count += 1,
                    Err(e) => {
                        warn!(
                            event = %record.event_name,
                            block = %record.block_number,
                            log_index = record.log_index,
                            error = %e,
                            "Failed to store event"
                        );
                        outcome.error_count += 1;
                    }
                }
                outcome.total_events += 1;
            }
            debug!(
                batch = batch.len(),
                success = outcome.success_count,
                errors = outcome.error_count,
                "Storage batch committed"
            );
        }

        metrics::counter!("indexer_events_stored_total").increment(outcome.success_count as u64);
        if outcome.error_count > 0 {
            metrics::counter!("indexer_event_store_errors_total")
                .increment(outcome.error_count as u64);
        }

        outcome
    }

    /// Store a single record, returning the id of the stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying insert fails.
    pub async fn store_event(&self, record: &NewBlockchainEvent) -> Result<uuid::Uuid> {
        let id = self.store.store_event(record).await?;
        metrics::counter!("indexer_events_stored_total").increment(1);
        Ok(id)
    }

    /// Resolve a block timestamp, preferring the cache.
    async fn resolve_block_timestamp(
        &self,
        chain_id: uuid::Uuid,
        block_number: u64,
        provider: &DynProvider,
    ) -> Result<DateTime<Utc>> {
        if let Some(cached) = self.block_cache.get(&(chain_id, block_number)).await {
            return Ok(cached);
        }

        let timestamp = fetch_block_timestamp(provider, block_number).await?;
        self.block_cache
            .insert((chain_id, block_number), timestamp)
            .await;
        Ok(timestamp)
    }
}

/// Fetch a block's timestamp with bounded retries.
async fn fetch_block_timestamp(
    provider: &DynProvider,
    block_number: u64,
) -> Result<DateTime<Utc>> {
    let mut last_error = String::new();

    for attempt in 0..BLOCK_FETCH_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(BLOCK_FETCH_RETRY_DELAY).await;
        }

        match provider
            .get_block_by_number(alloy::eips::BlockNumberOrTag::Number(block_number))
            .await
        {
            Ok(Some(block)) => {
                #[allow(clippy::cast_possible_wrap)] // timestamps fit i64 for eons
                let timestamp = DateTime::<Utc>::from_timestamp(block.header.timestamp as i64, 0)
                    .unwrap_or_else(Utc::now);
                return Ok(timestamp);
            }
            Ok(None) => {
                last_error = format!("block {block_number} not found");
            }
            Err(e) => {
                last_error = e.to_string();
            }
        }
        debug!(block_number, attempt, error = %last_error, "Block lookup failed");
    }

    Err(AppError::processing(
        format!("block timestamp lookup for block {block_number}"),
        InfraError::Rpc(last_error.into()).into(),
    ))
}

/// Infer which configured contract emitted a log.
fn infer_contract_name(chain: &Chain, address: EthAddress) -> ContractName {
    if address == chain.cache_manager_address {
        ContractName::CacheManager
    } else if chain.cache_manager_automation_address == Some(address) {
        ContractName::CacheManagerAutomation
    } else {
        ContractName::Unknown
    }
}

/// Serialize a log's decoded arguments as an ordered array of strings.
///
/// Big integers become decimal strings so downstream arithmetic stays
/// exact; addresses and hashes are lowercase hex.
fn serialize_event_data(kind: EventKind, log: &Log) -> Result<serde_json::Value> {
    let decode_err =
        |e: alloy::sol_types::Error| InfraError::EventDecoding(format!("{kind}: {e}"));

    let data = match kind {
        EventKind::InsertBid => {
            let event = cache_manager::InsertBid::decode_log(&log.inner).map_err(decode_err)?.data;
            json!([
                format!("{:#x}", event.codehash),
                format!("{:#x}", event.program),
                event.bid.to_string(),
                event.size.to_string(),
            ])
        }
        EventKind::DeleteBid => {
            let event = cache_manager::DeleteBid::decode_log(&log.inner).map_err(decode_err)?.data;
            json!([
                format!("{:#x}", event.codehash),
                event.bid.to_string(),
                event.size.to_string(),
            ])
        }
        EventKind::SetCacheSize => {
            let event = cache_manager::SetCacheSize::decode_log(&log.inner).map_err(decode_err)?.data;
            json!([event.size.to_string()])
        }
        EventKind::SetDecayRate => {
            let event = cache_manager::SetDecayRate::decode_log(&log.inner).map_err(decode_err)?.data;
            json!([event.decay.to_string()])
        }
        EventKind::Initialized => {
            let event = cache_manager::Initialized::decode_log(&log.inner).map_err(decode_err)?.data;
            json!([event.version.to_string()])
        }
        EventKind::Pause | EventKind::Unpause => json!([]),
        EventKind::ContractAdded => {
            let event =
                cache_manager_automation::ContractAdded::decode_log(&log.inner).map_err(decode_err)?.data;
            json!([
                format!("{:#x}", event.user),
                format!("{:#x}", event.contractAddress),
                event.maxBid.to_string(),
            ])
        }
        EventKind::ContractUpdated => {
            let event = cache_manager_automation::ContractUpdated::decode_log(&log.inner)
                .map_err(decode_err)?.data;
            json!([
                format!("{:#x}", event.contractAddress),
                event.maxBid.to_string(),
            ])
        }
    };

    Ok(data)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use alloy::primitives::{Address, B256, Bytes, LogData, aliases::U192};
    use alloy::sol_types::SolEvent;
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;
    use crate::store::MemoryStore;

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
            cache_manager_automation_address: Some(EthAddress::new([0x99; 20])),
            origin_block: BlockNumber::new(0),
            last_synced_block: BlockNumber::new(0),
            last_processed_block: BlockNumber::new(0),
            enabled: true,
        }
    }

    fn insert_bid_log(address: Address) -> Log {
        let event = cache_manager::InsertBid {
            codehash: B256::from([0xAB; 32]),
            program: Address::from([0x01; 20]),
            bid: U192::from(1_000_000_000_000_000_000u128),
            size: 1024,
        };
        Log {
            inner: alloy::primitives::Log {
                address,
                data: event.encode_log_data(),
            },
            block_hash: Some(B256::from([0x10; 32])),
            block_number: Some(100),
            block_timestamp: None,
            transaction_hash: Some(B256::from([0x20; 32])),
            transaction_index: Some(0),
            log_index: Some(0),
            removed: false,
        }
    }

    #[test]
    fn serialize_insert_bid_payload() {
        let log = insert_bid_log(Address::from([0x51; 20]));
        let data = serialize_event_data(EventKind::InsertBid, &log).unwrap();

        let array = data.as_array().unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array[0].as_str().unwrap(), format!("0x{}", "ab".repeat(32)));
        assert_eq!(array[2].as_str().unwrap(), "1000000000000000000");
        assert_eq!(array[3].as_str().unwrap(), "1024");
    }

    #[test]
    fn serialize_pause_is_empty_array() {
        let topics = vec![cache_manager::Pause::SIGNATURE_HASH];
        let log = Log {
            inner: alloy::primitives::Log {
                address: Address::from([0x51; 20]),
                data: LogData::new_unchecked(topics, Bytes::new()),
            },
            block_hash: None,
            block_number: Some(1),
            block_timestamp: None,
            transaction_hash: Some(B256::ZERO),
            transaction_index: Some(0),
            log_index: Some(0),
            removed: false,
        };
        let data = serialize_event_data(EventKind::Pause, &log).unwrap();
        assert_eq!(data, json!([]));
    }

    #[test]
    fn contract_name_inference() {
        let chain = test_chain();
        assert_eq!(
            infer_contract_name(&chain, chain.cache_manager_address),
            ContractName::CacheManager
        );
        assert_eq!(
            infer_contract_name(&chain, EthAddress::new([0x99; 20])),
            ContractName::CacheManagerAutomation
        );
        assert_eq!(
            infer_contract_name(&chain, EthAddress::new([0xEE; 20])),
            ContractName::Unknown
        );
    }

    #[tokio::test]
    async fn store_events_counts_successes() {
        let store = Arc::new(MemoryStore::new());
        let ingest = EventIngest::new(Arc::clone(&store), 50);
        let chain = test_chain();

        let records: Vec<NewBlockchainEvent> = (0..3)
            .map(|i| NewBlockchainEvent {
                chain_id: chain.id,
                contract_name: ContractName::CacheManager,
                contract_address: chain.cache_manager_address,
                event_name: "InsertBid".into(),
                block_timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                block_number: BlockNumber::new(100 + i),
                transaction_hash: BytecodeHash::new([i as u8; 32]),
                log_index: 0,
                is_real_time: false,
                event_data: json!([]),
            })
            .collect();

        let outcome = ingest.store_events(&records).await;
        assert_eq!(outcome.success_count, 3);
        assert_eq!(outcome.error_count, 0);
        assert_eq!(outcome.total_events, 3);
        assert_eq!(store.event_count(), 3);
    }

    #[tokio::test]
    async fn duplicate_store_still_counts_success() {
        let store = Arc::new(MemoryStore::new());
        let ingest = EventIngest::new(Arc::clone(&store), 50);
        let chain = test_chain();

        let record = NewBlockchainEvent {
            chain_id: chain.id,
            contract_name: ContractName::CacheManager,
            contract_address: chain.cache_manager_address,
            event_name: "InsertBid".into(),
            block_timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            block_number: BlockNumber::new(100),
            transaction_hash: BytecodeHash::new([0xAA; 32]),
            log_index: 0,
            is_real_time: false,
            event_data: json!([]),
        };

        let first = ingest.store_events(std::slice::from_ref(&record)).await;
        let second = ingest.store_events(std::slice::from_ref(&record)).await;

        assert_eq!(first.success_count, 1);
        assert_eq!(second.success_count, 1);
        assert_eq!(store.event_count(), 1);
    }
}
