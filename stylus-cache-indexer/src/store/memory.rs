//! In-memory implementation of the store ports.
//!
//! Implements the same semantics as the PostgreSQL adapter - idempotent
//! event inserts, monotonic cursors, transactional derived-state updates -
//! over plain maps. Used by integration tests and local development where
//! a database is not available.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::error::{DomainError, Result};
use crate::ports::{ChainStore, DerivedStateStore, EventStore, StateStore};
use crate::types::entities::{
    AutomationApplication, BlockchainEvent, BlockchainState, Bytecode, Chain, Contract,
    InsertBidApplication, NewBlockchainEvent, NewBlockchainState,
};
use crate::types::events::EventKind;
use crate::types::primitives::{BlockNumber, BytecodeHash, EthAddress, Wei};

/// Idempotency key of the event log.
type EventKey = (Uuid, BytecodeHash, u64, String);

#[derive(Debug, Default)]
struct Inner {
    chains: HashMap<Uuid, Chain>,
    events: HashMap<Uuid, BlockchainEvent>,
    event_keys: HashMap<EventKey, Uuid>,
    states: Vec<BlockchainState>,
    bytecodes: HashMap<(Uuid, BytecodeHash), Bytecode>,
    contracts: HashMap<(Uuid, EthAddress), Contract>,
}

/// Map-backed store implementing every persistence port.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in the event log (test helper).
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.inner.read().events.len()
    }
}

fn event_key(chain_id: Uuid, event: &NewBlockchainEvent) -> EventKey {
    (
        chain_id,
        event.transaction_hash,
        event.log_index,
        event.event_name.clone(),
    )
}

#[async_trait]
impl ChainStore for MemoryStore {
    async fn insert_chain(&self, chain: &Chain) -> Result<()> {
        self.inner.write().chains.insert(chain.id, chain.clone());
        Ok(())
    }

    async fn find_chain(&self, chain_id: u64, rpc_url: &str) -> Result<Option<Chain>> {
        Ok(self
            .inner
            .read()
            .chains
            .values()
            .find(|c| c.chain_id == chain_id && c.rpc_url == rpc_url)
            .cloned())
    }

    async fn get_chain(&self, id: Uuid) -> Result<Option<Chain>> {
        Ok(self.inner.read().chains.get(&id).cloned())
    }

    async fn list_enabled_chains(&self) -> Result<Vec<Chain>> {
        let mut chains: Vec<Chain> = self
            .inner
            .read()
            .chains
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect();
        chains.sort_by_key(|c| c.chain_id);
        Ok(chains)
    }

    async fn get_last_synced_block(&self, chain_id: Uuid) -> Result<BlockNumber> {
        Ok(self
            .inner
            .read()
            .chains
            .get(&chain_id)
            .map_or(BlockNumber::new(0), |c| c.last_synced_block))
    }

    async fn update_last_synced_block(&self, chain_id: Uuid, block: BlockNumber) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(chain) = inner.chains.get_mut(&chain_id) {
            if block < chain.last_synced_block {
                warn!(
                    current = %chain.last_synced_block,
                    requested = %block,
                    "Ignoring non-monotonic last_synced_block update"
                );
            } else {
                chain.last_synced_block = block;
            }
        }
        Ok(())
    }

    async fn get_last_processed_block(&self, chain_id: Uuid) -> Result<BlockNumber> {
        Ok(self
            .inner
            .read()
            .chains
            .get(&chain_id)
            .map_or(BlockNumber::new(0), |c| c.last_processed_block))
    }

    async fn update_last_processed_block(&self, chain_id: Uuid, block: BlockNumber) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(chain) = inner.chains.get_mut(&chain_id) {
            if block < chain.last_processed_block {
                warn!(
                    current = %chain.last_processed_block,
                    requested = %block,
                    "Ignoring non-monotonic last_processed_block update"
                );
            } else {
                chain.last_processed_block = block;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn store_event(&self, event: &NewBlockchainEvent) -> Result<Uuid> {
        let mut inner = self.inner.write();
        let key = event_key(event.chain_id, event);

        if let Some(existing_id) = inner.event_keys.get(&key).copied() {
            // Duplicate: a realtime observation upgrades the flag, never the
            // other way around.
            if event.is_real_time
                && let Some(existing) = inner.events.get_mut(&existing_id)
            {
                existing.is_real_time = true;
            }
            return Ok(existing_id);
        }

        let id = Uuid::new_v4();
        let stored = BlockchainEvent {
            id,
            chain_id: event.chain_id,
            contract_name: event.contract_name,
            contract_address: event.contract_address,
            event_name: event.event_name.clone(),
            block_timestamp: event.block_timestamp,
            block_number: event.block_number,
            transaction_hash: event.transaction_hash,
            log_index: event.log_index,
            is_real_time: event.is_real_time,
            event_data: event.event_data.clone(),
        };
        inner.events.insert(id, stored);
        inner.event_keys.insert(key, id);
        Ok(id)
    }

    async fn event_exists(
        &self,
        chain_id: Uuid,
        _block_number: BlockNumber,
        log_index: u64,
        transaction_hash: &BytecodeHash,
        event_name: &str,
    ) -> Result<bool> {
        let key = (chain_id, *transaction_hash, log_index, event_name.to_owned());
        Ok(self.inner.read().event_keys.contains_key(&key))
    }

    async fn events_in_block_range(
        &self,
        chain_id: Uuid,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<BlockchainEvent>> {
        let mut events: Vec<BlockchainEvent> = self
            .inner
            .read()
            .events
            .values()
            .filter(|e| e.chain_id == chain_id && e.block_number >= from && e.block_number <= to)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn max_event_block(&self, chain_id: Uuid) -> Result<Option<BlockNumber>> {
        Ok(self
            .inner
            .read()
            .events
            .values()
            .filter(|e| e.chain_id == chain_id)
            .map(|e| e.block_number)
            .max())
    }

    async fn decay_rate_at(
        &self,
        chain_id: Uuid,
        block_number: BlockNumber,
        log_index: u64,
    ) -> Result<Option<Wei>> {
        let inner = self.inner.read();
        let mut candidates: Vec<&BlockchainEvent> = inner
            .events
            .values()
            .filter(|e| {
                e.chain_id == chain_id
                    && e.event_name == EventKind::SetDecayRate.as_str()
                    && (e.block_number < block_number
                        || (e.block_number == block_number && e.log_index <= log_index))
            })
            .collect();
        candidates.sort_by_key(|e| (e.block_number, e.log_index));

        Ok(candidates.last().and_then(|e| {
            e.event_data
                .get(0)
                .and_then(serde_json::Value::as_str)
                .and_then(|s| Wei::parse(s).ok())
        }))
    }

    async fn recent_events(&self, chain_id: Uuid, limit: u32) -> Result<Vec<BlockchainEvent>> {
        let mut events: Vec<BlockchainEvent> = self
            .inner
            .read()
            .events
            .values()
            .filter(|e| e.chain_id == chain_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| std::cmp::Reverse((e.block_number, e.log_index)));
        events.truncate(limit as usize);
        Ok(events)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn insert_state(&self, state: &NewBlockchainState) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.inner.write().states.push(BlockchainState {
            id,
            chain_id: state.chain_id,
            block_number: state.block_number,
            block_timestamp: state.block_timestamp,
            cache_size: state.cache_size,
            queue_size: state.queue_size,
            decay_rate: state.decay_rate,
            is_paused: state.is_paused,
            min_bid_small: state.min_bid_small,
            min_bid_mid: state.min_bid_mid,
            min_bid_large: state.min_bid_large,
            total_contracts_cached: state.total_contracts_cached,
        });
        Ok(id)
    }

    async fn latest_state(&self, chain_id: Uuid) -> Result<Option<BlockchainState>> {
        Ok(self
            .inner
            .read()
            .states
            .iter()
            .filter(|s| s.chain_id == chain_id)
            .max_by_key(|s| (s.block_number, s.block_timestamp))
            .cloned())
    }
}

#[async_trait]
impl DerivedStateStore for MemoryStore {
    async fn apply_insert_bid(&self, update: &InsertBidApplication) -> Result<()> {
        let mut inner = self.inner.write();

        let bytecode_key = (update.chain_id, update.bytecode_hash);
        let bytecode_id = match inner.bytecodes.get_mut(&bytecode_key) {
            Some(bytecode) => {
                bytecode.size = update.size;
                bytecode.is_cached = true;
                bytecode.last_bid = update.actual_bid;
                bytecode.bid_plus_decay = update.bid_plus_decay;
                bytecode.total_bid_investment =
                    bytecode.total_bid_investment.saturating_add(update.actual_bid);
                bytecode.bid_block_number = update.block_number;
                bytecode.bid_block_timestamp = update.block_timestamp;
                bytecode.id
            }
            None => {
                let id = Uuid::new_v4();
                inner.bytecodes.insert(
                    bytecode_key,
                    Bytecode {
                        id,
                        chain_id: update.chain_id,
                        bytecode_hash: update.bytecode_hash,
                        size: update.size,
                        is_cached: true,
                        last_bid: update.actual_bid,
                        bid_plus_decay: update.bid_plus_decay,
                        last_eviction_bid: None,
                        total_bid_investment: update.actual_bid,
                        bid_block_number: update.block_number,
                        bid_block_timestamp: update.block_timestamp,
                    },
                );
                id
            }
        };

        let contract_key = (update.chain_id, update.contract_address);
        match inner.contracts.get_mut(&contract_key) {
            Some(contract) => {
                contract.bytecode_id = Some(bytecode_id);
                contract.is_cached = true;
                contract.last_bid = update.actual_bid;
                contract.bid_plus_decay = update.bid_plus_decay;
                contract.total_bid_investment =
                    contract.total_bid_investment.saturating_add(update.actual_bid);
                contract.bid_block_number = update.block_number;
                contract.bid_block_timestamp = update.block_timestamp;
            }
            None => {
                inner.contracts.insert(
                    contract_key,
                    Contract {
                        id: Uuid::new_v4(),
                        chain_id: update.chain_id,
                        address: update.contract_address,
                        bytecode_id: Some(bytecode_id),
                        is_cached: true,
                        last_bid: update.actual_bid,
                        bid_plus_decay: update.bid_plus_decay,
                        total_bid_investment: update.actual_bid,
                        bid_block_number: update.block_number,
                        bid_block_timestamp: update.block_timestamp,
                        max_bid: None,
                        is_automated: false,
                    },
                );
            }
        }

        Ok(())
    }

    async fn apply_delete_bid(
        &self,
        chain_id: Uuid,
        codehash: &BytecodeHash,
        eviction_bid: Wei,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(bytecode) = inner.bytecodes.get_mut(&(chain_id, *codehash)) else {
            return Err(DomainError::IntegrityViolation {
                event_name: "DeleteBid".into(),
                detail: format!("no bytecode row for {codehash}"),
            }
            .into());
        };

        bytecode.is_cached = false;
        bytecode.last_eviction_bid = Some(eviction_bid);
        Ok(())
    }

    async fn apply_contract_added(&self, update: &AutomationApplication) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(contract) = inner
            .contracts
            .get_mut(&(update.chain_id, update.contract_address))
        else {
            return Err(DomainError::IntegrityViolation {
                event_name: "ContractAdded".into(),
                detail: format!("no contract row for {}", update.contract_address),
            }
            .into());
        };

        contract.max_bid = Some(update.max_bid);
        contract.is_automated = true;
        contract.bid_block_number = update.block_number;
        contract.bid_block_timestamp = update.block_timestamp;
        Ok(())
    }

    async fn apply_contract_updated(&self, update: &AutomationApplication) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(contract) = inner
            .contracts
            .get_mut(&(update.chain_id, update.contract_address))
        else {
            return Err(DomainError::IntegrityViolation {
                event_name: "ContractUpdated".into(),
                detail: format!("no contract row for {}", update.contract_address),
            }
            .into());
        };

        contract.max_bid = Some(update.max_bid);
        contract.bid_block_number = update.block_number;
        contract.bid_block_timestamp = update.block_timestamp;
        Ok(())
    }

    async fn get_bytecode(
        &self,
        chain_id: Uuid,
        codehash: &BytecodeHash,
    ) -> Result<Option<Bytecode>> {
        Ok(self
            .inner
            .read()
            .bytecodes
            .get(&(chain_id, *codehash))
            .cloned())
    }

    async fn get_contract(
        &self,
        chain_id: Uuid,
        address: &EthAddress,
    ) -> Result<Option<Contract>> {
        Ok(self
            .inner
            .read()
            .contracts
            .get(&(chain_id, *address))
            .cloned())
    }

    async fn list_cached_bytecodes(&self, chain_id: Uuid) -> Result<Vec<Bytecode>> {
        let mut bytecodes: Vec<Bytecode> = self
            .inner
            .read()
            .bytecodes
            .values()
            .filter(|b| b.chain_id == chain_id && b.is_cached)
            .cloned()
            .collect();
        bytecodes.sort_by_key(|b| std::cmp::Reverse(b.last_bid));
        Ok(bytecodes)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::events::ContractName;

    fn sample_event(chain_id: Uuid, block: u64, log_index: u64, realtime: bool) -> NewBlockchainEvent {
        NewBlockchainEvent {
            chain_id,
            contract_name: ContractName::CacheManager,
            contract_address: EthAddress::new([0x11; 20]),
            event_name: "InsertBid".into(),
            block_timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            block_number: BlockNumber::new(block),
            transaction_hash: BytecodeHash::new([0xAA; 32]),
            log_index,
            is_real_time: realtime,
            event_data: serde_json::json!([]),
        }
    }

    #[tokio::test]
    async fn duplicate_event_is_single_row() {
        let store = MemoryStore::new();
        let chain = Uuid::new_v4();

        let first = store.store_event(&sample_event(chain, 10, 0, false)).await.unwrap();
        let second = store.store_event(&sample_event(chain, 10, 0, false)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.event_count(), 1);
    }

    #[tokio::test]
    async fn realtime_flag_is_monotonic() {
        let store = MemoryStore::new();
        let chain = Uuid::new_v4();

        let id = store.store_event(&sample_event(chain, 10, 0, true)).await.unwrap();
        store.store_event(&sample_event(chain, 10, 0, false)).await.unwrap();

        let events = store
            .events_in_block_range(chain, BlockNumber::new(0), BlockNumber::new(100))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, id);
        assert!(events[0].is_real_time);
    }

    #[tokio::test]
    async fn cursor_updates_are_monotonic() {
        let store = MemoryStore::new();
        let chain_id = Uuid::new_v4();
        store
            .insert_chain(&Chain {
                id: chain_id,
                name: "test".into(),
                chain_id: 42161,
                rpc_url: "http://localhost:8545".into(),
                fast_sync_rpc_url: None,
                rpc_wss_url: "ws://localhost:8546".into(),
                rpc_wss_url_backup: None,
                cache_manager_address: EthAddress::ZERO,
                arb_wasm_cache_address: EthAddress::ZERO,
                arb_wasm_address: EthAddress::ZERO,
                cache_manager_automation_address: None,
                origin_block: BlockNumber::new(0),
                last_synced_block: BlockNumber::new(0),
                last_processed_block: BlockNumber::new(0),
                enabled: true,
            })
            .await
            .unwrap();

        store
            .update_last_synced_block(chain_id, BlockNumber::new(100))
            .await
            .unwrap();
        store
            .update_last_synced_block(chain_id, BlockNumber::new(50))
            .await
            .unwrap();

        assert_eq!(
            store.get_last_synced_block(chain_id).await.unwrap(),
            BlockNumber::new(100)
        );
    }
}
