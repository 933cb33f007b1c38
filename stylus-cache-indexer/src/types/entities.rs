//! Domain entities for database persistence.
//!
//! These structs represent the indexer's persisted state: the chain
//! registry, the canonical event log, periodic on-chain snapshots, and the
//! derived bytecode/contract views the processor maintains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::ContractName;
use super::primitives::{BlockNumber, BytecodeHash, EthAddress, Wei};

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN
// ═══════════════════════════════════════════════════════════════════════════════

/// A registered chain and its ingestion/derivation cursors.
///
/// The chain row owns its events, snapshots, bytecodes and contracts;
/// deleting it cascades. Invariant: `last_processed_block ≤
/// last_synced_block`, and both cursors only move forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// EVM chain id (unique across rows).
    pub chain_id: u64,
    /// Primary HTTP RPC endpoint.
    pub rpc_url: String,
    /// Dedicated endpoint for historical log queries, if any.
    pub fast_sync_rpc_url: Option<String>,
    /// WebSocket endpoint for subscriptions.
    pub rpc_wss_url: String,
    /// Backup WebSocket endpoint, used after repeated probe failures.
    pub rpc_wss_url_backup: Option<String>,
    /// CacheManager contract address.
    pub cache_manager_address: EthAddress,
    /// ArbWasmCache precompile address.
    pub arb_wasm_cache_address: EthAddress,
    /// ArbWasm precompile address.
    pub arb_wasm_address: EthAddress,
    /// CacheManagerAutomation contract address, if deployed.
    pub cache_manager_automation_address: Option<EthAddress>,
    /// First block to index from when no progress exists.
    pub origin_block: BlockNumber,
    /// Ingestion cursor: highest block reconciled into the event log.
    pub last_synced_block: BlockNumber,
    /// Derivation cursor: highest block consumed by the processor.
    pub last_processed_block: BlockNumber,
    /// Whether the chain participates in indexing.
    pub enabled: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCKCHAIN EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// A normalized event record ready for insertion into the log.
///
/// Produced by the ingestion boundary from a raw log plus a resolved block
/// timestamp. The idempotency key is
/// `(chain, transaction_hash, log_index, event_name)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBlockchainEvent {
    /// Owning chain.
    pub chain_id: Uuid,
    /// Contract attribution inferred from the emitting address.
    pub contract_name: ContractName,
    /// Address that emitted the log.
    pub contract_address: EthAddress,
    /// Event name (ABI form).
    pub event_name: String,
    /// Timestamp of the containing block.
    pub block_timestamp: DateTime<Utc>,
    /// Containing block.
    pub block_number: BlockNumber,
    /// Emitting transaction.
    pub transaction_hash: BytecodeHash,
    /// Position within the block.
    pub log_index: u64,
    /// Whether this record was observed live over WebSocket.
    pub is_real_time: bool,
    /// Decoded arguments in declaration order; big integers as decimal strings.
    pub event_data: serde_json::Value,
}

/// A stored event-log row.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockchainEvent {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning chain.
    pub chain_id: Uuid,
    /// Contract attribution.
    pub contract_name: ContractName,
    /// Address that emitted the log.
    pub contract_address: EthAddress,
    /// Event name (ABI form).
    pub event_name: String,
    /// Timestamp of the containing block.
    pub block_timestamp: DateTime<Utc>,
    /// Containing block.
    pub block_number: BlockNumber,
    /// Emitting transaction.
    pub transaction_hash: BytecodeHash,
    /// Position within the block.
    pub log_index: u64,
    /// Whether this record was ever observed live over WebSocket.
    pub is_real_time: bool,
    /// Decoded arguments in declaration order.
    pub event_data: serde_json::Value,
}

/// Outcome of a batched store operation.
///
/// Per-record isolation means one bad record never aborts its batch; the
/// caller sees the split instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreOutcome {
    /// Records committed (including idempotent duplicates).
    pub success_count: usize,
    /// Records rolled back.
    pub error_count: usize,
    /// Total records attempted.
    pub total_events: usize,
}

impl StoreOutcome {
    /// Merge another outcome into this one.
    pub fn absorb(&mut self, other: Self) {
        self.success_count += other.success_count;
        self.error_count += other.error_count;
        self.total_events += other.total_events;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCKCHAIN STATE SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// One row of the per-chain on-chain parameter time series.
///
/// The latest row per chain is the authoritative view of current cache
/// parameters; history backs dashboards and bid analytics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainState {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning chain.
    pub chain_id: Uuid,
    /// Block the snapshot was taken at.
    pub block_number: BlockNumber,
    /// Timestamp of that block.
    pub block_timestamp: DateTime<Utc>,
    /// Total cache capacity in bytes.
    pub cache_size: u64,
    /// Bytes currently occupied.
    pub queue_size: u64,
    /// Decay rate in wei per second.
    pub decay_rate: Wei,
    /// Whether bidding is paused.
    pub is_paused: bool,
    /// Minimum bid for a small program.
    pub min_bid_small: Wei,
    /// Minimum bid for a mid-size program.
    pub min_bid_mid: Wei,
    /// Minimum bid for a large program.
    pub min_bid_large: Wei,
    /// Number of entries currently cached.
    pub total_contracts_cached: u64,
}

/// Snapshot fields as read from the chain, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlockchainState {
    /// Owning chain.
    pub chain_id: Uuid,
    /// Block the snapshot was taken at.
    pub block_number: BlockNumber,
    /// Timestamp of that block.
    pub block_timestamp: DateTime<Utc>,
    /// Total cache capacity in bytes.
    pub cache_size: u64,
    /// Bytes currently occupied.
    pub queue_size: u64,
    /// Decay rate in wei per second.
    pub decay_rate: Wei,
    /// Whether bidding is paused.
    pub is_paused: bool,
    /// Minimum bid for a small program.
    pub min_bid_small: Wei,
    /// Minimum bid for a mid-size program.
    pub min_bid_mid: Wei,
    /// Minimum bid for a large program.
    pub min_bid_large: Wei,
    /// Number of entries currently cached.
    pub total_contracts_cached: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BYTECODE
// ═══════════════════════════════════════════════════════════════════════════════

/// Derived per-bytecode cache state, keyed by `(chain, bytecode_hash)`.
///
/// Created on the first `InsertBid` and never deleted; `is_cached` toggles
/// with subsequent `InsertBid`/`DeleteBid` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bytecode {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning chain.
    pub chain_id: Uuid,
    /// Cache key of the program.
    pub bytecode_hash: BytecodeHash,
    /// Bytecode size in bytes.
    pub size: u64,
    /// Whether the entry is currently cached.
    pub is_cached: bool,
    /// Most recent bid, decay-adjusted.
    pub last_bid: Wei,
    /// Most recent bid as emitted (decay included).
    pub bid_plus_decay: Wei,
    /// Bid value recorded at the last eviction, if any.
    pub last_eviction_bid: Option<Wei>,
    /// Monotonic sum of decay-adjusted bids.
    pub total_bid_investment: Wei,
    /// Block of the most recent bid.
    pub bid_block_number: BlockNumber,
    /// Timestamp of the most recent bid.
    pub bid_block_timestamp: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTRACT
// ═══════════════════════════════════════════════════════════════════════════════

/// Derived per-contract cache state, keyed by `(chain, address)`.
///
/// References exactly one bytecode once an `InsertBid` has linked it.
/// Automation fields are populated by `ContractAdded`/`ContractUpdated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning chain.
    pub chain_id: Uuid,
    /// Program address.
    pub address: EthAddress,
    /// Linked bytecode row, set on `InsertBid`.
    pub bytecode_id: Option<Uuid>,
    /// Whether the program's code is currently cached.
    pub is_cached: bool,
    /// Most recent bid, decay-adjusted.
    pub last_bid: Wei,
    /// Most recent bid as emitted (decay included).
    pub bid_plus_decay: Wei,
    /// Monotonic sum of this contract's decay-adjusted bids.
    pub total_bid_investment: Wei,
    /// Block of the most recent bid or automation change.
    pub bid_block_number: BlockNumber,
    /// Timestamp of the most recent bid or automation change.
    pub bid_block_timestamp: DateTime<Utc>,
    /// Automation bid ceiling, if enrolled.
    pub max_bid: Option<Wei>,
    /// Whether the contract is enrolled in automated bidding.
    pub is_automated: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DERIVED-STATE MUTATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything an `InsertBid` applies to the derived tables, pre-computed by
/// the processor so the store can commit it in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertBidApplication {
    /// Owning chain.
    pub chain_id: Uuid,
    /// Cache key of the program.
    pub bytecode_hash: BytecodeHash,
    /// Program address.
    pub contract_address: EthAddress,
    /// Bytecode size in bytes.
    pub size: u64,
    /// Decay-adjusted bid (`max(0, bid − t·decay_rate)`).
    pub actual_bid: Wei,
    /// Raw bid as emitted.
    pub bid_plus_decay: Wei,
    /// Block of the bid.
    pub block_number: BlockNumber,
    /// Timestamp of the bid.
    pub block_timestamp: DateTime<Utc>,
}

/// Automation enrollment or update, applied to an existing contract row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationApplication {
    /// Owning chain.
    pub chain_id: Uuid,
    /// The enrolled contract.
    pub contract_address: EthAddress,
    /// Bid ceiling.
    pub max_bid: Wei,
    /// Block of the automation event.
    pub block_number: BlockNumber,
    /// Timestamp of the automation event.
    pub block_timestamp: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_outcome_absorbs() {
        let mut outcome = StoreOutcome {
            success_count: 3,
            error_count: 1,
            total_events: 4,
        };
        outcome.absorb(StoreOutcome {
            success_count: 2,
            error_count: 0,
            total_events: 2,
        });
        assert_eq!(outcome.success_count, 5);
        assert_eq!(outcome.error_count, 1);
        assert_eq!(outcome.total_events, 6);
    }
}
