//! Storage port traits for data persistence.
//!
//! These traits define the contract for persisting and retrieving
//! domain entities. Infrastructure adapters implement these traits
//! using concrete storage backends (PostgreSQL in production, the
//! in-memory store in tests and local development).

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::entities::{
    AutomationApplication, BlockchainEvent, BlockchainState, Bytecode, Chain, Contract,
    InsertBidApplication, NewBlockchainEvent, NewBlockchainState,
};
use crate::types::primitives::{BlockNumber, BytecodeHash, EthAddress, Wei};

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the chain registry and its two cursors.
///
/// # Implementation Notes
///
/// Cursor updates must be monotonic: an update below the stored value is a
/// no-op that implementations log as a warning, never an error.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Insert a new chain row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_chain(&self, chain: &Chain) -> Result<()>;

    /// Find a chain by its `(chain_id, rpc_url)` identity.
    ///
    /// This is the bootstrap matching key: the same EVM chain indexed
    /// through a different endpoint is a distinct row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn find_chain(&self, chain_id: u64, rpc_url: &str) -> Result<Option<Chain>>;

    /// Get a chain row by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_chain(&self, id: Uuid) -> Result<Option<Chain>>;

    /// All chains with `enabled = true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn list_enabled_chains(&self) -> Result<Vec<Chain>>;

    /// Ingestion cursor for a chain (0 if the chain has never synced).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_last_synced_block(&self, chain_id: Uuid) -> Result<BlockNumber>;

    /// Advance the ingestion cursor. Non-monotonic updates are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn update_last_synced_block(&self, chain_id: Uuid, block: BlockNumber) -> Result<()>;

    /// Derivation cursor for a chain (0 if nothing processed yet).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_last_processed_block(&self, chain_id: Uuid) -> Result<BlockNumber>;

    /// Advance the derivation cursor. Non-monotonic updates are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn update_last_processed_block(&self, chain_id: Uuid, block: BlockNumber) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the canonical event log.
///
/// # Implementation Notes
///
/// The log has exactly-once semantics on
/// `(chain, transaction_hash, log_index, event_name)`. Storing a duplicate
/// is a success; if the duplicate arrives flagged realtime, the stored row's
/// `is_real_time` flips to true and never back.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert one event record in its own transaction.
    ///
    /// Returns the id of the stored row (existing row for duplicates).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails for reasons other
    /// than the idempotency conflict.
    async fn store_event(&self, event: &NewBlockchainEvent) -> Result<Uuid>;

    /// Whether a record for this log already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn event_exists(
        &self,
        chain_id: Uuid,
        block_number: BlockNumber,
        log_index: u64,
        transaction_hash: &BytecodeHash,
        event_name: &str,
    ) -> Result<bool>;

    /// Events with `from ≤ block_number ≤ to`, ordered by
    /// `(block_number, log_index)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn events_in_block_range(
        &self,
        chain_id: Uuid,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<BlockchainEvent>>;

    /// Highest block present in the log for a chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn max_event_block(&self, chain_id: Uuid) -> Result<Option<BlockNumber>>;

    /// Decay rate applicable at `(block_number, log_index)`.
    ///
    /// Resolved from the most recent `SetDecayRate` event at or before that
    /// position; `None` when no such event exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn decay_rate_at(
        &self,
        chain_id: Uuid,
        block_number: BlockNumber,
        log_index: u64,
    ) -> Result<Option<Wei>>;

    /// Most recent events for a chain, newest first (read view).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn recent_events(&self, chain_id: Uuid, limit: u32) -> Result<Vec<BlockchainEvent>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the on-chain parameter snapshot time series.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Append a snapshot row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_state(&self, state: &NewBlockchainState) -> Result<Uuid>;

    /// Latest snapshot for a chain, the authoritative current parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn latest_state(&self, chain_id: Uuid) -> Result<Option<BlockchainState>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// DERIVED STATE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the derived bytecode/contract tables.
///
/// # Implementation Notes
///
/// The processor is the only writer. Each `apply_*` method commits in one
/// transaction so that a cancelled processor leaves no half-applied event.
#[async_trait]
pub trait DerivedStateStore: Send + Sync {
    /// Apply an `InsertBid`: upsert the bytecode and contract rows, mark
    /// them cached, advance bid fields, add to the investment totals.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn apply_insert_bid(&self, update: &InsertBidApplication) -> Result<()>;

    /// Apply a `DeleteBid`: clear the cached flag and record the eviction
    /// bid. Bid fields and investment totals are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::IntegrityViolation`] if no
    /// bytecode row exists for the hash.
    async fn apply_delete_bid(
        &self,
        chain_id: Uuid,
        codehash: &BytecodeHash,
        eviction_bid: Wei,
    ) -> Result<()>;

    /// Apply a `ContractAdded`: set the automation ceiling, mark the
    /// contract automated, advance the bid-block fields.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::IntegrityViolation`] if no
    /// contract row exists for the address.
    async fn apply_contract_added(&self, update: &AutomationApplication) -> Result<()>;

    /// Apply a `ContractUpdated`: same as `apply_contract_added` but the
    /// automated flag is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::IntegrityViolation`] if no
    /// contract row exists for the address.
    async fn apply_contract_updated(&self, update: &AutomationApplication) -> Result<()>;

    /// Look up a bytecode row by its cache key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_bytecode(
        &self,
        chain_id: Uuid,
        codehash: &BytecodeHash,
    ) -> Result<Option<Bytecode>>;

    /// Look up a contract row by address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_contract(
        &self,
        chain_id: Uuid,
        address: &EthAddress,
    ) -> Result<Option<Contract>>;

    /// All currently cached bytecodes for a chain (read view).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn list_cached_bytecodes(&self, chain_id: Uuid) -> Result<Vec<Bytecode>>;
}
