//! PostgreSQL implementation of the store ports using SQLx.
//!
//! # Type Conversions
//!
//! PostgreSQL uses signed integers (i64) for numeric columns while the
//! domain uses unsigned types. These casts are safe because:
//! - Block numbers won't exceed i64::MAX (~9 quintillion)
//! - Log indices and byte sizes stay far below i64::MAX
//! - Wei values are stored as NUMERIC(78,0), never cast
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::use_self // TryFrom implementations read better with explicit type names
)]

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{DomainError, InfraError, Result};
use crate::ports::{ChainStore, DerivedStateStore, EventStore, StateStore};
use crate::types::entities::{
    AutomationApplication, BlockchainEvent, BlockchainState, Bytecode, Chain, Contract,
    InsertBidApplication, NewBlockchainEvent, NewBlockchainState,
};
use crate::types::events::ContractName;
use crate::types::primitives::{BlockNumber, BytecodeHash, EthAddress, Wei};

// ═══════════════════════════════════════════════════════════════════════════════
// POSTGRES STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// PostgreSQL-based store implementation.
///
/// Implements all store port traits using SQLx for database access.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| InfraError::Internal(format!("Migration error: {e}")))?;
        Ok(())
    }
}

fn address_from_db(bytes: Vec<u8>) -> Result<EthAddress> {
    EthAddress::from_slice(&bytes)
        .map_err(|_| InfraError::Internal("Invalid address length in DB".into()).into())
}

fn hash_from_db(bytes: Vec<u8>) -> Result<BytecodeHash> {
    BytecodeHash::from_slice(&bytes)
        .map_err(|_| InfraError::Internal("Invalid hash length in DB".into()).into())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for chains.
#[derive(Debug, FromRow)]
struct ChainRow {
    id: Uuid,
    name: String,
    chain_id: i64,
    rpc_url: String,
    fast_sync_rpc_url: Option<String>,
    rpc_wss_url: String,
    rpc_wss_url_backup: Option<String>,
    cache_manager_address: Vec<u8>,
    arb_wasm_cache_address: Vec<u8>,
    arb_wasm_address: Vec<u8>,
    cache_manager_automation_address: Option<Vec<u8>>,
    origin_block: i64,
    last_synced_block: i64,
    last_processed_block: i64,
    enabled: bool,
}

impl TryFrom<ChainRow> for Chain {
    type Error = crate::error::AppError;

    fn try_from(row: ChainRow) -> Result<Self> {
        Ok(Chain {
            id: row.id,
            name: row.name,
            chain_id: row.chain_id as u64,
            rpc_url: row.rpc_url,
            fast_sync_rpc_url: row.fast_sync_rpc_url,
            rpc_wss_url: row.rpc_wss_url,
            rpc_wss_url_backup: row.rpc_wss_url_backup,
            cache_manager_address: address_from_db(row.cache_manager_address)?,
            arb_wasm_cache_address: address_from_db(row.arb_wasm_cache_address)?,
            arb_wasm_address: address_from_db(row.arb_wasm_address)?,
            cache_manager_automation_address: row
                .cache_manager_automation_address
                .map(address_from_db)
                .transpose()?,
            origin_block: BlockNumber::new(row.origin_block as u64),
            last_synced_block: BlockNumber::new(row.last_synced_block as u64),
            last_processed_block: BlockNumber::new(row.last_processed_block as u64),
            enabled: row.enabled,
        })
    }
}

const CHAIN_COLUMNS: &str = "id, name, chain_id, rpc_url, fast_sync_rpc_url, rpc_wss_url, \
     rpc_wss_url_backup, cache_manager_address, arb_wasm_cache_address, arb_wasm_address, \
     cache_manager_automation_address, origin_block, last_synced_block, last_processed_block, \
     enabled";

#[async_trait]
impl ChainStore for PostgresStore {
    #[instrument(skip(self, chain), fields(name = %chain.name, chain_id = chain.chain_id))]
    async fn insert_chain(&self, chain: &Chain) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blockchain (
                id, name, chain_id, rpc_url, fast_sync_rpc_url, rpc_wss_url,
                rpc_wss_url_backup, cache_manager_address, arb_wasm_cache_address,
                arb_wasm_address, cache_manager_automation_address, origin_block,
                last_synced_block, last_processed_block, enabled
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(chain.id)
        .bind(&chain.name)
        .bind(chain.chain_id as i64)
        .bind(&chain.rpc_url)
        .bind(&chain.fast_sync_rpc_url)
        .bind(&chain.rpc_wss_url)
        .bind(&chain.rpc_wss_url_backup)
        .bind(chain.cache_manager_address.as_slice())
        .bind(chain.arb_wasm_cache_address.as_slice())
        .bind(chain.arb_wasm_address.as_slice())
        .bind(
            chain
                .cache_manager_automation_address
                .as_ref()
                .map(EthAddress::as_slice),
        )
        .bind(chain.origin_block.value() as i64)
        .bind(chain.last_synced_block.value() as i64)
        .bind(chain.last_processed_block.value() as i64)
        .bind(chain.enabled)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        debug!("Chain inserted");
        Ok(())
    }

    #[instrument(skip(self), fields(chain_id = chain_id))]
    async fn find_chain(&self, chain_id: u64, rpc_url: &str) -> Result<Option<Chain>> {
        let row = sqlx::query_as::<_, ChainRow>(&format!(
            "SELECT {CHAIN_COLUMNS} FROM blockchain WHERE chain_id = $1 AND rpc_url = $2"
        ))
        .bind(chain_id as i64)
        .bind(rpc_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        row.map(Chain::try_from).transpose()
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn get_chain(&self, id: Uuid) -> Result<Option<Chain>> {
        let row = sqlx::query_as::<_, ChainRow>(&format!(
            "SELECT {CHAIN_COLUMNS} FROM blockchain WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        row.map(Chain::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list_enabled_chains(&self) -> Result<Vec<Chain>> {
        let rows = sqlx::query_as::<_, ChainRow>(&format!(
            "SELECT {CHAIN_COLUMNS} FROM blockchain WHERE enabled = true ORDER BY chain_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        rows.into_iter().map(Chain::try_from).collect()
    }

    #[instrument(skip(self), fields(chain = %chain_id))]
    async fn get_last_synced_block(&self, chain_id: Uuid) -> Result<BlockNumber> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT last_synced_block FROM blockchain WHERE id = $1")
                .bind(chain_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(InfraError::Database)?;

        Ok(BlockNumber::new(value.unwrap_or(0) as u64))
    }

    #[instrument(skip(self), fields(chain = %chain_id, block = %block))]
    async fn update_last_synced_block(&self, chain_id: Uuid, block: BlockNumber) -> Result<()> {
        let current = self.get_last_synced_block(chain_id).await?;
        if block < current {
            warn!(
                current = %current,
                requested = %block,
                "Ignoring non-monotonic last_synced_block update"
            );
            return Ok(());
        }

        sqlx::query(
            "UPDATE blockchain SET last_synced_block = GREATEST(last_synced_block, $2) WHERE id = $1",
        )
        .bind(chain_id)
        .bind(block.value() as i64)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        debug!("Ingestion cursor advanced");
        Ok(())
    }

    #[instrument(skip(self), fields(chain = %chain_id))]
    async fn get_last_processed_block(&self, chain_id: Uuid) -> Result<BlockNumber> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT last_processed_block FROM blockchain WHERE id = $1")
                .bind(chain_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(InfraError::Database)?;

        Ok(BlockNumber::new(value.unwrap_or(0) as u64))
    }

    #[instrument(skip(self), fields(chain = %chain_id, block = %block))]
    async fn update_last_processed_block(&self, chain_id: Uuid, block: BlockNumber) -> Result<()> {
        let current = self.get_last_processed_block(chain_id).await?;
        if block < current {
            warn!(
                current = %current,
                requested = %block,
                "Ignoring non-monotonic last_processed_block update"
            );
            return Ok(());
        }

        sqlx::query(
            "UPDATE blockchain SET last_processed_block = GREATEST(last_processed_block, $2) WHERE id = $1",
        )
        .bind(chain_id)
        .bind(block.value() as i64)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        debug!("Derivation cursor advanced");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for event-log entries.
#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    blockchain_id: Uuid,
    contract_name: String,
    contract_address: Vec<u8>,
    event_name: String,
    block_timestamp: chrono::DateTime<chrono::Utc>,
    block_number: i64,
    transaction_hash: Vec<u8>,
    log_index: i64,
    is_real_time: bool,
    event_data: serde_json::Value,
}

impl TryFrom<EventRow> for BlockchainEvent {
    type Error = crate::error::AppError;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(BlockchainEvent {
            id: row.id,
            chain_id: row.blockchain_id,
            contract_name: ContractName::from_name(&row.contract_name),
            contract_address: address_from_db(row.contract_address)?,
            event_name: row.event_name,
            block_timestamp: row.block_timestamp,
            block_number: BlockNumber::new(row.block_number as u64),
            transaction_hash: hash_from_db(row.transaction_hash)?,
            log_index: row.log_index as u64,
            is_real_time: row.is_real_time,
            event_data: row.event_data,
        })
    }
}

const EVENT_COLUMNS: &str = "id, blockchain_id, contract_name, contract_address, event_name, \
     block_timestamp, block_number, transaction_hash, log_index, is_real_time, event_data";

#[async_trait]
impl EventStore for PostgresStore {
    #[instrument(
        skip(self, event),
        fields(
            chain = %event.chain_id,
            event = %event.event_name,
            block = %event.block_number,
            log_index = event.log_index,
        )
    )]
    async fn store_event(&self, event: &NewBlockchainEvent) -> Result<Uuid> {
        // The conflict target is the idempotency key. A duplicate commits as
        // a no-op, except that a realtime duplicate flips the stored flag;
        // the OR keeps the flag monotonic.
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO blockchain_event (
                id, blockchain_id, contract_name, contract_address, event_name,
                block_timestamp, block_number, transaction_hash, log_index,
                is_real_time, event_data
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (blockchain_id, transaction_hash, log_index, event_name)
            DO UPDATE SET
                is_real_time = blockchain_event.is_real_time OR EXCLUDED.is_real_time
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.chain_id)
        .bind(event.contract_name.as_str())
        .bind(event.contract_address.as_slice())
        .bind(&event.event_name)
        .bind(event.block_timestamp)
        .bind(event.block_number.value() as i64)
        .bind(event.transaction_hash.as_slice())
        .bind(event.log_index as i64)
        .bind(event.is_real_time)
        .bind(&event.event_data)
        .fetch_one(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(id)
    }

    #[instrument(skip(self, transaction_hash), fields(chain = %chain_id, block = %block_number))]
    async fn event_exists(
        &self,
        chain_id: Uuid,
        block_number: BlockNumber,
        log_index: u64,
        transaction_hash: &BytecodeHash,
        event_name: &str,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM blockchain_event
                WHERE blockchain_id = $1 AND block_number = $2 AND log_index = $3
                  AND transaction_hash = $4 AND event_name = $5
            )
            "#,
        )
        .bind(chain_id)
        .bind(block_number.value() as i64)
        .bind(log_index as i64)
        .bind(transaction_hash.as_slice())
        .bind(event_name)
        .fetch_one(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(exists)
    }

    #[instrument(skip(self), fields(chain = %chain_id, from = %from, to = %to))]
    async fn events_in_block_range(
        &self,
        chain_id: Uuid,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<BlockchainEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM blockchain_event
            WHERE blockchain_id = $1 AND block_number >= $2 AND block_number <= $3
            ORDER BY block_number ASC, log_index ASC
            "#
        ))
        .bind(chain_id)
        .bind(from.value() as i64)
        .bind(to.value() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        rows.into_iter().map(BlockchainEvent::try_from).collect()
    }

    #[instrument(skip(self), fields(chain = %chain_id))]
    async fn max_event_block(&self, chain_id: Uuid) -> Result<Option<BlockNumber>> {
        let value: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(block_number) FROM blockchain_event WHERE blockchain_id = $1",
        )
        .bind(chain_id)
        .fetch_one(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(value.map(|v| BlockNumber::new(v as u64)))
    }

    #[instrument(skip(self), fields(chain = %chain_id, block = %block_number, log_index = log_index))]
    async fn decay_rate_at(
        &self,
        chain_id: Uuid,
        block_number: BlockNumber,
        log_index: u64,
    ) -> Result<Option<Wei>> {
        let data: Option<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT event_data FROM blockchain_event
            WHERE blockchain_id = $1 AND event_name = 'SetDecayRate'
              AND (block_number < $2 OR (block_number = $2 AND log_index <= $3))
            ORDER BY block_number DESC, log_index DESC
            LIMIT 1
            "#,
        )
        .bind(chain_id)
        .bind(block_number.value() as i64)
        .bind(log_index as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        let Some(data) = data else {
            return Ok(None);
        };

        let rate = data
            .get(0)
            .and_then(serde_json::Value::as_str)
            .and_then(|s| Wei::parse(s).ok())
            .ok_or_else(|| {
                InfraError::Internal("Malformed SetDecayRate payload in event log".into())
            })?;

        Ok(Some(rate))
    }

    #[instrument(skip(self), fields(chain = %chain_id, limit = limit))]
    async fn recent_events(&self, chain_id: Uuid, limit: u32) -> Result<Vec<BlockchainEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM blockchain_event
            WHERE blockchain_id = $1
            ORDER BY block_number DESC, log_index DESC
            LIMIT $2
            "#
        ))
        .bind(chain_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        rows.into_iter().map(BlockchainEvent::try_from).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for state snapshots.
#[derive(Debug, FromRow)]
struct StateRow {
    id: Uuid,
    blockchain_id: Uuid,
    block_number: i64,
    block_timestamp: chrono::DateTime<chrono::Utc>,
    cache_size: i64,
    queue_size: i64,
    decay_rate: sqlx::types::BigDecimal,
    is_paused: bool,
    min_bid_small: sqlx::types::BigDecimal,
    min_bid_mid: sqlx::types::BigDecimal,
    min_bid_large: sqlx::types::BigDecimal,
    total_contracts_cached: i64,
}

impl From<StateRow> for BlockchainState {
    fn from(row: StateRow) -> Self {
        BlockchainState {
            id: row.id,
            chain_id: row.blockchain_id,
            block_number: BlockNumber::new(row.block_number as u64),
            block_timestamp: row.block_timestamp,
            cache_size: row.cache_size as u64,
            queue_size: row.queue_size as u64,
            decay_rate: Wei::from_bigdecimal(&row.decay_rate),
            is_paused: row.is_paused,
            min_bid_small: Wei::from_bigdecimal(&row.min_bid_small),
            min_bid_mid: Wei::from_bigdecimal(&row.min_bid_mid),
            min_bid_large: Wei::from_bigdecimal(&row.min_bid_large),
            total_contracts_cached: row.total_contracts_cached as u64,
        }
    }
}

#[async_trait]
impl StateStore for PostgresStore {
    #[instrument(skip(self, state), fields(chain = %state.chain_id, block = %state.block_number))]
    async fn insert_state(&self, state: &NewBlockchainState) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO blockchain_state (
                id, blockchain_id, block_number, block_timestamp, cache_size,
                queue_size, decay_rate, is_paused, min_bid_small, min_bid_mid,
                min_bid_large, total_contracts_cached
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(id)
        .bind(state.chain_id)
        .bind(state.block_number.value() as i64)
        .bind(state.block_timestamp)
        .bind(state.cache_size as i64)
        .bind(state.queue_size as i64)
        .bind(state.decay_rate.to_bigdecimal())
        .bind(state.is_paused)
        .bind(state.min_bid_small.to_bigdecimal())
        .bind(state.min_bid_mid.to_bigdecimal())
        .bind(state.min_bid_large.to_bigdecimal())
        .bind(state.total_contracts_cached as i64)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        debug!("State snapshot recorded");
        Ok(id)
    }

    #[instrument(skip(self), fields(chain = %chain_id))]
    async fn latest_state(&self, chain_id: Uuid) -> Result<Option<BlockchainState>> {
        let row = sqlx::query_as::<_, StateRow>(
            r#"
            SELECT id, blockchain_id, block_number, block_timestamp, cache_size,
                   queue_size, decay_rate, is_paused, min_bid_small, min_bid_mid,
                   min_bid_large, total_contracts_cached
            FROM blockchain_state
            WHERE blockchain_id = $1
            ORDER BY block_number DESC, block_timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(chain_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(row.map(BlockchainState::from))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DERIVED STATE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for bytecodes.
#[derive(Debug, FromRow)]
struct BytecodeRow {
    id: Uuid,
    blockchain_id: Uuid,
    bytecode_hash: Vec<u8>,
    size: i64,
    is_cached: bool,
    last_bid: sqlx::types::BigDecimal,
    bid_plus_decay: sqlx::types::BigDecimal,
    last_eviction_bid: Option<sqlx::types::BigDecimal>,
    total_bid_investment: sqlx::types::BigDecimal,
    bid_block_number: i64,
    bid_block_timestamp: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<BytecodeRow> for Bytecode {
    type Error = crate::error::AppError;

    fn try_from(row: BytecodeRow) -> Result<Self> {
        Ok(Bytecode {
            id: row.id,
            chain_id: row.blockchain_id,
            bytecode_hash: hash_from_db(row.bytecode_hash)?,
            size: row.size as u64,
            is_cached: row.is_cached,
            last_bid: Wei::from_bigdecimal(&row.last_bid),
            bid_plus_decay: Wei::from_bigdecimal(&row.bid_plus_decay),
            last_eviction_bid: row.last_eviction_bid.as_ref().map(Wei::from_bigdecimal),
            total_bid_investment: Wei::from_bigdecimal(&row.total_bid_investment),
            bid_block_number: BlockNumber::new(row.bid_block_number as u64),
            bid_block_timestamp: row.bid_block_timestamp,
        })
    }
}

/// Database row for contracts.
#[derive(Debug, FromRow)]
struct ContractRow {
    id: Uuid,
    blockchain_id: Uuid,
    address: Vec<u8>,
    bytecode_id: Option<Uuid>,
    is_cached: bool,
    last_bid: sqlx::types::BigDecimal,
    bid_plus_decay: sqlx::types::BigDecimal,
    total_bid_investment: sqlx::types::BigDecimal,
    bid_block_number: i64,
    bid_block_timestamp: chrono::DateTime<chrono::Utc>,
    max_bid: Option<sqlx::types::BigDecimal>,
    is_automated: bool,
}

impl TryFrom<ContractRow> for Contract {
    type Error = crate::error::AppError;

    fn try_from(row: ContractRow) -> Result<Self> {
        Ok(Contract {
            id: row.id,
            chain_id: row.blockchain_id,
            address: address_from_db(row.address)?,
            bytecode_id: row.bytecode_id,
            is_cached: row.is_cached,
            last_bid: Wei::from_bigdecimal(&row.last_bid),
            bid_plus_decay: Wei::from_bigdecimal(&row.bid_plus_decay),
            total_bid_investment: Wei::from_bigdecimal(&row.total_bid_investment),
            bid_block_number: BlockNumber::new(row.bid_block_number as u64),
            bid_block_timestamp: row.bid_block_timestamp,
            max_bid: row.max_bid.as_ref().map(Wei::from_bigdecimal),
            is_automated: row.is_automated,
        })
    }
}

const BYTECODE_COLUMNS: &str = "id, blockchain_id, bytecode_hash, size, is_cached, last_bid, \
     bid_plus_decay, last_eviction_bid, total_bid_investment, bid_block_number, \
     bid_block_timestamp";

const CONTRACT_COLUMNS: &str = "id, blockchain_id, address, bytecode_id, is_cached, last_bid, \
     bid_plus_decay, total_bid_investment, bid_block_number, bid_block_timestamp, max_bid, \
     is_automated";

#[async_trait]
impl DerivedStateStore for PostgresStore {
    #[instrument(
        skip(self, update),
        fields(
            chain = %update.chain_id,
            codehash = %update.bytecode_hash,
            program = %update.contract_address,
        )
    )]
    async fn apply_insert_bid(&self, update: &InsertBidApplication) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(InfraError::Database)?;

        // Bytecode row: investment total is additive on every InsertBid.
        let bytecode_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO bytecode (
                id, blockchain_id, bytecode_hash, size, is_cached, last_bid,
                bid_plus_decay, total_bid_investment, bid_block_number,
                bid_block_timestamp
            )
            VALUES ($1, $2, $3, $4, true, $5, $6, $5, $7, $8)
            ON CONFLICT (blockchain_id, bytecode_hash) DO UPDATE SET
                size = EXCLUDED.size,
                is_cached = true,
                last_bid = EXCLUDED.last_bid,
                bid_plus_decay = EXCLUDED.bid_plus_decay,
                total_bid_investment = bytecode.total_bid_investment + EXCLUDED.last_bid,
                bid_block_number = EXCLUDED.bid_block_number,
                bid_block_timestamp = EXCLUDED.bid_block_timestamp
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(update.chain_id)
        .bind(update.bytecode_hash.as_slice())
        .bind(update.size as i64)
        .bind(update.actual_bid.to_bigdecimal())
        .bind(update.bid_plus_decay.to_bigdecimal())
        .bind(update.block_number.value() as i64)
        .bind(update.block_timestamp)
        .fetch_one(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        // Contract row: per-contract investment tracks its own total; the
        // automated flag belongs to the automation events and stays put.
        sqlx::query(
            r#"
            INSERT INTO contract (
                id, blockchain_id, address, bytecode_id, is_cached, last_bid,
                bid_plus_decay, total_bid_investment, bid_block_number,
                bid_block_timestamp, is_automated
            )
            VALUES ($1, $2, $3, $4, true, $5, $6, $5, $7, $8, false)
            ON CONFLICT (blockchain_id, address) DO UPDATE SET
                bytecode_id = EXCLUDED.bytecode_id,
                is_cached = true,
                last_bid = EXCLUDED.last_bid,
                bid_plus_decay = EXCLUDED.bid_plus_decay,
                total_bid_investment = contract.total_bid_investment + EXCLUDED.last_bid,
                bid_block_number = EXCLUDED.bid_block_number,
                bid_block_timestamp = EXCLUDED.bid_block_timestamp
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(update.chain_id)
        .bind(update.contract_address.as_slice())
        .bind(bytecode_id)
        .bind(update.actual_bid.to_bigdecimal())
        .bind(update.bid_plus_decay.to_bigdecimal())
        .bind(update.block_number.value() as i64)
        .bind(update.block_timestamp)
        .execute(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        tx.commit().await.map_err(InfraError::Database)?;

        debug!("InsertBid applied");
        Ok(())
    }

    #[instrument(skip(self, codehash), fields(chain = %chain_id))]
    async fn apply_delete_bid(
        &self,
        chain_id: Uuid,
        codehash: &BytecodeHash,
        eviction_bid: Wei,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE bytecode SET
                is_cached = false,
                last_eviction_bid = $3
            WHERE blockchain_id = $1 AND bytecode_hash = $2
            "#,
        )
        .bind(chain_id)
        .bind(codehash.as_slice())
        .bind(eviction_bid.to_bigdecimal())
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::IntegrityViolation {
                event_name: "DeleteBid".into(),
                detail: format!("no bytecode row for {codehash}"),
            }
            .into());
        }

        debug!("DeleteBid applied");
        Ok(())
    }

    #[instrument(skip(self, update), fields(chain = %update.chain_id, address = %update.contract_address))]
    async fn apply_contract_added(&self, update: &AutomationApplication) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE contract SET
                max_bid = $3,
                is_automated = true,
                bid_block_number = $4,
                bid_block_timestamp = $5
            WHERE blockchain_id = $1 AND address = $2
            "#,
        )
        .bind(update.chain_id)
        .bind(update.contract_address.as_slice())
        .bind(update.max_bid.to_bigdecimal())
        .bind(update.block_number.value() as i64)
        .bind(update.block_timestamp)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::IntegrityViolation {
                event_name: "ContractAdded".into(),
                detail: format!("no contract row for {}", update.contract_address),
            }
            .into());
        }

        debug!("ContractAdded applied");
        Ok(())
    }

    #[instrument(skip(self, update), fields(chain = %update.chain_id, address = %update.contract_address))]
    async fn apply_contract_updated(&self, update: &AutomationApplication) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE contract SET
                max_bid = $3,
                bid_block_number = $4,
                bid_block_timestamp = $5
            WHERE blockchain_id = $1 AND address = $2
            "#,
        )
        .bind(update.chain_id)
        .bind(update.contract_address.as_slice())
        .bind(update.max_bid.to_bigdecimal())
        .bind(update.block_number.value() as i64)
        .bind(update.block_timestamp)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::IntegrityViolation {
                event_name: "ContractUpdated".into(),
                detail: format!("no contract row for {}", update.contract_address),
            }
            .into());
        }

        debug!("ContractUpdated applied");
        Ok(())
    }

    #[instrument(skip(self, codehash), fields(chain = %chain_id))]
    async fn get_bytecode(
        &self,
        chain_id: Uuid,
        codehash: &BytecodeHash,
    ) -> Result<Option<Bytecode>> {
        let row = sqlx::query_as::<_, BytecodeRow>(&format!(
            "SELECT {BYTECODE_COLUMNS} FROM bytecode WHERE blockchain_id = $1 AND bytecode_hash = $2"
        ))
        .bind(chain_id)
        .bind(codehash.as_slice())
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        row.map(Bytecode::try_from).transpose()
    }

    #[instrument(skip(self, address), fields(chain = %chain_id))]
    async fn get_contract(
        &self,
        chain_id: Uuid,
        address: &EthAddress,
    ) -> Result<Option<Contract>> {
        let row = sqlx::query_as::<_, ContractRow>(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contract WHERE blockchain_id = $1 AND address = $2"
        ))
        .bind(chain_id)
        .bind(address.as_slice())
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        row.map(Contract::try_from).transpose()
    }

    #[instrument(skip(self), fields(chain = %chain_id))]
    async fn list_cached_bytecodes(&self, chain_id: Uuid) -> Result<Vec<Bytecode>> {
        let rows = sqlx::query_as::<_, BytecodeRow>(&format!(
            r#"
            SELECT {BYTECODE_COLUMNS} FROM bytecode
            WHERE blockchain_id = $1 AND is_cached = true
            ORDER BY last_bid DESC
            "#
        ))
        .bind(chain_id)
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        rows.into_iter().map(Bytecode::try_from).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    // Note: behavioral coverage for the port contracts lives in the
    // integration tests against the in-memory store; wiring this adapter
    // to a real PostgreSQL instance is an operational concern.

    #[test]
    fn postgres_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresStore>();
    }
}
