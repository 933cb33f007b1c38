//! Shared fixtures for integration tests.

#![allow(dead_code)] // each integration test binary uses a subset

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use stylus_cache_indexer::types::entities::{Chain, NewBlockchainEvent};
use stylus_cache_indexer::types::events::{ContractName, EventKind};
use stylus_cache_indexer::types::primitives::{BlockNumber, BytecodeHash, EthAddress};

/// CacheManager address used by every fixture chain.
pub const CACHE_MANAGER: [u8; 20] = [0x51; 20];

/// Automation address used by every fixture chain.
pub const AUTOMATION: [u8; 20] = [0x99; 20];

/// Default fixture timestamp (2023-11-14T22:13:20Z).
pub const T0: i64 = 1_700_000_000;

pub fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// A fixture chain row, enabled, cursors at zero.
pub fn make_chain() -> Chain {
    Chain {
        id: Uuid::new_v4(),
        name: "arbitrum-test".into(),
        chain_id: 42161,
        rpc_url: "https://arb1.example.org/rpc".into(),
        fast_sync_rpc_url: None,
        rpc_wss_url: "wss://arb1.example.org/ws".into(),
        rpc_wss_url_backup: None,
        cache_manager_address: EthAddress::new(CACHE_MANAGER),
        arb_wasm_cache_address: EthAddress::new([0x72; 20]),
        arb_wasm_address: EthAddress::new([0x71; 20]),
        cache_manager_automation_address: Some(EthAddress::new(AUTOMATION)),
        origin_block: BlockNumber::new(0),
        last_synced_block: BlockNumber::new(0),
        last_processed_block: BlockNumber::new(0),
        enabled: true,
    }
}

/// Builder for event-log records with fixture defaults.
pub struct EventBuilder {
    chain_id: Uuid,
    block: u64,
    log_index: u64,
    timestamp_secs: i64,
    tx_seed: u8,
    is_real_time: bool,
}

impl EventBuilder {
    pub fn new(chain_id: Uuid, block: u64) -> Self {
        Self {
            chain_id,
            block,
            log_index: 0,
            timestamp_secs: T0,
            tx_seed: block as u8,
            is_real_time: false,
        }
    }

    pub fn log_index(mut self, log_index: u64) -> Self {
        self.log_index = log_index;
        self
    }

    pub fn at(mut self, timestamp_secs: i64) -> Self {
        self.timestamp_secs = timestamp_secs;
        self
    }

    pub fn tx_seed(mut self, seed: u8) -> Self {
        self.tx_seed = seed;
        self
    }

    pub fn realtime(mut self) -> Self {
        self.is_real_time = true;
        self
    }

    fn record(
        self,
        kind: EventKind,
        contract_name: ContractName,
        address: [u8; 20],
        data: serde_json::Value,
    ) -> NewBlockchainEvent {
        NewBlockchainEvent {
            chain_id: self.chain_id,
            contract_name,
            contract_address: EthAddress::new(address),
            event_name: kind.as_str().into(),
            block_timestamp: timestamp(self.timestamp_secs),
            block_number: BlockNumber::new(self.block),
            transaction_hash: BytecodeHash::new([self.tx_seed; 32]),
            log_index: self.log_index,
            is_real_time: self.is_real_time,
            event_data: data,
        }
    }

    pub fn insert_bid(self, codehash: [u8; 32], program: [u8; 20], bid: &str, size: u64) -> NewBlockchainEvent {
        self.record(
            EventKind::InsertBid,
            ContractName::CacheManager,
            CACHE_MANAGER,
            json!([
                format!("0x{}", hex::encode(codehash)),
                format!("0x{}", hex::encode(program)),
                bid,
                size.to_string(),
            ]),
        )
    }

    pub fn delete_bid(self, codehash: [u8; 32], bid: &str, size: u64) -> NewBlockchainEvent {
        self.record(
            EventKind::DeleteBid,
            ContractName::CacheManager,
            CACHE_MANAGER,
            json!([
                format!("0x{}", hex::encode(codehash)),
                bid,
                size.to_string(),
            ]),
        )
    }

    pub fn set_decay_rate(self, rate: &str) -> NewBlockchainEvent {
        self.record(
            EventKind::SetDecayRate,
            ContractName::CacheManager,
            CACHE_MANAGER,
            json!([rate]),
        )
    }

    pub fn contract_added(self, user: [u8; 20], contract: [u8; 20], max_bid: &str) -> NewBlockchainEvent {
        self.record(
            EventKind::ContractAdded,
            ContractName::CacheManagerAutomation,
            AUTOMATION,
            json!([
                format!("0x{}", hex::encode(user)),
                format!("0x{}", hex::encode(contract)),
                max_bid,
            ]),
        )
    }

    pub fn contract_updated(self, contract: [u8; 20], max_bid: &str) -> NewBlockchainEvent {
        self.record(
            EventKind::ContractUpdated,
            ContractName::CacheManagerAutomation,
            AUTOMATION,
            json!([format!("0x{}", hex::encode(contract)), max_bid]),
        )
    }
}
