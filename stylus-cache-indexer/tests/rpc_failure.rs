//! Integration tests for RPC failure handling at the HTTP level.
//!
//! A mock JSON-RPC server stands in for the chain so the retry and
//! degradation paths can be driven for real: head fetches that exhaust
//! their retries, block-timestamp lookups that fail during event
//! preparation, and historical log queries that degrade to empty result
//! sets without failing the sync pass.

mod common;

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, aliases::U192};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use rstest::rstest;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use common::make_chain;
use stylus_cache_indexer::abi::cache_manager;
use stylus_cache_indexer::config::{SyncSettings, WebSocketSettings};
use stylus_cache_indexer::indexer::historical_sync::fetch_head;
use stylus_cache_indexer::indexer::{EventIngest, HistoricalSync};
use stylus_cache_indexer::ports::ChainStore;
use stylus_cache_indexer::providers::ProviderManager;
use stylus_cache_indexer::store::MemoryStore;
use stylus_cache_indexer::types::entities::Chain;
use stylus_cache_indexer::types::events::EventKind;
use stylus_cache_indexer::types::primitives::BlockNumber;

// ═══════════════════════════════════════════════════════════════════════════════
// MOCK RPC HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Responds with a fixed JSON-RPC result, echoing the request id.
struct JsonRpcResult(serde_json::Value);

impl Respond for JsonRpcResult {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let id = body.get("id").cloned().unwrap_or(json!(0));
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": self.0.clone(),
        }))
    }
}

fn http_provider(server: &MockServer) -> DynProvider {
    let url = server.uri().parse().expect("mock server URI is valid");
    ProviderBuilder::new().connect_http(url).erased()
}

/// A block body complete enough for the provider to deserialize.
/// Timestamp 0x6553f100 = 1_700_000_000.
fn block_body() -> serde_json::Value {
    json!({
        "hash": format!("0x{}", "10".repeat(32)),
        "parentHash": format!("0x{}", "11".repeat(32)),
        "sha3Uncles": format!("0x{}", "12".repeat(32)),
        "miner": format!("0x{}", "00".repeat(20)),
        "stateRoot": format!("0x{}", "13".repeat(32)),
        "transactionsRoot": format!("0x{}", "14".repeat(32)),
        "receiptsRoot": format!("0x{}", "15".repeat(32)),
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "difficulty": "0x0",
        "totalDifficulty": "0x0",
        "number": "0x64",
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x0",
        "timestamp": "0x6553f100",
        "extraData": "0x",
        "mixHash": format!("0x{}", "16".repeat(32)),
        "nonce": "0x0000000000000000",
        "baseFeePerGas": "0x0",
        "size": "0x0",
        "uncles": [],
        "transactions": [],
    })
}

fn insert_bid_log(chain: &Chain) -> Log {
    let event = cache_manager::InsertBid {
        codehash: B256::from([0xAB; 32]),
        program: Address::from([0x01; 20]),
        bid: U192::from(1_000_000_000_000_000_000u128),
        size: 1024,
    };

    Log {
        inner: alloy::primitives::Log {
            address: Address::from(chain.cache_manager_address),
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

fn sync_settings() -> SyncSettings {
    SyncSettings {
        event_types: EventKind::ALL.iter().map(|k| k.as_str().into()).collect(),
        events_filter_batch_size: 5000,
        resync_blocks_back: 100,
        resync_interval_secs: 3600,
        storage_batch_size: 50,
        processor_block_range: 50_000,
        head_fetch_retries: 3,
        head_fetch_retry_delay_ms: 10,
    }
}

fn ws_settings() -> WebSocketSettings {
    WebSocketSettings {
        ping_interval_ms: 15_000,
        ping_timeout_ms: 10_000,
        // Long enough that the reconnect task just sleeps for the test's
        // lifetime after the deliberately unreachable WS endpoint fails.
        backoff_base_ms: 60_000,
        backoff_max_ms: 300_000,
        failover_threshold: 2,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEAD FETCH
// ═══════════════════════════════════════════════════════════════════════════════

#[rstest]
#[case(1)]
#[case(3)]
#[tokio::test]
async fn head_fetch_exhausts_retries_into_chain_unavailable(#[case] attempts: u32) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = http_provider(&server);
    let err = fetch_head(&provider, "test-chain", attempts, Duration::from_millis(10))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "CHAIN_UNAVAILABLE");
}

#[tokio::test]
async fn head_fetch_succeeds_against_healthy_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_blockNumber"})))
        .respond_with(JsonRpcResult(json!("0x64")))
        .mount(&server)
        .await;

    let provider = http_provider(&server);
    let head = fetch_head(&provider, "test-chain", 3, Duration::from_millis(10))
        .await
        .unwrap();

    assert_eq!(head, BlockNumber::new(100));
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT PREPARATION
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn prepare_events_fails_when_block_lookup_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let ingest = EventIngest::new(Arc::clone(&store), 50);
    let chain = make_chain();
    let provider = http_provider(&server);

    let err = ingest
        .prepare_events(&chain, vec![insert_bid_log(&chain)], &provider, true)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "EVENT_PROCESSING_FAILED");
    assert_eq!(store.event_count(), 0);
}

#[tokio::test]
async fn prepare_events_resolves_timestamp_from_the_chain() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getBlockByNumber"})))
        .respond_with(JsonRpcResult(block_body()))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let ingest = EventIngest::new(Arc::clone(&store), 50);
    let chain = make_chain();
    let provider = http_provider(&server);

    let records = ingest
        .prepare_events(&chain, vec![insert_bid_log(&chain)], &provider, true)
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_name, "InsertBid");
    assert_eq!(records[0].block_timestamp.timestamp(), 1_700_000_000);
    assert!(records[0].is_real_time);
}

// ═══════════════════════════════════════════════════════════════════════════════
// HISTORICAL SYNC DEGRADATION
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn failing_log_queries_degrade_to_empty_and_still_advance_the_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let mut chain = make_chain();
    chain.rpc_url = server.uri();
    // Unreachable on purpose; a dead WebSocket must not block historical sync.
    chain.rpc_wss_url = "ws://127.0.0.1:9".into();
    store.insert_chain(&chain).await.unwrap();

    let providers = Arc::new(ProviderManager::new(ws_settings()));
    providers.register_chain(chain.clone()).await.unwrap();

    let ingest = Arc::new(EventIngest::new(Arc::clone(&store), 50));
    let sync = HistoricalSync::new(
        Arc::clone(&store),
        ingest,
        Arc::clone(&providers),
        sync_settings(),
        EventKind::ALL.to_vec(),
    );

    let outcome = sync
        .sync_range(&chain, BlockNumber::new(1), BlockNumber::new(100), true)
        .await
        .unwrap();

    // Every per-filter query failed; nothing stored, nothing errored, and
    // the ingestion cursor still reached the end of the range.
    assert_eq!(outcome.total_events, 0);
    assert_eq!(outcome.error_count, 0);
    assert_eq!(
        store.get_last_synced_block(chain.id).await.unwrap(),
        BlockNumber::new(100)
    );

    providers.shutdown().await;
}
