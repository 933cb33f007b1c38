//! Integration tests for the event processor over the in-memory store.
//!
//! These cover the derivation semantics end to end: bid math with and
//! without decay, eviction handling, automation events, ordering, and
//! cursor movement.

mod common;

use std::sync::Arc;

use common::{EventBuilder, T0, make_chain, timestamp};
use uuid::Uuid;

use stylus_cache_indexer::bus::NotifierBus;
use stylus_cache_indexer::ports::{ChainStore, DerivedStateStore, EventStore, StateStore};
use stylus_cache_indexer::processor::EventProcessor;
use stylus_cache_indexer::store::MemoryStore;
use stylus_cache_indexer::types::entities::NewBlockchainState;
use stylus_cache_indexer::types::primitives::{BlockNumber, BytecodeHash, EthAddress, Wei};

const HASH: [u8; 32] = [0xAB; 32];
const PROGRAM: [u8; 20] = [0x01; 20];

async fn store_with_chain() -> (Arc<MemoryStore>, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let chain = make_chain();
    store.insert_chain(&chain).await.unwrap();
    (store, chain.id)
}

fn processor(store: &Arc<MemoryStore>) -> EventProcessor<MemoryStore> {
    EventProcessor::new(Arc::clone(store), NotifierBus::new(), 50_000)
}

// ═══════════════════════════════════════════════════════════════════════════════
// BID LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn insert_then_delete_preserves_bid_fields() {
    let (store, chain_id) = store_with_chain().await;

    // InsertBid(1e18) at block 100, DeleteBid(5e17) at block 200, decay 0.
    store
        .store_event(
            &EventBuilder::new(chain_id, 100).insert_bid(HASH, PROGRAM, "1000000000000000000", 1024),
        )
        .await
        .unwrap();
    store
        .store_event(&EventBuilder::new(chain_id, 200).delete_bid(HASH, "500000000000000000", 1024))
        .await
        .unwrap();

    processor(&store).drain(chain_id).await.unwrap();

    let bytecode = store
        .get_bytecode(chain_id, &BytecodeHash::new(HASH))
        .await
        .unwrap()
        .expect("bytecode row must exist");

    assert!(!bytecode.is_cached);
    assert_eq!(bytecode.last_bid.to_decimal_string(), "1000000000000000000");
    assert_eq!(bytecode.bid_plus_decay.to_decimal_string(), "1000000000000000000");
    assert_eq!(
        bytecode.total_bid_investment.to_decimal_string(),
        "1000000000000000000"
    );
    assert_eq!(
        bytecode.last_eviction_bid.expect("eviction bid recorded").to_decimal_string(),
        "500000000000000000"
    );
    assert_eq!(bytecode.size, 1024);
}

#[tokio::test]
async fn cold_start_insert_creates_linked_rows_and_advances_cursor() {
    let (store, chain_id) = store_with_chain().await;

    store
        .store_event(&EventBuilder::new(chain_id, 100).insert_bid(HASH, PROGRAM, "42", 512))
        .await
        .unwrap();

    processor(&store).drain(chain_id).await.unwrap();

    let bytecode = store
        .get_bytecode(chain_id, &BytecodeHash::new(HASH))
        .await
        .unwrap()
        .expect("bytecode created");
    let contract = store
        .get_contract(chain_id, &EthAddress::new(PROGRAM))
        .await
        .unwrap()
        .expect("contract created");

    assert!(bytecode.is_cached);
    assert_eq!(contract.bytecode_id, Some(bytecode.id));
    assert!(!contract.is_automated);
    assert_eq!(contract.max_bid, None);
    assert_eq!(
        store.get_last_processed_block(chain_id).await.unwrap(),
        BlockNumber::new(100)
    );
}

#[tokio::test]
async fn total_investment_is_the_sum_of_actual_bids() {
    let (store, chain_id) = store_with_chain().await;

    let bids = ["1000", "2500", "400"];
    for (i, bid) in bids.iter().enumerate() {
        store
            .store_event(
                &EventBuilder::new(chain_id, 100 + i as u64).insert_bid(HASH, PROGRAM, bid, 1024),
            )
            .await
            .unwrap();
    }
    // A DeleteBid must not change the invested total.
    store
        .store_event(&EventBuilder::new(chain_id, 200).delete_bid(HASH, "99", 1024))
        .await
        .unwrap();

    processor(&store).drain(chain_id).await.unwrap();

    let bytecode = store
        .get_bytecode(chain_id, &BytecodeHash::new(HASH))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bytecode.total_bid_investment.to_decimal_string(), "3900");
    assert_eq!(bytecode.last_bid.to_decimal_string(), "400");
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECAY
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn decay_rate_event_adjusts_subsequent_bids() {
    let (store, chain_id) = store_with_chain().await;

    // Rate 1e12 set at block 90; InsertBid(2e18) at T0=1000s scale: use a
    // small timestamp so the expected value is easy to state exactly.
    store
        .store_event(&EventBuilder::new(chain_id, 90).set_decay_rate("1000000000000"))
        .await
        .unwrap();
    store
        .store_event(
            &EventBuilder::new(chain_id, 100)
                .at(1000)
                .insert_bid(HASH, PROGRAM, "2000000000000000000", 512),
        )
        .await
        .unwrap();

    processor(&store).drain(chain_id).await.unwrap();

    let bytecode = store
        .get_bytecode(chain_id, &BytecodeHash::new(HASH))
        .await
        .unwrap()
        .unwrap();

    // decayAmount = 1000 * 1e12 = 1e15; actual = 2e18 - 1e15
    assert_eq!(bytecode.last_bid.to_decimal_string(), "1999000000000000000");
    assert_eq!(bytecode.bid_plus_decay.to_decimal_string(), "2000000000000000000");
}

#[tokio::test]
async fn oversized_decay_saturates_to_zero_investment() {
    let (store, chain_id) = store_with_chain().await;

    store
        .store_event(&EventBuilder::new(chain_id, 90).set_decay_rate("3000000000000000"))
        .await
        .unwrap();
    store
        .store_event(
            &EventBuilder::new(chain_id, 100)
                .at(1000)
                .insert_bid(HASH, PROGRAM, "2000000000000000000", 512),
        )
        .await
        .unwrap();

    processor(&store).drain(chain_id).await.unwrap();

    let bytecode = store
        .get_bytecode(chain_id, &BytecodeHash::new(HASH))
        .await
        .unwrap()
        .unwrap();

    // decayAmount = 1000 * 3e15 = 3e18 > bid: saturates, investment adds 0.
    assert_eq!(bytecode.last_bid, Wei::ZERO);
    assert_eq!(bytecode.total_bid_investment, Wei::ZERO);
    assert!(bytecode.is_cached);
}

#[tokio::test]
async fn snapshot_decay_rate_is_the_fallback() {
    let (store, chain_id) = store_with_chain().await;

    // No SetDecayRate events; the latest snapshot carries rate 1.
    store
        .insert_state(&NewBlockchainState {
            chain_id,
            block_number: BlockNumber::new(50),
            block_timestamp: timestamp(T0 - 1000),
            cache_size: 4_000_000,
            queue_size: 100,
            decay_rate: Wei::parse("1").unwrap(),
            is_paused: false,
            min_bid_small: Wei::ZERO,
            min_bid_mid: Wei::ZERO,
            min_bid_large: Wei::ZERO,
            total_contracts_cached: 0,
        })
        .await
        .unwrap();

    store
        .store_event(
            &EventBuilder::new(chain_id, 100)
                .at(1000)
                .insert_bid(HASH, PROGRAM, "5000", 512),
        )
        .await
        .unwrap();

    processor(&store).drain(chain_id).await.unwrap();

    let bytecode = store
        .get_bytecode(chain_id, &BytecodeHash::new(HASH))
        .await
        .unwrap()
        .unwrap();
    // actual = 5000 - 1000 * 1
    assert_eq!(bytecode.last_bid.to_decimal_string(), "4000");
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORDERING
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn same_block_events_apply_in_log_index_order() {
    let (store, chain_id) = store_with_chain().await;

    // Two inserts and a delete all in block 100; final state must reflect
    // log-index order: insert(0), insert(1), delete(2).
    store
        .store_event(
            &EventBuilder::new(chain_id, 100)
                .log_index(0)
                .tx_seed(1)
                .insert_bid(HASH, PROGRAM, "1000", 64),
        )
        .await
        .unwrap();
    store
        .store_event(
            &EventBuilder::new(chain_id, 100)
                .log_index(2)
                .tx_seed(3)
                .delete_bid(HASH, "77", 64),
        )
        .await
        .unwrap();
    store
        .store_event(
            &EventBuilder::new(chain_id, 100)
                .log_index(1)
                .tx_seed(2)
                .insert_bid(HASH, PROGRAM, "2000", 64),
        )
        .await
        .unwrap();

    processor(&store).drain(chain_id).await.unwrap();

    let bytecode = store
        .get_bytecode(chain_id, &BytecodeHash::new(HASH))
        .await
        .unwrap()
        .unwrap();

    assert!(!bytecode.is_cached);
    assert_eq!(bytecode.last_bid.to_decimal_string(), "2000");
    assert_eq!(bytecode.total_bid_investment.to_decimal_string(), "3000");
    assert_eq!(
        bytecode.last_eviction_bid.unwrap().to_decimal_string(),
        "77"
    );
}

#[tokio::test]
async fn drain_is_idempotent_across_repeat_calls() {
    let (store, chain_id) = store_with_chain().await;

    store
        .store_event(&EventBuilder::new(chain_id, 100).insert_bid(HASH, PROGRAM, "1000", 64))
        .await
        .unwrap();

    let processor = processor(&store);
    processor.drain(chain_id).await.unwrap();
    processor.drain(chain_id).await.unwrap();
    processor.drain(chain_id).await.unwrap();

    let bytecode = store
        .get_bytecode(chain_id, &BytecodeHash::new(HASH))
        .await
        .unwrap()
        .unwrap();
    // Re-draining must not re-apply the investment.
    assert_eq!(bytecode.total_bid_investment.to_decimal_string(), "1000");
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTOMATION
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn automation_events_update_existing_contract() {
    let (store, chain_id) = store_with_chain().await;
    let user = [0xEE; 20];

    store
        .store_event(&EventBuilder::new(chain_id, 100).insert_bid(HASH, PROGRAM, "1000", 64))
        .await
        .unwrap();
    store
        .store_event(
            &EventBuilder::new(chain_id, 110).contract_added(user, PROGRAM, "9000000000000000000"),
        )
        .await
        .unwrap();

    let processor = processor(&store);
    processor.drain(chain_id).await.unwrap();

    let contract = store
        .get_contract(chain_id, &EthAddress::new(PROGRAM))
        .await
        .unwrap()
        .unwrap();
    assert!(contract.is_automated);
    assert_eq!(
        contract.max_bid.unwrap().to_decimal_string(),
        "9000000000000000000"
    );

    // ContractUpdated changes the ceiling but not the automated flag.
    store
        .store_event(&EventBuilder::new(chain_id, 120).contract_updated(PROGRAM, "123"))
        .await
        .unwrap();
    processor.drain(chain_id).await.unwrap();

    let contract = store
        .get_contract(chain_id, &EthAddress::new(PROGRAM))
        .await
        .unwrap()
        .unwrap();
    assert!(contract.is_automated);
    assert_eq!(contract.max_bid.unwrap().to_decimal_string(), "123");
}

#[tokio::test]
async fn automation_event_without_contract_does_not_stall_the_pipeline() {
    let (store, chain_id) = store_with_chain().await;

    store
        .store_event(
            &EventBuilder::new(chain_id, 100).contract_added([0xEE; 20], [0xDD; 20], "5000"),
        )
        .await
        .unwrap();
    store
        .store_event(&EventBuilder::new(chain_id, 110).insert_bid(HASH, PROGRAM, "1000", 64))
        .await
        .unwrap();

    processor(&store).drain(chain_id).await.unwrap();

    // The integrity violation is reported but the later event still applied.
    assert!(
        store
            .get_bytecode(chain_id, &BytecodeHash::new(HASH))
            .await
            .unwrap()
            .is_some()
    );
    assert_eq!(
        store.get_last_processed_block(chain_id).await.unwrap(),
        BlockNumber::new(110)
    );
}
