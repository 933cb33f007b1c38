//! Startup reconciliation of declared chain configs with the chain table.
//!
//! Each declared chain is matched on `(chain_id, rpc_url)`. A missing row is
//! inserted with its cursors at the origin block; an existing row is left
//! completely untouched - operators reconfigure chains out of band, and
//! cursors in particular are never reset by a restart.

use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::ChainSettings;
use crate::error::{AppError, Result};
use crate::ports::ChainStore;
use crate::types::entities::Chain;
use crate::types::primitives::{BlockNumber, EthAddress};

/// Reconcile the declared configs against the chain table.
///
/// Returns every chain row the configs resolve to, inserted or existing.
///
/// # Errors
///
/// Returns an error if a declared address is malformed or storage fails.
#[instrument(skip(store, configs), fields(declared = configs.len()))]
pub async fn register_chains<S>(store: &S, configs: &[ChainSettings]) -> Result<Vec<Chain>>
where
    S: ChainStore,
{
    let mut chains = Vec::with_capacity(configs.len());

    for config in configs {
        if let Some(existing) = store.find_chain(config.chain_id, &config.rpc_url).await? {
            info!(chain = %existing.name, chain_id = existing.chain_id, "Chain already registered");
            chains.push(existing);
            continue;
        }

        let chain = chain_from_config(config)?;
        store.insert_chain(&chain).await?;
        info!(
            chain = %chain.name,
            chain_id = chain.chain_id,
            origin = %chain.origin_block,
            "Chain registered"
        );
        chains.push(chain);
    }

    Ok(chains)
}

/// Build a fresh chain row from its declared config.
fn chain_from_config(config: &ChainSettings) -> Result<Chain> {
    let parse_address = |field: &str, value: &str| {
        EthAddress::from_hex(value).map_err(|e| {
            AppError::Config(format!("chain {}: invalid {field} ({e})", config.name))
        })
    };

    let origin = BlockNumber::new(config.origin_block.unwrap_or(0));

    Ok(Chain {
        id: Uuid::new_v4(),
        name: config.name.clone(),
        chain_id: config.chain_id,
        rpc_url: config.rpc_url.clone(),
        fast_sync_rpc_url: config.fast_sync_rpc_url.clone(),
        rpc_wss_url: config.rpc_wss_url.clone(),
        rpc_wss_url_backup: config.rpc_wss_url_backup.clone(),
        cache_manager_address: parse_address("cache_manager_address", &config.cache_manager_address)?,
        arb_wasm_cache_address: parse_address(
            "arb_wasm_cache_address",
            &config.arb_wasm_cache_address,
        )?,
        arb_wasm_address: parse_address("arb_wasm_address", &config.arb_wasm_address)?,
        cache_manager_automation_address: config
            .cache_manager_automation_address
            .as_deref()
            .map(|value| parse_address("cache_manager_automation_address", value))
            .transpose()?,
        origin_block: origin,
        last_synced_block: origin,
        last_processed_block: BlockNumber::new(0),
        enabled: config.enabled,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn config(name: &str, chain_id: u64, rpc: &str) -> ChainSettings {
        ChainSettings {
            name: name.into(),
            chain_id,
            rpc_url: rpc.into(),
            fast_sync_rpc_url: None,
            rpc_wss_url: "wss://example.org/ws".into(),
            rpc_wss_url_backup: None,
            cache_manager_address: format!("0x{}", "51".repeat(20)),
            arb_wasm_cache_address: format!("0x{}", "72".repeat(20)),
            arb_wasm_address: format!("0x{}", "71".repeat(20)),
            cache_manager_automation_address: None,
            origin_block: Some(1000),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn inserts_missing_chain_with_origin_cursor() {
        let store = MemoryStore::new();
        let chains = register_chains(&store, &[config("arb", 42161, "https://a")])
            .await
            .unwrap();

        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].last_synced_block, BlockNumber::new(1000));
        assert_eq!(chains[0].last_processed_block, BlockNumber::new(0));
    }

    #[tokio::test]
    async fn existing_chain_keeps_its_cursors() {
        let store = MemoryStore::new();
        let first = register_chains(&store, &[config("arb", 42161, "https://a")])
            .await
            .unwrap();
        let chain_id = first[0].id;

        // Simulate progress
        store
            .update_last_synced_block(chain_id, BlockNumber::new(5000))
            .await
            .unwrap();

        // Re-registering must not touch the cursor
        let second = register_chains(&store, &[config("arb", 42161, "https://a")])
            .await
            .unwrap();
        assert_eq!(second[0].id, chain_id);
        assert_eq!(
            store.get_last_synced_block(chain_id).await.unwrap(),
            BlockNumber::new(5000)
        );
    }

    #[tokio::test]
    async fn same_chain_id_different_rpc_is_a_new_row() {
        let store = MemoryStore::new();
        register_chains(&store, &[config("arb", 42161, "https://a")])
            .await
            .unwrap();
        let chains = register_chains(&store, &[config("arb-alt", 42161, "https://b")])
            .await
            .unwrap();

        assert_eq!(store.list_enabled_chains().await.unwrap().len(), 2);
        assert_eq!(chains[0].name, "arb-alt");
    }

    #[tokio::test]
    async fn bad_address_is_config_error() {
        let store = MemoryStore::new();
        let mut bad = config("arb", 42161, "https://a");
        bad.cache_manager_address = "0x1234".into();

        let err = register_chains(&store, &[bad]).await.unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
