//! Periodic on-chain parameter snapshots.
//!
//! Every run reads the CacheManager's current parameters concurrently and
//! appends one `blockchain_state` row per chain. `getEntries` is the only
//! call allowed to degrade: it retries once and then falls back to an empty
//! list, so a partial snapshot still lands.

use std::sync::Arc;

use alloy::providers::Provider;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::abi::cache_manager::ICacheManager;
use crate::config::PollerSettings;
use crate::error::{InfraError, Result};
use crate::ports::StateStore;
use crate::providers::{CacheManagerContract, ProviderManager};
use crate::types::entities::{Chain, NewBlockchainState};
use crate::types::primitives::{BlockNumber, Wei};

/// On-chain state poller.
pub struct StatePoller<S> {
    store: Arc<S>,
    providers: Arc<ProviderManager>,
    settings: PollerSettings,
}

impl<S> std::fmt::Debug for StatePoller<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatePoller")
            .field("interval_secs", &self.settings.interval_secs)
            .finish_non_exhaustive()
    }
}

impl<S> StatePoller<S>
where
    S: StateStore,
{
    /// Create a poller.
    #[must_use]
    pub fn new(store: Arc<S>, providers: Arc<ProviderManager>, settings: PollerSettings) -> Self {
        Self {
            store,
            providers,
            settings,
        }
    }

    /// Take one snapshot for a chain.
    ///
    /// # Errors
    ///
    /// Returns an error when any required parameter read fails; only the
    /// entries list is optional.
    #[instrument(skip(self, chain), fields(chain = %chain.name))]
    pub async fn snapshot_chain(&self, chain: &Chain) -> Result<()> {
        let contract = self.providers.cache_manager(chain.id)?;
        let provider = self.providers.http_provider(chain.id)?;

        let rpc_err = |e: alloy::contract::Error| InfraError::Rpc(Box::new(e));

        let (min_small, min_mid, min_large, decay, cache_size, queue_size, is_paused, head) = tokio::try_join!(
            async {
                contract
                    .getMinBid(self.settings.contract_small_size)
                    .call()
                    .await
                    .map_err(rpc_err)
            },
            async {
                contract
                    .getMinBid(self.settings.contract_mid_size)
                    .call()
                    .await
                    .map_err(rpc_err)
            },
            async {
                contract
                    .getMinBid(self.settings.contract_large_size)
                    .call()
                    .await
                    .map_err(rpc_err)
            },
            async { contract.decay().call().await.map_err(rpc_err) },
            async { contract.cacheSize().call().await.map_err(rpc_err) },
            async { contract.queueSize().call().await.map_err(rpc_err) },
            async { contract.isPaused().call().await.map_err(rpc_err) },
            async {
                provider
                    .get_block_number()
                    .await
                    .map_err(|e| InfraError::Rpc(Box::new(e)))
            },
        )?;

        let entries = self.fetch_entries_with_retry(&contract, chain).await;
        let block_timestamp = fetch_block_timestamp(&provider, head).await;

        let snapshot = NewBlockchainState {
            chain_id: chain.id,
            block_number: BlockNumber::new(head),
            block_timestamp,
            cache_size,
            queue_size,
            decay_rate: Wei::from(decay),
            is_paused,
            min_bid_small: wei_from_decimal_string(&min_small.to_string()),
            min_bid_mid: wei_from_decimal_string(&min_mid.to_string()),
            min_bid_large: wei_from_decimal_string(&min_large.to_string()),
            total_contracts_cached: entries.len() as u64,
        };

        self.store.insert_state(&snapshot).await?;
        metrics::gauge!("indexer_cache_queue_bytes", "chain" => chain.name.clone())
            .set(queue_size as f64);

        info!(
            block = head,
            cached = entries.len(),
            paused = is_paused,
            "State snapshot recorded"
        );
        Ok(())
    }

    /// `getEntries` with bounded retries and an empty-list fallback.
    async fn fetch_entries_with_retry(
        &self,
        contract: &CacheManagerContract,
        chain: &Chain,
    ) -> Vec<ICacheManager::Entry> {
        let attempts = self.settings.entries_retry_attempts.max(1);
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.settings.entries_retry_delay()).await;
            }
            match contract.getEntries().call().await {
                Ok(entries) => return entries,
                Err(e) => {
                    debug!(chain = %chain.name, attempt, error = %e, "getEntries failed");
                }
            }
        }

        warn!(chain = %chain.name, "getEntries exhausted retries, snapshot proceeds without entries");
        Vec::new()
    }
}

/// Exact wei conversion from a uint's decimal string form.
fn wei_from_decimal_string(value: &str) -> Wei {
    // Uint::to_string is always a valid non-negative decimal
    Wei::parse(value).unwrap_or(Wei::ZERO)
}

/// Block timestamp for the snapshot block, falling back to wall time.
async fn fetch_block_timestamp(
    provider: &alloy::providers::DynProvider,
    block_number: u64,
) -> DateTime<Utc> {
    match provider
        .get_block_by_number(alloy::eips::BlockNumberOrTag::Number(block_number))
        .await
    {
        #[allow(clippy::cast_possible_wrap)] // timestamps fit i64 for eons
        Ok(Some(block)) => DateTime::<Utc>::from_timestamp(block.header.timestamp as i64, 0)
            .unwrap_or_else(Utc::now),
        Ok(None) => {
            debug!(block_number, "Snapshot block not found, using current time");
            Utc::now()
        }
        Err(e) => {
            warn!(block_number, error = %e, "Failed to fetch snapshot block, using current time");
            Utc::now()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
