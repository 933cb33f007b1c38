//! Historical back-fill over bounded block ranges.
//!
//! Reconciles the durable event log against the chain from the last known
//! cursor. Each configured event type is queried separately on the
//! fast-sync provider; ranges wider than the filter batch are split, and
//! the ingestion cursor advances after every successful batch so a crash
//! never repeats more than one batch of work.

use std::sync::Arc;

use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::{Filter, Log};
use tracing::{debug, info, instrument, warn};

use crate::config::SyncSettings;
use crate::error::{InfraError, Result};
use crate::indexer::event_ingest::EventIngest;
use crate::ports::{ChainStore, EventStore};
use crate::providers::ProviderManager;
use crate::types::entities::{Chain, StoreOutcome};
use crate::types::events::{ContractName, EventKind};
use crate::types::primitives::BlockNumber;

// ═══════════════════════════════════════════════════════════════════════════════
// HEAD FETCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Fetch the chain head with bounded retries.
///
/// # Errors
///
/// Returns [`InfraError::ChainUnavailable`] when every attempt fails.
pub async fn fetch_head(
    provider: &DynProvider,
    chain_name: &str,
    attempts: u32,
    retry_delay: std::time::Duration,
) -> Result<BlockNumber> {
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(retry_delay).await;
        }
        match provider.get_block_number().await {
            Ok(head) => return Ok(BlockNumber::new(head)),
            Err(e) => {
                last_error = e.to_string();
                debug!(chain = chain_name, attempt, error = %last_error, "Head fetch failed");
            }
        }
    }

    Err(InfraError::ChainUnavailable {
        chain: chain_name.to_owned(),
        attempts,
    }
    .into())
}

// ═══════════════════════════════════════════════════════════════════════════════
// HISTORICAL SYNC
// ═══════════════════════════════════════════════════════════════════════════════

/// Paginated log back-fill for one or more chains.
pub struct HistoricalSync<S> {
    store: Arc<S>,
    ingest: Arc<EventIngest<S>>,
    providers: Arc<ProviderManager>,
    settings: SyncSettings,
    event_kinds: Vec<EventKind>,
}

impl<S> std::fmt::Debug for HistoricalSync<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoricalSync")
            .field("event_kinds", &self.event_kinds)
            .finish_non_exhaustive()
    }
}

impl<S> HistoricalSync<S>
where
    S: ChainStore + EventStore,
{
    /// Create a historical sync engine.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        ingest: Arc<EventIngest<S>>,
        providers: Arc<ProviderManager>,
        settings: SyncSettings,
        event_kinds: Vec<EventKind>,
    ) -> Self {
        Self {
            store,
            ingest,
            providers,
            settings,
            event_kinds,
        }
    }

    /// Catch the chain up from its cursor to the current head.
    ///
    /// Returns the store outcome over all batches. A chain already at (or
    /// past) the head is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when the head cannot be fetched or a batch fails
    /// to prepare.
    #[instrument(skip(self, chain), fields(chain = %chain.name))]
    pub async fn sync_chain(&self, chain: &Chain) -> Result<StoreOutcome> {
        let last_synced = self.store.get_last_synced_block(chain.id).await?;
        let from = BlockNumber::new(last_synced.value().max(chain.origin_block.value()));

        let provider = self.providers.fast_sync_provider(chain.id)?;
        let head = fetch_head(
            &provider,
            &chain.name,
            self.settings.head_fetch_retries,
            self.settings.head_fetch_retry_delay(),
        )
        .await?;

        if head <= from {
            debug!(head = %head, cursor = %from, "Nothing to sync");
            return Ok(StoreOutcome::default());
        }

        info!(from = %from, to = %head, "Starting historical sync");
        let outcome = self.sync_range(chain, from, head, true).await?;

        // Even an empty range moves the cursor to the head.
        self.store.update_last_synced_block(chain.id, head).await?;

        info!(
            stored = outcome.success_count,
            errors = outcome.error_count,
            head = %head,
            "Historical sync complete"
        );
        Ok(outcome)
    }

    /// Sync an explicit block range, batching by the configured filter size.
    ///
    /// When `advance_cursor` is set the ingestion cursor moves to the end of
    /// each batch as it completes.
    ///
    /// # Errors
    ///
    /// Returns an error when record preparation or cursor persistence fails.
    /// Per-filter query failures degrade to empty result sets.
    #[instrument(skip(self, chain), fields(chain = %chain.name, from = %from, to = %to))]
    pub async fn sync_range(
        &self,
        chain: &Chain,
        from: BlockNumber,
        to: BlockNumber,
        advance_cursor: bool,
    ) -> Result<StoreOutcome> {
        let provider = self.providers.fast_sync_provider(chain.id)?;
        let batch_size = self.settings.events_filter_batch_size.max(1);
        let mut outcome = StoreOutcome::default();

        let mut batch_start = from.value();
        while batch_start <= to.value() {
            let batch_end = batch_start
                .saturating_add(batch_size - 1)
                .min(to.value());

            let logs = self
                .fetch_batch_logs(chain, &provider, batch_start, batch_end)
                .await;

            if !logs.is_empty() {
                let records = self
                    .ingest
                    .prepare_events(chain, logs, &provider, false)
                    .await?;
                outcome.absorb(self.ingest.store_events(&records).await);
            }

            if advance_cursor {
                self.store
                    .update_last_synced_block(chain.id, BlockNumber::new(batch_end))
                    .await?;
            }

            debug!(batch_start, batch_end, stored = outcome.success_count, "Batch synced");
            batch_start = batch_end + 1;
        }

        Ok(outcome)
    }

    /// Query every configured event type over one block batch.
    ///
    /// Results come back globally ordered by `(block_number, log_index)`;
    /// failures on individual filters are logged and contribute nothing.
    async fn fetch_batch_logs(
        &self,
        chain: &Chain,
        provider: &DynProvider,
        from: u64,
        to: u64,
    ) -> Vec<Log> {
        let mut logs: Vec<Log> = Vec::new();

        for kind in &self.event_kinds {
            let address = match kind.contract() {
                ContractName::CacheManager => Address::from(chain.cache_manager_address),
                ContractName::CacheManagerAutomation => {
                    match chain.cache_manager_automation_address {
                        Some(addr) => Address::from(addr),
                        None => continue,
                    }
                }
                ContractName::Unknown => continue,
            };

            let filter = Filter::new()
                .address(address)
                .event_signature(kind.signature_hash())
                .from_block(from)
                .to_block(to);

            match provider.get_logs(&filter).await {
                Ok(batch) => logs.extend(batch),
                Err(e) => {
                    warn!(
                        chain = %chain.name,
                        event = %kind,
                        from,
                        to,
                        error = %e,
                        "Log query failed, continuing with empty result"
                    );
                }
            }
        }

        logs.sort_by_key(|log| (log.block_number.unwrap_or(0), log.log_index.unwrap_or(0)));
        logs
    }
}
