//! Real-time event listener over WebSocket subscriptions.
//!
//! One subscription per chain covers the CacheManager and (when deployed)
//! CacheManagerAutomation addresses. Incoming logs are filtered against the
//! configured allow-list at receive time, deduplicated twice - once against
//! a process-wide in-flight set, once against the durable log - and handed
//! to the ingestion boundary. Every successful store advances the ingestion
//! cursor and publishes a notice on the bus.
//!
//! The listener registers itself with the provider manager: `on_ws_down`
//! clears the chain's subscription task, `on_ws_reconnected` re-installs it
//! from the configuration cached at first setup.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::bus::{EventStored, NotifierBus};
use crate::error::{InfraError, Result};
use crate::indexer::event_ingest::EventIngest;
use crate::ports::{ChainStore, EventStore};
use crate::providers::{ProviderManager, ReconnectHooks};
use crate::types::entities::Chain;
use crate::types::events::EventKind;
use crate::types::primitives::{BlockNumber, BytecodeHash};

/// Process-wide dedup key: `chain|block|log_index|event`.
type InFlightKey = (Uuid, u64, u64, EventKind);

// ═══════════════════════════════════════════════════════════════════════════════
// REALTIME LISTENER
// ═══════════════════════════════════════════════════════════════════════════════

/// Live subscription manager for every enabled chain.
pub struct RealtimeListener<S> {
    store: Arc<S>,
    ingest: Arc<EventIngest<S>>,
    providers: Arc<ProviderManager>,
    bus: NotifierBus,
    allow_list: HashSet<EventKind>,
    in_flight: DashSet<InFlightKey>,
    tasks: DashMap<Uuid, JoinHandle<()>>,
    configs: DashMap<Uuid, Chain>,
}

impl<S> std::fmt::Debug for RealtimeListener<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeListener")
            .field("active_chains", &self.tasks.len())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl<S> RealtimeListener<S>
where
    S: ChainStore + EventStore + Send + Sync + 'static,
{
    /// Create a listener.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        ingest: Arc<EventIngest<S>>,
        providers: Arc<ProviderManager>,
        bus: NotifierBus,
        allow_list: Vec<EventKind>,
    ) -> Self {
        Self {
            store,
            ingest,
            providers,
            bus,
            allow_list: allow_list.into_iter().collect(),
            in_flight: DashSet::new(),
            tasks: DashMap::new(),
            configs: DashMap::new(),
        }
    }

    /// Install the subscription for a chain and cache its configuration for
    /// later re-setup after reconnects.
    ///
    /// A chain without a live WebSocket is not an error - the provider
    /// manager's reconnect path will call back in.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription request itself fails.
    #[instrument(skip(self, chain), fields(chain = %chain.name))]
    pub async fn setup(self: Arc<Self>, chain: Chain) -> Result<()> {
        self.configs.insert(chain.id, chain.clone());

        let Some(ws) = self.providers.ws_provider(chain.id)? else {
            warn!("No WebSocket available yet, subscription deferred to reconnect");
            return Ok(());
        };

        let mut addresses = vec![Address::from(chain.cache_manager_address)];
        if let Some(automation) = chain.cache_manager_automation_address {
            addresses.push(Address::from(automation));
        }

        let filter = Filter::new().address(addresses);
        let subscription = ws
            .subscribe_logs(&filter)
            .await
            .map_err(|e| InfraError::Rpc(Box::new(e)))?;

        info!(events = self.allow_list.len(), "Subscribed to realtime logs");
        let mut stream = subscription.into_stream();

        let listener = Arc::clone(&self);
        let task_chain = chain.clone();
        let handle = tokio::spawn(async move {
            while let Some(log) = stream.next().await {
                if let Err(e) = listener.handle_log(&task_chain, log).await {
                    error!(chain = %task_chain.name, error = %e, "Failed to handle realtime log");
                }
            }
            // Stream end means the socket died; the watchdog owns recovery.
            warn!(chain = %task_chain.name, "Realtime log stream ended");
            listener.tasks.remove(&task_chain.id);
        });

        if let Some(previous) = self.tasks.insert(chain.id, handle) {
            previous.abort();
        }

        Ok(())
    }

    /// Handle one incoming log end to end.
    async fn handle_log(&self, chain: &Chain, log: Log) -> Result<()> {
        let Some(topic0) = log.topics().first() else {
            return Ok(());
        };
        let Some(kind) = EventKind::from_signature_hash(topic0) else {
            return Ok(());
        };
        // Outside the allow-list: dropped silently by design of the filter.
        if !self.allow_list.contains(&kind) {
            return Ok(());
        }

        let (Some(block_number), Some(log_index), Some(tx_hash)) =
            (log.block_number, log.log_index, log.transaction_hash)
        else {
            warn!(chain = %chain.name, event = %kind, "Realtime log missing metadata");
            return Ok(());
        };

        // While the key is present no second handler runs for this event;
        // the key is removed after the storage attempt either way.
        let key: InFlightKey = (chain.id, block_number, log_index, kind);
        if !self.in_flight.insert(key) {
            debug!(event = %kind, block_number, log_index, "Event already in flight");
            return Ok(());
        }

        let result = self
            .ingest_log(chain, log, kind, block_number, log_index, tx_hash.0)
            .await;
        self.in_flight.remove(&key);
        result
    }

    /// Check the durable log, store, advance the cursor, publish.
    async fn ingest_log(
        &self,
        chain: &Chain,
        log: Log,
        kind: EventKind,
        block_number: u64,
        log_index: u64,
        tx_hash: [u8; 32],
    ) -> Result<()> {
        let tx_hash = BytecodeHash::new(tx_hash);
        if self
            .store
            .event_exists(
                chain.id,
                BlockNumber::new(block_number),
                log_index,
                &tx_hash,
                kind.as_str(),
            )
            .await?
        {
            debug!(event = %kind, block_number, log_index, "Event already recorded");
            return Ok(());
        }

        let provider = self.providers.http_provider(chain.id)?;
        let records = self
            .ingest
            .prepare_events(chain, vec![log], &provider, true)
            .await?;
        let Some(record) = records.into_iter().next() else {
            return Ok(());
        };

        let event_id = self.ingest.store_event(&record).await?;
        self.store
            .update_last_synced_block(chain.id, record.block_number)
            .await?;

        metrics::counter!("indexer_realtime_events_total", "chain" => chain.name.clone())
            .increment(1);

        self.bus.publish(EventStored {
            chain_id: chain.id,
            event_id,
            block_number: record.block_number,
        });

        debug!(event = %kind, block = %record.block_number, "Realtime event stored and published");
        Ok(())
    }

    /// Drop the chain's subscription task (socket died or is being replaced).
    pub fn clear_chain(&self, chain_id: Uuid) {
        if let Some((_, handle)) = self.tasks.remove(&chain_id) {
            handle.abort();
            debug!(chain = %chain_id, "Cleared realtime subscription");
        }
    }

    /// Remove all subscriptions and forget cached setup.
    pub fn shutdown(&self) {
        for entry in &self.tasks {
            entry.value().abort();
        }
        self.tasks.clear();
        self.configs.clear();
        self.in_flight.clear();
        info!("Realtime listener shut down");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECONNECT INTEGRATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Adapter wiring the listener into the provider manager's lifecycle hooks.
pub struct ListenerHooks<S>(pub Arc<RealtimeListener<S>>);

impl<S> std::fmt::Debug for ListenerHooks<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ListenerHooks").finish()
    }
}

#[async_trait]
impl<S> ReconnectHooks for ListenerHooks<S>
where
    S: ChainStore + EventStore + Send + Sync + 'static,
{
    async fn on_ws_down(&self, chain_id: Uuid) {
        self.0.clear_chain(chain_id);
    }

    async fn on_ws_reconnected(&self, chain_id: Uuid) {
        let Some(chain) = self.0.configs.get(&chain_id).map(|entry| entry.value().clone()) else {
            debug!(chain = %chain_id, "No cached setup for reconnected chain");
            return;
        };

        if let Err(e) = Arc::clone(&self.0).setup(chain).await {
            error!(chain = %chain_id, error = %e, "Failed to re-install subscription");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebSocketSettings;
    use crate::store::MemoryStore;

    fn make_listener() -> Arc<RealtimeListener<MemoryStore>> {
        let store = Arc::new(MemoryStore::new());
        let ingest = Arc::new(EventIngest::new(Arc::clone(&store), 50));
        let providers = Arc::new(ProviderManager::new(WebSocketSettings {
            ping_interval_ms: 15_000,
            ping_timeout_ms: 10_000,
            backoff_base_ms: 5000,
            backoff_max_ms: 300_000,
            failover_threshold: 2,
        }));
        Arc::new(RealtimeListener::new(
            store,
            ingest,
            providers,
            NotifierBus::new(),
            EventKind::ALL.to_vec(),
        ))
    }

    #[test]
    fn in_flight_set_is_exclusive() {
        let listener = make_listener();
        let key: InFlightKey = (Uuid::new_v4(), 100, 0, EventKind::InsertBid);

        assert!(listener.in_flight.insert(key));
        assert!(!listener.in_flight.insert(key));

        listener.in_flight.remove(&key);
        assert!(listener.in_flight.insert(key));
    }

    #[test]
    fn clear_chain_without_task_is_noop() {
        let listener = make_listener();
        listener.clear_chain(Uuid::new_v4());
    }

    #[test]
    fn shutdown_clears_state() {
        let listener = make_listener();
        let key: InFlightKey = (Uuid::new_v4(), 1, 0, EventKind::DeleteBid);
        listener.in_flight.insert(key);

        listener.shutdown();
        assert_eq!(listener.in_flight.len(), 0);
        assert_eq!(listener.tasks.len(), 0);
    }
}
