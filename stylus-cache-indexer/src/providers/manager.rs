//! Provider lifecycle management for every registered chain.
//!
//! For each chain the manager owns:
//! - one HTTP provider for general RPC
//! - one fast-sync HTTP provider for historical log queries (falls back to
//!   the primary when no dedicated endpoint is configured)
//! - one WebSocket provider for subscriptions
//!
//! Typed contract instances are memoized per chain × contract kind.
//!
//! # WebSocket liveness
//!
//! A periodic probe fetches the latest block number with a hard timeout.
//! On failure the socket is destroyed, listener state is cleared through
//! the registered hooks, and a reconnect task is scheduled with
//! exponential backoff. Repeated failures switch to the backup endpoint
//! when one is configured. The policy itself lives in
//! [`crate::providers::backoff`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::abi::arb_wasm_cache::IArbWasmCache;
use crate::abi::cache_manager::ICacheManager;
use crate::config::WebSocketSettings;
use crate::error::{DomainError, InfraError, Result};
use crate::providers::backoff::{FailureAction, WsHealth, reconnect_delay};
use crate::types::entities::Chain;
use crate::types::primitives::BytecodeHash;

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Timeout for establishing a WebSocket connection.
const WS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Memoized CacheManager instance bound to a provider.
pub type CacheManagerContract = ICacheManager::ICacheManagerInstance<DynProvider>;

/// Memoized ArbWasmCache instance bound to a provider.
pub type WasmCacheContract = IArbWasmCache::IArbWasmCacheInstance<DynProvider>;

/// Contract kinds the manager memoizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    /// CacheManager on the primary HTTP provider.
    CacheManager,
    /// CacheManager on the fast-sync provider (historical queries).
    CacheManagerFastSync,
    /// ArbWasmCache precompile on the primary HTTP provider.
    ArbWasmCache,
}

enum ContractHandle {
    CacheManager(CacheManagerContract),
    WasmCache(WasmCacheContract),
}

/// Callbacks invoked around WebSocket lifecycle transitions.
///
/// The real-time listener registers itself here: `on_ws_down` clears its
/// per-chain subscription state, `on_ws_reconnected` re-installs the
/// subscriptions on the fresh socket.
#[async_trait]
pub trait ReconnectHooks: Send + Sync {
    /// The chain's WebSocket was destroyed after a probe failure.
    async fn on_ws_down(&self, chain_id: Uuid);

    /// A fresh WebSocket provider is available for the chain.
    async fn on_ws_reconnected(&self, chain_id: Uuid);
}

struct ChainHandles {
    chain: Chain,
    http: DynProvider,
    fast_sync: DynProvider,
    ws: RwLock<Option<DynProvider>>,
    health: Mutex<WsHealth>,
    reconnecting: AtomicBool,
}

impl std::fmt::Debug for ChainHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainHandles")
            .field("chain", &self.chain.name)
            .field("ws_connected", &self.ws.read().is_some())
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROVIDER MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Owns every RPC endpoint and contract handle in the process.
///
/// Constructed once by the root application and shared by reference with
/// every component that talks to a chain.
pub struct ProviderManager {
    settings: WebSocketSettings,
    chains: DashMap<Uuid, Arc<ChainHandles>>,
    contracts: DashMap<(Uuid, ContractKind), ContractHandle>,
    hooks: RwLock<Vec<Arc<dyn ReconnectHooks>>>,
    watchdogs: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderManager")
            .field("chains", &self.chains.len())
            .field("contracts", &self.contracts.len())
            .finish_non_exhaustive()
    }
}

impl ProviderManager {
    /// Create a manager with the given WebSocket policy.
    #[must_use]
    pub fn new(settings: WebSocketSettings) -> Self {
        Self {
            settings,
            chains: DashMap::new(),
            contracts: DashMap::new(),
            hooks: RwLock::new(Vec::new()),
            watchdogs: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a hook for WebSocket lifecycle transitions.
    pub fn add_hooks(&self, hooks: Arc<dyn ReconnectHooks>) {
        self.hooks.write().push(hooks);
    }

    /// Register a chain: build its HTTP providers and attempt the initial
    /// WebSocket connection.
    ///
    /// A failed WebSocket connection is not fatal - the watchdog schedules
    /// reconnects - but invalid HTTP endpoints are.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP endpoint URL cannot be parsed.
    #[instrument(skip(self, chain), fields(chain = %chain.name))]
    pub async fn register_chain(&self, chain: Chain) -> Result<()> {
        let http = build_http_provider(&chain.rpc_url)?;
        let fast_sync = match &chain.fast_sync_rpc_url {
            Some(url) => build_http_provider(url)?,
            None => http.clone(),
        };

        let ws = match connect_ws(&chain.rpc_wss_url).await {
            Ok(provider) => {
                info!(url = %chain.rpc_wss_url, "WebSocket connected");
                Some(provider)
            }
            Err(e) => {
                warn!(url = %chain.rpc_wss_url, error = %e, "Initial WebSocket connection failed");
                None
            }
        };
        let ws_missing = ws.is_none();

        let handles = Arc::new(ChainHandles {
            chain,
            http,
            fast_sync,
            ws: RwLock::new(ws),
            health: Mutex::new(WsHealth::new()),
            reconnecting: AtomicBool::new(false),
        });
        let chain_id = handles.chain.id;
        self.chains.insert(chain_id, handles);

        if ws_missing {
            self.ensure_reconnect(chain_id);
        }

        Ok(())
    }

    fn handles(&self, chain_id: Uuid) -> Result<Arc<ChainHandles>> {
        self.chains
            .get(&chain_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DomainError::ChainNotFound(chain_id.to_string()).into())
    }

    /// The registered chain record.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ChainNotFound`] for unregistered ids.
    pub fn chain(&self, chain_id: Uuid) -> Result<Chain> {
        Ok(self.handles(chain_id)?.chain.clone())
    }

    /// Primary HTTP provider for a chain.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ChainNotFound`] for unregistered ids.
    pub fn http_provider(&self, chain_id: Uuid) -> Result<DynProvider> {
        Ok(self.handles(chain_id)?.http.clone())
    }

    /// Fast-sync HTTP provider for a chain (historical log queries only).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ChainNotFound`] for unregistered ids.
    pub fn fast_sync_provider(&self, chain_id: Uuid) -> Result<DynProvider> {
        Ok(self.handles(chain_id)?.fast_sync.clone())
    }

    /// Current WebSocket provider, if connected.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ChainNotFound`] for unregistered ids.
    pub fn ws_provider(&self, chain_id: Uuid) -> Result<Option<DynProvider>> {
        Ok(self.handles(chain_id)?.ws.read().clone())
    }

    /// Memoized CacheManager instance on the primary HTTP provider.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ChainNotFound`] for unregistered ids.
    pub fn cache_manager(&self, chain_id: Uuid) -> Result<CacheManagerContract> {
        let key = (chain_id, ContractKind::CacheManager);
        if let Some(handle) = self.contracts.get(&key)
            && let ContractHandle::CacheManager(instance) = handle.value()
        {
            return Ok(instance.clone());
        }

        let handles = self.handles(chain_id)?;
        let instance = ICacheManager::new(
            Address::from(handles.chain.cache_manager_address),
            handles.http.clone(),
        );
        self.contracts
            .insert(key, ContractHandle::CacheManager(instance.clone()));
        Ok(instance)
    }

    /// Memoized CacheManager instance on the fast-sync provider.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ChainNotFound`] for unregistered ids.
    pub fn cache_manager_fast_sync(&self, chain_id: Uuid) -> Result<CacheManagerContract> {
        let key = (chain_id, ContractKind::CacheManagerFastSync);
        if let Some(handle) = self.contracts.get(&key)
            && let ContractHandle::CacheManager(instance) = handle.value()
        {
            return Ok(instance.clone());
        }

        let handles = self.handles(chain_id)?;
        let instance = ICacheManager::new(
            Address::from(handles.chain.cache_manager_address),
            handles.fast_sync.clone(),
        );
        self.contracts
            .insert(key, ContractHandle::CacheManager(instance.clone()));
        Ok(instance)
    }

    /// Memoized ArbWasmCache instance on the primary HTTP provider.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ChainNotFound`] for unregistered ids.
    pub fn wasm_cache(&self, chain_id: Uuid) -> Result<WasmCacheContract> {
        let key = (chain_id, ContractKind::ArbWasmCache);
        if let Some(handle) = self.contracts.get(&key)
            && let ContractHandle::WasmCache(instance) = handle.value()
        {
            return Ok(instance.clone());
        }

        let handles = self.handles(chain_id)?;
        let instance = IArbWasmCache::new(
            Address::from(handles.chain.arb_wasm_cache_address),
            handles.http.clone(),
        );
        self.contracts
            .insert(key, ContractHandle::WasmCache(instance.clone()));
        Ok(instance)
    }

    /// Ask ArbOS whether a codehash is currently cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain is unregistered or the call fails.
    pub async fn codehash_is_cached(
        &self,
        chain_id: Uuid,
        codehash: BytecodeHash,
    ) -> Result<bool> {
        let cache = self.wasm_cache(chain_id)?;
        let cached = cache
            .codehashIsCached(codehash.into())
            .call()
            .await
            .map_err(|e| InfraError::Rpc(Box::new(e)))?;
        Ok(cached)
    }

    /// Spawn the liveness watchdog for every registered chain.
    pub fn start_watchdogs(self: &Arc<Self>) {
        let chain_ids: Vec<Uuid> = self.chains.iter().map(|entry| *entry.key()).collect();
        let mut watchdogs = self.watchdogs.lock();
        for chain_id in chain_ids {
            let manager = Arc::clone(self);
            watchdogs.push(tokio::spawn(async move {
                manager.watchdog_loop(chain_id).await;
            }));
        }
    }

    /// Probe loop for one chain; runs until shutdown.
    async fn watchdog_loop(self: Arc<Self>, chain_id: Uuid) {
        let mut ticker = tokio::time::interval(self.settings.ping_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a freshly-connected
        // socket is not probed before it settles.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    debug!(chain = %chain_id, "Watchdog stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.probe(chain_id).await;
                }
            }
        }
    }

    /// One liveness probe: fetch the block number over the socket, racing a
    /// hard timeout. The loser of the race is dropped; both paths leave the
    /// socket in a known state.
    async fn probe(&self, chain_id: Uuid) {
        let Ok(handles) = self.handles(chain_id) else {
            return;
        };

        let ws = handles.ws.read().clone();
        let Some(provider) = ws else {
            // No socket at all counts as a failure and keeps reconnection alive.
            self.handle_ws_failure(chain_id, "socket absent").await;
            return;
        };

        match timeout(self.settings.ping_timeout(), provider.get_block_number()).await {
            Ok(Ok(block)) => {
                debug!(chain = %chain_id, block, "WebSocket probe ok");
                handles.health.lock().record_probe_success();
            }
            Ok(Err(e)) => {
                self.handle_ws_failure(chain_id, &format!("probe error: {e}")).await;
            }
            Err(_) => {
                self.handle_ws_failure(chain_id, "probe timed out").await;
            }
        }
    }

    /// Destroy the socket, clear listener state, schedule reconnection.
    async fn handle_ws_failure(&self, chain_id: Uuid, reason: &str) {
        let Ok(handles) = self.handles(chain_id) else {
            return;
        };

        let action = {
            let mut health = handles.health.lock();
            let has_backup = handles.chain.rpc_wss_url_backup.is_some();
            health.record_failure(has_backup, self.settings.failover_threshold)
        };

        warn!(
            chain = %handles.chain.name,
            reason,
            failover = matches!(action, FailureAction::SwitchToBackup),
            "WebSocket failure"
        );
        metrics::counter!("indexer_ws_failures_total", "chain" => handles.chain.name.clone())
            .increment(1);

        // Destroy the current socket before anything resubscribes.
        handles.ws.write().take();

        let hooks: Vec<Arc<dyn ReconnectHooks>> = self.hooks.read().clone();
        for hook in hooks {
            hook.on_ws_down(chain_id).await;
        }

        self.ensure_reconnect(chain_id);
    }

    /// Schedule a reconnect task unless one is already running.
    fn ensure_reconnect(&self, chain_id: Uuid) {
        let Ok(handles) = self.handles(chain_id) else {
            return;
        };
        if handles.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        let settings = self.settings.clone();
        let shutdown = self.shutdown.clone();
        let hooks: Vec<Arc<dyn ReconnectHooks>> = self.hooks.read().clone();
        tokio::spawn(async move {
            loop {
                let attempt = handles.health.lock().next_attempt();
                let delay = reconnect_delay(settings.backoff_base(), settings.backoff_max(), attempt);

                debug!(
                    chain = %handles.chain.name,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "Scheduling WebSocket reconnect"
                );

                tokio::select! {
                    () = shutdown.cancelled() => {
                        handles.reconnecting.store(false, Ordering::SeqCst);
                        return;
                    }
                    () = tokio::time::sleep(delay) => {}
                }

                let url = if handles.health.lock().using_backup() {
                    handles
                        .chain
                        .rpc_wss_url_backup
                        .as_deref()
                        .unwrap_or(&handles.chain.rpc_wss_url)
                } else {
                    &handles.chain.rpc_wss_url
                };

                match connect_ws(url).await {
                    Ok(provider) => {
                        info!(chain = %handles.chain.name, url, "WebSocket reconnected");
                        metrics::counter!(
                            "indexer_ws_reconnects_total",
                            "chain" => handles.chain.name.clone()
                        )
                        .increment(1);
                        *handles.ws.write() = Some(provider);
                        handles.health.lock().record_reconnect_success();
                        handles.reconnecting.store(false, Ordering::SeqCst);

                        for hook in hooks {
                            hook.on_ws_reconnected(handles.chain.id).await;
                        }
                        return;
                    }
                    Err(e) => {
                        warn!(chain = %handles.chain.name, url, error = %e, "Reconnect failed");
                    }
                }
            }
        });
    }

    /// Tear down every socket, timer and memoized contract.
    ///
    /// Called once at shutdown, before the storage layer closes.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let watchdogs = std::mem::take(&mut *self.watchdogs.lock());
        for handle in watchdogs {
            handle.abort();
        }

        for entry in &self.chains {
            entry.value().ws.write().take();
        }
        self.contracts.clear();
        self.hooks.write().clear();

        info!("Provider manager shut down");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONNECTION HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn build_http_provider(url: &str) -> Result<DynProvider> {
    let parsed: url::Url = url
        .parse()
        .map_err(|e| crate::error::AppError::Config(format!("invalid RPC URL {url}: {e}")))?;
    Ok(ProviderBuilder::new().connect_http(parsed).erased())
}

async fn connect_ws(url: &str) -> Result<DynProvider> {
    let ws = WsConnect::new(url);
    let provider = timeout(WS_CONNECT_TIMEOUT, ProviderBuilder::new().connect_ws(ws))
        .await
        .map_err(|_| InfraError::Timeout("WebSocket connection timed out".into()))?
        .map_err(|e| InfraError::Rpc(Box::new(e)))?;
    Ok(provider.erased())
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
