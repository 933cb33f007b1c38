//! Root application: construction, per-chain task groups, teardown.
//!
//! Construction order: database pool → stores → chain registry → provider
//! manager → pipeline components → per-chain tasks → scheduler. Teardown
//! runs in reverse. Cancellation fans out through one token; the processor
//! finishes its in-flight event before exiting, and the provider manager
//! destroys its sockets before the pool closes.

use std::sync::Arc;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bootstrap;
use crate::bus::NotifierBus;
use crate::config::{DatabaseSettings, Settings};
use crate::error::{InfraError, Result};
use crate::indexer::{
    EventIngest, HistoricalSync, ListenerHooks, PeriodicResync, RealtimeListener, StatePoller,
};
use crate::ports::ChainStore;
use crate::processor::EventProcessor;
use crate::providers::ProviderManager;
use crate::scheduler::Scheduler;
use crate::store::PostgresStore;

/// Open the PostgreSQL connection pool.
///
/// # Errors
///
/// Returns an error if the pool cannot connect.
pub async fn connect_pool(settings: &DatabaseSettings) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.connect_timeout())
        .idle_timeout(settings.idle_timeout())
        .connect(&settings.url)
        .await
        .map_err(|e| InfraError::Database(e).into())
}

/// The assembled indexer service.
pub struct App {
    pool: PgPool,
    providers: Arc<ProviderManager>,
    listener: Arc<RealtimeListener<PostgresStore>>,
    scheduler: Scheduler,
    chain_tasks: Vec<JoinHandle<()>>,
    startup_tasks: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("chain_tasks", &self.chain_tasks.len())
            .finish_non_exhaustive()
    }
}

impl App {
    /// Build and start the whole pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the database, migrations, or chain registration
    /// fail. Chains whose providers cannot connect are skipped with a log
    /// line rather than failing startup.
    pub async fn start(settings: Settings) -> Result<Self> {
        let shutdown = CancellationToken::new();

        let pool = connect_pool(&settings.database).await?;
        let store = Arc::new(PostgresStore::new(pool.clone()));
        store.run_migrations().await?;

        bootstrap::register_chains(store.as_ref(), &settings.chains).await?;
        let chains = store.list_enabled_chains().await?;
        info!(chains = chains.len(), "Chain registry reconciled");

        let providers = Arc::new(ProviderManager::new(settings.websocket.clone()));
        let mut active_chains = Vec::with_capacity(chains.len());
        for chain in chains {
            match providers.register_chain(chain.clone()).await {
                Ok(()) => active_chains.push(chain),
                Err(e) => {
                    error!(chain = %chain.name, error = %e, "Skipping chain, providers unavailable");
                }
            }
        }

        let bus = NotifierBus::new();
        let event_kinds = settings.event_kinds();

        let ingest = Arc::new(EventIngest::new(
            Arc::clone(&store),
            settings.sync.storage_batch_size,
        ));
        let historical = Arc::new(HistoricalSync::new(
            Arc::clone(&store),
            Arc::clone(&ingest),
            Arc::clone(&providers),
            settings.sync.clone(),
            event_kinds.clone(),
        ));
        let resync = Arc::new(PeriodicResync::new(
            Arc::clone(&store),
            Arc::clone(&historical),
            Arc::clone(&providers),
            settings.sync.clone(),
        ));
        let poller = Arc::new(StatePoller::new(
            Arc::clone(&store),
            Arc::clone(&providers),
            settings.poller.clone(),
        ));
        let processor = Arc::new(EventProcessor::new(
            Arc::clone(&store),
            bus.clone(),
            settings.sync.processor_block_range,
        ));

        let listener = Arc::new(RealtimeListener::new(
            Arc::clone(&store),
            Arc::clone(&ingest),
            Arc::clone(&providers),
            bus.clone(),
            event_kinds,
        ));
        providers.add_hooks(Arc::new(ListenerHooks(Arc::clone(&listener))));
        providers.start_watchdogs();

        // Per-chain task group: processor, live subscription, initial
        // snapshot + backfill. Everything across chains runs in parallel.
        let mut chain_tasks = Vec::new();
        let mut startup_tasks = Vec::new();
        for chain in &active_chains {
            let chain_processor = Arc::clone(&processor);
            let processor_chain_id = chain.id;
            let processor_token = shutdown.child_token();
            chain_tasks.push(tokio::spawn(async move {
                chain_processor.run(processor_chain_id, processor_token).await;
            }));

            if let Err(e) = Arc::clone(&listener).setup(chain.clone()).await {
                warn!(chain = %chain.name, error = %e, "Realtime subscription failed at startup");
            }

            let startup_poller = Arc::clone(&poller);
            let startup_sync = Arc::clone(&historical);
            let startup_chain = chain.clone();
            startup_tasks.push(tokio::spawn(async move {
                if let Err(e) = startup_poller.snapshot_chain(&startup_chain).await {
                    warn!(chain = %startup_chain.name, error = %e, "Initial state snapshot failed");
                }
                match startup_sync.sync_chain(&startup_chain).await {
                    Ok(outcome) => info!(
                        chain = %startup_chain.name,
                        stored = outcome.success_count,
                        "Initial backfill finished"
                    ),
                    Err(e) => {
                        error!(chain = %startup_chain.name, error = %e, "Initial backfill failed");
                    }
                }
            }));
        }

        // Periodic work: hourly resync, five-minute state snapshots.
        let mut scheduler = Scheduler::new(shutdown.clone());

        let resync_store = Arc::clone(&store);
        scheduler.spawn_interval("resync", settings.sync.resync_interval(), move || {
            let resync = Arc::clone(&resync);
            let store = Arc::clone(&resync_store);
            async move {
                let chains = match store.list_enabled_chains().await {
                    Ok(chains) => chains,
                    Err(e) => {
                        error!(error = %e, "Resync could not list chains");
                        return;
                    }
                };
                for chain in chains {
                    if let Err(e) = resync.run_once(&chain).await {
                        error!(chain = %chain.name, error = %e, "Resync failed");
                    }
                }
            }
        });

        let poller_store = Arc::clone(&store);
        scheduler.spawn_interval("state-poller", settings.poller.interval(), move || {
            let poller = Arc::clone(&poller);
            let store = Arc::clone(&poller_store);
            async move {
                let chains = match store.list_enabled_chains().await {
                    Ok(chains) => chains,
                    Err(e) => {
                        error!(error = %e, "Poller could not list chains");
                        return;
                    }
                };
                for chain in chains {
                    if let Err(e) = poller.snapshot_chain(&chain).await {
                        error!(chain = %chain.name, error = %e, "State snapshot failed");
                    }
                }
            }
        });

        info!(chains = active_chains.len(), "Indexer started");

        Ok(Self {
            pool,
            providers,
            listener,
            scheduler,
            chain_tasks,
            startup_tasks,
            shutdown,
        })
    }

    /// Block until ctrl-c, then tear down.
    ///
    /// # Errors
    ///
    /// Returns an error if signal installation fails.
    pub async fn run_until_shutdown(self) -> Result<()> {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| crate::error::AppError::Initialization(format!("signal handler: {e}")))?;
        info!("Shutdown signal received");
        self.stop().await;
        Ok(())
    }

    /// Tear down in reverse construction order.
    pub async fn stop(mut self) {
        self.shutdown.cancel();

        self.scheduler.stop().await;

        for task in self.startup_tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        for task in self.chain_tasks.drain(..) {
            // Processors observe the token and finish their in-flight event.
            let _ = task.await;
        }

        self.listener.shutdown();
        self.providers.shutdown().await;
        self.pool.close().await;

        info!("Indexer stopped");
    }
}
