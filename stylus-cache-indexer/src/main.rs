//! Stylus cache indexer CLI.
//!
//! Entry point for the indexer binary. Provides subcommands for:
//! - `run` - Start the indexer
//! - `migrate` - Run database migrations
//! - `backfill` - Re-ingest an explicit historical block range
//! - `check-cached` - Ask ArbOS whether a codehash is cached

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stylus_cache_indexer::app::{App, connect_pool};
use stylus_cache_indexer::bootstrap;
use stylus_cache_indexer::config::{LoggingSettings, Settings};
use stylus_cache_indexer::indexer::{EventIngest, HistoricalSync};
use stylus_cache_indexer::ports::ChainStore;
use stylus_cache_indexer::providers::ProviderManager;
use stylus_cache_indexer::store::PostgresStore;
use stylus_cache_indexer::types::primitives::{BlockNumber, BytecodeHash};

/// Stylus CacheManager auction indexer
#[derive(Parser, Debug)]
#[command(name = "stylus-cache-indexer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Environment name (selects config/{environment}.toml)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the indexer
    Run,

    /// Run database migrations
    Migrate,

    /// Re-ingest a historical block range for one chain
    Backfill {
        /// EVM chain id of the target chain
        #[arg(long)]
        chain_id: u64,

        /// Starting block number
        #[arg(long)]
        from: u64,

        /// Ending block number
        #[arg(long)]
        to: u64,
    },

    /// Ask ArbOS whether a codehash is currently cached
    CheckCached {
        /// EVM chain id of the target chain
        #[arg(long)]
        chain_id: u64,

        /// 32-byte codehash (0x-prefixed hex)
        #[arg(long)]
        codehash: String,
    },

    /// Show version information
    Version,
}

fn init_tracing(logging: &LoggingSettings, verbose: bool) {
    let default_level = if verbose { "debug" } else { &logging.level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_owned()));

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::load(&cli.environment)
        .map_err(|e| eyre::eyre!("failed to load configuration: {e}"))?;
    init_tracing(&settings.logging, cli.verbose);

    if let Err(errors) = settings.validate() {
        for error in &errors {
            eprintln!("config error: {error}");
        }
        eyre::bail!("invalid configuration ({} errors)", errors.len());
    }

    info!(
        version = stylus_cache_indexer::VERSION,
        environment = %cli.environment,
        "Starting Stylus cache indexer"
    );

    match cli.command {
        Commands::Run => {
            let app = App::start(settings).await?;
            app.run_until_shutdown().await?;
        }

        Commands::Migrate => {
            let pool = connect_pool(&settings.database).await?;
            let store = PostgresStore::new(pool);
            store.run_migrations().await?;
            info!("Migrations applied");
        }

        Commands::Backfill { chain_id, from, to } => {
            if from > to {
                eyre::bail!("--from must not exceed --to");
            }

            let pool = connect_pool(&settings.database).await?;
            let store = Arc::new(PostgresStore::new(pool));
            bootstrap::register_chains(store.as_ref(), &settings.chains).await?;

            let chain = store
                .list_enabled_chains()
                .await?
                .into_iter()
                .find(|chain| chain.chain_id == chain_id)
                .ok_or_else(|| eyre::eyre!("no enabled chain with chain_id {chain_id}"))?;

            let providers = Arc::new(ProviderManager::new(settings.websocket.clone()));
            providers.register_chain(chain.clone()).await?;

            let ingest = Arc::new(EventIngest::new(
                Arc::clone(&store),
                settings.sync.storage_batch_size,
            ));
            let sync = HistoricalSync::new(
                Arc::clone(&store),
                ingest,
                Arc::clone(&providers),
                settings.sync.clone(),
                settings.event_kinds(),
            );

            info!(chain = %chain.name, from, to, "Running backfill");
            let outcome = sync
                .sync_range(
                    &chain,
                    BlockNumber::new(from),
                    BlockNumber::new(to),
                    false,
                )
                .await?;
            providers.shutdown().await;

            println!(
                "backfill complete: {} stored, {} errors, {} total",
                outcome.success_count, outcome.error_count, outcome.total_events
            );
        }

        Commands::CheckCached { chain_id, codehash } => {
            let codehash = BytecodeHash::from_hex(&codehash)
                .map_err(|e| eyre::eyre!("invalid codehash: {e}"))?;

            let pool = connect_pool(&settings.database).await?;
            let store = Arc::new(PostgresStore::new(pool));
            let chain = store
                .list_enabled_chains()
                .await?
                .into_iter()
                .find(|chain| chain.chain_id == chain_id)
                .ok_or_else(|| eyre::eyre!("no enabled chain with chain_id {chain_id}"))?;

            let providers = Arc::new(ProviderManager::new(settings.websocket.clone()));
            providers.register_chain(chain.clone()).await?;

            let cached = providers.codehash_is_cached(chain.id, codehash).await?;
            providers.shutdown().await;

            println!("{codehash}: {}", if cached { "cached" } else { "not cached" });
        }

        Commands::Version => {
            println!("stylus-cache-indexer {}", stylus_cache_indexer::VERSION);
        }
    }

    Ok(())
}
