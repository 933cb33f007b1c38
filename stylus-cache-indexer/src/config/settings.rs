//! Settings structs and loading logic.
//!
//! All settings have sensible defaults and can be overridden via
//! environment variables or configuration files. The chain list has no
//! default - every deployment declares its chains explicitly.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::types::events::EventKind;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Declared chains to index.
    #[serde(default)]
    pub chains: Vec<ChainSettings>,
    /// Database configuration.
    pub database: DatabaseSettings,
    /// Ingestion and sync configuration.
    pub sync: SyncSettings,
    /// WebSocket liveness and reconnection configuration.
    pub websocket: WebSocketSettings,
    /// On-chain state poller configuration.
    pub poller: PollerSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Files are loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (if exists)
    /// 3. Environment variables with `INDEXER_` prefix
    ///
    /// # Arguments
    /// * `environment` - Environment name (e.g., "development", "production")
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration is invalid or cannot be loaded.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("database.url", "postgres://localhost/stylus_cache")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout_ms", 5000)?
            .set_default("database.idle_timeout_ms", 600_000)?
            .set_default("sync.event_types", default_event_type_names())?
            .set_default("sync.events_filter_batch_size", 5000)?
            .set_default("sync.resync_blocks_back", 100)?
            .set_default("sync.resync_interval_secs", 3600)?
            .set_default("sync.storage_batch_size", 50)?
            .set_default("sync.processor_block_range", 50_000)?
            .set_default("sync.head_fetch_retries", 3)?
            .set_default("sync.head_fetch_retry_delay_ms", 2000)?
            .set_default("websocket.ping_interval_ms", 15_000)?
            .set_default("websocket.ping_timeout_ms", 10_000)?
            .set_default("websocket.backoff_base_ms", 5000)?
            .set_default("websocket.backoff_max_ms", 300_000)?
            .set_default("websocket.failover_threshold", 2)?
            .set_default("poller.interval_secs", 300)?
            .set_default("poller.contract_small_size", 8192)?
            .set_default("poller.contract_mid_size", 32_768)?
            .set_default("poller.contract_large_size", 131_072)?
            .set_default("poller.entries_retry_attempts", 2)?
            .set_default("poller.entries_retry_delay_ms", 1000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            // Load default configuration file
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Load environment-specific file
            .add_source(File::with_name(&format!("{config_dir}/{environment}")).required(false))
            // Override with environment variables (INDEXER_ prefix)
            .add_source(
                Environment::with_prefix("INDEXER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file path.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Validate settings and return any validation errors.
    ///
    /// # Errors
    /// Returns a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Database validation
        if self.database.url.is_empty() {
            errors.push("database.url cannot be empty".into());
        }
        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be non-zero".into());
        }
        if self.database.min_connections > self.database.max_connections {
            errors.push("database.min_connections cannot exceed max_connections".into());
        }

        // Sync validation
        if self.sync.events_filter_batch_size == 0 {
            errors.push("sync.events_filter_batch_size must be non-zero".into());
        }
        if self.sync.storage_batch_size == 0 {
            errors.push("sync.storage_batch_size must be non-zero".into());
        }
        for name in &self.sync.event_types {
            if EventKind::from_name(name).is_none() {
                errors.push(format!("sync.event_types contains unknown event: {name}"));
            }
        }

        // WebSocket validation
        if self.websocket.backoff_base_ms == 0 {
            errors.push("websocket.backoff_base_ms must be non-zero".into());
        }
        if self.websocket.backoff_max_ms < self.websocket.backoff_base_ms {
            errors.push("websocket.backoff_max_ms cannot be below backoff_base_ms".into());
        }

        // Chain validation
        for chain in &self.chains {
            if chain.name.is_empty() {
                errors.push("chain name cannot be empty".into());
            }
            if chain.chain_id == 0 {
                errors.push(format!("chain {} has zero chain_id", chain.name));
            }
            if chain.rpc_url.is_empty() {
                errors.push(format!("chain {} has empty rpc_url", chain.name));
            }
            if chain.rpc_wss_url.is_empty() {
                errors.push(format!("chain {} has empty rpc_wss_url", chain.name));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Resolve the configured event-type allow-list into kinds.
    ///
    /// Unknown names are dropped; `validate` reports them separately.
    #[must_use]
    pub fn event_kinds(&self) -> Vec<EventKind> {
        self.sync
            .event_types
            .iter()
            .filter_map(|name| EventKind::from_name(name))
            .collect()
    }
}

fn default_event_type_names() -> Vec<String> {
    EventKind::ALL.iter().map(|kind| kind.as_str().into()).collect()
}

/// Declared configuration for one chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSettings {
    /// Human-readable name.
    pub name: String,
    /// EVM chain id.
    pub chain_id: u64,
    /// Primary HTTP RPC endpoint.
    pub rpc_url: String,
    /// Dedicated endpoint for historical log queries.
    #[serde(default)]
    pub fast_sync_rpc_url: Option<String>,
    /// WebSocket endpoint for subscriptions.
    pub rpc_wss_url: String,
    /// Backup WebSocket endpoint.
    #[serde(default)]
    pub rpc_wss_url_backup: Option<String>,
    /// CacheManager contract address.
    pub cache_manager_address: String,
    /// ArbWasmCache precompile address.
    pub arb_wasm_cache_address: String,
    /// ArbWasm precompile address.
    pub arb_wasm_address: String,
    /// CacheManagerAutomation contract address, if deployed.
    #[serde(default)]
    pub cache_manager_automation_address: Option<String>,
    /// First block to index from when no progress exists.
    #[serde(default)]
    pub origin_block: Option<u64>,
    /// Whether the chain participates in indexing.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum connections in the pool.
    pub max_connections: u32,
    /// Minimum connections to maintain.
    pub min_connections: u32,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Idle connection timeout in milliseconds.
    pub idle_timeout_ms: u64,
}

impl DatabaseSettings {
    /// Get the connection timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get the idle timeout as a `Duration`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Ingestion and sync configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Allow-list of event names to subscribe to and index.
    pub event_types: Vec<String>,
    /// Block-range batch for historical log queries.
    pub events_filter_batch_size: u64,
    /// Lookback window for the periodic resync.
    pub resync_blocks_back: u64,
    /// Seconds between resync runs.
    pub resync_interval_secs: u64,
    /// Record count per storage isolation batch.
    pub storage_batch_size: usize,
    /// Block-range window the processor drains per iteration.
    pub processor_block_range: u64,
    /// Attempts when fetching the chain head.
    pub head_fetch_retries: u32,
    /// Delay between head-fetch attempts in milliseconds.
    pub head_fetch_retry_delay_ms: u64,
}

impl SyncSettings {
    /// Get the resync interval as a `Duration`.
    #[must_use]
    pub const fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Get the head-fetch retry delay as a `Duration`.
    #[must_use]
    pub const fn head_fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.head_fetch_retry_delay_ms)
    }
}

/// WebSocket liveness and reconnection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Milliseconds between liveness probes.
    pub ping_interval_ms: u64,
    /// Hard timeout for one probe in milliseconds.
    pub ping_timeout_ms: u64,
    /// Base reconnection delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Reconnection delay cap in milliseconds.
    pub backoff_max_ms: u64,
    /// Consecutive probe failures before switching to the backup endpoint.
    pub failover_threshold: u32,
}

impl WebSocketSettings {
    /// Get the probe interval as a `Duration`.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Get the probe timeout as a `Duration`.
    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Get the base backoff as a `Duration`.
    #[must_use]
    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Get the backoff cap as a `Duration`.
    #[must_use]
    pub const fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// On-chain state poller configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollerSettings {
    /// Seconds between snapshots.
    pub interval_secs: u64,
    /// Byte size used for the small min-bid probe.
    pub contract_small_size: u64,
    /// Byte size used for the mid min-bid probe.
    pub contract_mid_size: u64,
    /// Byte size used for the large min-bid probe.
    pub contract_large_size: u64,
    /// Attempts for the `getEntries` call.
    pub entries_retry_attempts: u32,
    /// Delay between `getEntries` attempts in milliseconds.
    pub entries_retry_delay_ms: u64,
}

impl PollerSettings {
    /// Get the polling interval as a `Duration`.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Get the `getEntries` retry delay as a `Duration`.
    #[must_use]
    pub const fn entries_retry_delay(&self) -> Duration {
        Duration::from_millis(self.entries_retry_delay_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log format (json, pretty).
    pub format: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
