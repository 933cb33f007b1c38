//! Stylus CacheManager Auction Indexer
//!
//! A Rust backend service that observes CacheManager contract events from
//! one or more EVM chains, persists a canonical ordered event log to
//! PostgreSQL, and derives per-bytecode and per-contract cache state
//! (current bid, decay-adjusted bid, total investment, cached status,
//! automation bids) together with periodic on-chain parameter snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          INDEXER CORE                                │
//! │  ┌────────────┐  ┌────────────┐  ┌─────────────┐  ┌──────────────┐  │
//! │  │ Historical │  │  Realtime  │  │   Event     │  │   Notifier   │  │
//! │  │    Sync    │─▶│  Listener  │─▶│   Ingest    │─▶│     Bus      │  │
//! │  └────────────┘  └────────────┘  └─────────────┘  └──────┬───────┘  │
//! │                                          │               │          │
//! │                                          ▼               ▼          │
//! │                                  ┌─────────────┐  ┌──────────────┐  │
//! │                                  │  Event Log  │─▶│   Event      │  │
//! │                                  │  (storage)  │  │   Processor  │  │
//! │                                  └─────────────┘  └──────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`] - Domain types (primitives, events, entities)
//! - [`error`] - Layered error types
//! - [`config`] - Configuration loading and validation
//! - [`abi`] - ABI bindings for the observed contracts
//! - [`providers`] - RPC endpoint lifecycle, liveness, failover
//! - [`indexer`] - Ingestion pipeline (backfill, realtime, resync, poller)
//! - [`processor`] - Ordered derivation of bytecode/contract state
//! - [`bus`] - In-process stored-event notifications
//! - [`ports`] / [`store`] - Persistence traits and adapters
//! - [`bootstrap`] - Chain-config reconciliation at startup
//! - [`scheduler`] / [`app`] - Periodic tasks and root wiring
//!
//! # Getting Started
//!
//! ```bash
//! # Set up environment
//! cp .env.example .env
//! # Edit .env and config/default.toml with your chains
//!
//! # Run migrations
//! cargo run -- migrate
//!
//! # Start the indexer
//! cargo run -- run
//! ```

#![doc(html_root_url = "https://docs.stylus-cache.io/indexer")]

pub mod abi;
pub mod app;
pub mod bootstrap;
pub mod bus;
pub mod config;
pub mod error;
pub mod indexer;
pub mod ports;
pub mod processor;
pub mod providers;
pub mod scheduler;
pub mod store;
pub mod types;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version string
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
        assert!(version().starts_with("0."));
    }
}
