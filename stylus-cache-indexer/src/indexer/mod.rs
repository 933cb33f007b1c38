//! Core ingestion pipeline.
//!
//! - [`event_ingest`] - normalization and idempotent storage of raw logs
//! - [`historical_sync`] - bounded-range back-fill from the ingestion cursor
//! - [`realtime_listener`] - WebSocket subscriptions with dedup and publish
//! - [`resync`] - periodic lookback healing of missed events
//! - [`state_poller`] - periodic on-chain parameter snapshots

pub mod event_ingest;
pub mod historical_sync;
pub mod realtime_listener;
pub mod resync;
pub mod state_poller;

pub use event_ingest::EventIngest;
pub use historical_sync::HistoricalSync;
pub use realtime_listener::{ListenerHooks, RealtimeListener};
pub use resync::PeriodicResync;
pub use state_poller::StatePoller;
