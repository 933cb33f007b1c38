//! ABI bindings for the on-chain contracts the indexer observes.
//!
//! Each module contains `sol!`-generated types for one contract:
//!
//! - [`cache_manager`] - the CacheManager bid auction (events + parameter getters)
//! - [`cache_manager_automation`] - the opt-in bid automation contract
//! - [`arb_wasm_cache`] - ArbOS precompile exposing cache membership checks
//!
//! Event data is consumed positionally: the ingestion boundary serializes
//! decoded arguments in declaration order, and the processor's shape guards
//! read them back by index.

pub mod arb_wasm_cache;
pub mod cache_manager;
pub mod cache_manager_automation;
