//! RPC provider lifecycle: endpoints, contract handles, liveness, failover.

pub mod backoff;
mod manager;

pub use manager::{
    CacheManagerContract, ContractKind, ProviderManager, ReconnectHooks, WasmCacheContract,
};
