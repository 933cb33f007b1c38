//! Event-kind taxonomy and decoded event payloads.
//!
//! Raw logs enter the system once at the ingestion boundary, where they are
//! serialized into an ordered `event_data` array. The processor later decodes
//! those arrays back into the strongly-typed payloads in this module via
//! shape guards, so handlers never touch loosely-typed data.

use std::fmt;

use alloy::primitives::B256;
use alloy::sol_types::SolEvent;
use serde::{Deserialize, Serialize};

use crate::abi::{cache_manager, cache_manager_automation};
use crate::types::primitives::{BytecodeHash, EthAddress, Wei};

// ═══════════════════════════════════════════════════════════════════════════════
// CONTRACT NAME
// ═══════════════════════════════════════════════════════════════════════════════

/// Which contract emitted an event, inferred from the emitting address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractName {
    /// The CacheManager auction contract.
    CacheManager,
    /// The CacheManagerAutomation opt-in contract.
    CacheManagerAutomation,
    /// The emitting address matched no configured contract.
    ///
    /// Events from unknown addresses are still persisted; the processor
    /// ignores them.
    Unknown,
}

impl ContractName {
    /// Canonical string form used in persistence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CacheManager => "CacheManager",
            Self::CacheManagerAutomation => "CacheManagerAutomation",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse from the persisted string form.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "CacheManager" => Self::CacheManager,
            "CacheManagerAutomation" => Self::CacheManagerAutomation,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT KIND
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile-time enumeration of every event the indexer understands.
///
/// Dispatch in the processor is keyed by this enum; event names outside it
/// are explicit [`EventKind::from_name`] misses, never silent assumptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Bid placed, entry cached.
    InsertBid,
    /// Entry evicted.
    DeleteBid,
    /// Bidding paused.
    Pause,
    /// Bidding resumed.
    Unpause,
    /// Cache capacity changed.
    SetCacheSize,
    /// Decay rate changed.
    SetDecayRate,
    /// Contract initialized.
    Initialized,
    /// Contract enrolled in automation.
    ContractAdded,
    /// Automation ceiling updated.
    ContractUpdated,
}

impl EventKind {
    /// Every kind, in declaration order. Drives historical-sync filters and
    /// the default subscription allow-list.
    pub const ALL: [Self; 9] = [
        Self::InsertBid,
        Self::DeleteBid,
        Self::Pause,
        Self::Unpause,
        Self::SetCacheSize,
        Self::SetDecayRate,
        Self::Initialized,
        Self::ContractAdded,
        Self::ContractUpdated,
    ];

    /// Canonical event name as emitted by the contract ABI.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InsertBid => "InsertBid",
            Self::DeleteBid => "DeleteBid",
            Self::Pause => "Pause",
            Self::Unpause => "Unpause",
            Self::SetCacheSize => "SetCacheSize",
            Self::SetDecayRate => "SetDecayRate",
            Self::Initialized => "Initialized",
            Self::ContractAdded => "ContractAdded",
            Self::ContractUpdated => "ContractUpdated",
        }
    }

    /// Parse from an event name; `None` for names outside the table.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "InsertBid" => Some(Self::InsertBid),
            "DeleteBid" => Some(Self::DeleteBid),
            "Pause" => Some(Self::Pause),
            "Unpause" => Some(Self::Unpause),
            "SetCacheSize" => Some(Self::SetCacheSize),
            "SetDecayRate" => Some(Self::SetDecayRate),
            "Initialized" => Some(Self::Initialized),
            "ContractAdded" => Some(Self::ContractAdded),
            "ContractUpdated" => Some(Self::ContractUpdated),
            _ => None,
        }
    }

    /// Resolve from a log's topic0.
    #[must_use]
    pub fn from_signature_hash(topic0: &B256) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.signature_hash() == *topic0)
    }

    /// keccak256 of the event signature (topic0).
    #[must_use]
    pub fn signature_hash(&self) -> B256 {
        match self {
            Self::InsertBid => cache_manager::InsertBid::SIGNATURE_HASH,
            Self::DeleteBid => cache_manager::DeleteBid::SIGNATURE_HASH,
            Self::Pause => cache_manager::Pause::SIGNATURE_HASH,
            Self::Unpause => cache_manager::Unpause::SIGNATURE_HASH,
            Self::SetCacheSize => cache_manager::SetCacheSize::SIGNATURE_HASH,
            Self::SetDecayRate => cache_manager::SetDecayRate::SIGNATURE_HASH,
            Self::Initialized => cache_manager::Initialized::SIGNATURE_HASH,
            Self::ContractAdded => cache_manager_automation::ContractAdded::SIGNATURE_HASH,
            Self::ContractUpdated => cache_manager_automation::ContractUpdated::SIGNATURE_HASH,
        }
    }

    /// Which contract emits this event.
    #[must_use]
    pub const fn contract(&self) -> ContractName {
        match self {
            Self::InsertBid
            | Self::DeleteBid
            | Self::Pause
            | Self::Unpause
            | Self::SetCacheSize
            | Self::SetDecayRate
            | Self::Initialized => ContractName::CacheManager,
            Self::ContractAdded | Self::ContractUpdated => ContractName::CacheManagerAutomation,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECODED PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════════

/// Decoded `InsertBid` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertBidPayload {
    /// Hash of the cached bytecode.
    pub codehash: BytecodeHash,
    /// Program whose code was cached.
    pub program: EthAddress,
    /// Raw bid as emitted (decay included).
    pub bid: Wei,
    /// Bytecode size in bytes.
    pub size: u64,
}

/// Decoded `DeleteBid` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteBidPayload {
    /// Hash of the evicted bytecode.
    pub codehash: BytecodeHash,
    /// Bid value the entry held at eviction time.
    pub bid: Wei,
    /// Bytecode size in bytes.
    pub size: u64,
}

/// Decoded `ContractAdded` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAddedPayload {
    /// Wallet that enrolled the contract.
    pub user: EthAddress,
    /// The enrolled contract.
    pub contract_address: EthAddress,
    /// Ceiling the automation may bid up to.
    pub max_bid: Wei,
}

/// Decoded `ContractUpdated` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractUpdatedPayload {
    /// The enrolled contract.
    pub contract_address: EthAddress,
    /// New bid ceiling.
    pub max_bid: Wei,
}

/// Strongly-typed event, the unit the processor's dispatch table consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CacheEvent {
    /// Bid placed, entry cached.
    InsertBid(InsertBidPayload),
    /// Entry evicted.
    DeleteBid(DeleteBidPayload),
    /// Contract enrolled in automation.
    ContractAdded(ContractAddedPayload),
    /// Automation ceiling updated.
    ContractUpdated(ContractUpdatedPayload),
    /// Decay rate changed to the contained wei-per-second value.
    SetDecayRate(Wei),
    /// Cache capacity changed to the contained byte count.
    SetCacheSize(u64),
    /// Bidding paused.
    Pause,
    /// Bidding resumed.
    Unpause,
    /// Contract initialized.
    Initialized,
}

impl CacheEvent {
    /// The kind tag for this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::InsertBid(_) => EventKind::InsertBid,
            Self::DeleteBid(_) => EventKind::DeleteBid,
            Self::ContractAdded(_) => EventKind::ContractAdded,
            Self::ContractUpdated(_) => EventKind::ContractUpdated,
            Self::SetDecayRate(_) => EventKind::SetDecayRate,
            Self::SetCacheSize(_) => EventKind::SetCacheSize,
            Self::Pause => EventKind::Pause,
            Self::Unpause => EventKind::Unpause,
            Self::Initialized => EventKind::Initialized,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_name_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_name("Transfer"), None);
    }

    #[test]
    fn kind_resolves_from_topic0() {
        for kind in EventKind::ALL {
            let hash = kind.signature_hash();
            assert_eq!(EventKind::from_signature_hash(&hash), Some(kind));
        }
        assert_eq!(EventKind::from_signature_hash(&B256::ZERO), None);
    }

    #[test]
    fn contract_attribution() {
        assert_eq!(EventKind::InsertBid.contract(), ContractName::CacheManager);
        assert_eq!(
            EventKind::ContractAdded.contract(),
            ContractName::CacheManagerAutomation
        );
    }

    #[test]
    fn contract_name_round_trip() {
        assert_eq!(
            ContractName::from_name("CacheManager"),
            ContractName::CacheManager
        );
        assert_eq!(ContractName::from_name("whatever"), ContractName::Unknown);
    }
}
