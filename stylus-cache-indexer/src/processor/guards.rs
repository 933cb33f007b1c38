//! Shape guards for stored event payloads.
//!
//! `event_data` rows are ordered arrays of strings written by the ingestion
//! boundary. These guards re-validate that shape before any handler runs:
//! element counts, hex widths, and integer parses are all checked, and a
//! rejection is an [`DomainError::InvalidEventData`] the processor logs and
//! skips. Once a guard passes, handlers receive strongly typed payloads.

use serde_json::Value;

use crate::error::{DomainError, Result};
use crate::types::entities::BlockchainEvent;
use crate::types::events::{
    CacheEvent, ContractAddedPayload, ContractUpdatedPayload, DeleteBidPayload, EventKind,
    InsertBidPayload,
};
use crate::types::primitives::{BytecodeHash, EthAddress, Wei};

/// Decode a stored event row into a typed payload.
///
/// # Errors
///
/// - [`DomainError::UnknownEventType`] for names outside the dispatch table
/// - [`DomainError::InvalidEventData`] when the payload fails its guard
pub fn decode_event(event: &BlockchainEvent) -> Result<CacheEvent> {
    let kind = EventKind::from_name(&event.event_name)
        .ok_or_else(|| DomainError::UnknownEventType(event.event_name.clone()))?;

    let decoded = match kind {
        EventKind::InsertBid => CacheEvent::InsertBid(insert_bid(&event.event_data)?),
        EventKind::DeleteBid => CacheEvent::DeleteBid(delete_bid(&event.event_data)?),
        EventKind::ContractAdded => CacheEvent::ContractAdded(contract_added(&event.event_data)?),
        EventKind::ContractUpdated => {
            CacheEvent::ContractUpdated(contract_updated(&event.event_data)?)
        }
        EventKind::SetDecayRate => {
            let rate = single_wei(kind, &event.event_data)?;
            CacheEvent::SetDecayRate(rate)
        }
        EventKind::SetCacheSize => {
            let size = single_u64(kind, &event.event_data)?;
            CacheEvent::SetCacheSize(size)
        }
        EventKind::Pause => CacheEvent::Pause,
        EventKind::Unpause => CacheEvent::Unpause,
        EventKind::Initialized => CacheEvent::Initialized,
    };

    Ok(decoded)
}

/// `InsertBid`: 4-tuple of strings - 32-byte hash, 20-byte address, bid, size.
fn insert_bid(data: &Value) -> Result<InsertBidPayload> {
    let elements = tuple(EventKind::InsertBid, data, 4)?;
    Ok(InsertBidPayload {
        codehash: hash_element(EventKind::InsertBid, elements, 0)?,
        program: address_element(EventKind::InsertBid, elements, 1)?,
        bid: wei_element(EventKind::InsertBid, elements, 2)?,
        size: u64_element(EventKind::InsertBid, elements, 3)?,
    })
}

/// `DeleteBid`: 3-tuple - hash, eviction bid, size.
fn delete_bid(data: &Value) -> Result<DeleteBidPayload> {
    let elements = tuple(EventKind::DeleteBid, data, 3)?;
    Ok(DeleteBidPayload {
        codehash: hash_element(EventKind::DeleteBid, elements, 0)?,
        bid: wei_element(EventKind::DeleteBid, elements, 1)?,
        size: u64_element(EventKind::DeleteBid, elements, 2)?,
    })
}

/// `ContractAdded`: 3-tuple - user, contract address, max bid.
fn contract_added(data: &Value) -> Result<ContractAddedPayload> {
    let elements = tuple(EventKind::ContractAdded, data, 3)?;
    Ok(ContractAddedPayload {
        user: address_element(EventKind::ContractAdded, elements, 0)?,
        contract_address: address_element(EventKind::ContractAdded, elements, 1)?,
        max_bid: wei_element(EventKind::ContractAdded, elements, 2)?,
    })
}

/// `ContractUpdated`: 2-tuple - contract address, max bid.
fn contract_updated(data: &Value) -> Result<ContractUpdatedPayload> {
    let elements = tuple(EventKind::ContractUpdated, data, 2)?;
    Ok(ContractUpdatedPayload {
        contract_address: address_element(EventKind::ContractUpdated, elements, 0)?,
        max_bid: wei_element(EventKind::ContractUpdated, elements, 1)?,
    })
}

fn single_wei(kind: EventKind, data: &Value) -> Result<Wei> {
    let elements = tuple(kind, data, 1)?;
    wei_element(kind, elements, 0)
}

fn single_u64(kind: EventKind, data: &Value) -> Result<u64> {
    let elements = tuple(kind, data, 1)?;
    u64_element(kind, elements, 0)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENT HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn invalid(kind: EventKind, reason: impl Into<String>) -> crate::error::AppError {
    DomainError::InvalidEventData {
        event_name: kind.as_str().to_owned(),
        reason: reason.into(),
    }
    .into()
}

fn tuple(kind: EventKind, data: &Value, expected: usize) -> Result<&[Value]> {
    let array = data
        .as_array()
        .ok_or_else(|| invalid(kind, "payload is not an array"))?;
    if array.len() != expected {
        return Err(invalid(
            kind,
            format!("expected {expected} elements, got {}", array.len()),
        ));
    }
    Ok(array)
}

fn str_element<'a>(kind: EventKind, elements: &'a [Value], index: usize) -> Result<&'a str> {
    elements[index]
        .as_str()
        .ok_or_else(|| invalid(kind, format!("element {index} is not a string")))
}

fn hash_element(kind: EventKind, elements: &[Value], index: usize) -> Result<BytecodeHash> {
    let raw = str_element(kind, elements, index)?;
    BytecodeHash::from_hex(raw)
        .map_err(|e| invalid(kind, format!("element {index} is not a 32-byte hash: {e}")))
}

fn address_element(kind: EventKind, elements: &[Value], index: usize) -> Result<EthAddress> {
    let raw = str_element(kind, elements, index)?;
    EthAddress::from_hex(raw)
        .map_err(|e| invalid(kind, format!("element {index} is not a 20-byte address: {e}")))
}

fn wei_element(kind: EventKind, elements: &[Value], index: usize) -> Result<Wei> {
    let raw = str_element(kind, elements, index)?;
    Wei::parse(raw)
        .map_err(|e| invalid(kind, format!("element {index} is not a non-negative integer: {e}")))
}

fn u64_element(kind: EventKind, elements: &[Value], index: usize) -> Result<u64> {
    let raw = str_element(kind, elements, index)?;
    raw.parse::<u64>()
        .map_err(|e| invalid(kind, format!("element {index} is not a u64: {e}")))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
