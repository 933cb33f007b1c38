//! Validated primitive types for domain entities.
//!
//! These newtypes provide:
//! - Type safety (can't accidentally pass a bid as a block number)
//! - Validation at construction time
//! - Domain semantics in function signatures

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256, U256};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK NUMBER
// ═══════════════════════════════════════════════════════════════════════════════

/// Monotonic block height on an EVM chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(u64);

impl BlockNumber {
    /// Create a new block number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The block after this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Saturating backward jump, used for lookback windows.
    #[must_use]
    pub const fn saturating_back(&self, blocks: u64) -> Self {
        Self(self.0.saturating_sub(blocks))
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BlockNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ETHEREUM ADDRESS
// ═══════════════════════════════════════════════════════════════════════════════

/// Validated 20-byte Ethereum address.
///
/// Use `Address` from `alloy-primitives` for on-chain interaction,
/// but this type for persistence and domain logic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EthAddress([u8; 20]);

impl EthAddress {
    /// Create from a fixed-size array (infallible).
    #[must_use]
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Try to create from a byte slice.
    ///
    /// # Errors
    /// Returns `InvalidAddress::WrongLength` if the slice is not exactly 20 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, InvalidAddress> {
        let bytes: [u8; 20] = slice
            .try_into()
            .map_err(|_| InvalidAddress::WrongLength(slice.len()))?;
        Ok(Self(bytes))
    }

    /// Parse from hex string (with or without 0x prefix).
    ///
    /// # Errors
    /// Returns `InvalidAddress` if the string is not valid hex or wrong length.
    pub fn from_hex(s: &str) -> Result<Self, InvalidAddress> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != 40 {
            return Err(InvalidAddress::WrongLength(s.len() / 2));
        }
        let bytes = hex::decode(s).map_err(|_| InvalidAddress::InvalidHex)?;
        Self::from_slice(&bytes)
    }

    /// Get the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Get as a byte slice.
    #[must_use]
    pub const fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Convert to lowercase hex string with 0x prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Check if this is the zero address.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// The zero address (0x0000...0000).
    pub const ZERO: Self = Self([0u8; 20]);
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthAddress({})", self.to_hex())
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<EthAddress> for String {
    fn from(addr: EthAddress) -> Self {
        addr.to_hex()
    }
}

impl TryFrom<String> for EthAddress {
    type Error = InvalidAddress;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl TryFrom<&str> for EthAddress {
    type Error = InvalidAddress;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::from_hex(s)
    }
}

impl From<[u8; 20]> for EthAddress {
    fn from(bytes: [u8; 20]) -> Self {
        Self::new(bytes)
    }
}

impl From<Address> for EthAddress {
    fn from(addr: Address) -> Self {
        Self::new(addr.0.0)
    }
}

impl From<EthAddress> for Address {
    fn from(addr: EthAddress) -> Self {
        Self::from(addr.0)
    }
}

/// Error for invalid Ethereum addresses.
#[derive(Debug, Clone, Error)]
pub enum InvalidAddress {
    /// Address has wrong byte length.
    #[error("wrong length: expected 20 bytes, got {0}")]
    WrongLength(usize),
    /// Address contains invalid hex characters.
    #[error("invalid hex encoding")]
    InvalidHex,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BYTECODE HASH
// ═══════════════════════════════════════════════════════════════════════════════

/// Validated 32-byte bytecode hash (the cache key of a Stylus program).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BytecodeHash([u8; 32]);

impl BytecodeHash {
    /// Create from a fixed-size array (infallible).
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Try to create from a byte slice.
    ///
    /// # Errors
    /// Returns `InvalidHash::WrongLength` if the slice is not exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, InvalidHash> {
        let bytes: [u8; 32] = slice
            .try_into()
            .map_err(|_| InvalidHash::WrongLength(slice.len()))?;
        Ok(Self(bytes))
    }

    /// Parse from hex string (with or without 0x prefix).
    ///
    /// # Errors
    /// Returns `InvalidHash` if the string is not valid hex or wrong length.
    pub fn from_hex(s: &str) -> Result<Self, InvalidHash> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != 64 {
            return Err(InvalidHash::WrongLength(s.len() / 2));
        }
        let bytes = hex::decode(s).map_err(|_| InvalidHash::InvalidHex)?;
        Self::from_slice(&bytes)
    }

    /// Get the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Get as a byte slice.
    #[must_use]
    pub const fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Convert to lowercase hex string with 0x prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BytecodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BytecodeHash({})", self.to_hex())
    }
}

impl fmt::Display for BytecodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<BytecodeHash> for String {
    fn from(hash: BytecodeHash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for BytecodeHash {
    type Error = InvalidHash;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<B256> for BytecodeHash {
    fn from(hash: B256) -> Self {
        Self::new(hash.0)
    }
}

impl From<BytecodeHash> for B256 {
    fn from(hash: BytecodeHash) -> Self {
        Self::from(hash.0)
    }
}

/// Error for invalid bytecode hashes.
#[derive(Debug, Clone, Error)]
pub enum InvalidHash {
    /// Hash has wrong byte length.
    #[error("wrong length: expected 32 bytes, got {0}")]
    WrongLength(usize),
    /// Hash contains invalid hex characters.
    #[error("invalid hex encoding")]
    InvalidHex,
}

// ═══════════════════════════════════════════════════════════════════════════════
// WEI
// ═══════════════════════════════════════════════════════════════════════════════

/// Non-negative native-token amount in wei, with exact 256-bit arithmetic.
///
/// All bid math happens on this type; floating point never enters the
/// pipeline. Conversion to human-readable units is a presentation concern.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Wei(U256);

impl Wei {
    /// Zero wei.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Create from a raw `U256`.
    #[must_use]
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// Parse from a decimal string (the wire format of `event_data` values).
    ///
    /// # Errors
    /// Returns `InvalidAmount` if the string is not a non-negative integer
    /// that fits in 256 bits.
    pub fn parse(s: &str) -> Result<Self, InvalidAmount> {
        if s.starts_with('-') {
            return Err(InvalidAmount::Negative);
        }
        let value = U256::from_str(s).map_err(|_| InvalidAmount::ParseError)?;
        Ok(Self(value))
    }

    /// Get the underlying `U256`.
    #[must_use]
    pub const fn as_u256(&self) -> U256 {
        self.0
    }

    /// Check if zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Saturating addition.
    #[must_use]
    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction (floors at zero).
    ///
    /// This is the saturation the decay math relies on: a fully decayed bid
    /// is worth exactly zero, never a wrapped-around huge value.
    #[must_use]
    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Saturating multiplication.
    #[must_use]
    pub fn saturating_mul(&self, other: Self) -> Self {
        Self(self.0.saturating_mul(other.0))
    }

    /// Decimal string representation (exact).
    #[must_use]
    pub fn to_decimal_string(&self) -> String {
        self.0.to_string()
    }

    /// Convert to `sqlx::types::BigDecimal` for database storage.
    #[must_use]
    pub fn to_bigdecimal(&self) -> sqlx::types::BigDecimal {
        // U256::to_string is always a valid non-negative decimal integer
        sqlx::types::BigDecimal::from_str(&self.0.to_string()).unwrap_or_default()
    }

    /// Convert from a database `BigDecimal`.
    ///
    /// Values are stored as NUMERIC(78,0) so the integer part is exact;
    /// anything out of range collapses to zero rather than panicking.
    #[must_use]
    pub fn from_bigdecimal(value: &BigDecimal) -> Self {
        let digits = value.with_scale(0).to_string();
        Self::parse(&digits).unwrap_or(Self::ZERO)
    }
}

impl fmt::Debug for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wei({})", self.0)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Wei> for String {
    fn from(value: Wei) -> Self {
        value.to_decimal_string()
    }
}

impl TryFrom<String> for Wei {
    type Error = InvalidAmount;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<U256> for Wei {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<u64> for Wei {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

/// Error for invalid wei amounts.
#[derive(Debug, Clone, Error)]
pub enum InvalidAmount {
    /// Amount was negative.
    #[error("amount cannot be negative")]
    Negative,
    /// Amount could not be parsed as a decimal integer.
    #[error("amount is not a valid decimal integer")]
    ParseError,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn block_number_next_and_back() {
        let block = BlockNumber::new(100);
        assert_eq!(block.next().value(), 101);
        assert_eq!(block.saturating_back(40).value(), 60);
        assert_eq!(block.saturating_back(500).value(), 0);
    }

    #[test]
    fn address_hex_round_trip() {
        let hex = "0x00000000000000000000000000000000000000c8";
        let addr = EthAddress::from_hex(hex).unwrap();
        assert_eq!(addr.to_hex(), hex);
        assert!(!addr.is_zero());
        assert!(EthAddress::ZERO.is_zero());
    }

    #[test]
    fn address_rejects_bad_input() {
        assert!(EthAddress::from_hex("0x1234").is_err());
        assert!(EthAddress::from_hex("0xzz000000000000000000000000000000000000zz").is_err());
    }

    #[test]
    fn bytecode_hash_round_trip() {
        let hex = format!("0x{}", "ab".repeat(32));
        let hash = BytecodeHash::from_hex(&hex).unwrap();
        assert_eq!(hash.to_hex(), hex);
        assert_eq!(B256::from(hash), B256::from([0xAB; 32]));
    }

    #[test]
    fn wei_parse_and_saturate() {
        let bid = Wei::parse("1000000000000000000").unwrap();
        let decay = Wei::parse("3000000000000000000").unwrap();
        assert_eq!(bid.saturating_sub(decay), Wei::ZERO);
        assert_eq!(decay.saturating_sub(bid).to_decimal_string(), "2000000000000000000");
    }

    #[test]
    fn wei_rejects_negative_and_garbage() {
        assert!(Wei::parse("-5").is_err());
        assert!(Wei::parse("12.5").is_err());
        assert!(Wei::parse("abc").is_err());
    }

    #[test]
    fn wei_bigdecimal_round_trip() {
        let original = Wei::parse("123456789012345678901234567890").unwrap();
        let decimal = original.to_bigdecimal();
        let bridged = Wei::from_bigdecimal(&BigDecimal::from_str(&decimal.to_string()).unwrap());
        assert_eq!(bridged, original);
    }
}
