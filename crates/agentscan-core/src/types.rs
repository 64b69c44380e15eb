//! Chain value types

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A 32-byte chain address, rendered as base58 everywhere it leaves memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The protocol zero address. Wallet fields equal to this store as NULL.
    pub const ZERO: Address = Address([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse from canonical base58 text.
    pub fn from_base58(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CoreError::InvalidAddress(format!("{s}: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidAddress(format!("{s}: wrong length")))?;
        Ok(Address(arr))
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_base58(&s).map_err(serde::de::Error::custom)
    }
}

/// A 32-byte hash (event seal or running digest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    /// All-zero seals mean "no hash" on the wire and store as NULL.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// None when the hash is the all-zero sentinel.
    pub fn non_zero(self) -> Option<Hash32> {
        if self.is_zero() {
            None
        } else {
            Some(self)
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidHash(format!("wrong length {}", bytes.len())))?;
        Ok(Hash32(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Row lifecycle state against the finalized chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
    /// Not yet checked against a finalized slot.
    Pending,
    /// Exists on-chain behind the safety margin (and hash chain matched,
    /// for event rows).
    Finalized,
    /// Backing account confirmed absent, or owning agent orphaned.
    Orphaned,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Pending => "PENDING",
            RowStatus::Finalized => "FINALIZED",
            RowStatus::Orphaned => "ORPHANED",
        }
    }

    pub fn parse(s: &str) -> Option<RowStatus> {
        match s {
            "PENDING" => Some(RowStatus::Pending),
            "FINALIZED" => Some(RowStatus::Finalized),
            "ORPHANED" => Some(RowStatus::Orphaned),
            _ => None,
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which per-agent hash chain a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainType {
    Feedback,
    Response,
    Revoke,
}

impl ChainType {
    pub const ALL: [ChainType; 3] = [ChainType::Feedback, ChainType::Response, ChainType::Revoke];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainType::Feedback => "feedback",
            ChainType::Response => "response",
            ChainType::Revoke => "revoke",
        }
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical order key: `(slot, tx_signature, tx_index NULLS LAST,
/// event_ordinal NULLS LAST, row_id)`. Total, replay-stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalKey {
    pub slot: u64,
    pub tx_signature: String,
    pub tx_index: Option<i32>,
    pub event_ordinal: Option<i32>,
    pub row_id: i64,
}

/// Option ordering with NULLS LAST semantics (SQL parity).
fn cmp_nulls_last(a: Option<i32>, b: Option<i32>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl Ord for CanonicalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.slot
            .cmp(&other.slot)
            .then_with(|| self.tx_signature.cmp(&other.tx_signature))
            .then_with(|| cmp_nulls_last(self.tx_index, other.tx_index))
            .then_with(|| cmp_nulls_last(self.event_ordinal, other.event_ordinal))
            .then_with(|| self.row_id.cmp(&other.row_id))
    }
}

impl PartialOrd for CanonicalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_base58_roundtrip() {
        let addr = Address([7u8; 32]);
        let text = addr.to_base58();
        assert_eq!(Address::from_base58(&text).unwrap(), addr);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        // base58 of fewer than 32 bytes
        let short = bs58::encode([1u8; 16]).into_string();
        assert!(Address::from_base58(&short).is_err());
    }

    #[test]
    fn test_zero_hash_sentinel() {
        assert!(Hash32::ZERO.is_zero());
        assert_eq!(Hash32::ZERO.non_zero(), None);
        assert_eq!(Hash32([1u8; 32]).non_zero(), Some(Hash32([1u8; 32])));
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [RowStatus::Pending, RowStatus::Finalized, RowStatus::Orphaned] {
            assert_eq!(RowStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(RowStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_canonical_key_slot_dominates() {
        let a = key(100, "zzz", Some(5), Some(5), 99);
        let b = key(101, "aaa", Some(0), Some(0), 1);
        assert!(a < b);
    }

    #[test]
    fn test_canonical_key_nulls_last() {
        let with_index = key(100, "sig", Some(3), None, 1);
        let without_index = key(100, "sig", None, None, 1);
        assert!(with_index < without_index);
    }

    #[test]
    fn test_canonical_key_row_id_breaks_ties() {
        let a = key(100, "sig", Some(0), Some(0), 1);
        let b = key(100, "sig", Some(0), Some(0), 2);
        assert!(a < b);
    }

    fn key(
        slot: u64,
        sig: &str,
        tx_index: Option<i32>,
        event_ordinal: Option<i32>,
        row_id: i64,
    ) -> CanonicalKey {
        CanonicalKey {
            slot,
            tx_signature: sig.to_string(),
            tx_index,
            event_ordinal,
            row_id,
        }
    }
}
