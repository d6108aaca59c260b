//! Globally unique identifiers used throughout ZionBridge.
//!
//! `SettlementId` uses UUIDv7 for time-ordered lexicographic sorting;
//! `PaymentHash` is the raw 32-byte SHA-256 hash from the BOLT-11 invoice.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SettlementId
// ---------------------------------------------------------------------------

/// Globally unique settlement identifier. Uses UUIDv7 for time-ordered
/// sorting, and doubles as the ledger-side idempotency key for the
/// debit/credit leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SettlementId(pub Uuid);

impl SettlementId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// The idempotency key sent with the ledger transfer for this settlement.
    #[must_use]
    pub fn transfer_key(&self) -> String {
        format!("zb:settle:{}", self.0)
    }
}

impl Default for SettlementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SettlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// An account identifier on the ZION ledger.
///
/// Opaque to the bridge: the ledger is the authority on whether it resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// PaymentHash
// ---------------------------------------------------------------------------

/// The payment hash of a Lightning invoice (SHA-256 of the preimage).
///
/// This is the idempotency key for the Lightning leg: the node settles a
/// given hash at most once, so retrying a payment keyed by it can never
/// double-send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PaymentHash(pub [u8; 32]);

impl PaymentHash {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a 64-character hex string.
    ///
    /// # Errors
    /// Returns `None` if the input is not exactly 32 hex-encoded bytes.
    #[must_use]
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Abbreviated form for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_id_uniqueness() {
        let a = SettlementId::new();
        let b = SettlementId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn settlement_id_ordering() {
        let a = SettlementId::new();
        let b = SettlementId::new();
        assert!(a < b);
    }

    #[test]
    fn transfer_key_is_stable() {
        let id = SettlementId::new();
        assert_eq!(id.transfer_key(), id.transfer_key());
        assert!(id.transfer_key().starts_with("zb:settle:"));
    }

    #[test]
    fn payment_hash_hex_roundtrip() {
        let hash = PaymentHash::from_bytes([0xab; 32]);
        let hex_str = hash.to_string();
        assert_eq!(hex_str.len(), 64);
        assert_eq!(PaymentHash::from_hex(&hex_str), Some(hash));
    }

    #[test]
    fn payment_hash_from_hex_rejects_bad_input() {
        assert!(PaymentHash::from_hex("not hex").is_none());
        assert!(PaymentHash::from_hex("abcd").is_none());
    }

    #[test]
    fn payment_hash_short_form() {
        let hash = PaymentHash::from_bytes([0xff; 32]);
        assert_eq!(hash.short(), "ffffffff");
    }

    #[test]
    fn account_id_display() {
        let acct = AccountId::new("zion1qtest");
        assert_eq!(acct.to_string(), "zion1qtest");
        assert_eq!(acct.as_str(), "zion1qtest");
    }

    #[test]
    fn serde_roundtrips() {
        let id = SettlementId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: SettlementId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);

        let hash = PaymentHash::from_bytes([7u8; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        let back: PaymentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, back);
    }
}
