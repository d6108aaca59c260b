//! The ZION ledger contract.
//!
//! The ledger is account-based and its transfer primitive is atomic: it
//! checks the source balance and applies the movement in one step, or
//! rejects. Every transfer carries an idempotency key, and the ledger
//! treats a replayed key as a no-op that reports the original outcome.
//! That pair of guarantees is what lets the coordinator retry transfers
//! freely after a crash without ever double-applying one.

use async_trait::async_trait;
use zionbridge_types::{AccountId, Result};

/// The outcome of a ledger transfer.
///
/// `Applied` and `InsufficientFunds` are definitive: the ledger either did
/// or did not move the funds, and will give the same answer for the same
/// key forever. `TransientError` is an explicit rejection too (the ledger
/// answered, and the answer was "not applied, try later"), which is what
/// distinguishes it from a transport `Err` where nothing is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The transfer was applied (or had already been applied under this
    /// key).
    Applied,
    /// The source account cannot cover the amount.
    InsufficientFunds { available: u64 },
    /// The ledger explicitly declined to apply the transfer right now.
    TransientError { reason: String },
}

/// Client for the ZION account ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current balance of `account`, in the smallest unit.
    ///
    /// Fails with `UnknownAccount` when the ledger has never seen it.
    async fn get_balance(&self, account: &AccountId) -> Result<u64>;

    /// Atomically move `amount` from `from` to `to`, deduped by
    /// `idempotency_key`. Replaying a key the ledger has already applied
    /// returns [`TransferOutcome::Applied`] without moving funds again.
    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
        idempotency_key: &str,
    ) -> Result<TransferOutcome>;
}
