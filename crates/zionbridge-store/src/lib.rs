//! # zionbridge-store
//!
//! The settlement persistence contract, and an in-memory implementation
//! for tests and single-node deployments.
//!
//! The store is the system's only concurrency-control primitive. Every
//! state change goes through [`SettlementStore::update_state`], which is a
//! compare-and-swap: the caller names the state it believes the settlement
//! is in, and the store rejects with `StateConflict` if another actor got
//! there first. The coordinator and the reconciliation sweeper never hold
//! locks across external calls; they race freely and let CAS pick exactly
//! one winner per transition.
//!
//! The store is append-only in spirit: settlements are never deleted, not
//! even terminal ones. A failed settlement is the audit record of its own
//! failure.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use zionbridge_types::{PaymentHash, Result, Settlement, SettlementId, SettlementState};

pub use memory::MemoryStore;

/// Metadata attached to a state transition.
#[derive(Debug, Clone, Default)]
pub struct StateMeta {
    /// Human-readable reason, recorded on transitions into `Failed`,
    /// `Compensating`, and `Compensated`.
    pub failure_reason: Option<String>,
}

impl StateMeta {
    /// A transition with nothing to record.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A transition carrying a reason.
    #[must_use]
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
        }
    }
}

/// Durable record of every settlement the coordinator has ever touched.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Persist a new settlement.
    ///
    /// Rejects with `DuplicatePaymentHash` when the record carries a
    /// payment hash already held by a settlement that is not `Failed`. A
    /// failed settlement never reached the network, so its hash may be
    /// tried again under a fresh record; any other state means the hash is
    /// spoken for.
    async fn create(&self, settlement: Settlement) -> Result<Settlement>;

    /// Compare-and-swap state transition.
    ///
    /// Fails with `StateConflict` when the settlement is no longer in
    /// `expected`, and with `InvalidTransition` when `expected -> new` is
    /// not in the state machine's table. On success the stored record's
    /// `updated_at` is refreshed and the updated record is returned.
    async fn update_state(
        &self,
        id: SettlementId,
        expected: SettlementState,
        new: SettlementState,
        meta: StateMeta,
    ) -> Result<Settlement>;

    /// Fetch one settlement. Terminal settlements remain fetchable forever.
    async fn get(&self, id: SettlementId) -> Result<Settlement>;

    /// All settlements in `state` whose `updated_at` is strictly older
    /// than `older_than`, oldest first. The sweeper's scan primitive.
    async fn list_by_state(
        &self,
        state: SettlementState,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Settlement>>;

    /// Look up the settlement holding a payment hash, if any. Used to
    /// answer inbound settle notifications arriving by hash. Failed
    /// settlements gave their hash up and are never returned here.
    async fn find_by_payment_hash(&self, hash: &PaymentHash) -> Result<Option<Settlement>>;

    /// Attach an invoice and its payment hash to a settlement still in
    /// `Created`. Inbound settlements get their invoice only after the
    /// node has issued one. Subject to the same duplicate-hash rule as
    /// `create`.
    async fn set_invoice(
        &self,
        id: SettlementId,
        invoice: String,
        hash: PaymentHash,
    ) -> Result<Settlement>;
}
