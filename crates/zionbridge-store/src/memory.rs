//! In-memory [`SettlementStore`] backed by a mutex-guarded map.
//!
//! All trait methods take the lock, do their check-and-mutate, and release
//! before returning, so the CAS contract holds under any interleaving of
//! coordinator and sweeper tasks.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use zionbridge_types::{
    BridgeError, PaymentHash, Result, Settlement, SettlementId, SettlementState,
};

use crate::{SettlementStore, StateMeta};

/// Mutex-guarded map store. Cheap to clone-free share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<SettlementId, Settlement>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SettlementId, Settlement>>> {
        self.inner
            .lock()
            .map_err(|_| BridgeError::Internal("settlement store lock poisoned".into()))
    }

    fn hash_in_use(map: &HashMap<SettlementId, Settlement>, hash: PaymentHash) -> bool {
        // Failed settlements never reached the network, so their hash is
        // free again. Any other state holds the hash forever.
        map.values().any(|s| {
            s.payment_hash == Some(hash) && s.state != SettlementState::Failed
        })
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn create(&self, settlement: Settlement) -> Result<Settlement> {
        let mut map = self.lock()?;
        if let Some(hash) = settlement.payment_hash {
            if Self::hash_in_use(&map, hash) {
                return Err(BridgeError::DuplicatePaymentHash(hash));
            }
        }
        debug!(id = %settlement.id, state = %settlement.state, "settlement created");
        map.insert(settlement.id, settlement.clone());
        Ok(settlement)
    }

    async fn update_state(
        &self,
        id: SettlementId,
        expected: SettlementState,
        new: SettlementState,
        meta: StateMeta,
    ) -> Result<Settlement> {
        let mut map = self.lock()?;
        let record = map.get_mut(&id).ok_or(BridgeError::NotFound(id))?;
        if record.state != expected {
            return Err(BridgeError::StateConflict {
                id,
                expected,
                actual: record.state,
            });
        }
        if !expected.can_transition_to(new) {
            return Err(BridgeError::InvalidTransition {
                id,
                from: expected,
                to: new,
            });
        }
        record.state = new;
        if meta.failure_reason.is_some() {
            record.failure_reason = meta.failure_reason;
        }
        record.updated_at = Utc::now();
        debug!(id = %id, from = %expected, to = %new, "settlement transitioned");
        Ok(record.clone())
    }

    async fn get(&self, id: SettlementId) -> Result<Settlement> {
        self.lock()?
            .get(&id)
            .cloned()
            .ok_or(BridgeError::NotFound(id))
    }

    async fn list_by_state(
        &self,
        state: SettlementState,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Settlement>> {
        let map = self.lock()?;
        let mut out: Vec<Settlement> = map
            .values()
            .filter(|s| s.state == state && s.updated_at < older_than)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.updated_at);
        Ok(out)
    }

    async fn find_by_payment_hash(&self, hash: &PaymentHash) -> Result<Option<Settlement>> {
        // Same rule as `hash_in_use`: a Failed settlement no longer holds
        // its hash, so a retained dead record must not shadow the live one.
        Ok(self
            .lock()?
            .values()
            .find(|s| {
                s.payment_hash.as_ref() == Some(hash) && s.state != SettlementState::Failed
            })
            .cloned())
    }

    async fn set_invoice(
        &self,
        id: SettlementId,
        invoice: String,
        hash: PaymentHash,
    ) -> Result<Settlement> {
        let mut map = self.lock()?;
        if Self::hash_in_use(&map, hash) {
            return Err(BridgeError::DuplicatePaymentHash(hash));
        }
        let record = map.get_mut(&id).ok_or(BridgeError::NotFound(id))?;
        if record.state != SettlementState::Created {
            return Err(BridgeError::StateConflict {
                id,
                expected: SettlementState::Created,
                actual: record.state,
            });
        }
        record.invoice = Some(invoice);
        record.payment_hash = Some(hash);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use zionbridge_types::{AccountId, Direction};

    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = store();
        let s = store.create(Settlement::dummy(1_000, "alice")).await.unwrap();
        let got = store.get(s.id).await.unwrap();
        assert_eq!(got.id, s.id);
        assert_eq!(got.state, SettlementState::Created);
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let err = store().get(SettlementId::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn cas_happy_path_refreshes_updated_at() {
        let store = store();
        let s = store.create(Settlement::dummy(1_000, "alice")).await.unwrap();
        let before = s.updated_at;
        let updated = store
            .update_state(
                s.id,
                SettlementState::Created,
                SettlementState::LedgerReserved,
                StateMeta::none(),
            )
            .await
            .unwrap();
        assert_eq!(updated.state, SettlementState::LedgerReserved);
        assert!(updated.updated_at >= before);
    }

    #[tokio::test]
    async fn cas_rejects_stale_expected_state() {
        let store = store();
        let s = store.create(Settlement::dummy(1_000, "alice")).await.unwrap();
        store
            .update_state(
                s.id,
                SettlementState::Created,
                SettlementState::LedgerReserved,
                StateMeta::none(),
            )
            .await
            .unwrap();
        // A second actor still believing Created loses the race.
        let err = store
            .update_state(
                s.id,
                SettlementState::Created,
                SettlementState::Failed,
                StateMeta::none(),
            )
            .await
            .unwrap_err();
        match err {
            BridgeError::StateConflict { expected, actual, .. } => {
                assert_eq!(expected, SettlementState::Created);
                assert_eq!(actual, SettlementState::LedgerReserved);
            }
            other => panic!("expected StateConflict, got {other}"),
        }
    }

    #[tokio::test]
    async fn cas_rejects_transition_outside_the_table() {
        let store = store();
        let s = store.create(Settlement::dummy(1_000, "alice")).await.unwrap();
        let err = store
            .update_state(
                s.id,
                SettlementState::Created,
                SettlementState::Completed,
                StateMeta::none(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTransition { .. }));
        // The record is untouched.
        assert_eq!(
            store.get(s.id).await.unwrap().state,
            SettlementState::Created
        );
    }

    #[tokio::test]
    async fn failure_reason_is_recorded() {
        let store = store();
        let s = store.create(Settlement::dummy(1_000, "alice")).await.unwrap();
        let updated = store
            .update_state(
                s.id,
                SettlementState::Created,
                SettlementState::Failed,
                StateMeta::reason("insufficient funds"),
            )
            .await
            .unwrap();
        assert_eq!(updated.failure_reason.as_deref(), Some("insufficient funds"));
    }

    #[tokio::test]
    async fn terminal_records_are_retained() {
        let store = store();
        let s = store.create(Settlement::dummy(1_000, "alice")).await.unwrap();
        store
            .update_state(
                s.id,
                SettlementState::Created,
                SettlementState::Failed,
                StateMeta::reason("rejected"),
            )
            .await
            .unwrap();
        let got = store.get(s.id).await.unwrap();
        assert_eq!(got.state, SettlementState::Failed);
        assert_eq!(got.failure_reason.as_deref(), Some("rejected"));
    }

    #[tokio::test]
    async fn list_by_state_filters_on_staleness() {
        let store = store();
        let fresh = store.create(Settlement::dummy(1_000, "a")).await.unwrap();
        let mut stale = Settlement::dummy(2_000, "b");
        stale.updated_at = Utc::now() - Duration::minutes(5);
        let stale = store.create(stale).await.unwrap();

        let cutoff = Utc::now() - Duration::minutes(1);
        let listed = store
            .list_by_state(SettlementState::Created, cutoff)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, stale.id);
        assert_ne!(listed[0].id, fresh.id);
    }

    #[tokio::test]
    async fn list_by_state_is_oldest_first() {
        let store = store();
        let mut older = Settlement::dummy(1, "a");
        older.updated_at = Utc::now() - Duration::minutes(10);
        let mut newer = Settlement::dummy(2, "b");
        newer.updated_at = Utc::now() - Duration::minutes(2);
        let newer = store.create(newer).await.unwrap();
        let older = store.create(older).await.unwrap();

        let listed = store
            .list_by_state(SettlementState::Created, Utc::now())
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[1].id, newer.id);
    }

    #[tokio::test]
    async fn duplicate_payment_hash_rejected_while_live() {
        let store = store();
        let s = store.create(Settlement::dummy(1_000, "alice")).await.unwrap();
        let hash = s.payment_hash.unwrap();

        let dup = Settlement::new(Direction::LedgerToChannel, 1_000, AccountId::new("bob"))
            .with_invoice(s.invoice.clone().unwrap(), hash);
        let err = store.create(dup.clone()).await.unwrap_err();
        assert!(matches!(err, BridgeError::DuplicatePaymentHash(_)));

        // Once the holder fails, the hash frees up.
        store
            .update_state(
                s.id,
                SettlementState::Created,
                SettlementState::Failed,
                StateMeta::reason("no route"),
            )
            .await
            .unwrap();
        store.create(dup).await.unwrap();
    }

    #[tokio::test]
    async fn find_by_payment_hash() {
        let store = store();
        let s = store.create(Settlement::dummy(1_000, "alice")).await.unwrap();
        let hash = s.payment_hash.unwrap();
        let found = store.find_by_payment_hash(&hash).await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(s.id));

        let missing = PaymentHash::from_bytes([9u8; 32]);
        assert!(store.find_by_payment_hash(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_payment_hash_ignores_failed_holders() {
        let store = store();
        let dead = store.create(Settlement::dummy(1_000, "alice")).await.unwrap();
        let hash = dead.payment_hash.unwrap();
        store
            .update_state(
                dead.id,
                SettlementState::Created,
                SettlementState::Failed,
                StateMeta::reason("no route"),
            )
            .await
            .unwrap();

        // The hash alone resolves to nothing now.
        assert!(store.find_by_payment_hash(&hash).await.unwrap().is_none());

        // A new settlement reusing the freed hash is the one the lookup
        // must return, whatever the map's iteration order.
        let live = Settlement::new(Direction::LedgerToChannel, 1_000, AccountId::new("bob"))
            .with_invoice(dead.invoice.clone().unwrap(), hash);
        let live = store.create(live).await.unwrap();
        let found = store.find_by_payment_hash(&hash).await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(live.id));
    }

    #[tokio::test]
    async fn set_invoice_only_in_created() {
        let store = store();
        let s = store
            .create(Settlement::new(
                Direction::ChannelToLedger,
                700,
                AccountId::new("carol"),
            ))
            .await
            .unwrap();
        let hash = PaymentHash::from_bytes([3u8; 32]);
        let updated = store
            .set_invoice(s.id, "lnzb1:700:abc".into(), hash)
            .await
            .unwrap();
        assert_eq!(updated.payment_hash, Some(hash));
        assert_eq!(updated.invoice.as_deref(), Some("lnzb1:700:abc"));

        // Not after the settlement has moved on.
        store
            .update_state(
                s.id,
                SettlementState::Created,
                SettlementState::ChannelSettled,
                StateMeta::none(),
            )
            .await
            .unwrap();
        let err = store
            .set_invoice(s.id, "lnzb1:700:def".into(), PaymentHash::from_bytes([4u8; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::StateConflict { .. }));
    }
}
