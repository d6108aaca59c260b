//! In-process reservation table for outbound settlements.
//!
//! The check-and-reserve is atomic per account: two concurrent settlements
//! that each fit the balance alone, but not together, cannot both pass. The
//! table only guards concurrent admission inside this process. The durable
//! reservation of record is the settlement's `LedgerReserved` state, and
//! [`SettlementCoordinator::rebuild_reservations`] repopulates the table
//! from those records after a restart.
//!
//! [`SettlementCoordinator::rebuild_reservations`]: crate::SettlementCoordinator::rebuild_reservations

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use zionbridge_types::{AccountId, BridgeError, Result};

/// Outstanding reserved amounts per account.
#[derive(Debug, Default)]
pub struct ReservationTable {
    inner: Mutex<HashMap<AccountId, u64>>,
}

impl ReservationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<AccountId, u64>>> {
        self.inner
            .lock()
            .map_err(|_| BridgeError::Internal("reservation table lock poisoned".into()))
    }

    /// Reserve `amount` against `balance`, counting what is already
    /// reserved for the account. Returns whether the reservation fit.
    pub fn try_reserve(&self, account: &AccountId, amount: u64, balance: u64) -> Result<bool> {
        let mut map = self.lock()?;
        let held = map.get(account).copied().unwrap_or(0);
        let Some(total) = held.checked_add(amount) else {
            return Ok(false);
        };
        if total > balance {
            return Ok(false);
        }
        map.insert(account.clone(), total);
        Ok(true)
    }

    /// Release a reservation. Saturating, so releasing after a restart
    /// (empty table) is harmless.
    pub fn release(&self, account: &AccountId, amount: u64) -> Result<()> {
        let mut map = self.lock()?;
        if let Some(held) = map.get_mut(account) {
            *held = held.saturating_sub(amount);
            if *held == 0 {
                map.remove(account);
            }
        }
        Ok(())
    }

    /// Re-admit a reservation without a balance check, for rebuilding the
    /// table from durable records after a restart. The funds were already
    /// validated at intake.
    pub fn restore(&self, account: &AccountId, amount: u64) -> Result<()> {
        let mut map = self.lock()?;
        let held = map.entry(account.clone()).or_insert(0);
        *held = held.saturating_add(amount);
        Ok(())
    }

    /// Total currently reserved for the account.
    pub fn outstanding(&self, account: &AccountId) -> Result<u64> {
        Ok(self.lock()?.get(account).copied().unwrap_or(0))
    }
}
