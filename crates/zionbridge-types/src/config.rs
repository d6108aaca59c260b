//! Configuration for the settlement coordinator and the reconciliation
//! sweeper. Millisecond fields with `Duration` accessors; defaults come from
//! [`crate::constants`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AccountId, constants};

/// Configuration for the [`SettlementCoordinator`].
///
/// [`SettlementCoordinator`]: https://docs.rs/zionbridge-settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// The pool account backing channel liquidity: outbound debits credit
    /// it, inbound credits debit it.
    pub pool_account: AccountId,
    /// Timeout for a single external call, milliseconds.
    pub call_timeout_ms: u64,
    /// Maximum attempts for the Lightning payment leg.
    pub max_payment_attempts: u32,
    /// Maximum attempts for the ledger transfer leg before escalating to
    /// COMPENSATING.
    pub max_transfer_attempts: u32,
    /// Base delay for exponential backoff between retries, milliseconds.
    pub backoff_base_ms: u64,
    /// Cap on a single backoff delay, milliseconds.
    pub backoff_cap_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            pool_account: AccountId::new(constants::DEFAULT_POOL_ACCOUNT),
            call_timeout_ms: constants::DEFAULT_CALL_TIMEOUT_MS,
            max_payment_attempts: constants::DEFAULT_PAYMENT_ATTEMPTS,
            max_transfer_attempts: constants::DEFAULT_TRANSFER_ATTEMPTS,
            backoff_base_ms: constants::DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: constants::DEFAULT_BACKOFF_CAP_MS,
        }
    }
}

impl CoordinatorConfig {
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    #[must_use]
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    /// A configuration tuned for tests: no real waiting anywhere.
    #[cfg(any(test, feature = "test-helpers"))]
    #[must_use]
    pub fn fast() -> Self {
        Self {
            backoff_base_ms: 1,
            backoff_cap_ms: 2,
            call_timeout_ms: 1_000,
            ..Self::default()
        }
    }
}

/// Configuration for the [`ReconciliationSweeper`].
///
/// [`ReconciliationSweeper`]: https://docs.rs/zionbridge-settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// How often the sweeper scans the store, milliseconds.
    pub interval_ms: u64,
    /// A non-terminal settlement untouched for longer than this is swept.
    pub staleness_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_ms: constants::DEFAULT_SWEEP_INTERVAL_MS,
            staleness_ms: constants::DEFAULT_STALENESS_MS,
        }
    }
}

impl SweeperConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.staleness_ms).unwrap_or(i64::MAX))
    }
}
