//! Background reconciliation: finds settlements that stopped making
//! progress and drives each one forward through the coordinator.
//!
//! The sweeper is what turns "persist intent before acting" into an actual
//! liveness guarantee. It never decides anything itself; it calls
//! [`SettlementCoordinator::resume`], which consults ground truth before
//! any ambiguous transition. Racing against a live coordinator task is
//! fine: the store's CAS lets exactly one of them win each transition.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use zionbridge_types::{BridgeError, Result, SettlementState, SweeperConfig};

use zionbridge_store::SettlementStore;

use crate::coordinator::SettlementCoordinator;

/// Non-terminal states the sweeper scans, in lifecycle order.
const SWEPT_STATES: [SettlementState; 5] = [
    SettlementState::Created,
    SettlementState::LedgerReserved,
    SettlementState::ChannelSettled,
    SettlementState::LedgerSettled,
    SettlementState::Compensating,
];

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale settlements examined.
    pub examined: usize,
    /// Settlements that moved to a new state (another actor winning the
    /// race counts: progress is progress).
    pub advanced: usize,
    /// Settlements still legitimately waiting on the outside world.
    pub still_pending: usize,
    /// Settlements the sweep could not resolve this round.
    pub failed: usize,
}

/// Periodic task that resumes stale settlements.
pub struct ReconciliationSweeper {
    coordinator: Arc<SettlementCoordinator>,
    store: Arc<dyn SettlementStore>,
    config: SweeperConfig,
}

impl ReconciliationSweeper {
    #[must_use]
    pub fn new(
        coordinator: Arc<SettlementCoordinator>,
        store: Arc<dyn SettlementStore>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            coordinator,
            store,
            config,
        }
    }

    /// One full scan over every non-terminal state.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let cutoff = Utc::now() - self.config.staleness();
        let mut report = SweepReport::default();
        for state in SWEPT_STATES {
            let stale = self.store.list_by_state(state, cutoff).await?;
            for settlement in stale {
                report.examined += 1;
                let before = settlement.state;
                match self.coordinator.resume(settlement.id).await {
                    Ok(after) if after.state == before => report.still_pending += 1,
                    Ok(after) => {
                        debug!(id = %settlement.id, from = %before, to = %after.state, "sweep advanced settlement");
                        report.advanced += 1;
                    }
                    // Another actor moved it first; that is progress too.
                    Err(BridgeError::StateConflict { .. }) => report.advanced += 1,
                    Err(BridgeError::AmbiguousPayment { .. }) => report.still_pending += 1,
                    Err(err) => {
                        // A resume may terminalize the record and then
                        // report why (failed payment, unfunded reservation).
                        // Read the record back before calling it stuck.
                        let terminal = self
                            .store
                            .get(settlement.id)
                            .await
                            .is_ok_and(|s| s.is_terminal());
                        if terminal {
                            report.advanced += 1;
                        } else {
                            warn!(id = %settlement.id, state = %before, error = %err, "sweep could not resolve settlement");
                            report.failed += 1;
                        }
                    }
                }
            }
        }
        Ok(report)
    }

    /// Run the sweep loop until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.sweep_once().await {
                    Ok(report) if report.examined > 0 => {
                        info!(
                            examined = report.examined,
                            advanced = report.advanced,
                            still_pending = report.still_pending,
                            failed = report.failed,
                            "reconciliation sweep finished"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "reconciliation sweep failed"),
                }
            }
        })
    }
}
