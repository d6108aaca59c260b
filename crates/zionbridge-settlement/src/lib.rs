//! # zionbridge-settlement
//!
//! The settlement engine: a coordinator that drives cross-ledger
//! settlements between the ZION account ledger and a Lightning node, and a
//! reconciliation sweeper that finishes whatever a crash or an outage left
//! behind.
//!
//! Neither ledger supports distributed transactions, so atomicity is
//! manufactured from three ingredients:
//!
//! 1. **Persisted intent.** Every transition is durably recorded, via
//!    compare-and-swap, before the external call it licenses.
//! 2. **Idempotency keys.** The Lightning leg is keyed by payment hash,
//!    the ledger leg by a key derived from the settlement id, so any
//!    ambiguous step can be replayed instead of guessed about.
//! 3. **Ground truth.** Ambiguity is resolved by asking the backend what
//!    actually happened, never by assuming.

pub mod coordinator;
pub mod reservation;
pub mod retry;
pub mod sweeper;

pub use coordinator::{SettleRequest, SettlementCoordinator};
pub use reservation::ReservationTable;
pub use sweeper::{ReconciliationSweeper, SweepReport};
