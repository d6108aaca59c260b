//! # Settlement: one cross-ledger payment attempt
//!
//! A `Settlement` records a single attempt to move value between the ZION
//! ledger and a Lightning channel. It is the unit of crash recovery: every
//! state transition is persisted *before* the external call it licenses, so
//! a crash between "decided" and "executed" is resumable from the record.
//!
//! ## State Machine
//!
//! ```text
//!                 outbound (LedgerToChannel)        inbound (ChannelToLedger)
//!
//!   CREATED ──reserve──▶ LEDGER_RESERVED     CREATED ──invoice paid──▶ CHANNEL_SETTLED
//!      │                      │                 │                          │
//!      │ validation/cancel    │ pay settled     │ validation/cancel        │ credit applied
//!      ▼                      ▼                 ▼                          ▼
//!   FAILED             CHANNEL_SETTLED       FAILED                 LEDGER_SETTLED
//!                        │         │                                       │
//!            debit applied         │ leg rejected repeatedly               ▼
//!                        ▼         ▼                                  COMPLETED
//!                  COMPLETED   COMPENSATING ──fence──▶ COMPENSATED
//! ```
//!
//! Transitions are **monotonic**: no state is ever re-entered, and no
//! transition skips a required step. `Completed`, `Compensated`, and
//! `Failed` are terminal. Records are never deleted; the store is an
//! append-only audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, PaymentHash, SettlementId};

/// Which leg is the source of funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// A ZION account funds an outbound Lightning payment.
    LedgerToChannel,
    /// An inbound Lightning payment credits a ZION account.
    ChannelToLedger,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LedgerToChannel => write!(f, "ledger_to_channel"),
            Self::ChannelToLedger => write!(f, "channel_to_ledger"),
        }
    }
}

/// The lifecycle state of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementState {
    /// Record persisted; no external mutation has been licensed yet.
    Created,
    /// Outbound only: the reservation is durably recorded and re-validated;
    /// the Lightning payment may now be attempted.
    LedgerReserved,
    /// The irreversible Lightning leg has settled. From here the settlement
    /// **must** run to `Completed` or `Compensated`; cancellation is no
    /// longer honored.
    ChannelSettled,
    /// Inbound only: the ledger credit has been applied, not yet finalized.
    LedgerSettled,
    /// Both legs durably applied. Terminal.
    Completed,
    /// The counterpart leg was rejected repeatedly after the Lightning leg
    /// settled; the sweeper will fence it. Never surfaced to the caller as
    /// an error.
    Compensating,
    /// The executed leg is accounted for and the counterpart leg was never,
    /// and will never be, applied. The account sits at its pre-attempt
    /// balance. Terminal.
    Compensated,
    /// No irreversible leg ran (or validation rejected the intent). Terminal.
    Failed,
}

impl SettlementState {
    /// Whether this state ends the settlement's lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Compensated | Self::Failed)
    }

    /// Can this settlement transition to the given target state?
    ///
    /// This is the single source of truth for the state machine; the store
    /// rejects any update that is not in this table.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::LedgerReserved)
                | (Self::Created, Self::ChannelSettled)
                | (Self::Created, Self::Failed)
                | (Self::LedgerReserved, Self::ChannelSettled)
                | (Self::LedgerReserved, Self::Failed)
                | (Self::ChannelSettled, Self::Completed)
                | (Self::ChannelSettled, Self::LedgerSettled)
                | (Self::ChannelSettled, Self::Compensating)
                | (Self::LedgerSettled, Self::Completed)
                | (Self::Compensating, Self::Compensated)
        )
    }
}

impl std::fmt::Display for SettlementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::LedgerReserved => write!(f, "LEDGER_RESERVED"),
            Self::ChannelSettled => write!(f, "CHANNEL_SETTLED"),
            Self::LedgerSettled => write!(f, "LEDGER_SETTLED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Compensating => write!(f, "COMPENSATING"),
            Self::Compensated => write!(f, "COMPENSATED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One cross-ledger payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    /// Globally unique identifier, assigned at creation, immutable.
    pub id: SettlementId,
    /// Which leg is the source of funds.
    pub direction: Direction,
    /// Amount in the smallest shared unit. Positive; immutable once created.
    pub amount: u64,
    /// The ZION account being debited (outbound) or credited (inbound).
    pub ledger_account: AccountId,
    /// The BOLT-11 payment request. Caller-supplied for outbound; generated
    /// by the bridge for inbound (absent until created).
    pub invoice: Option<String>,
    /// Derived from the invoice; idempotency key for the Lightning leg.
    pub payment_hash: Option<PaymentHash>,
    /// Current lifecycle state.
    pub state: SettlementState,
    /// Present only for Failed (and recorded when entering Compensating).
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Settlement {
    /// Create a new settlement record in `Created` state.
    #[must_use]
    pub fn new(direction: Direction, amount: u64, ledger_account: AccountId) -> Self {
        let now = Utc::now();
        Self {
            id: SettlementId::new(),
            direction,
            amount,
            ledger_account,
            invoice: None,
            payment_hash: None,
            state: SettlementState::Created,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the invoice and its payment hash (builder style, pre-create).
    #[must_use]
    pub fn with_invoice(mut self, invoice: impl Into<String>, hash: PaymentHash) -> Self {
        self.invoice = Some(invoice.into());
        self.payment_hash = Some(hash);
        self
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the caller may still cancel: only before the irreversible
    /// Lightning leg, i.e. in `Created` or `LedgerReserved`.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self.state,
            SettlementState::Created | SettlementState::LedgerReserved
        )
    }

    /// How long since the record was last touched.
    #[must_use]
    pub fn age_since_update(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }
}

/// Dummy settlement for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Settlement {
    /// Create a dummy outbound settlement with a random payment hash.
    pub fn dummy(amount: u64, account: &str) -> Self {
        let hash = PaymentHash::from_bytes(rand::random::<[u8; 32]>());
        Self::new(Direction::LedgerToChannel, amount, AccountId::new(account))
            .with_invoice(format!("lnzb1:{amount}:{hash}"), hash)
    }
}
