//! Error types for the ZionBridge settlement coordinator.
//!
//! All errors use the `ZB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors (caller input, never retried)
//! - 2xx: Funds errors (business rejection, never retried)
//! - 3xx: Channel (Lightning) leg errors
//! - 4xx: Ledger leg errors
//! - 5xx: Settlement store errors
//! - 9xx: General / internal errors
//!
//! Divergence risk is deliberately *not* an error variant: it manifests as
//! the `Compensating` settlement state and is never surfaced to the caller.

use thiserror::Error;

use crate::{AccountId, PaymentHash, SettlementId, SettlementState};

/// Central error enum for all ZionBridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// The requested amount is not a positive integer.
    #[error("ZB_ERR_100: Invalid amount: {amount} (must be > 0)")]
    InvalidAmount { amount: u64 },

    /// The supplied invoice could not be decoded.
    #[error("ZB_ERR_101: Invoice could not be decoded: {reason}")]
    InvoiceUndecodable { reason: String },

    /// The invoice's requested amount does not equal the settlement amount.
    /// Rejected so a caller cannot under- or over-fund a precomputed invoice.
    #[error("ZB_ERR_102: Invoice amount mismatch: invoice asks {invoice_amount}, request says {requested}")]
    InvoiceAmountMismatch { invoice_amount: u64, requested: u64 },

    /// An outbound settlement was requested without an invoice.
    #[error("ZB_ERR_103: Outbound settlement requires an invoice")]
    MissingInvoice,

    /// The ledger does not know this account.
    #[error("ZB_ERR_104: Unknown ledger account: {0}")]
    UnknownAccount(AccountId),

    /// Cancellation requested after the irreversible leg.
    #[error("ZB_ERR_105: Settlement {id} cannot be cancelled in state {state}")]
    NotCancellable {
        id: SettlementId,
        state: SettlementState,
    },

    /// A live settlement already holds this payment hash. At most one
    /// settlement per hash may ever reach `ChannelSettled`.
    #[error("ZB_ERR_106: Payment hash already in use: {0}")]
    DuplicatePaymentHash(PaymentHash),

    // =================================================================
    // Funds Errors (2xx)
    // =================================================================
    /// Not enough available balance at reservation time.
    #[error("ZB_ERR_200: Insufficient funds for settlement {id}: need {needed}, have {available}")]
    InsufficientFunds {
        id: SettlementId,
        needed: u64,
        available: u64,
    },

    // =================================================================
    // Channel (Lightning) Errors (3xx)
    // =================================================================
    /// The Lightning payment definitively failed before execution
    /// (routing failure, expired invoice) and retries are exhausted.
    /// The reservation was released; no ledger mutation occurred.
    #[error("ZB_ERR_300: Lightning payment failed for settlement {id}: {reason}")]
    PaymentFailed { id: SettlementId, reason: String },

    /// The payment attempt timed out and the node still reports it pending:
    /// outcome unknown. The settlement stays `LedgerReserved` and the
    /// sweeper resolves it from ground truth, never by a blind retry.
    #[error("ZB_ERR_301: Payment outcome unknown for settlement {id}; reconciliation pending")]
    AmbiguousPayment { id: SettlementId },

    /// The Lightning node is temporarily unreachable.
    #[error("ZB_ERR_302: Lightning node unavailable: {reason}")]
    ChannelUnavailable { reason: String },

    // =================================================================
    // Ledger Errors (4xx)
    // =================================================================
    /// The ZION ledger is temporarily unreachable.
    #[error("ZB_ERR_400: ZION ledger unavailable: {reason}")]
    LedgerUnavailable { reason: String },

    // =================================================================
    // Store Errors (5xx)
    // =================================================================
    /// Compare-and-swap failed: another actor already moved the settlement.
    #[error("ZB_ERR_500: State conflict on settlement {id}: expected {expected}, found {actual}")]
    StateConflict {
        id: SettlementId,
        expected: SettlementState,
        actual: SettlementState,
    },

    /// The requested settlement does not exist.
    #[error("ZB_ERR_501: Settlement not found: {0}")]
    NotFound(SettlementId),

    /// The requested transition is not in the state machine's table.
    #[error("ZB_ERR_502: Invalid transition for settlement {id}: {from} -> {to}")]
    InvalidTransition {
        id: SettlementId,
        from: SettlementState,
        to: SettlementState,
    },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("ZB_ERR_900: Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Whether the caller may retry the *whole operation* after this error.
    /// Validation and business rejections are final; infrastructure
    /// unavailability is not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ChannelUnavailable { .. } | Self::LedgerUnavailable { .. }
        )
    }

    /// The settlement this error is attached to, when one was created.
    /// Callers use it for later `status` lookup (failed settlements remain
    /// queryable forever).
    #[must_use]
    pub fn settlement_id(&self) -> Option<SettlementId> {
        match self {
            Self::NotCancellable { id, .. }
            | Self::InsufficientFunds { id, .. }
            | Self::PaymentFailed { id, .. }
            | Self::AmbiguousPayment { id }
            | Self::StateConflict { id, .. }
            | Self::InvalidTransition { id, .. }
            | Self::NotFound(id) => Some(*id),
            _ => None,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = BridgeError::InvalidAmount { amount: 0 };
        let msg = format!("{err}");
        assert!(msg.starts_with("ZB_ERR_100"), "Got: {msg}");
    }

    #[test]
    fn insufficient_funds_display() {
        let id = SettlementId::new();
        let err = BridgeError::InsufficientFunds {
            id,
            needed: 1000,
            available: 500,
        };
        let msg = format!("{err}");
        assert!(msg.contains("ZB_ERR_200"));
        assert!(msg.contains("1000"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn all_errors_have_zb_err_prefix() {
        let id = SettlementId::new();
        let errors: Vec<BridgeError> = vec![
            BridgeError::MissingInvoice,
            BridgeError::UnknownAccount(AccountId::new("x")),
            BridgeError::DuplicatePaymentHash(PaymentHash::from_bytes([0u8; 32])),
            BridgeError::AmbiguousPayment { id },
            BridgeError::ChannelUnavailable {
                reason: "dial".into(),
            },
            BridgeError::LedgerUnavailable {
                reason: "rpc".into(),
            },
            BridgeError::NotFound(id),
            BridgeError::Internal("test".into()),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(msg.starts_with("ZB_ERR_"), "Error missing prefix: {msg}");
        }
    }

    #[test]
    fn transient_classification() {
        assert!(
            BridgeError::LedgerUnavailable {
                reason: "down".into()
            }
            .is_transient()
        );
        assert!(
            BridgeError::ChannelUnavailable {
                reason: "down".into()
            }
            .is_transient()
        );
        assert!(!BridgeError::MissingInvoice.is_transient());
        assert!(
            !BridgeError::InsufficientFunds {
                id: SettlementId::new(),
                needed: 1,
                available: 0
            }
            .is_transient()
        );
    }

    #[test]
    fn settlement_id_attachment() {
        let id = SettlementId::new();
        assert_eq!(
            BridgeError::AmbiguousPayment { id }.settlement_id(),
            Some(id)
        );
        assert_eq!(BridgeError::MissingInvoice.settlement_id(), None);
    }
}
