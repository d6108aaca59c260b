//! The Lightning-node contract.
//!
//! `pay_invoice` is the one irreversible operation in the whole system, so
//! its contract carries the heaviest obligations: the implementation must
//! dedupe by payment hash (replaying a hash that already settled returns
//! `Settled` without moving funds again), and it must distinguish "the node
//! told me the payment failed" from "I don't know what happened". The
//! coordinator's correctness under crashes rests entirely on that split.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zionbridge_types::{PaymentHash, Result};

/// An invoice freshly issued by our own node, for an inbound settlement.
#[derive(Debug, Clone)]
pub struct CreatedInvoice {
    /// The encoded invoice string handed to the remote payer.
    pub invoice: String,
    /// The payment hash the node derived for it.
    pub payment_hash: PaymentHash,
}

/// The fields of a decoded invoice the coordinator cares about.
#[derive(Debug, Clone)]
pub struct DecodedInvoice {
    /// The amount the invoice asks for, in the smallest unit.
    pub amount: u64,
    /// The payment hash embedded in the invoice.
    pub payment_hash: PaymentHash,
}

/// The definitive outcome of a payment attempt, as reported by the node.
///
/// These are business outcomes, not transport errors. A `RoutingFailure`
/// means the node is certain no funds moved; `Timeout` means the attempt is
/// still in flight from the node's point of view and the true outcome must
/// be read back later via [`ChannelClient::payment_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The payment settled. The preimage is held by the node.
    Settled,
    /// The node is certain the payment did not and will not go through.
    RoutingFailure { reason: String },
    /// The attempt outlived its deadline with no verdict. Funds may or may
    /// not have moved.
    Timeout,
}

/// The node's current knowledge about a payment hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// The payment settled at some point.
    Settled,
    /// The payment terminally failed. No funds moved.
    Failed,
    /// The payment is in flight, or the invoice is still awaiting payment.
    Pending,
    /// The node has no record of this hash: a payment under it was never
    /// attempted. Distinct from `Pending`, where an attempt exists and may
    /// still settle.
    Unknown,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Settled => "SETTLED",
            Self::Failed => "FAILED",
            Self::Pending => "PENDING",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Client for the bridge's own Lightning node.
///
/// All methods return `Err` only for transport-level failure where the
/// node could not be asked at all.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Issue an invoice on our node for `amount`, carrying `memo`.
    async fn create_invoice(&self, amount: u64, memo: &str) -> Result<CreatedInvoice>;

    /// Decode a remote invoice without paying it.
    ///
    /// Fails with `InvoiceUndecodable` when the string is not an invoice.
    async fn decode_invoice(&self, invoice: &str) -> Result<DecodedInvoice>;

    /// Pay a remote invoice. At most once per payment hash: if the node has
    /// already settled `idempotency_key`, this returns
    /// [`PaymentOutcome::Settled`] without sending again.
    async fn pay_invoice(
        &self,
        invoice: &str,
        idempotency_key: PaymentHash,
    ) -> Result<PaymentOutcome>;

    /// Ask the node what it knows about a payment hash. This is the ground
    /// truth the reconciliation sweeper consults before touching any
    /// ambiguous settlement.
    async fn payment_status(&self, payment_hash: PaymentHash) -> Result<PaymentStatus>;
}
