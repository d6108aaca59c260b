//! # zionbridge-clients
//!
//! External-capability contracts for the ZionBridge settlement coordinator.
//!
//! The coordinator never talks to the Lightning node or the ZION ledger
//! directly; it holds a [`ChannelClient`] and a [`LedgerClient`], injected
//! at construction. Production deployments back these with the node's RPC
//! surface (gRPC + macaroon for lnd, JSON-RPC for ZION); tests use the
//! deterministic doubles in [`mock`] (behind the `test-helpers` feature).
//!
//! ## Contract obligations
//!
//! Both contracts are written so the coordinator can be correct under
//! arbitrary single-step failure:
//!
//! - `pay_invoice` is **at-most-once per payment hash**: the node must
//!   dedupe by the hash, so a retried call can never double-send.
//! - `transfer` is **atomic, balance-conditioned, and at-most-once per
//!   idempotency key**: it rejects rather than overdraws, and replaying a
//!   key is a no-op that reports the original outcome.
//! - Business outcomes (`RoutingFailure`, `InsufficientFunds`, ...) are
//!   values, not errors; `Err` is reserved for transport-level failure
//!   where the outcome may be unknown.

pub mod channel;
pub mod ledger;

#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use channel::{ChannelClient, CreatedInvoice, DecodedInvoice, PaymentOutcome, PaymentStatus};
pub use ledger::{LedgerClient, TransferOutcome};

#[cfg(any(test, feature = "test-helpers"))]
pub use mock::{MockChannelNode, MockLedger, PayDirective};
