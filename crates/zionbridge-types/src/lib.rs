//! # zionbridge-types
//!
//! Shared types, errors, and configuration for **ZionBridge**, the
//! cross-ledger settlement coordinator between a Lightning Network node and
//! the ZION account ledger.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`SettlementId`], [`AccountId`], [`PaymentHash`]
//! - **Settlement model**: [`Settlement`], [`SettlementState`], [`Direction`]
//! - **Configuration**: [`CoordinatorConfig`], [`SweeperConfig`]
//! - **Errors**: [`BridgeError`] with `ZB_ERR_` prefix codes
//! - **Constants**: retry bounds, timeouts, and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod settlement;

// Re-export all primary types at crate root for ergonomic imports:
//   use zionbridge_types::{Settlement, SettlementState, BridgeError, ...};

pub use config::*;
pub use error::*;
pub use ids::*;
pub use settlement::*;

// Constants are accessed via `zionbridge_types::constants::FOO`
// (not re-exported to avoid name collisions).
