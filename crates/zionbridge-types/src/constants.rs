//! System-wide constants for the ZionBridge settlement coordinator.

/// Default timeout for a single external call (Lightning node or ZION RPC),
/// in milliseconds.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Default maximum attempts for the Lightning payment leg.
pub const DEFAULT_PAYMENT_ATTEMPTS: u32 = 3;

/// Default maximum attempts for the ledger transfer leg before the
/// settlement escalates to COMPENSATING.
pub const DEFAULT_TRANSFER_ATTEMPTS: u32 = 5;

/// Default base delay for exponential backoff between retries, milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 100;

/// Default cap on a single backoff delay, milliseconds.
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 5_000;

/// Default reconciliation sweep interval, milliseconds.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 30_000;

/// Default staleness threshold: a non-terminal settlement untouched for
/// longer than this is picked up by the sweeper, milliseconds.
pub const DEFAULT_STALENESS_MS: u64 = 60_000;

/// The ledger account that backs the bridge's channel liquidity: outbound
/// debits land here, inbound credits are drawn from here.
pub const DEFAULT_POOL_ACCOUNT: &str = "zion-lightning-pool";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name.
pub const SERVICE_NAME: &str = "ZionBridge";
