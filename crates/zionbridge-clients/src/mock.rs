//! Deterministic in-process doubles for the Lightning node and the ZION
//! ledger.
//!
//! Both mocks honor the full contract of their trait, idempotency
//! guarantees included, and expose counters so tests can assert *exactly
//! once* rather than *at least once*. Failure injection is script-driven:
//! queue directives up front, then watch the coordinator work through them.
//!
//! Invoices use the toy encoding `lnzb1:{amount}:{payment_hash_hex}`, which
//! is enough to exercise decode, amount matching, and hash extraction.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use zionbridge_types::{AccountId, BridgeError, PaymentHash, Result};

use crate::channel::{ChannelClient, CreatedInvoice, DecodedInvoice, PaymentOutcome, PaymentStatus};
use crate::ledger::{LedgerClient, TransferOutcome};

/// One scripted response for the next `pay_invoice` call.
#[derive(Debug, Clone)]
pub enum PayDirective {
    /// The node reports a definitive routing failure. No funds move.
    RoutingFailure,
    /// The attempt times out; `then` is what actually happened on the
    /// network, which `payment_status` will report afterwards.
    Timeout { then: PaymentStatus },
    /// The node cannot be reached at all.
    Unavailable,
}

#[derive(Debug)]
struct InvoiceRecord {
    amount: u64,
    status: PaymentStatus,
    /// Issued by "a remote node" rather than this one. The node tracks a
    /// remote invoice only once a payment attempt for it reaches it.
    external: bool,
    /// A payment attempt made it to the node (an `Unavailable` directive
    /// does not count: the call never arrived).
    node_seen: bool,
    /// Times the network actually moved funds for this hash. The whole
    /// point of the mock: this must never exceed 1.
    settle_count: u32,
    /// Times `pay_invoice` reached this record (dedup short-circuits
    /// included).
    pay_attempts: u32,
}

#[derive(Debug, Default)]
struct ChannelInner {
    invoices: HashMap<PaymentHash, InvoiceRecord>,
    script: VecDeque<PayDirective>,
}

/// In-process Lightning node double.
#[derive(Debug, Default)]
pub struct MockChannelNode {
    inner: Mutex<ChannelInner>,
}

impl MockChannelNode {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        self.inner.lock().expect("channel mock lock poisoned")
    }

    fn register(inner: &mut ChannelInner, amount: u64, external: bool) -> (String, PaymentHash) {
        let preimage: [u8; 32] = rand::random();
        let hash = PaymentHash::from_bytes(Sha256::digest(preimage).into());
        let invoice = format!("lnzb1:{amount}:{hash}");
        inner.invoices.insert(
            hash,
            InvoiceRecord {
                amount,
                status: PaymentStatus::Pending,
                external,
                node_seen: false,
                settle_count: 0,
                pay_attempts: 0,
            },
        );
        (invoice, hash)
    }

    /// An invoice "issued by a remote node", payable through `pay_invoice`.
    pub fn issue_external_invoice(&self, amount: u64) -> String {
        let (invoice, _) = Self::register(&mut self.lock(), amount, true);
        invoice
    }

    /// Queue a directive consumed by the next `pay_invoice` call. With an
    /// empty script, payments settle immediately.
    pub fn script_payment(&self, directive: PayDirective) {
        self.lock().script.push_back(directive);
    }

    /// Simulate a remote payer settling one of our own invoices.
    pub fn mark_invoice_settled(&self, hash: &PaymentHash) {
        let mut inner = self.lock();
        if let Some(rec) = inner.invoices.get_mut(hash) {
            if rec.status != PaymentStatus::Settled {
                rec.status = PaymentStatus::Settled;
                rec.settle_count += 1;
            }
        }
    }

    /// Resolve a payment left pending by `PayDirective::Timeout`.
    pub fn resolve_payment(&self, hash: &PaymentHash, status: PaymentStatus) {
        let mut inner = self.lock();
        if let Some(rec) = inner.invoices.get_mut(hash) {
            if status == PaymentStatus::Settled && rec.status != PaymentStatus::Settled {
                rec.settle_count += 1;
            }
            rec.status = status;
            rec.node_seen = true;
        }
    }

    /// How many times funds actually moved for this hash.
    #[must_use]
    pub fn settle_count(&self, hash: &PaymentHash) -> u32 {
        self.lock().invoices.get(hash).map_or(0, |r| r.settle_count)
    }

    /// How many times `pay_invoice` was called for this hash.
    #[must_use]
    pub fn pay_attempts(&self, hash: &PaymentHash) -> u32 {
        self.lock().invoices.get(hash).map_or(0, |r| r.pay_attempts)
    }

    fn parse(invoice: &str) -> Result<(u64, PaymentHash)> {
        let undecodable = |reason: &str| BridgeError::InvoiceUndecodable {
            reason: reason.to_string(),
        };
        let rest = invoice
            .strip_prefix("lnzb1:")
            .ok_or_else(|| undecodable("missing lnzb1 prefix"))?;
        let (amount, hash_hex) = rest
            .split_once(':')
            .ok_or_else(|| undecodable("missing payment hash"))?;
        let amount: u64 = amount.parse().map_err(|_| undecodable("bad amount"))?;
        let hash =
            PaymentHash::from_hex(hash_hex).ok_or_else(|| undecodable("bad payment hash"))?;
        Ok((amount, hash))
    }
}

#[async_trait]
impl ChannelClient for MockChannelNode {
    async fn create_invoice(&self, amount: u64, _memo: &str) -> Result<CreatedInvoice> {
        let (invoice, payment_hash) = Self::register(&mut self.lock(), amount, false);
        Ok(CreatedInvoice {
            invoice,
            payment_hash,
        })
    }

    async fn decode_invoice(&self, invoice: &str) -> Result<DecodedInvoice> {
        let (amount, payment_hash) = Self::parse(invoice)?;
        Ok(DecodedInvoice {
            amount,
            payment_hash,
        })
    }

    async fn pay_invoice(
        &self,
        invoice: &str,
        idempotency_key: PaymentHash,
    ) -> Result<PaymentOutcome> {
        let (_, hash) = Self::parse(invoice)?;
        if hash != idempotency_key {
            return Err(BridgeError::Internal(
                "idempotency key does not match invoice".into(),
            ));
        }
        let mut inner = self.lock();
        let directive = inner.script.pop_front();
        let rec = inner
            .invoices
            .get_mut(&hash)
            .ok_or_else(|| BridgeError::Internal(format!("unknown invoice hash {hash}")))?;
        rec.pay_attempts += 1;
        // Hash-level dedup, same as a real node: an already settled payment
        // is reported settled, never sent again.
        if rec.status == PaymentStatus::Settled {
            return Ok(PaymentOutcome::Settled);
        }
        match directive {
            None => {
                rec.node_seen = true;
                rec.status = PaymentStatus::Settled;
                rec.settle_count += 1;
                Ok(PaymentOutcome::Settled)
            }
            Some(PayDirective::RoutingFailure) => {
                rec.node_seen = true;
                rec.status = PaymentStatus::Failed;
                Ok(PaymentOutcome::RoutingFailure {
                    reason: "no route found".into(),
                })
            }
            Some(PayDirective::Timeout { then }) => {
                rec.node_seen = true;
                if then == PaymentStatus::Settled {
                    rec.settle_count += 1;
                }
                rec.status = then;
                Ok(PaymentOutcome::Timeout)
            }
            Some(PayDirective::Unavailable) => Err(BridgeError::ChannelUnavailable {
                reason: "connection refused".into(),
            }),
        }
    }

    async fn payment_status(&self, payment_hash: PaymentHash) -> Result<PaymentStatus> {
        self.lock()
            .invoices
            .get(&payment_hash)
            .map(|r| {
                // A remote invoice the node was never asked to pay has no
                // payment record, same as lnd's payment-not-found.
                if r.external && !r.node_seen && r.status == PaymentStatus::Pending {
                    PaymentStatus::Unknown
                } else {
                    r.status
                }
            })
            .ok_or_else(|| BridgeError::Internal(format!("unknown payment hash {payment_hash}")))
    }
}

#[derive(Debug, Default)]
struct LedgerInner {
    accounts: HashMap<AccountId, u64>,
    applied_keys: HashSet<String>,
    fail_next: u32,
    always_fail: bool,
    unreachable: bool,
    transfer_calls: u64,
}

/// In-process ZION ledger double: atomic conditioned transfers with
/// idempotency-key dedup.
#[derive(Debug, Default)]
pub struct MockLedger {
    inner: Mutex<LedgerInner>,
}

impl MockLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().expect("ledger mock lock poisoned")
    }

    pub fn open_account(&self, account: &AccountId, balance: u64) {
        self.lock().accounts.insert(account.clone(), balance);
    }

    /// Direct balance read for assertions.
    #[must_use]
    pub fn balance_of(&self, account: &AccountId) -> Option<u64> {
        self.lock().accounts.get(account).copied()
    }

    /// The next `n` transfers are rejected with `TransferOutcome::TransientError`.
    pub fn fail_next_transfers(&self, n: u32) {
        self.lock().fail_next = n;
    }

    /// Every transfer from now on is rejected with `TransientError`.
    pub fn always_fail_transfers(&self, on: bool) {
        self.lock().always_fail = on;
    }

    /// When set, every call fails at the transport level.
    pub fn set_unreachable(&self, on: bool) {
        self.lock().unreachable = on;
    }

    /// Total `transfer` calls that reached the ledger.
    #[must_use]
    pub fn transfer_calls(&self) -> u64 {
        self.lock().transfer_calls
    }

    /// Distinct idempotency keys that were actually applied.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.lock().applied_keys.len()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_balance(&self, account: &AccountId) -> Result<u64> {
        let inner = self.lock();
        if inner.unreachable {
            return Err(BridgeError::LedgerUnavailable {
                reason: "rpc unreachable".into(),
            });
        }
        inner
            .accounts
            .get(account)
            .copied()
            .ok_or_else(|| BridgeError::UnknownAccount(account.clone()))
    }

    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
        idempotency_key: &str,
    ) -> Result<TransferOutcome> {
        let mut inner = self.lock();
        if inner.unreachable {
            return Err(BridgeError::LedgerUnavailable {
                reason: "rpc unreachable".into(),
            });
        }
        inner.transfer_calls += 1;
        // Key replay reports the original outcome without moving funds.
        if inner.applied_keys.contains(idempotency_key) {
            return Ok(TransferOutcome::Applied);
        }
        if inner.always_fail || inner.fail_next > 0 {
            inner.fail_next = inner.fail_next.saturating_sub(1);
            return Ok(TransferOutcome::TransientError {
                reason: "ledger write rejected".into(),
            });
        }
        let available = inner
            .accounts
            .get(from)
            .copied()
            .ok_or_else(|| BridgeError::UnknownAccount(from.clone()))?;
        if available < amount {
            return Ok(TransferOutcome::InsufficientFunds { available });
        }
        if !inner.accounts.contains_key(to) {
            return Err(BridgeError::UnknownAccount(to.clone()));
        }
        // Check and apply under one lock: the real ledger's transfer is a
        // single atomic operation.
        inner.accounts.insert(from.clone(), available - amount);
        if let Some(dest) = inner.accounts.get_mut(to) {
            *dest += amount;
        }
        inner.applied_keys.insert(idempotency_key.to_string());
        Ok(TransferOutcome::Applied)
    }
}
