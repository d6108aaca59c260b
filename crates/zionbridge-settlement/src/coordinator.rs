//! The settlement coordinator: drives every cross-ledger settlement
//! through its state machine.
//!
//! The one rule everything here follows: **persist intent before acting**.
//! Every state transition is written (and CAS-verified) before the external
//! call it licenses, so a crash at any point leaves a record the
//! reconciliation sweeper can resume from. The irreversible leg, the
//! Lightning payment, always runs last among the things that can still be
//! abandoned, and only ever under its payment-hash idempotency key.

use std::sync::Arc;

use tokio::time::{sleep, timeout};
use tracing::{info, warn};
use zionbridge_types::{
    AccountId, BridgeError, CoordinatorConfig, Direction, PaymentHash, Result, Settlement,
    SettlementId, SettlementState,
};

use zionbridge_clients::{
    ChannelClient, LedgerClient, PaymentOutcome, PaymentStatus, TransferOutcome,
};
use zionbridge_store::{SettlementStore, StateMeta};

use crate::reservation::ReservationTable;
use crate::retry::backoff_delay;

/// A caller's request for one settlement.
#[derive(Debug, Clone)]
pub struct SettleRequest {
    pub direction: Direction,
    /// Amount in the smallest shared unit.
    pub amount: u64,
    /// The ZION account being debited (outbound) or credited (inbound).
    pub ledger_account: AccountId,
    /// Required for outbound; must be absent for inbound (the bridge
    /// issues the invoice itself).
    pub invoice: Option<String>,
    /// Memo for the invoice the bridge issues on inbound settlements.
    pub memo: Option<String>,
}

impl SettleRequest {
    /// An outbound request: debit `account`, pay `invoice`.
    #[must_use]
    pub fn outbound(amount: u64, account: impl Into<AccountId>, invoice: impl Into<String>) -> Self {
        Self {
            direction: Direction::LedgerToChannel,
            amount,
            ledger_account: account.into(),
            invoice: Some(invoice.into()),
            memo: None,
        }
    }

    /// An inbound request: issue an invoice whose payment credits `account`.
    #[must_use]
    pub fn inbound(amount: u64, account: impl Into<AccountId>) -> Self {
        Self {
            direction: Direction::ChannelToLedger,
            amount,
            ledger_account: account.into(),
            invoice: None,
            memo: None,
        }
    }

    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// Coordinates settlements across the ZION ledger and the Lightning node.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and the store's
/// compare-and-swap arbitrates every race.
pub struct SettlementCoordinator {
    store: Arc<dyn SettlementStore>,
    ledger: Arc<dyn LedgerClient>,
    channel: Arc<dyn ChannelClient>,
    reservations: ReservationTable,
    config: CoordinatorConfig,
}

impl SettlementCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<dyn SettlementStore>,
        ledger: Arc<dyn LedgerClient>,
        channel: Arc<dyn ChannelClient>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            channel,
            reservations: ReservationTable::new(),
            config,
        }
    }

    /// Run one settlement as far as it can go right now.
    ///
    /// Validation failures return `Err` before any record exists. Failures
    /// after the record exists mark it `Failed` and return an `Err`
    /// carrying the settlement id. A settlement whose Lightning leg ran
    /// never returns `Err` for its ledger leg: it comes back `Ok` in a
    /// non-terminal state and the sweeper finishes the job.
    pub async fn settle(&self, request: SettleRequest) -> Result<Settlement> {
        if request.amount == 0 {
            return Err(BridgeError::InvalidAmount {
                amount: request.amount,
            });
        }
        match request.direction {
            Direction::LedgerToChannel => self.settle_outbound(request).await,
            Direction::ChannelToLedger => self.settle_inbound(request).await,
        }
    }

    /// Current record for a settlement. Terminal settlements stay
    /// queryable forever.
    pub async fn status(&self, id: SettlementId) -> Result<Settlement> {
        self.store.get(id).await
    }

    /// Cancel a settlement that has not run its irreversible leg.
    ///
    /// Cancelling marks the record `Failed`, which is terminal, so the
    /// node's ground truth is consulted first: a payment the node reports
    /// settled or still in flight refuses the cancel (the sweeper will
    /// finish that settlement instead), and so does an unreachable node.
    /// Only a hash the node reports failed, or has never seen, may be
    /// abandoned.
    pub async fn cancel(&self, id: SettlementId) -> Result<Settlement> {
        let settlement = self.store.get(id).await?;
        if !settlement.is_cancellable() {
            return Err(BridgeError::NotCancellable {
                id,
                state: settlement.state,
            });
        }
        if let Some(hash) = settlement.payment_hash {
            match self.payment_status_of(hash).await? {
                PaymentStatus::Settled => {
                    return Err(BridgeError::NotCancellable {
                        id,
                        state: settlement.state,
                    });
                }
                PaymentStatus::Pending
                    if settlement.state == SettlementState::LedgerReserved =>
                {
                    // An attempt exists and may still settle. Abandoning it
                    // now could strand a paid invoice in a terminal state.
                    return Err(BridgeError::AmbiguousPayment { id });
                }
                // Failed, never attempted, or an inbound invoice still
                // awaiting its payer: safe to abandon.
                _ => {}
            }
        }
        let cancelled = self
            .store
            .update_state(
                id,
                settlement.state,
                SettlementState::Failed,
                StateMeta::reason("cancelled by caller"),
            )
            .await?;
        if settlement.state == SettlementState::LedgerReserved {
            self.reservations
                .release(&settlement.ledger_account, settlement.amount)?;
        }
        info!(id = %id, "settlement cancelled");
        Ok(cancelled)
    }

    /// An inbound invoice was reported paid. Verifies against the node's
    /// ground truth, then applies the ledger credit. Idempotent: replayed
    /// notifications for a finished settlement return it unchanged.
    pub async fn notify_invoice_settled(&self, hash: PaymentHash) -> Result<Settlement> {
        let Some(settlement) = self.store.find_by_payment_hash(&hash).await? else {
            return Err(BridgeError::Internal(format!(
                "no settlement holds payment hash {hash}"
            )));
        };
        if settlement.direction != Direction::ChannelToLedger {
            return Err(BridgeError::Internal(format!(
                "settlement {} is not inbound",
                settlement.id
            )));
        }
        if settlement.is_terminal() {
            return Ok(settlement);
        }
        match self.payment_status_of(hash).await? {
            PaymentStatus::Settled => {}
            PaymentStatus::Pending | PaymentStatus::Unknown => {
                return Err(BridgeError::AmbiguousPayment { id: settlement.id });
            }
            PaymentStatus::Failed => {
                return Err(BridgeError::PaymentFailed {
                    id: settlement.id,
                    reason: "invoice payment failed on the network".into(),
                });
            }
        }
        match settlement.state {
            SettlementState::Created => {
                let settled = self
                    .store
                    .update_state(
                        settlement.id,
                        SettlementState::Created,
                        SettlementState::ChannelSettled,
                        StateMeta::none(),
                    )
                    .await?;
                self.run_credit(&settled).await
            }
            // A replayed notification while the credit is still pending.
            SettlementState::ChannelSettled => self.run_credit(&settlement).await,
            SettlementState::LedgerSettled => {
                self.store
                    .update_state(
                        settlement.id,
                        SettlementState::LedgerSettled,
                        SettlementState::Completed,
                        StateMeta::none(),
                    )
                    .await
            }
            _ => Ok(settlement),
        }
    }

    /// Pick up a settlement wherever its record says it stopped and drive
    /// it forward. Consults the node's ground truth before any ambiguous
    /// transition; never re-sends a payment blindly. Safe to call on any
    /// settlement in any state.
    pub async fn resume(&self, id: SettlementId) -> Result<Settlement> {
        let settlement = self.store.get(id).await?;
        if settlement.is_terminal() {
            return Ok(settlement);
        }
        match (settlement.state, settlement.direction) {
            (SettlementState::Created, Direction::LedgerToChannel) => {
                // Stopped between intake and reservation. Funds were never
                // touched, so restart admission from scratch.
                self.reserve_and_run(settlement).await
            }
            (SettlementState::Created, Direction::ChannelToLedger) => {
                self.resume_inbound_created(settlement).await
            }
            (SettlementState::LedgerReserved, Direction::LedgerToChannel) => {
                self.resume_reserved(settlement).await
            }
            (SettlementState::ChannelSettled, Direction::LedgerToChannel) => {
                self.run_debit(&settlement).await
            }
            (SettlementState::ChannelSettled, Direction::ChannelToLedger) => {
                self.run_credit(&settlement).await
            }
            (SettlementState::LedgerSettled, _) => {
                self.store
                    .update_state(
                        id,
                        SettlementState::LedgerSettled,
                        SettlementState::Completed,
                        StateMeta::none(),
                    )
                    .await
            }
            (SettlementState::Compensating, _) => {
                // Fence: the counterpart leg's idempotency key is retired,
                // the account already sits at its pre-attempt balance.
                let fenced = self
                    .store
                    .update_state(
                        id,
                        SettlementState::Compensating,
                        SettlementState::Compensated,
                        StateMeta::none(),
                    )
                    .await?;
                warn!(id = %id, "settlement compensated; counterpart leg fenced");
                Ok(fenced)
            }
            // States the coordinator never produces for this direction.
            (state, direction) => Err(BridgeError::Internal(format!(
                "settlement {id} in unexpected state {state} for direction {direction}"
            ))),
        }
    }

    /// Repopulate the in-process reservation table from durable
    /// `LedgerReserved` records. Call once at startup, before accepting
    /// new settlements.
    pub async fn rebuild_reservations(&self) -> Result<usize> {
        let reserved = self
            .store
            .list_by_state(SettlementState::LedgerReserved, chrono::Utc::now())
            .await?;
        for settlement in &reserved {
            self.reservations
                .restore(&settlement.ledger_account, settlement.amount)?;
        }
        if !reserved.is_empty() {
            info!(count = reserved.len(), "rebuilt reservations from durable records");
        }
        Ok(reserved.len())
    }

    // ---------------------------------------------------------------
    // Outbound: ledger -> channel
    // ---------------------------------------------------------------

    async fn settle_outbound(&self, request: SettleRequest) -> Result<Settlement> {
        let invoice = request.invoice.ok_or(BridgeError::MissingInvoice)?;
        let decoded = match timeout(
            self.config.call_timeout(),
            self.channel.decode_invoice(&invoice),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(BridgeError::ChannelUnavailable {
                    reason: "invoice decode timed out".into(),
                });
            }
        };
        if decoded.amount != request.amount {
            return Err(BridgeError::InvoiceAmountMismatch {
                invoice_amount: decoded.amount,
                requested: request.amount,
            });
        }
        // Also validates the account exists before any record is written.
        let balance = self.balance_of(&request.ledger_account).await?;

        let settlement = Settlement::new(
            Direction::LedgerToChannel,
            request.amount,
            request.ledger_account,
        )
        .with_invoice(invoice, decoded.payment_hash);
        let settlement = self.store.create(settlement).await?;
        info!(
            id = %settlement.id,
            amount = settlement.amount,
            account = %settlement.ledger_account,
            hash = %decoded.payment_hash.short(),
            "outbound settlement created"
        );
        self.admit_and_run(settlement, balance).await
    }

    /// Reserve against a freshly read balance, then run both legs.
    async fn admit_and_run(&self, settlement: Settlement, balance: u64) -> Result<Settlement> {
        if !self
            .reservations
            .try_reserve(&settlement.ledger_account, settlement.amount, balance)?
        {
            let available =
                balance.saturating_sub(self.reservations.outstanding(&settlement.ledger_account)?);
            self.store
                .update_state(
                    settlement.id,
                    SettlementState::Created,
                    SettlementState::Failed,
                    StateMeta::reason(format!(
                        "insufficient funds: need {}, have {available}",
                        settlement.amount
                    )),
                )
                .await?;
            return Err(BridgeError::InsufficientFunds {
                id: settlement.id,
                needed: settlement.amount,
                available,
            });
        }
        let reserved = match self
            .store
            .update_state(
                settlement.id,
                SettlementState::Created,
                SettlementState::LedgerReserved,
                StateMeta::none(),
            )
            .await
        {
            Ok(reserved) => reserved,
            Err(err) => {
                self.reservations
                    .release(&settlement.ledger_account, settlement.amount)?;
                return Err(err);
            }
        };
        let settled = self.run_payment(&reserved).await?;
        self.run_debit(&settled).await
    }

    async fn reserve_and_run(&self, settlement: Settlement) -> Result<Settlement> {
        let balance = self.balance_of(&settlement.ledger_account).await?;
        self.admit_and_run(settlement, balance).await
    }

    /// Resume an outbound settlement stopped in `LedgerReserved`. The
    /// payment may or may not have run; only the node knows.
    async fn resume_reserved(&self, settlement: Settlement) -> Result<Settlement> {
        let hash = settlement
            .payment_hash
            .ok_or(BridgeError::MissingInvoice)?;
        match self.payment_status_of(hash).await? {
            PaymentStatus::Settled => {
                let settled = self
                    .store
                    .update_state(
                        settlement.id,
                        SettlementState::LedgerReserved,
                        SettlementState::ChannelSettled,
                        StateMeta::none(),
                    )
                    .await?;
                self.run_debit(&settled).await
            }
            PaymentStatus::Failed => {
                let failed = self
                    .store
                    .update_state(
                        settlement.id,
                        SettlementState::LedgerReserved,
                        SettlementState::Failed,
                        StateMeta::reason("payment failed on the network"),
                    )
                    .await?;
                self.reservations
                    .release(&settlement.ledger_account, settlement.amount)?;
                Ok(failed)
            }
            PaymentStatus::Pending | PaymentStatus::Unknown => {
                // Never landed, or still in flight. The node dedupes by
                // hash, so replaying the attempt cannot double-send.
                let settled = self.run_payment(&settlement).await?;
                self.run_debit(&settled).await
            }
        }
    }

    /// The irreversible leg. Entered only from `LedgerReserved`; on
    /// success the settlement is `ChannelSettled`.
    async fn run_payment(&self, settlement: &Settlement) -> Result<Settlement> {
        let invoice = settlement
            .invoice
            .as_deref()
            .ok_or(BridgeError::MissingInvoice)?;
        let hash = settlement
            .payment_hash
            .ok_or(BridgeError::MissingInvoice)?;
        // Funds can move underneath a reservation (the ledger has other
        // writers). Re-check right before the irreversible leg; what a
        // drained balance means depends on what the node already knows.
        let balance = self.balance_of(&settlement.ledger_account).await?;
        if balance < settlement.amount {
            warn!(id = %settlement.id, balance, amount = settlement.amount, "balance drained under reservation");
            match self.payment_status_of(hash).await? {
                // The leg already ran; the balance gate no longer applies.
                // The replay below dedupes instead of sending.
                PaymentStatus::Settled => {}
                PaymentStatus::Failed => {
                    return self
                        .fail_payment(settlement, "payment failed on the network".into())
                        .await;
                }
                PaymentStatus::Unknown => {
                    // Never sent and no longer affordable. Close the record
                    // out rather than hold a reservation nothing can use.
                    self.store
                        .update_state(
                            settlement.id,
                            SettlementState::LedgerReserved,
                            SettlementState::Failed,
                            StateMeta::reason(format!(
                                "reservation no longer funded: need {}, have {balance}",
                                settlement.amount
                            )),
                        )
                        .await?;
                    self.reservations
                        .release(&settlement.ledger_account, settlement.amount)?;
                    return Err(BridgeError::InsufficientFunds {
                        id: settlement.id,
                        needed: settlement.amount,
                        available: balance,
                    });
                }
                PaymentStatus::Pending => {
                    // In flight; only the network can resolve it. Keep the
                    // reservation and let the sweeper re-ask.
                    return Err(BridgeError::InsufficientFunds {
                        id: settlement.id,
                        needed: settlement.amount,
                        available: balance,
                    });
                }
            }
        }
        let mut attempt: u32 = 1;
        loop {
            let outcome = match timeout(
                self.config.call_timeout(),
                self.channel.pay_invoice(invoice, hash),
            )
            .await
            {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) if err.is_transient() => {
                    warn!(id = %settlement.id, attempt, error = %err, "payment attempt could not reach the node");
                    if attempt >= self.config.max_payment_attempts {
                        // Stays LedgerReserved; the sweeper resolves it
                        // from the node's ground truth later.
                        return Err(err);
                    }
                    sleep(backoff_delay(
                        attempt,
                        self.config.backoff_base(),
                        self.config.backoff_cap(),
                    ))
                    .await;
                    attempt += 1;
                    continue;
                }
                Ok(Err(err)) => return Err(err),
                // An elapsed local deadline is the same ambiguity as a
                // node-reported timeout.
                Err(_) => PaymentOutcome::Timeout,
            };
            match outcome {
                PaymentOutcome::Settled => {
                    info!(id = %settlement.id, hash = %hash.short(), "lightning leg settled");
                    return self
                        .store
                        .update_state(
                            settlement.id,
                            SettlementState::LedgerReserved,
                            SettlementState::ChannelSettled,
                            StateMeta::none(),
                        )
                        .await;
                }
                PaymentOutcome::RoutingFailure { reason } => {
                    warn!(id = %settlement.id, attempt, %reason, "payment attempt failed definitively");
                    if attempt >= self.config.max_payment_attempts {
                        return self.fail_payment(settlement, reason).await;
                    }
                }
                PaymentOutcome::Timeout => {
                    // Outcome unknown. Ask before deciding anything.
                    match self.payment_status_of(hash).await {
                        Ok(PaymentStatus::Settled) => {
                            info!(id = %settlement.id, "timed-out payment turned out settled");
                            return self
                                .store
                                .update_state(
                                    settlement.id,
                                    SettlementState::LedgerReserved,
                                    SettlementState::ChannelSettled,
                                    StateMeta::none(),
                                )
                                .await;
                        }
                        // Unknown after a timeout means the send never
                        // reached the node, so a retry is just as safe.
                        Ok(PaymentStatus::Failed | PaymentStatus::Unknown) => {
                            if attempt >= self.config.max_payment_attempts {
                                return self
                                    .fail_payment(settlement, "payment timed out and failed".into())
                                    .await;
                            }
                        }
                        Ok(PaymentStatus::Pending) | Err(_) => {
                            // Still unknown. Leave the reservation in place
                            // and hand the settlement to the sweeper.
                            return Err(BridgeError::AmbiguousPayment { id: settlement.id });
                        }
                    }
                }
            }
            sleep(backoff_delay(
                attempt,
                self.config.backoff_base(),
                self.config.backoff_cap(),
            ))
            .await;
            attempt += 1;
        }
    }

    /// Definitive payment failure before the irreversible leg ran: release
    /// the reservation and close the record.
    async fn fail_payment(&self, settlement: &Settlement, reason: String) -> Result<Settlement> {
        // CAS first: whoever wins the transition owns the release. A loser
        // (the sweeper racing us, or vice versa) must not release a
        // reservation the winner already accounted for.
        self.store
            .update_state(
                settlement.id,
                SettlementState::LedgerReserved,
                SettlementState::Failed,
                StateMeta::reason(reason.clone()),
            )
            .await?;
        self.reservations
            .release(&settlement.ledger_account, settlement.amount)?;
        Err(BridgeError::PaymentFailed {
            id: settlement.id,
            reason,
        })
    }

    /// The ledger debit after a settled payment. Entered from
    /// `ChannelSettled`; ends in `Completed`, `Compensating`, or (on
    /// transport ambiguity) stays put for the sweeper to replay.
    async fn run_debit(&self, settlement: &Settlement) -> Result<Settlement> {
        let key = settlement.id.transfer_key();
        let mut attempt: u32 = 1;
        loop {
            let call = self.ledger.transfer(
                &settlement.ledger_account,
                &self.config.pool_account,
                settlement.amount,
                &key,
            );
            match timeout(self.config.call_timeout(), call).await {
                Ok(Ok(TransferOutcome::Applied)) => {
                    // The key dedups, so a racing sweeper sees Applied too.
                    // Only the CAS winner releases the reservation.
                    let completed = self
                        .store
                        .update_state(
                            settlement.id,
                            SettlementState::ChannelSettled,
                            SettlementState::Completed,
                            StateMeta::none(),
                        )
                        .await?;
                    self.reservations
                        .release(&settlement.ledger_account, settlement.amount)?;
                    info!(id = %settlement.id, "outbound settlement completed");
                    return Ok(completed);
                }
                Ok(Ok(TransferOutcome::InsufficientFunds { available })) => {
                    // Explicitly rejected, so definitely not applied. No
                    // point retrying a balance that cannot cover it.
                    return self
                        .enter_compensating(
                            settlement,
                            format!(
                                "debit rejected: insufficient funds ({available} available)"
                            ),
                        )
                        .await;
                }
                Ok(Ok(TransferOutcome::TransientError { reason })) => {
                    warn!(id = %settlement.id, attempt, %reason, "debit rejected");
                    if attempt >= self.config.max_transfer_attempts {
                        return self
                            .enter_compensating(
                                settlement,
                                format!("debit rejected after {attempt} attempts: {reason}"),
                            )
                            .await;
                    }
                }
                // Transport failure or local timeout: the transfer may or
                // may not have applied. The idempotency key makes a replay
                // safe, so retry now and leave the rest to the sweeper.
                Ok(Err(err)) => {
                    warn!(id = %settlement.id, attempt, error = %err, "debit could not reach the ledger");
                    if attempt >= self.config.max_transfer_attempts {
                        return self.store.get(settlement.id).await;
                    }
                }
                Err(_) => {
                    warn!(id = %settlement.id, attempt, "debit call timed out");
                    if attempt >= self.config.max_transfer_attempts {
                        return self.store.get(settlement.id).await;
                    }
                }
            }
            sleep(backoff_delay(
                attempt,
                self.config.backoff_base(),
                self.config.backoff_cap(),
            ))
            .await;
            attempt += 1;
        }
    }

    /// The Lightning leg ran but the ledger explicitly refuses the
    /// counterpart leg. Record the divergence, retire the transfer key,
    /// and release the reservation (the balance was never touched). The
    /// sweeper fences the record to `Compensated`.
    async fn enter_compensating(
        &self,
        settlement: &Settlement,
        reason: String,
    ) -> Result<Settlement> {
        warn!(id = %settlement.id, %reason, "entering compensation");
        let compensating = self
            .store
            .update_state(
                settlement.id,
                SettlementState::ChannelSettled,
                SettlementState::Compensating,
                StateMeta::reason(reason),
            )
            .await?;
        if settlement.direction == Direction::LedgerToChannel {
            self.reservations
                .release(&settlement.ledger_account, settlement.amount)?;
        }
        Ok(compensating)
    }

    // ---------------------------------------------------------------
    // Inbound: channel -> ledger
    // ---------------------------------------------------------------

    async fn settle_inbound(&self, request: SettleRequest) -> Result<Settlement> {
        // The account must exist before we hand an invoice to a payer.
        self.balance_of(&request.ledger_account).await?;
        let settlement = self
            .store
            .create(Settlement::new(
                Direction::ChannelToLedger,
                request.amount,
                request.ledger_account,
            ))
            .await?;
        let memo = request
            .memo
            .unwrap_or_else(|| format!("zionbridge settlement {}", settlement.id));
        let created = match timeout(
            self.config.call_timeout(),
            self.channel.create_invoice(settlement.amount, &memo),
        )
        .await
        {
            Ok(Ok(created)) => created,
            Ok(Err(err)) => {
                self.store
                    .update_state(
                        settlement.id,
                        SettlementState::Created,
                        SettlementState::Failed,
                        StateMeta::reason(format!("invoice could not be issued: {err}")),
                    )
                    .await?;
                return Err(err);
            }
            Err(_) => {
                self.store
                    .update_state(
                        settlement.id,
                        SettlementState::Created,
                        SettlementState::Failed,
                        StateMeta::reason("invoice issuance timed out"),
                    )
                    .await?;
                return Err(BridgeError::ChannelUnavailable {
                    reason: "invoice issuance timed out".into(),
                });
            }
        };
        info!(
            id = %settlement.id,
            amount = settlement.amount,
            hash = %created.payment_hash.short(),
            "inbound settlement created, awaiting payment"
        );
        self.store
            .set_invoice(settlement.id, created.invoice, created.payment_hash)
            .await
    }

    async fn resume_inbound_created(&self, settlement: Settlement) -> Result<Settlement> {
        let Some(hash) = settlement.payment_hash else {
            // Stopped before the node issued an invoice; the caller never
            // got one, so nothing can ever pay this.
            return self
                .store
                .update_state(
                    settlement.id,
                    SettlementState::Created,
                    SettlementState::Failed,
                    StateMeta::reason("no invoice was issued"),
                )
                .await;
        };
        match self.payment_status_of(hash).await? {
            PaymentStatus::Settled => {
                let settled = self
                    .store
                    .update_state(
                        settlement.id,
                        SettlementState::Created,
                        SettlementState::ChannelSettled,
                        StateMeta::none(),
                    )
                    .await?;
                self.run_credit(&settled).await
            }
            PaymentStatus::Failed => {
                self.store
                    .update_state(
                        settlement.id,
                        SettlementState::Created,
                        SettlementState::Failed,
                        StateMeta::reason("invoice payment failed on the network"),
                    )
                    .await
            }
            // Still waiting for a payer. Not this sweep's problem.
            PaymentStatus::Pending | PaymentStatus::Unknown => Ok(settlement),
        }
    }

    /// The ledger credit after an inbound payment settled. Entered from
    /// `ChannelSettled`; ends in `Completed` via `LedgerSettled`.
    async fn run_credit(&self, settlement: &Settlement) -> Result<Settlement> {
        let key = settlement.id.transfer_key();
        let mut attempt: u32 = 1;
        loop {
            let call = self.ledger.transfer(
                &self.config.pool_account,
                &settlement.ledger_account,
                settlement.amount,
                &key,
            );
            match timeout(self.config.call_timeout(), call).await {
                Ok(Ok(TransferOutcome::Applied)) => {
                    self.store
                        .update_state(
                            settlement.id,
                            SettlementState::ChannelSettled,
                            SettlementState::LedgerSettled,
                            StateMeta::none(),
                        )
                        .await?;
                    info!(id = %settlement.id, "inbound settlement completed");
                    return self
                        .store
                        .update_state(
                            settlement.id,
                            SettlementState::LedgerSettled,
                            SettlementState::Completed,
                            StateMeta::none(),
                        )
                        .await;
                }
                Ok(Ok(rejected @ (TransferOutcome::TransientError { .. }
                | TransferOutcome::InsufficientFunds { .. }))) => {
                    // A drained pool behaves like any other explicit
                    // rejection here: retry, then record the divergence.
                    let reason = match rejected {
                        TransferOutcome::TransientError { reason } => reason,
                        TransferOutcome::InsufficientFunds { available } => {
                            format!("pool holds only {available}")
                        }
                        TransferOutcome::Applied => unreachable!(),
                    };
                    warn!(id = %settlement.id, attempt, %reason, "credit rejected");
                    if attempt >= self.config.max_transfer_attempts {
                        return self
                            .enter_compensating(
                                settlement,
                                format!("credit rejected after {attempt} attempts: {reason}"),
                            )
                            .await;
                    }
                }
                Ok(Err(err)) => {
                    warn!(id = %settlement.id, attempt, error = %err, "credit could not reach the ledger");
                    if attempt >= self.config.max_transfer_attempts {
                        return self.store.get(settlement.id).await;
                    }
                }
                Err(_) => {
                    warn!(id = %settlement.id, attempt, "credit call timed out");
                    if attempt >= self.config.max_transfer_attempts {
                        return self.store.get(settlement.id).await;
                    }
                }
            }
            sleep(backoff_delay(
                attempt,
                self.config.backoff_base(),
                self.config.backoff_cap(),
            ))
            .await;
            attempt += 1;
        }
    }

    // ---------------------------------------------------------------
    // External-call wrappers
    // ---------------------------------------------------------------

    async fn balance_of(&self, account: &AccountId) -> Result<u64> {
        match timeout(self.config.call_timeout(), self.ledger.get_balance(account)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::LedgerUnavailable {
                reason: "balance query timed out".into(),
            }),
        }
    }

    async fn payment_status_of(&self, hash: PaymentHash) -> Result<PaymentStatus> {
        match timeout(self.config.call_timeout(), self.channel.payment_status(hash)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::ChannelUnavailable {
                reason: "payment status query timed out".into(),
            }),
        }
    }
}
