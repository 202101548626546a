//! Escrow ledger: the escrow state machine and everything it custodies.
//!
//! ## Lifecycle
//!
//! ```text
//!  initiate ──▶ PendingPayment ──deposit──▶ PendingApproval ──approve──▶ Approved
//!                    │                              │
//!                    └──archive──▶ Archived          └──cancel──▶ Canceled
//! ```
//!
//! Every mutating method checks its guards in a fixed order (role,
//! existence, state, value) and touches nothing until all of them pass.
//! On success it returns the single [`LedgerEvent`] describing the change;
//! the caller decides where the event goes.
//!
//! Fund movements project the custody totals they would produce and check
//! the conservation equations on the projection first. A movement that
//! would break conservation is refused before anything is written.

use chrono::{DateTime, Utc};
use escrowagent_access::AccessRegistry;
use escrowagent_types::{
    Address, Amount, EscrowAgentError, EscrowId, EscrowRecord, EscrowStatus, FeePercentage,
    LedgerEvent, Result, Settlement,
};

use crate::conservation::{CustodyInvariant, CustodyTotals};
use crate::custody::Custody;
use crate::fee_pool::FeePool;

/// Terms of a new escrow, as requested by an arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEscrow {
    pub buyer: Address,
    pub seller: Address,
    pub amount: Amount,
    pub description: String,
}

impl NewEscrow {
    #[must_use]
    pub fn new(buyer: Address, seller: Address, amount: Amount) -> Self {
        Self {
            buyer,
            seller,
            amount,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Escrow records, custody and the fee pool.
///
/// Authorization decisions are delegated to the [`AccessRegistry`] passed
/// into each call; the ledger holds no role state of its own.
#[derive(Debug, Clone)]
pub struct EscrowLedger {
    /// Indexed by `EscrowId`; ids are dense and never reused.
    escrows: Vec<EscrowRecord>,
    next_id: EscrowId,
    fee_percentage: FeePercentage,
    custody: Custody,
    fee_pool: FeePool,
}

impl EscrowLedger {
    #[must_use]
    pub fn new(fee_percentage: FeePercentage) -> Self {
        Self {
            escrows: Vec::new(),
            next_id: EscrowId(0),
            fee_percentage,
            custody: Custody::new(),
            fee_pool: FeePool::new(),
        }
    }

    // -----------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------

    /// Create an escrow in `PendingPayment`, capturing the current fee.
    ///
    /// # Errors
    /// - `NotAuthorized` unless `caller` is the Owner or an Agent
    /// - `InvalidCounterparty` if buyer and seller conflict
    /// - `InvalidAmount` if the amount is zero
    /// - `AmountOverflow` if the required deposit can't be represented
    pub fn initiate(
        &mut self,
        registry: &AccessRegistry,
        caller: &Address,
        terms: NewEscrow,
        now: DateTime<Utc>,
    ) -> Result<(EscrowId, LedgerEvent)> {
        registry.require_arbiter(caller, "initiate an escrow")?;
        registry.check_counterparties(&terms.buyer, &terms.seller)?;
        if terms.amount == 0 {
            return Err(EscrowAgentError::InvalidAmount {
                reason: "Escrow amount must be greater than zero".into(),
            });
        }
        self.fee_percentage.required_deposit(terms.amount)?;

        let id = self.next_id;
        let record = EscrowRecord::new(
            id,
            terms.buyer,
            terms.seller,
            terms.amount,
            self.fee_percentage,
            terms.description,
            now,
        );
        self.escrows.push(record.clone());
        self.next_id = id.next();

        tracing::info!(
            escrow = %id,
            agent = %caller,
            buyer = %record.buyer,
            seller = %record.seller,
            amount = record.amount,
            fee_pct = record.agent_fee_percentage.value(),
            "Escrow initiated"
        );
        Ok((
            id,
            LedgerEvent::EscrowInitiated {
                escrow: record,
                timestamp: now,
            },
        ))
    }

    /// The buyer pays principal plus fee into custody.
    ///
    /// # Errors
    /// - `NotFound` if `id` was never assigned
    /// - `NotAuthorized` unless `caller` is the escrow's buyer
    /// - `InvalidState` unless the escrow is `PendingPayment`
    /// - `AmountMismatch` unless `paid` equals the required deposit exactly
    pub fn deposit(
        &mut self,
        caller: &Address,
        id: EscrowId,
        paid: Amount,
        now: DateTime<Utc>,
    ) -> Result<LedgerEvent> {
        let record = self.get(id)?;
        if record.buyer != *caller {
            return Err(EscrowAgentError::not_authorized(
                *caller,
                "deposit into an escrow (Only buyer should deposit into an escrow)",
            ));
        }
        record.check_transition(EscrowStatus::PendingApproval, "Escrow is not awaiting payment")?;
        let expected = record.required_deposit()?;
        if paid != expected {
            return Err(EscrowAgentError::AmountMismatch {
                expected,
                actual: paid,
            });
        }

        self.audit("deposit", self.totals().after_deposit(paid)?)?;
        self.custody.receive(caller, paid)?;
        self.get_mut(id)?
            .transition(EscrowStatus::PendingApproval, now, "Escrow is not awaiting payment")?;

        tracing::info!(escrow = %id, buyer = %caller, amount = paid, "Escrow paid");
        Ok(LedgerEvent::EscrowPaid {
            id,
            buyer: *caller,
            amount: paid,
            timestamp: now,
        })
    }

    /// Refund the principal to the buyer; the fee goes to the pool.
    ///
    /// # Errors
    /// - `NotAuthorized` unless `caller` is the Owner or an Agent
    /// - `NotFound` if `id` was never assigned
    /// - `InvalidState` unless the escrow is `PendingApproval`
    pub fn cancel(
        &mut self,
        registry: &AccessRegistry,
        caller: &Address,
        id: EscrowId,
        now: DateTime<Utc>,
    ) -> Result<LedgerEvent> {
        registry.require_arbiter(caller, "cancel an escrow")?;
        let record = self.get(id)?;
        record.check_transition(EscrowStatus::Canceled, "Escrow cannot be canceled")?;
        let buyer = record.buyer;
        let settlement = self.settle(
            id,
            &buyer,
            EscrowStatus::Canceled,
            now,
            "Escrow cannot be canceled",
        )?;

        tracing::info!(
            escrow = %id,
            agent = %caller,
            buyer = %buyer,
            refund = settlement.principal,
            fee = settlement.fee,
            "Escrow canceled"
        );
        Ok(LedgerEvent::EscrowCanceled {
            id,
            buyer,
            refund: settlement.principal,
            fee: settlement.fee,
            timestamp: now,
        })
    }

    /// Pay the principal to the seller; the fee goes to the pool.
    ///
    /// # Errors
    /// - `NotAuthorized` unless `caller` is the Owner or an Agent
    /// - `NotFound` if `id` was never assigned
    /// - `InvalidState` unless the escrow is `PendingApproval`
    pub fn approve(
        &mut self,
        registry: &AccessRegistry,
        caller: &Address,
        id: EscrowId,
        now: DateTime<Utc>,
    ) -> Result<LedgerEvent> {
        registry.require_arbiter(caller, "approve an escrow")?;
        let record = self.get(id)?;
        record.check_transition(EscrowStatus::Approved, "Escrow cannot be approved")?;
        let seller = record.seller;
        let settlement = self.settle(
            id,
            &seller,
            EscrowStatus::Approved,
            now,
            "Escrow cannot be approved",
        )?;

        tracing::info!(
            escrow = %id,
            agent = %caller,
            seller = %seller,
            payout = settlement.principal,
            fee = settlement.fee,
            "Escrow approved"
        );
        Ok(LedgerEvent::EscrowApproved {
            id,
            seller,
            payout: settlement.principal,
            fee: settlement.fee,
            timestamp: now,
        })
    }

    /// Close an escrow that was never paid. No funds move.
    ///
    /// # Errors
    /// - `NotAuthorized` unless `caller` is the Owner or an Agent
    /// - `NotFound` if `id` was never assigned
    /// - `InvalidState` unless the escrow is `PendingPayment`
    pub fn archive(
        &mut self,
        registry: &AccessRegistry,
        caller: &Address,
        id: EscrowId,
        now: DateTime<Utc>,
    ) -> Result<LedgerEvent> {
        registry.require_arbiter(caller, "archive an escrow")?;
        self.get_mut(id)?
            .transition(EscrowStatus::Archived, now, "Can't archive active Escrow")?;

        tracing::info!(escrow = %id, agent = %caller, "Escrow archived");
        Ok(LedgerEvent::EscrowArchived { id, timestamp: now })
    }

    /// Transfer `amount` from the fee pool to the Owner.
    ///
    /// # Errors
    /// - `NotAuthorized` unless `caller` is the Owner
    /// - `InsufficientFunds` if `amount` exceeds the pool
    pub fn withdraw_funds(
        &mut self,
        registry: &AccessRegistry,
        caller: &Address,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<LedgerEvent> {
        registry.require_owner(caller, "withdraw funds")?;
        self.fee_pool.ensure_available(amount)?;
        self.audit("withdraw", self.totals().after_withdrawal(amount)?)?;

        self.fee_pool.withdraw(amount)?;
        self.custody.disburse(caller, amount)?;

        tracing::info!(owner = %caller, amount, remaining = self.fee_pool.balance(), "Funds withdrawn");
        Ok(LedgerEvent::FundsWithdrawn {
            to: *caller,
            amount,
            timestamp: now,
        })
    }

    /// Set the fee for escrows initiated from now on.
    ///
    /// # Errors
    /// - `NotAuthorized` unless `caller` is the Owner
    /// - `InvalidFeePercentage` if `pct > 100`
    pub fn change_agent_fee_percentage(
        &mut self,
        registry: &AccessRegistry,
        caller: &Address,
        pct: u8,
        now: DateTime<Utc>,
    ) -> Result<LedgerEvent> {
        registry.require_owner(caller, "change the agent fee percentage")?;
        let percentage = FeePercentage::new(pct)?;
        let previous = std::mem::replace(&mut self.fee_percentage, percentage);

        tracing::info!(from = %previous, to = %percentage, "Agent fee percentage updated");
        Ok(LedgerEvent::AgentFeePercentageUpdated {
            percentage,
            timestamp: now,
        })
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// # Errors
    /// Returns `NotFound` if `id` was never assigned.
    pub fn get(&self, id: EscrowId) -> Result<&EscrowRecord> {
        id.index()
            .and_then(|i| self.escrows.get(i))
            .ok_or(EscrowAgentError::NotFound(id))
    }

    /// All escrows in id order.
    #[must_use]
    pub fn all(&self) -> &[EscrowRecord] {
        &self.escrows
    }

    #[must_use]
    pub fn fee_percentage(&self) -> FeePercentage {
        self.fee_percentage
    }

    #[must_use]
    pub fn fee_pool_balance(&self) -> Amount {
        self.fee_pool.balance()
    }

    #[must_use]
    pub fn custody(&self) -> &Custody {
        &self.custody
    }

    #[must_use]
    pub fn fee_pool(&self) -> &FeePool {
        &self.fee_pool
    }

    /// Full custody audit, including a rescan of every escrow against the
    /// running held-deposit total. `O(n)` in the number of escrows.
    ///
    /// # Errors
    /// Returns `CustodyInvariantViolation` on any mismatch.
    pub fn verify_custody(&self) -> Result<()> {
        CustodyInvariant::verify(&self.custody, &self.fee_pool, &self.escrows)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn get_mut(&mut self, id: EscrowId) -> Result<&mut EscrowRecord> {
        id.index()
            .and_then(|i| self.escrows.get_mut(i))
            .ok_or(EscrowAgentError::NotFound(id))
    }

    fn totals(&self) -> CustodyTotals {
        CustodyTotals::of(&self.custody, &self.fee_pool)
    }

    /// Release a paid escrow: principal to `recipient`, fee to the pool.
    fn settle(
        &mut self,
        id: EscrowId,
        recipient: &Address,
        target: EscrowStatus,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<Settlement> {
        let settlement = self.get(id)?.settlement()?;
        let deposit = self.get(id)?.required_deposit()?;
        self.audit(&target.to_string(), self.totals().after_settlement(settlement)?)?;

        self.custody.release(deposit)?;
        self.custody.disburse(recipient, settlement.principal)?;
        self.fee_pool.collect(settlement.fee)?;
        self.get_mut(id)?.transition(target, now, reason)?;
        Ok(settlement)
    }

    /// Check a projected post-state before committing it.
    fn audit(&self, operation: &str, projected: CustodyTotals) -> Result<()> {
        CustodyInvariant::check(&projected).inspect_err(|e| {
            tracing::error!(operation, error = %e, "Custody invariant violated");
        })
    }
}
