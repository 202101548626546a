//! Custodied funds.
//!
//! Everything a buyer deposits lands here and every payout, refund or fee
//! withdrawal leaves from here. The ledger never moves value any other way,
//! so `balance == total_received - total_disbursed` at all times.
//!
//! `held` is the part of the balance still owed to open escrows. A deposit
//! is held in full until its escrow settles; settlement releases it, after
//! which the principal is disbursed and the fee sits in the fee pool.

use std::collections::HashMap;

use escrowagent_types::{Address, Amount, EscrowAgentError, Result};

/// Funds held by the ledger on behalf of buyers, sellers and the Owner.
#[derive(Debug, Clone, Default)]
pub struct Custody {
    balance: Amount,
    total_received: Amount,
    total_disbursed: Amount,
    /// Deposits of escrows awaiting arbitration.
    held: Amount,
    /// Cumulative transfers out, per recipient.
    disbursed: HashMap<Address, Amount>,
}

impl Custody {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a deposit of `amount` into custody from `from` and hold it.
    ///
    /// # Errors
    /// Returns `AmountOverflow` if any total would overflow. Nothing is
    /// mutated on error.
    pub fn receive(&mut self, from: &Address, amount: Amount) -> Result<()> {
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(EscrowAgentError::AmountOverflow)?;
        let total_received = self
            .total_received
            .checked_add(amount)
            .ok_or(EscrowAgentError::AmountOverflow)?;
        let held = self
            .held
            .checked_add(amount)
            .ok_or(EscrowAgentError::AmountOverflow)?;
        self.balance = balance;
        self.total_received = total_received;
        self.held = held;
        tracing::debug!(from = %from, amount, balance, held, "Deposit received into custody");
        Ok(())
    }

    /// Stop holding a settled escrow's `deposit`. The value stays in custody
    /// until it is disbursed or withdrawn from the fee pool.
    ///
    /// # Errors
    /// Returns `CustodyInvariantViolation` if less than `deposit` is held.
    pub fn release(&mut self, deposit: Amount) -> Result<()> {
        self.held = self.held.checked_sub(deposit).ok_or_else(|| {
            EscrowAgentError::CustodyInvariantViolation {
                reason: format!("release of {deposit} exceeds held deposits {}", self.held),
            }
        })?;
        Ok(())
    }

    /// Fail unless `amount` can leave custody.
    ///
    /// # Errors
    /// Returns `CustodyInvariantViolation` if `amount` exceeds the balance.
    pub fn ensure_available(&self, amount: Amount) -> Result<()> {
        if amount > self.balance {
            return Err(EscrowAgentError::CustodyInvariantViolation {
                reason: format!(
                    "disbursement of {amount} exceeds custodied balance {}",
                    self.balance
                ),
            });
        }
        Ok(())
    }

    /// Transfer `amount` out of custody to `to`.
    ///
    /// # Errors
    /// Returns `CustodyInvariantViolation` if `amount` exceeds the balance.
    pub fn disburse(&mut self, to: &Address, amount: Amount) -> Result<()> {
        self.ensure_available(amount)?;
        self.balance -= amount;
        self.total_disbursed = self.total_disbursed.saturating_add(amount);
        let entry = self.disbursed.entry(*to).or_insert(0);
        *entry = entry.saturating_add(amount);
        tracing::debug!(to = %to, amount, balance = self.balance, "Funds disbursed from custody");
        Ok(())
    }

    /// Value currently held.
    #[must_use]
    pub fn balance(&self) -> Amount {
        self.balance
    }

    #[must_use]
    pub fn total_received(&self) -> Amount {
        self.total_received
    }

    #[must_use]
    pub fn total_disbursed(&self) -> Amount {
        self.total_disbursed
    }

    /// Deposits still owed to escrows awaiting arbitration.
    #[must_use]
    pub fn held(&self) -> Amount {
        self.held
    }

    /// Everything ever transferred to `address` (refunds, payouts, fee
    /// withdrawals).
    #[must_use]
    pub fn disbursed_to(&self, address: &Address) -> Amount {
        self.disbursed.get(address).copied().unwrap_or(0)
    }
}
