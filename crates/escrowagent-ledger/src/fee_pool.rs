//! Owner's fee pool.
//!
//! Fees are separated from a deposit only when its escrow settles (approve
//! or cancel). Until then the whole deposit counts as held for the escrow.

use escrowagent_types::{Amount, EscrowAgentError, Result};

/// Retained agent fees awaiting withdrawal by the Owner.
#[derive(Debug, Clone, Default)]
pub struct FeePool {
    balance: Amount,
    total_collected: Amount,
    total_withdrawn: Amount,
}

impl FeePool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a settled escrow's fee.
    ///
    /// # Errors
    /// Returns `AmountOverflow` if the pool would overflow.
    pub fn collect(&mut self, fee: Amount) -> Result<()> {
        let balance = self
            .balance
            .checked_add(fee)
            .ok_or(EscrowAgentError::AmountOverflow)?;
        self.balance = balance;
        self.total_collected = self.total_collected.saturating_add(fee);
        Ok(())
    }

    /// Guard a withdrawal of `amount`.
    ///
    /// # Errors
    /// Returns `InsufficientFunds` if `amount` exceeds the pool.
    pub fn ensure_available(&self, amount: Amount) -> Result<()> {
        if amount > self.balance {
            return Err(EscrowAgentError::InsufficientFunds {
                requested: amount,
                available: self.balance,
            });
        }
        Ok(())
    }

    /// Debit `amount` from the pool.
    ///
    /// # Errors
    /// Returns `InsufficientFunds` if `amount` exceeds the pool; the pool is
    /// left unchanged.
    pub fn withdraw(&mut self, amount: Amount) -> Result<()> {
        self.ensure_available(amount)?;
        self.balance -= amount;
        self.total_withdrawn = self.total_withdrawn.saturating_add(amount);
        Ok(())
    }

    #[must_use]
    pub fn balance(&self) -> Amount {
        self.balance
    }

    #[must_use]
    pub fn total_collected(&self) -> Amount {
        self.total_collected
    }

    #[must_use]
    pub fn total_withdrawn(&self) -> Amount {
        self.total_withdrawn
    }
}
