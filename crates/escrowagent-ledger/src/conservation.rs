//! Custody conservation invariant.
//!
//! Mathematical invariants checked before every fund movement is committed:
//! ```text
//! custodied == fee_pool + held
//! custodied == total_received - total_disbursed
//! fee_pool  == fees_collected - fees_withdrawn
//! ```
//!
//! The ledger projects the totals a movement would produce, checks the
//! projection, and only then mutates. A failed check means value would be
//! created or destroyed; the movement is refused with
//! `CustodyInvariantViolation` and nothing changes.
//!
//! The full audit additionally rescans every escrow and checks that the
//! running `held` total equals the sum of deposits in `PendingApproval`.

use escrowagent_types::{Amount, EscrowAgentError, EscrowRecord, Result, Settlement};

use crate::custody::Custody;
use crate::fee_pool::FeePool;

/// Scalar custody totals, either current or projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustodyTotals {
    pub custodied: Amount,
    pub received: Amount,
    pub disbursed: Amount,
    pub held: Amount,
    pub fee_pool: Amount,
    pub fees_collected: Amount,
    pub fees_withdrawn: Amount,
}

fn underflow(what: &str, amount: Amount, available: Amount) -> EscrowAgentError {
    EscrowAgentError::CustodyInvariantViolation {
        reason: format!("{what} of {amount} exceeds {available}"),
    }
}

impl CustodyTotals {
    #[must_use]
    pub fn of(custody: &Custody, fee_pool: &FeePool) -> Self {
        Self {
            custodied: custody.balance(),
            received: custody.total_received(),
            disbursed: custody.total_disbursed(),
            held: custody.held(),
            fee_pool: fee_pool.balance(),
            fees_collected: fee_pool.total_collected(),
            fees_withdrawn: fee_pool.total_withdrawn(),
        }
    }

    /// Totals after a buyer deposits `amount`.
    pub fn after_deposit(self, amount: Amount) -> Result<Self> {
        let add = |v: Amount| v.checked_add(amount).ok_or(EscrowAgentError::AmountOverflow);
        Ok(Self {
            custodied: add(self.custodied)?,
            received: add(self.received)?,
            held: add(self.held)?,
            ..self
        })
    }

    /// Totals after a paid escrow settles: principal out, fee to the pool.
    pub fn after_settlement(self, settlement: Settlement) -> Result<Self> {
        let Settlement { principal, fee } = settlement;
        let deposit = principal
            .checked_add(fee)
            .ok_or(EscrowAgentError::AmountOverflow)?;
        Ok(Self {
            custodied: self
                .custodied
                .checked_sub(principal)
                .ok_or_else(|| underflow("payout", principal, self.custodied))?,
            disbursed: self
                .disbursed
                .checked_add(principal)
                .ok_or(EscrowAgentError::AmountOverflow)?,
            held: self
                .held
                .checked_sub(deposit)
                .ok_or_else(|| underflow("release", deposit, self.held))?,
            fee_pool: self
                .fee_pool
                .checked_add(fee)
                .ok_or(EscrowAgentError::AmountOverflow)?,
            fees_collected: self
                .fees_collected
                .checked_add(fee)
                .ok_or(EscrowAgentError::AmountOverflow)?,
            ..self
        })
    }

    /// Totals after the Owner withdraws `amount` from the fee pool.
    pub fn after_withdrawal(self, amount: Amount) -> Result<Self> {
        Ok(Self {
            custodied: self
                .custodied
                .checked_sub(amount)
                .ok_or_else(|| underflow("withdrawal", amount, self.custodied))?,
            disbursed: self
                .disbursed
                .checked_add(amount)
                .ok_or(EscrowAgentError::AmountOverflow)?,
            fee_pool: self
                .fee_pool
                .checked_sub(amount)
                .ok_or_else(|| underflow("withdrawal", amount, self.fee_pool))?,
            fees_withdrawn: self
                .fees_withdrawn
                .checked_add(amount)
                .ok_or(EscrowAgentError::AmountOverflow)?,
            ..self
        })
    }
}

/// Conservation checks over custody totals and the escrow table.
pub struct CustodyInvariant;

impl CustodyInvariant {
    /// Check the three scalar equations. `O(1)`.
    ///
    /// # Errors
    /// Returns [`EscrowAgentError::CustodyInvariantViolation`] naming the
    /// mismatch.
    pub fn check(t: &CustodyTotals) -> Result<()> {
        let violation =
            |reason: String| -> Result<()> { Err(EscrowAgentError::CustodyInvariantViolation { reason }) };

        if t.received.checked_sub(t.disbursed) != Some(t.custodied) {
            return violation(format!(
                "custodied {} != received {} - disbursed {}",
                t.custodied, t.received, t.disbursed
            ));
        }
        if t.fee_pool.checked_add(t.held) != Some(t.custodied) {
            return violation(format!(
                "custodied {} != fee pool {} + held deposits {}",
                t.custodied, t.fee_pool, t.held
            ));
        }
        if t.fees_collected.checked_sub(t.fees_withdrawn) != Some(t.fee_pool) {
            return violation(format!(
                "fee pool {} != collected {} - withdrawn {}",
                t.fee_pool, t.fees_collected, t.fees_withdrawn
            ));
        }
        Ok(())
    }

    /// Sum of deposits currently held for escrows awaiting arbitration.
    ///
    /// # Errors
    /// Returns `AmountOverflow` if the sum does not fit an [`Amount`].
    pub fn held_deposits(escrows: &[EscrowRecord]) -> Result<Amount> {
        escrows
            .iter()
            .filter(|e| e.status.holds_deposit())
            .try_fold(0, |acc: Amount, e| {
                acc.checked_add(e.required_deposit()?)
                    .ok_or(EscrowAgentError::AmountOverflow)
            })
    }

    /// Full audit: the scalar equations plus a rescan of every escrow
    /// against the running `held` total. `O(n)`.
    ///
    /// # Errors
    /// Returns [`EscrowAgentError::CustodyInvariantViolation`] naming the
    /// mismatch.
    pub fn verify(custody: &Custody, fee_pool: &FeePool, escrows: &[EscrowRecord]) -> Result<()> {
        Self::check(&CustodyTotals::of(custody, fee_pool))?;
        let scanned = Self::held_deposits(escrows)?;
        if scanned != custody.held() {
            return Err(EscrowAgentError::CustodyInvariantViolation {
                reason: format!(
                    "held deposits {} != sum over pending escrows {scanned}",
                    custody.held()
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrowagent_types::{EscrowId, EscrowStatus, FeePercentage};

    fn pending_approval(id: u64, amount: Amount) -> EscrowRecord {
        let mut rec = EscrowRecord::dummy(EscrowId(id), amount, FeePercentage::default());
        rec.status = EscrowStatus::PendingApproval;
        rec
    }

    fn zero() -> CustodyTotals {
        CustodyTotals::of(&Custody::new(), &FeePool::new())
    }

    #[test]
    fn empty_ledger_is_balanced() {
        assert!(CustodyInvariant::check(&zero()).is_ok());
        assert!(CustodyInvariant::verify(&Custody::new(), &FeePool::new(), &[]).is_ok());
    }

    #[test]
    fn held_deposits_only_counts_pending_approval() {
        let paid = pending_approval(0, 250);
        let unpaid = EscrowRecord::dummy(EscrowId(1), 1_000, FeePercentage::default());
        assert_eq!(CustodyInvariant::held_deposits(&[paid, unpaid]).unwrap(), 275);
    }

    #[test]
    fn projections_stay_balanced() {
        let t = zero()
            .after_deposit(275)
            .unwrap()
            .after_deposit(110)
            .unwrap();
        assert!(CustodyInvariant::check(&t).is_ok());

        let t = t
            .after_settlement(Settlement { principal: 250, fee: 25 })
            .unwrap();
        assert_eq!((t.custodied, t.held, t.fee_pool), (135, 110, 25));
        assert!(CustodyInvariant::check(&t).is_ok());

        let t = t.after_withdrawal(20).unwrap();
        assert_eq!((t.custodied, t.fee_pool, t.fees_withdrawn), (115, 5, 20));
        assert!(CustodyInvariant::check(&t).is_ok());
    }

    #[test]
    fn projection_refuses_to_release_more_than_held() {
        let t = zero().after_deposit(100).unwrap();
        let err = t
            .after_settlement(Settlement { principal: 100, fee: 10 })
            .unwrap_err();
        assert!(matches!(err, EscrowAgentError::CustodyInvariantViolation { .. }));
        assert!(zero().after_withdrawal(1).is_err());
    }

    #[test]
    fn running_held_total_matches_rescan() {
        let mut custody = Custody::new();
        let mut pool = FeePool::new();
        let mut escrows = vec![pending_approval(0, 250), pending_approval(1, 100)];
        custody.receive(&escrows[0].buyer, 275).unwrap();
        custody.receive(&escrows[1].buyer, 110).unwrap();
        assert!(CustodyInvariant::verify(&custody, &pool, &escrows).is_ok());

        // Settle the first escrow: principal out, fee into the pool.
        let seller = escrows[0].seller;
        custody.release(275).unwrap();
        custody.disburse(&seller, 250).unwrap();
        pool.collect(25).unwrap();
        escrows[0].status = EscrowStatus::Approved;
        assert!(CustodyInvariant::verify(&custody, &pool, &escrows).is_ok());

        // A record flipped without releasing its deposit is caught by the rescan.
        escrows[1].status = EscrowStatus::Canceled;
        let err = CustodyInvariant::verify(&custody, &pool, &escrows).unwrap_err();
        assert!(err.to_string().contains("sum over pending escrows 0"));
    }

    #[test]
    fn detects_unaccounted_funds() {
        let mut t = zero().after_deposit(5).unwrap();
        t.held = 0;
        let err = CustodyInvariant::check(&t).unwrap_err();
        assert!(err.to_string().contains("fee pool 0 + held deposits 0"));
    }

    #[test]
    fn detects_fee_pool_drift() {
        let mut pool = FeePool::new();
        pool.collect(1).unwrap();
        let err = CustodyInvariant::verify(&Custody::new(), &pool, &[]).unwrap_err();
        assert!(err.to_string().contains("fee pool 1"));

        let mut t = zero();
        t.fees_collected = 3;
        assert!(CustodyInvariant::check(&t).is_err());
    }
}
