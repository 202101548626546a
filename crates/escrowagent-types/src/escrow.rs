//! # Escrow record and lifecycle
//!
//! ## State Machine
//!
//! ```text
//!   ┌────────────────┐  deposit   ┌─────────────────┐  approve   ┌──────────┐
//!   │ PENDING_PAYMENT├───────────▶│ PENDING_APPROVAL├───────────▶│ APPROVED │
//!   └───────┬────────┘            └────────┬────────┘            └──────────┘
//!           │ archive                      │ cancel
//!           ▼                              ▼
//!   ┌──────────┐                     ┌──────────┐
//!   │ ARCHIVED │                     │ CANCELED │
//!   └──────────┘                     └──────────┘
//! ```
//!
//! `APPROVED`, `CANCELED` and `ARCHIVED` are terminal. There is no expiry
//! transition: an unpaid or unapproved escrow waits indefinitely.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, Amount, EscrowAgentError, EscrowId, FeePercentage, Result};

/// Lifecycle status of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Created; waiting for the buyer's deposit.
    PendingPayment,
    /// Buyer deposited principal plus fee; waiting for an arbiter.
    PendingApproval,
    /// Principal paid to the seller. **Terminal.**
    Approved,
    /// Principal refunded to the buyer. **Terminal.**
    Canceled,
    /// Withdrawn before any deposit. **Terminal.**
    Archived,
}

impl EscrowStatus {
    /// Can an escrow in this status move to `target`?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::PendingPayment, Self::PendingApproval | Self::Archived)
                | (Self::PendingApproval, Self::Approved | Self::Canceled)
        )
    }

    /// Settled or withdrawn; no transition leaves this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Canceled | Self::Archived)
    }

    /// Whether the ledger currently custodies this escrow's deposit.
    #[must_use]
    pub fn holds_deposit(self) -> bool {
        self == Self::PendingApproval
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingPayment => write!(f, "PENDING_PAYMENT"),
            Self::PendingApproval => write!(f, "PENDING_APPROVAL"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Archived => write!(f, "ARCHIVED"),
        }
    }
}

/// How a custodied deposit splits when the escrow settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Paid to the seller on approve, refunded to the buyer on cancel.
    #[serde(with = "crate::fee::amount_serde")]
    pub principal: Amount,
    /// Retained into the fee pool either way.
    #[serde(with = "crate::fee::amount_serde")]
    pub fee: Amount,
}

/// A single buyer/seller transaction custodied by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub id: EscrowId,
    pub buyer: Address,
    pub seller: Address,
    /// Principal in the smallest currency unit.
    #[serde(with = "crate::fee::amount_serde")]
    pub amount: Amount,
    /// Fee percentage captured at `initiate`; later global changes don't apply.
    pub agent_fee_percentage: FeePercentage,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub description: String,
}

impl EscrowRecord {
    /// Fresh record in `PendingPayment`.
    #[must_use]
    pub fn new(
        id: EscrowId,
        buyer: Address,
        seller: Address,
        amount: Amount,
        agent_fee_percentage: FeePercentage,
        description: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            buyer,
            seller,
            amount,
            agent_fee_percentage,
            status: EscrowStatus::PendingPayment,
            created_at: now,
            updated_at: now,
            description,
        }
    }

    /// Agent fee on this escrow's principal.
    pub fn fee(&self) -> Result<Amount> {
        self.agent_fee_percentage.fee_on(self.amount)
    }

    /// Exact value the buyer must deposit.
    pub fn required_deposit(&self) -> Result<Amount> {
        self.agent_fee_percentage.required_deposit(self.amount)
    }

    /// Principal/fee split of the custodied deposit.
    pub fn settlement(&self) -> Result<Settlement> {
        Ok(Settlement {
            principal: self.amount,
            fee: self.fee()?,
        })
    }

    /// Check that `target` is reachable without moving.
    ///
    /// # Errors
    /// Returns `InvalidState` with `reason` if the state table forbids it.
    pub fn check_transition(&self, target: EscrowStatus, reason: &str) -> Result<()> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else if self.status.is_terminal() {
            Err(EscrowAgentError::invalid_state(format!(
                "{reason} ({} is already {})",
                self.id, self.status
            )))
        } else {
            Err(EscrowAgentError::invalid_state(format!(
                "{reason} ({} is {})",
                self.id, self.status
            )))
        }
    }

    /// Move to `target`, stamping `updated_at`.
    ///
    /// # Errors
    /// Returns `InvalidState` with `reason` if the state table forbids it.
    pub fn transition(
        &mut self,
        target: EscrowStatus,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<()> {
        self.check_transition(target, reason)?;
        self.status = target;
        self.updated_at = now;
        Ok(())
    }
}

/// Dummy record for unit tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl EscrowRecord {
    pub fn dummy(id: EscrowId, amount: Amount, pct: FeePercentage) -> Self {
        Self::new(
            id,
            Address::random(),
            Address::random(),
            amount,
            pct,
            String::new(),
            Utc::now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(amount: Amount, pct: u8) -> EscrowRecord {
        EscrowRecord::dummy(EscrowId(0), amount, FeePercentage::new(pct).unwrap())
    }

    #[test]
    fn valid_transitions() {
        use EscrowStatus::*;
        assert!(PendingPayment.can_transition_to(PendingApproval));
        assert!(PendingPayment.can_transition_to(Archived));
        assert!(PendingApproval.can_transition_to(Approved));
        assert!(PendingApproval.can_transition_to(Canceled));
    }

    #[test]
    fn invalid_transitions() {
        use EscrowStatus::*;
        assert!(!PendingPayment.can_transition_to(Approved));
        assert!(!PendingPayment.can_transition_to(Canceled));
        assert!(!PendingApproval.can_transition_to(Archived));
        assert!(!PendingApproval.can_transition_to(PendingPayment));
        for terminal in [Approved, Canceled, Archived] {
            assert!(terminal.is_terminal());
            for target in [PendingPayment, PendingApproval, Approved, Canceled, Archived] {
                assert!(
                    !terminal.can_transition_to(target),
                    "{terminal} -> {target} must fail"
                );
            }
        }
    }

    #[test]
    fn only_pending_approval_holds_deposit() {
        assert!(EscrowStatus::PendingApproval.holds_deposit());
        assert!(!EscrowStatus::PendingPayment.holds_deposit());
        assert!(!EscrowStatus::Canceled.holds_deposit());
    }

    #[test]
    fn new_record_is_pending_payment() {
        let rec = make(250, 10);
        assert_eq!(rec.status, EscrowStatus::PendingPayment);
        assert_eq!(rec.created_at, rec.updated_at);
    }

    #[test]
    fn settlement_splits_deposit() {
        let rec = make(250, 10);
        let s = rec.settlement().unwrap();
        assert_eq!(s.principal, 250);
        assert_eq!(s.fee, 25);
        assert_eq!(s.principal + s.fee, rec.required_deposit().unwrap());
    }

    #[test]
    fn transition_stamps_update_time() {
        let mut rec = make(100, 5);
        let later = rec.created_at + chrono::Duration::seconds(30);
        rec.transition(EscrowStatus::PendingApproval, later, "Escrow is not awaiting payment")
            .unwrap();
        assert_eq!(rec.status, EscrowStatus::PendingApproval);
        assert_eq!(rec.updated_at, later);
        assert!(rec.created_at < rec.updated_at);
    }

    #[test]
    fn forbidden_transition_keeps_record() {
        let mut rec = make(100, 5);
        let before = rec.clone();
        let err = rec
            .transition(EscrowStatus::Approved, Utc::now(), "Escrow cannot be approved")
            .unwrap_err();
        assert!(err.to_string().contains("Escrow cannot be approved"));
        assert!(err.to_string().ends_with("is PENDING_PAYMENT)"));
        assert_eq!(rec, before);
    }

    #[test]
    fn settled_record_reports_final_status() {
        let mut rec = make(100, 5);
        rec.status = EscrowStatus::Approved;
        let err = rec
            .check_transition(EscrowStatus::Canceled, "Escrow cannot be canceled")
            .unwrap_err();
        assert!(err.to_string().ends_with("is already APPROVED)"));
    }

    #[test]
    fn serde_roundtrip() {
        let rec = make(1_000, 7);
        let json = serde_json::to_string(&rec).unwrap();
        let back: EscrowRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
