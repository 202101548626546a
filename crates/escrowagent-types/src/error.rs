//! Error types for the EscrowAgent ledger.
//!
//! All errors use the `EA_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Identity / authorization errors
//! - 2xx: Escrow lifecycle errors
//! - 3xx: Counterparty errors
//! - 4xx: Amount and fee errors
//! - 5xx: Fee pool / custody errors
//! - 9xx: General / internal errors

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Address, Amount, EscrowId};

/// Why a buyer/seller pair was rejected at `initiate` time.
///
/// Each variant renders to a distinct, stable message so callers can tell
/// exactly which side conflicts with which membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterpartyConflict {
    /// Buyer and seller are the same principal.
    SameParty,
    /// The buyer holds Agent (or Owner) authority.
    BuyerIsAgent,
    /// The seller holds Agent (or Owner) authority.
    SellerIsAgent,
    /// The buyer is waiting on the agent waitlist.
    BuyerWaitlisted,
    /// The seller is waiting on the agent waitlist.
    SellerWaitlisted,
}

impl fmt::Display for CounterpartyConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SameParty => write!(f, "Buyer and seller must be different"),
            Self::BuyerIsAgent => write!(f, "Buyer is an agent"),
            Self::SellerIsAgent => write!(f, "Seller is an agent"),
            Self::BuyerWaitlisted => write!(f, "Buyer is in an agent waitlist"),
            Self::SellerWaitlisted => write!(f, "Seller is in an agent waitlist"),
        }
    }
}

/// Central error enum for all EscrowAgent operations.
#[derive(Debug, Error)]
pub enum EscrowAgentError {
    // =================================================================
    // Identity / Authorization Errors (1xx)
    // =================================================================
    /// The caller's role does not permit this operation.
    #[error("EA_ERR_100: {caller} is not authorized to {action}")]
    NotAuthorized { caller: Address, action: String },

    /// A principal address could not be parsed.
    #[error("EA_ERR_101: Invalid address: {0}")]
    InvalidAddress(String),

    // =================================================================
    // Escrow Lifecycle Errors (2xx)
    // =================================================================
    /// No escrow has been assigned this id.
    #[error("EA_ERR_200: Escrow not found: {0}")]
    NotFound(EscrowId),

    /// The operation is not valid from the current state.
    #[error("EA_ERR_201: Invalid state: {reason}")]
    InvalidState { reason: String },

    // =================================================================
    // Counterparty Errors (3xx)
    // =================================================================
    /// Buyer/seller participation conflicts with agent or waitlist membership.
    #[error("EA_ERR_300: Invalid counterparty: {0}")]
    InvalidCounterparty(CounterpartyConflict),

    // =================================================================
    // Amount / Fee Errors (4xx)
    // =================================================================
    /// The amount is not acceptable for this operation.
    #[error("EA_ERR_400: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// The deposited value differs from principal plus agent fee.
    #[error(
        "EA_ERR_401: Deposit must be equal to amount including the agent fee: expected {expected}, got {actual}"
    )]
    AmountMismatch { expected: Amount, actual: Amount },

    /// Fee or deposit arithmetic overflowed the amount type.
    #[error("EA_ERR_402: Amount arithmetic overflow")]
    AmountOverflow,

    /// Fee percentage outside `0..=100`.
    #[error("EA_ERR_403: Invalid fee percentage: {0} (must be 0..=100)")]
    InvalidFeePercentage(u8),

    // =================================================================
    // Fee Pool / Custody Errors (5xx)
    // =================================================================
    /// Withdrawal exceeds the fee pool balance.
    #[error("EA_ERR_500: Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Amount, available: Amount },

    /// Custodied balance no longer matches fee pool plus pending deposits.
    #[error("EA_ERR_501: Custody invariant violation: {reason}")]
    CustodyInvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("EA_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("EA_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("EA_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("EA_ERR_903: I/O error: {0}")]
    Io(String),
}

impl EscrowAgentError {
    /// Shorthand for a [`EscrowAgentError::NotAuthorized`] error.
    pub fn not_authorized(caller: Address, action: impl Into<String>) -> Self {
        Self::NotAuthorized {
            caller,
            action: action.into(),
        }
    }

    /// Shorthand for a [`EscrowAgentError::InvalidState`] error.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, EscrowAgentError>;

impl From<std::io::Error> for EscrowAgentError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EscrowAgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counterparty_reasons_are_distinct() {
        let reasons = [
            CounterpartyConflict::SameParty,
            CounterpartyConflict::BuyerIsAgent,
            CounterpartyConflict::SellerIsAgent,
            CounterpartyConflict::BuyerWaitlisted,
            CounterpartyConflict::SellerWaitlisted,
        ]
        .map(|c| c.to_string());
        for (i, a) in reasons.iter().enumerate() {
            for b in &reasons[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(reasons[1], "Buyer is an agent");
        assert_eq!(reasons[4], "Seller is in an agent waitlist");
    }

    #[test]
    fn amount_mismatch_display() {
        let err = EscrowAgentError::AmountMismatch {
            expected: 275,
            actual: 280,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("EA_ERR_401"));
        assert!(msg.contains("275"));
        assert!(msg.contains("280"));
    }

    #[test]
    fn not_authorized_names_caller_and_action() {
        let caller = Address::from_bytes([0xab; 20]);
        let err = EscrowAgentError::not_authorized(caller, "withdraw funds");
        let msg = err.to_string();
        assert!(msg.contains("EA_ERR_100"));
        assert!(msg.contains(&caller.to_string()));
        assert!(msg.contains("withdraw funds"));
    }

    #[test]
    fn all_errors_have_ea_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(EscrowAgentError::NotFound(EscrowId(3))),
            Box::new(EscrowAgentError::invalid_state("Escrow cannot be approved")),
            Box::new(EscrowAgentError::InvalidCounterparty(
                CounterpartyConflict::BuyerIsAgent,
            )),
            Box::new(EscrowAgentError::AmountOverflow),
            Box::new(EscrowAgentError::InsufficientFunds {
                requested: 2,
                available: 1,
            }),
            Box::new(EscrowAgentError::Internal("test".into())),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("EA_ERR_"),
                "Error missing EA_ERR_ prefix: {msg}"
            );
        }
    }

    #[test]
    fn io_error_converts() {
        let err: EscrowAgentError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, EscrowAgentError::Io(_)));
    }
}
