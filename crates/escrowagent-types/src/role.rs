//! Principal roles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The role a principal holds in the registry.
///
/// Waitlist membership is tracked separately: a waitlisted applicant is a
/// `Visitor` until the Owner promotes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The single administrator, fixed at creation. Collects the fee pool.
    Owner,
    /// Arbitrates escrows on the Owner's behalf.
    Agent,
    /// Any address not otherwise recorded.
    Visitor,
}

impl Role {
    /// Whether this role may initiate and arbitrate escrows.
    #[must_use]
    pub fn can_arbitrate(self) -> bool {
        matches!(self, Self::Owner | Self::Agent)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "OWNER"),
            Self::Agent => write!(f, "AGENT"),
            Self::Visitor => write!(f, "VISITOR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arbitration_rights() {
        assert!(Role::Owner.can_arbitrate());
        assert!(Role::Agent.can_arbitrate());
        assert!(!Role::Visitor.can_arbitrate());
    }

    #[test]
    fn display() {
        assert_eq!(Role::Agent.to_string(), "AGENT");
    }
}
