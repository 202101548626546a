//! Access registry: who may do what.
//!
//! Three fixed roles plus a waitlist:
//!
//! ```text
//!   Visitor ──apply_for_agent──▶ waitlisted ──add_agent──▶ Agent
//!      ▲                                                     │
//!      └──────────────────────revoke_agent───────────────────┘
//! ```
//!
//! `add_agent` may also promote a visitor that never applied. Agent and
//! waitlist membership are mutually exclusive at all times.

use chrono::{DateTime, Utc};
use escrowagent_types::{
    Address, CounterpartyConflict, EscrowAgentError, LedgerEvent, Result, Role,
};

use crate::membership::MembershipSet;

/// Owner, agents, and pending agent applicants.
#[derive(Debug, Clone)]
pub struct AccessRegistry {
    owner: Address,
    agents: MembershipSet,
    waitlist: MembershipSet,
}

impl AccessRegistry {
    /// Create a registry administered by `owner`, with no agents.
    #[must_use]
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            agents: MembershipSet::new(),
            waitlist: MembershipSet::new(),
        }
    }

    #[must_use]
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Role of `principal`; `Visitor` unless recorded otherwise.
    #[must_use]
    pub fn role_of(&self, principal: &Address) -> Role {
        if *principal == self.owner {
            Role::Owner
        } else if self.agents.contains(principal) {
            Role::Agent
        } else {
            Role::Visitor
        }
    }

    #[must_use]
    pub fn is_agent(&self, principal: &Address) -> bool {
        self.agents.contains(principal)
    }

    #[must_use]
    pub fn is_waitlisted(&self, principal: &Address) -> bool {
        self.waitlist.contains(principal)
    }

    /// Agents in the order they were added.
    #[must_use]
    pub fn agents(&self) -> &[Address] {
        self.agents.as_slice()
    }

    /// Applicants in the order they applied.
    #[must_use]
    pub fn waitlist(&self) -> &[Address] {
        self.waitlist.as_slice()
    }

    // -----------------------------------------------------------------
    // Guards
    // -----------------------------------------------------------------

    /// Require `caller` to be the Owner.
    ///
    /// # Errors
    /// Returns `NotAuthorized` naming `action` otherwise.
    pub fn require_owner(&self, caller: &Address, action: &str) -> Result<()> {
        if self.role_of(caller) == Role::Owner {
            Ok(())
        } else {
            Err(EscrowAgentError::not_authorized(*caller, action))
        }
    }

    /// Require `caller` to be the Owner or an Agent.
    ///
    /// # Errors
    /// Returns `NotAuthorized` naming `action` otherwise.
    pub fn require_arbiter(&self, caller: &Address, action: &str) -> Result<()> {
        if self.role_of(caller).can_arbitrate() {
            Ok(())
        } else {
            Err(EscrowAgentError::not_authorized(*caller, action))
        }
    }

    /// Validate a buyer/seller pair for a new escrow.
    ///
    /// The Owner carries agent authority, so it is rejected as a
    /// counterparty just like an Agent.
    ///
    /// # Errors
    /// Returns `InvalidCounterparty` with the first conflict found, checked
    /// in the order: same party, buyer agent, seller agent, buyer
    /// waitlisted, seller waitlisted.
    pub fn check_counterparties(&self, buyer: &Address, seller: &Address) -> Result<()> {
        let conflict = if buyer == seller {
            Some(CounterpartyConflict::SameParty)
        } else if self.role_of(buyer).can_arbitrate() {
            Some(CounterpartyConflict::BuyerIsAgent)
        } else if self.role_of(seller).can_arbitrate() {
            Some(CounterpartyConflict::SellerIsAgent)
        } else if self.is_waitlisted(buyer) {
            Some(CounterpartyConflict::BuyerWaitlisted)
        } else if self.is_waitlisted(seller) {
            Some(CounterpartyConflict::SellerWaitlisted)
        } else {
            None
        };
        match conflict {
            Some(c) => Err(EscrowAgentError::InvalidCounterparty(c)),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------
    // Mutations (each returns the single event it produced)
    // -----------------------------------------------------------------

    /// Self-service request for Agent status.
    ///
    /// # Errors
    /// Returns `InvalidState` if `caller` is the Owner, already an Agent, or
    /// already waitlisted.
    pub fn apply_for_agent(
        &mut self,
        caller: &Address,
        now: DateTime<Utc>,
    ) -> Result<LedgerEvent> {
        match self.role_of(caller) {
            Role::Owner => {
                return Err(EscrowAgentError::invalid_state("Owner cannot apply as an agent"));
            }
            Role::Agent => {
                return Err(EscrowAgentError::invalid_state("Address is already an agent"));
            }
            Role::Visitor => {}
        }
        if !self.waitlist.insert(*caller) {
            return Err(EscrowAgentError::invalid_state(
                "Address is already in the agent waitlist",
            ));
        }

        tracing::info!(
            applicant = %caller,
            waitlist = self.waitlist.len(),
            "Agent application received"
        );
        Ok(LedgerEvent::AgentApplied {
            address: *caller,
            timestamp: now,
        })
    }

    /// Promote `target` to Agent, dropping it from the waitlist if present.
    ///
    /// # Errors
    /// - `NotAuthorized` if `caller` is not the Owner
    /// - `InvalidState` if `target` is the Owner or already an Agent
    pub fn add_agent(
        &mut self,
        caller: &Address,
        target: &Address,
        now: DateTime<Utc>,
    ) -> Result<LedgerEvent> {
        self.require_owner(caller, "add an agent")?;
        match self.role_of(target) {
            Role::Owner => {
                return Err(EscrowAgentError::invalid_state(
                    "Owner cannot be added as an agent",
                ));
            }
            Role::Agent => {
                return Err(EscrowAgentError::invalid_state("Address is already an agent"));
            }
            Role::Visitor => {}
        }

        let was_waitlisted = self.waitlist.remove(target);
        self.agents.insert(*target);

        tracing::info!(agent = %target, from_waitlist = was_waitlisted, "Agent added");
        Ok(LedgerEvent::AgentAdded {
            address: *target,
            timestamp: now,
        })
    }

    /// Demote `target` from Agent to Visitor.
    ///
    /// # Errors
    /// - `NotAuthorized` if `caller` is not the Owner
    /// - `InvalidState` if `target` is not an Agent
    pub fn revoke_agent(
        &mut self,
        caller: &Address,
        target: &Address,
        now: DateTime<Utc>,
    ) -> Result<LedgerEvent> {
        self.require_owner(caller, "revoke an agent")?;
        if !self.agents.remove(target) {
            return Err(EscrowAgentError::invalid_state("Address is not an agent"));
        }

        tracing::info!(agent = %target, remaining = self.agents.len(), "Agent revoked");
        Ok(LedgerEvent::AgentRevoked {
            address: *target,
            timestamp: now,
        })
    }
}
