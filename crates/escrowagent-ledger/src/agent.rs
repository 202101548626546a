//! `EscrowAgent`, the serialized entry point.
//!
//! Owns the access registry, the escrow ledger and the event journal behind
//! a single `RwLock`. Each mutating call holds the write lock across guard
//! checks, effects and the journal append, so two callers can never both
//! pass the same check. Sealed events are then fanned out on a
//! `tokio::sync::broadcast` channel.
//!
//! ## Halting
//!
//! The ledger validates and audits a mutation before committing it, so the
//! only failure left after commit is sealing the event into the journal.
//! If that happens the state and its history disagree. The agent logs at
//! `error`, marks itself halted and refuses every further mutation with
//! `Internal`; queries keep working so the state can be inspected.

use parking_lot::{RwLock, RwLockReadGuard};

use chrono::{DateTime, Utc};
use escrowagent_access::AccessRegistry;
use escrowagent_types::{
    Address, Amount, EscrowAgentError, EscrowId, EscrowRecord, EventEnvelope, FeePercentage,
    LedgerConfig, LedgerEvent, Result, Role, constants,
};
use tokio::sync::broadcast;

use crate::journal::EventJournal;
use crate::ledger::{EscrowLedger, NewEscrow};

/// Everything guarded by the agent's lock.
#[derive(Debug)]
struct AgentState {
    registry: AccessRegistry,
    ledger: EscrowLedger,
    journal: EventJournal,
    /// Set when a committed mutation could not be journaled.
    halted: bool,
}

/// Thread-safe escrow service. Share it with `Arc<EscrowAgent>`.
pub struct EscrowAgent {
    state: RwLock<AgentState>,
    events: broadcast::Sender<EventEnvelope>,
}

impl EscrowAgent {
    /// Build an agent from a validated config.
    ///
    /// # Errors
    /// Returns `Configuration` if the config is invalid.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_channel_capacity);

        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            owner = %config.owner,
            fee_pct = config.initial_fee_percentage.value(),
            "Escrow agent started"
        );
        Ok(Self {
            state: RwLock::new(AgentState {
                registry: AccessRegistry::new(config.owner),
                ledger: EscrowLedger::new(config.initial_fee_percentage),
                journal: EventJournal::new(),
                halted: false,
            }),
            events,
        })
    }

    // -----------------------------------------------------------------
    // Escrow lifecycle
    // -----------------------------------------------------------------

    pub fn initiate(
        &self,
        caller: &Address,
        buyer: &Address,
        seller: &Address,
        amount: Amount,
    ) -> Result<EscrowId> {
        self.open(caller, NewEscrow::new(*buyer, *seller, amount))
    }

    pub fn initiate_with_description(
        &self,
        caller: &Address,
        buyer: &Address,
        seller: &Address,
        amount: Amount,
        description: impl Into<String>,
    ) -> Result<EscrowId> {
        self.open(
            caller,
            NewEscrow::new(*buyer, *seller, amount).with_description(description),
        )
    }

    pub fn deposit(&self, caller: &Address, id: EscrowId, paid: Amount) -> Result<()> {
        self.mutate(caller, "deposit", |s, now| {
            s.ledger.deposit(caller, id, paid, now).map(|e| ((), e))
        })
    }

    pub fn cancel(&self, caller: &Address, id: EscrowId) -> Result<()> {
        self.mutate(caller, "cancel", |s, now| {
            s.ledger.cancel(&s.registry, caller, id, now).map(|e| ((), e))
        })
    }

    pub fn approve(&self, caller: &Address, id: EscrowId) -> Result<()> {
        self.mutate(caller, "approve", |s, now| {
            s.ledger.approve(&s.registry, caller, id, now).map(|e| ((), e))
        })
    }

    pub fn archive(&self, caller: &Address, id: EscrowId) -> Result<()> {
        self.mutate(caller, "archive", |s, now| {
            s.ledger.archive(&s.registry, caller, id, now).map(|e| ((), e))
        })
    }

    // -----------------------------------------------------------------
    // Owner administration
    // -----------------------------------------------------------------

    pub fn withdraw_funds(&self, caller: &Address, amount: Amount) -> Result<()> {
        self.mutate(caller, "withdraw_funds", |s, now| {
            s.ledger
                .withdraw_funds(&s.registry, caller, amount, now)
                .map(|e| ((), e))
        })
    }

    pub fn change_agent_fee_percentage(&self, caller: &Address, pct: u8) -> Result<()> {
        self.mutate(caller, "change_agent_fee_percentage", |s, now| {
            s.ledger
                .change_agent_fee_percentage(&s.registry, caller, pct, now)
                .map(|e| ((), e))
        })
    }

    pub fn apply_for_agent(&self, caller: &Address) -> Result<()> {
        self.mutate(caller, "apply_for_agent", |s, now| {
            s.registry.apply_for_agent(caller, now).map(|e| ((), e))
        })
    }

    pub fn add_agent(&self, caller: &Address, target: &Address) -> Result<()> {
        self.mutate(caller, "add_agent", |s, now| {
            s.registry.add_agent(caller, target, now).map(|e| ((), e))
        })
    }

    pub fn revoke_agent(&self, caller: &Address, target: &Address) -> Result<()> {
        self.mutate(caller, "revoke_agent", |s, now| {
            s.registry.revoke_agent(caller, target, now).map(|e| ((), e))
        })
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    pub fn get_by_id(&self, id: EscrowId) -> Result<EscrowRecord> {
        self.read().ledger.get(id).cloned()
    }

    /// All escrows in id order.
    pub fn get_all(&self) -> Vec<EscrowRecord> {
        self.read().ledger.all().to_vec()
    }

    pub fn list_agents(&self) -> Vec<Address> {
        self.read().registry.agents().to_vec()
    }

    pub fn list_waitlist(&self) -> Vec<Address> {
        self.read().registry.waitlist().to_vec()
    }

    pub fn fee_pool_balance(&self) -> Amount {
        self.read().ledger.fee_pool_balance()
    }

    pub fn current_fee_percentage(&self) -> FeePercentage {
        self.read().ledger.fee_percentage()
    }

    pub fn owner(&self) -> Address {
        self.read().registry.owner()
    }

    pub fn role_of(&self, address: &Address) -> Role {
        self.read().registry.role_of(address)
    }

    /// Total value currently held in custody.
    pub fn custodied_balance(&self) -> Amount {
        self.read().ledger.custody().balance()
    }

    /// Refunds, payouts and withdrawals ever sent to `address`.
    pub fn disbursed_to(&self, address: &Address) -> Amount {
        self.read().ledger.custody().disbursed_to(address)
    }

    /// # Errors
    /// Returns `CustodyInvariantViolation` if custody doesn't balance.
    pub fn verify_custody(&self) -> Result<()> {
        self.read().ledger.verify_custody()
    }

    // -----------------------------------------------------------------
    // Event stream
    // -----------------------------------------------------------------

    /// Live feed of every event sealed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    /// Journaled envelopes with `sequence >= from`.
    pub fn events_since(&self, from: u64) -> Vec<EventEnvelope> {
        self.read().journal.since(from).to_vec()
    }

    /// Number of events journaled so far.
    pub fn event_count(&self) -> u64 {
        self.read().journal.next_sequence()
    }

    /// # Errors
    /// Returns `Internal` if any journaled digest fails to verify.
    pub fn verify_event_chain(&self) -> Result<()> {
        self.read().journal.verify_chain()
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn open(&self, caller: &Address, terms: NewEscrow) -> Result<EscrowId> {
        self.mutate(caller, "initiate", |s, now| {
            s.ledger.initiate(&s.registry, caller, terms, now)
        })
    }

    /// Run one mutation inside the write lock and publish its event.
    fn mutate<T>(
        &self,
        caller: &Address,
        operation: &'static str,
        apply: impl FnOnce(&mut AgentState, DateTime<Utc>) -> Result<(T, LedgerEvent)>,
    ) -> Result<T> {
        let mut state = self.state.write();
        if state.halted {
            return Err(EscrowAgentError::Internal(format!(
                "escrow agent halted; {operation} refused"
            )));
        }

        let (value, event) = match apply(&mut *state, Utc::now()) {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(
                    operation,
                    caller = %caller.short(),
                    error = %e,
                    "Operation rejected"
                );
                return Err(e);
            }
        };
        let escrow = event.escrow_id();
        let envelope = match state.journal.append(event) {
            Ok(envelope) => envelope,
            Err(e) => {
                state.halted = true;
                tracing::error!(
                    operation,
                    escrow = ?escrow,
                    error = %e,
                    "Committed mutation could not be journaled, halting"
                );
                return Err(e);
            }
        };
        drop(state);

        // No subscribers is not an error.
        let _ = self.events.send(envelope);
        Ok(value)
    }

    fn read(&self) -> RwLockReadGuard<'_, AgentState> {
        self.state.read()
    }
}

impl std::fmt::Debug for EscrowAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowAgent")
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn agent() -> (EscrowAgent, Address) {
        let owner = Address::random();
        (EscrowAgent::new(LedgerConfig::new(owner)).unwrap(), owner)
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = LedgerConfig::new(Address::random());
        config.event_channel_capacity = 0;
        let err = EscrowAgent::new(config).unwrap_err();
        assert!(matches!(err, EscrowAgentError::Configuration(_)));
    }

    #[test]
    fn starts_with_configured_owner_and_fee() {
        let owner = Address::random();
        let config =
            LedgerConfig::new(owner).with_fee_percentage(FeePercentage::new(7).unwrap());
        let agent = EscrowAgent::new(config).unwrap();
        assert_eq!(agent.owner(), owner);
        assert_eq!(agent.role_of(&owner), Role::Owner);
        assert_eq!(agent.current_fee_percentage().value(), 7);
        assert_eq!(agent.event_count(), 0);
    }

    #[test]
    fn events_reach_subscribers_in_order() {
        let (agent, owner) = agent();
        let mut rx = agent.subscribe();
        let x = Address::random();

        agent.apply_for_agent(&x).unwrap();
        agent.add_agent(&owner, &x).unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.event.name(), "AgentApplied");
        assert_eq!(second.sequence, 1);
        assert_eq!(second.event.name(), "AgentAdded");
        assert!(second.verify(&first.digest).unwrap());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn failed_operations_emit_nothing() {
        let (agent, _owner) = agent();
        let mut rx = agent.subscribe();
        let stranger = Address::random();

        assert!(agent.add_agent(&stranger, &stranger).is_err());
        assert!(agent.withdraw_funds(&stranger, 0).is_err());
        assert!(agent.approve(&stranger, EscrowId(0)).is_err());

        assert_eq!(agent.event_count(), 0);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn sending_without_subscribers_is_fine() {
        let (agent, owner) = agent();
        agent.change_agent_fee_percentage(&owner, 15).unwrap();
        assert_eq!(agent.events_since(0).len(), 1);
        assert!(agent.verify_event_chain().is_ok());
    }

    #[test]
    fn halted_agent_refuses_mutations_but_answers_queries() {
        let (agent, owner) = agent();
        agent.change_agent_fee_percentage(&owner, 15).unwrap();
        agent.state.write().halted = true;

        let err = agent.change_agent_fee_percentage(&owner, 20).unwrap_err();
        assert!(matches!(err, EscrowAgentError::Internal(_)));
        assert!(err.to_string().contains("change_agent_fee_percentage refused"));
        assert!(agent.apply_for_agent(&Address::random()).is_err());

        assert_eq!(agent.current_fee_percentage().value(), 15);
        assert_eq!(agent.event_count(), 1);
        assert!(agent.verify_event_chain().is_ok());
    }

    #[test]
    fn debug_reports_subscribers() {
        let (agent, _) = agent();
        let _rx = agent.subscribe();
        assert!(format!("{agent:?}").contains("subscribers: 1"));
    }
}
