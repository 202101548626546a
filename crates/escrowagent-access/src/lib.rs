//! # escrowagent-access
//!
//! **Access registry**: the leaf authority every mutating ledger call
//! consults before touching state.
//!
//! ## Roles
//!
//! | Role | May |
//! |------|-----|
//! | Owner | manage agents, set the fee, withdraw the fee pool, arbitrate |
//! | Agent | initiate, approve, cancel, archive escrows |
//! | Visitor | apply for agent status, deposit as a buyer |
//!
//! Waitlist membership is tracked beside the role and never overlaps with
//! Agent.

pub mod membership;
pub mod registry;

pub use membership::MembershipSet;
pub use registry::AccessRegistry;
