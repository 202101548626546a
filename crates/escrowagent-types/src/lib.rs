//! # escrowagent-types
//!
//! Shared types, errors, and configuration for the **EscrowAgent** ledger.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`Address`], [`EscrowId`]
//! - **Amounts and fees**: [`Amount`], [`FeePercentage`]
//! - **Roles**: [`Role`]
//! - **Escrow model**: [`EscrowRecord`], [`EscrowStatus`], [`Settlement`]
//! - **Events**: [`LedgerEvent`], [`EventEnvelope`]
//! - **Configuration**: [`LedgerConfig`]
//! - **Errors**: [`EscrowAgentError`] with `EA_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod escrow;
pub mod event;
pub mod fee;
pub mod ids;
pub mod role;

// Re-export all primary types at crate root for ergonomic imports:
//   use escrowagent_types::{Address, EscrowRecord, LedgerEvent, ...};

pub use config::*;
pub use error::*;
pub use escrow::*;
pub use event::*;
pub use fee::{Amount, FeePercentage};
pub use ids::*;
pub use role::*;

// Constants are accessed via `escrowagent_types::constants::FOO`
// (not re-exported to avoid name collisions).
