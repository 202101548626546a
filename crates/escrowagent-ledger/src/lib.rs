//! # escrowagent-ledger
//!
//! **Escrow ledger and service facade.** Buyers and sellers who don't trust
//! each other route payment through an agent-arbitrated escrow:
//!
//! 1. An Agent (or the Owner) **initiates** an escrow for a buyer, seller and
//!    principal. The current fee percentage is captured on the record.
//! 2. The buyer **deposits** exactly `principal + floor(principal·fee/100)`.
//! 3. An Agent **approves** (principal to the seller) or **cancels**
//!    (principal back to the buyer). Either way the fee moves to the Owner's
//!    fee pool.
//! 4. An unpaid escrow may be **archived** instead.
//!
//! ## Components
//!
//! - [`EscrowLedger`]: the state machine, custody and fee pool
//! - [`Custody`] / [`FeePool`]: where value sits between transitions
//! - [`CustodyTotals`] / [`CustodyInvariant`]: conservation check run on the
//!   projected totals before every fund movement
//! - [`EventJournal`]: hash-chained history of every successful mutation
//! - [`EscrowAgent`]: serializes all of the above behind one lock and
//!   broadcasts sealed events

pub mod agent;
pub mod conservation;
pub mod custody;
pub mod fee_pool;
pub mod journal;
pub mod ledger;

pub use agent::EscrowAgent;
pub use conservation::{CustodyInvariant, CustodyTotals};
pub use custody::Custody;
pub use fee_pool::FeePool;
pub use journal::EventJournal;
pub use ledger::{EscrowLedger, NewEscrow};
