//! Insertion-ordered address set.
//!
//! Backs both the agent list and the waitlist. Lookups are `O(1)` through a
//! `HashSet`; the `Vec` keeps first-insertion order so listings are stable
//! across queries and removals don't reshuffle the survivors.

use std::collections::HashSet;

use escrowagent_types::Address;

/// A duplicate-free set of addresses that remembers insertion order.
#[derive(Debug, Clone, Default)]
pub struct MembershipSet {
    members: HashSet<Address>,
    order: Vec<Address>,
}

impl MembershipSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `address` at the end. Returns `false` if it was already present.
    pub fn insert(&mut self, address: Address) -> bool {
        if !self.members.insert(address) {
            return false;
        }
        self.order.push(address);
        true
    }

    /// Remove `address`, keeping the relative order of the rest.
    /// Returns `false` if it was absent.
    pub fn remove(&mut self, address: &Address) -> bool {
        if !self.members.remove(address) {
            return false;
        }
        self.order.retain(|a| a != address);
        true
    }

    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.members.contains(address)
    }

    /// Members in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[Address] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
