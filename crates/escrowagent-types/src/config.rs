//! Configuration for an EscrowAgent ledger instance.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Address, EscrowAgentError, FeePercentage, Result, constants};

/// Configuration for a single ledger instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// The Owner: administers agents, sets the fee, collects the fee pool.
    pub owner: Address,
    /// Agent fee percentage applied to escrows initiated from the start.
    #[serde(default)]
    pub initial_fee_percentage: FeePercentage,
    /// Capacity of the live event broadcast channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_event_channel_capacity() -> usize {
    constants::DEFAULT_EVENT_CHANNEL_CAPACITY
}

impl LedgerConfig {
    /// Config with default fee and channel capacity.
    #[must_use]
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            initial_fee_percentage: FeePercentage::default(),
            event_channel_capacity: constants::DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_fee_percentage(mut self, pct: FeePercentage) -> Self {
        self.initial_fee_percentage = pct;
        self
    }

    /// Parse a JSON config document.
    ///
    /// # Errors
    /// Returns `Configuration` on malformed JSON or an invalid config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EscrowAgentError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    ///
    /// # Errors
    /// Returns `Io` if the file can't be read, `Configuration` if it's invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Check values serde can't.
    ///
    /// # Errors
    /// Returns `Configuration` if the event channel capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            return Err(EscrowAgentError::Configuration(
                "event_channel_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
