//! Amounts and agent fee arithmetic.
//!
//! Amounts are integers in the smallest currency unit. The agent fee is a
//! whole percentage, and the fee on an amount is rounded down:
//!
//! ```text
//! fee      = floor(amount * pct / 100)
//! deposit  = amount + fee
//! ```
//!
//! All arithmetic is checked; there is no tolerance band anywhere.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{EscrowAgentError, Result, constants};

/// Value in the smallest currency unit.
pub type Amount = u128;

/// Serde adapter writing an [`Amount`] as a decimal string.
///
/// 128-bit integers don't survive buffered (internally tagged) serde
/// representations or JSON consumers limited to 53-bit numbers.
pub mod amount_serde {
    use serde::{Deserialize, Deserializer, Serializer, de};

    use super::Amount;

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Agent fee percentage, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FeePercentage(u8);

impl FeePercentage {
    /// Zero fee.
    pub const ZERO: Self = Self(0);

    /// Validate and wrap a percentage.
    ///
    /// # Errors
    /// Returns `InvalidFeePercentage` if `pct > 100`.
    pub fn new(pct: u8) -> Result<Self> {
        if pct > constants::MAX_FEE_PERCENTAGE {
            return Err(EscrowAgentError::InvalidFeePercentage(pct));
        }
        Ok(Self(pct))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Fee charged on `amount`, rounded down.
    ///
    /// Splits `amount` into hundreds and a remainder so the product never
    /// exceeds the fee itself; equals `floor(amount * pct / 100)` exactly.
    ///
    /// # Errors
    /// Returns `AmountOverflow` if the fee does not fit in [`Amount`].
    pub fn fee_on(self, amount: Amount) -> Result<Amount> {
        let pct = Amount::from(self.0);
        (amount / 100)
            .checked_mul(pct)
            .and_then(|whole| whole.checked_add((amount % 100) * pct / 100))
            .ok_or(EscrowAgentError::AmountOverflow)
    }

    /// Exact value the buyer must deposit: principal plus fee.
    ///
    /// # Errors
    /// Returns `AmountOverflow` if the sum does not fit in [`Amount`].
    pub fn required_deposit(self, amount: Amount) -> Result<Amount> {
        amount
            .checked_add(self.fee_on(amount)?)
            .ok_or(EscrowAgentError::AmountOverflow)
    }
}

impl Default for FeePercentage {
    fn default() -> Self {
        Self(constants::DEFAULT_AGENT_FEE_PERCENTAGE)
    }
}

impl TryFrom<u8> for FeePercentage {
    type Error = EscrowAgentError;

    fn try_from(pct: u8) -> Result<Self> {
        Self::new(pct)
    }
}

impl From<FeePercentage> for u8 {
    fn from(pct: FeePercentage) -> Self {
        pct.0
    }
}

impl fmt::Display for FeePercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
