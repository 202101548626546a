//! Ledger events: the only externally meaningful output besides queries.
//!
//! Every state-changing operation emits exactly one [`LedgerEvent`]. The
//! ledger wraps each event in an [`EventEnvelope`] carrying a gap-free
//! sequence number and a hash-chain digest, so a subscriber that keeps a
//! cached view can tell when it has missed or been fed altered events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Address, Amount, EscrowId, EscrowRecord, FeePercentage, Result, constants};

/// A typed record of one completed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    /// A new escrow was created; carries the full record.
    EscrowInitiated {
        escrow: EscrowRecord,
        timestamp: DateTime<Utc>,
    },
    /// The buyer deposited principal plus fee.
    EscrowPaid {
        id: EscrowId,
        buyer: Address,
        #[serde(with = "crate::fee::amount_serde")]
        amount: Amount,
        timestamp: DateTime<Utc>,
    },
    /// Principal paid to the seller; fee retained.
    EscrowApproved {
        id: EscrowId,
        seller: Address,
        #[serde(with = "crate::fee::amount_serde")]
        payout: Amount,
        #[serde(with = "crate::fee::amount_serde")]
        fee: Amount,
        timestamp: DateTime<Utc>,
    },
    /// Principal refunded to the buyer; fee retained.
    EscrowCanceled {
        id: EscrowId,
        buyer: Address,
        #[serde(with = "crate::fee::amount_serde")]
        refund: Amount,
        #[serde(with = "crate::fee::amount_serde")]
        fee: Amount,
        timestamp: DateTime<Utc>,
    },
    /// Escrow closed before any deposit.
    EscrowArchived {
        id: EscrowId,
        timestamp: DateTime<Utc>,
    },
    /// The Owner withdrew from the fee pool.
    FundsWithdrawn {
        to: Address,
        #[serde(with = "crate::fee::amount_serde")]
        amount: Amount,
        timestamp: DateTime<Utc>,
    },
    /// The global fee for new escrows changed.
    AgentFeePercentageUpdated {
        percentage: FeePercentage,
        timestamp: DateTime<Utc>,
    },
    AgentAdded {
        address: Address,
        timestamp: DateTime<Utc>,
    },
    AgentRevoked {
        address: Address,
        timestamp: DateTime<Utc>,
    },
    /// A visitor joined the agent waitlist.
    AgentApplied {
        address: Address,
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Stable event name, matching the variant.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::EscrowInitiated { .. } => "EscrowInitiated",
            Self::EscrowPaid { .. } => "EscrowPaid",
            Self::EscrowApproved { .. } => "EscrowApproved",
            Self::EscrowCanceled { .. } => "EscrowCanceled",
            Self::EscrowArchived { .. } => "EscrowArchived",
            Self::FundsWithdrawn { .. } => "FundsWithdrawn",
            Self::AgentFeePercentageUpdated { .. } => "AgentFeePercentageUpdated",
            Self::AgentAdded { .. } => "AgentAdded",
            Self::AgentRevoked { .. } => "AgentRevoked",
            Self::AgentApplied { .. } => "AgentApplied",
        }
    }

    /// The escrow this event concerns, if any.
    #[must_use]
    pub fn escrow_id(&self) -> Option<EscrowId> {
        match self {
            Self::EscrowInitiated { escrow, .. } => Some(escrow.id),
            Self::EscrowPaid { id, .. }
            | Self::EscrowApproved { id, .. }
            | Self::EscrowCanceled { id, .. }
            | Self::EscrowArchived { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// A journaled event with its position and chained digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Zero-based, gap-free position in the event stream.
    pub sequence: u64,
    pub event: LedgerEvent,
    /// `SHA-256(prev_digest || domain || sequence_le || json(event))`.
    pub digest: [u8; 32],
}

impl EventEnvelope {
    /// Digest preceding the first event.
    pub const GENESIS_DIGEST: [u8; 32] = [0u8; 32];

    /// Wrap `event` at `sequence`, chaining from `prev_digest`.
    ///
    /// # Errors
    /// Returns `Serialization` if the event cannot be encoded.
    pub fn seal(prev_digest: &[u8; 32], sequence: u64, event: LedgerEvent) -> Result<Self> {
        let digest = Self::compute_digest(prev_digest, sequence, &event)?;
        Ok(Self {
            sequence,
            event,
            digest,
        })
    }

    /// Recompute the digest this envelope should carry.
    pub fn compute_digest(
        prev_digest: &[u8; 32],
        sequence: u64,
        event: &LedgerEvent,
    ) -> Result<[u8; 32]> {
        let payload = serde_json::to_vec(event)?;
        let mut hasher = Sha256::new();
        hasher.update(prev_digest);
        hasher.update(constants::EVENT_DIGEST_DOMAIN);
        hasher.update(sequence.to_le_bytes());
        hasher.update(&payload);
        Ok(hasher.finalize().into())
    }

    /// Does this envelope follow `prev_digest` correctly?
    pub fn verify(&self, prev_digest: &[u8; 32]) -> Result<bool> {
        Ok(Self::compute_digest(prev_digest, self.sequence, &self.event)? == self.digest)
    }

    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(address: Address) -> LedgerEvent {
        LedgerEvent::AgentAdded {
            address,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn serde_is_type_tagged() {
        let event = LedgerEvent::EscrowArchived {
            id: EscrowId(4),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "EscrowArchived");
        assert_eq!(json["id"], 4);
        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn large_amounts_survive_tagged_roundtrip() {
        let event = LedgerEvent::EscrowCanceled {
            id: EscrowId(0),
            buyer: Address::random(),
            refund: 2_500_000_000_000_000_000,
            fee: 250_000_000_000_000_000,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"refund\":\"2500000000000000000\""));
        let back: LedgerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn escrow_id_extraction() {
        let rec = EscrowRecord::dummy(EscrowId(9), 10, FeePercentage::default());
        let ts = rec.created_at;
        let initiated = LedgerEvent::EscrowInitiated {
            escrow: rec,
            timestamp: ts,
        };
        assert_eq!(initiated.escrow_id(), Some(EscrowId(9)));
        assert_eq!(initiated.name(), "EscrowInitiated");
        assert_eq!(added(Address::random()).escrow_id(), None);
    }

    #[test]
    fn digest_is_deterministic_and_chained() {
        let event = added(Address::from_bytes([1; 20]));
        let a = EventEnvelope::seal(&EventEnvelope::GENESIS_DIGEST, 0, event.clone()).unwrap();
        let b = EventEnvelope::seal(&EventEnvelope::GENESIS_DIGEST, 0, event.clone()).unwrap();
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.digest_hex().len(), 64);

        let other_seq = EventEnvelope::seal(&EventEnvelope::GENESIS_DIGEST, 1, event.clone()).unwrap();
        assert_ne!(a.digest, other_seq.digest);

        let other_prev = EventEnvelope::seal(&a.digest, 0, event).unwrap();
        assert_ne!(a.digest, other_prev.digest);
    }

    #[test]
    fn tampered_event_fails_verification() {
        let env = EventEnvelope::seal(
            &EventEnvelope::GENESIS_DIGEST,
            0,
            LedgerEvent::FundsWithdrawn {
                to: Address::from_bytes([2; 20]),
                amount: 20,
                timestamp: Utc::now(),
            },
        )
        .unwrap();
        assert!(env.verify(&EventEnvelope::GENESIS_DIGEST).unwrap());

        let mut forged = env.clone();
        if let LedgerEvent::FundsWithdrawn { amount, .. } = &mut forged.event {
            *amount = 2_000;
        }
        assert!(!forged.verify(&EventEnvelope::GENESIS_DIGEST).unwrap());
    }
}
