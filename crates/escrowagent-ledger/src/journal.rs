//! Append-only event journal with a SHA-256 hash chain.
//!
//! Subscribers that fall behind the live broadcast channel catch up from
//! here by sequence number. `verify_chain` replays every digest from the
//! genesis value.

use escrowagent_types::{EscrowAgentError, EventEnvelope, LedgerEvent, Result};

/// Ordered, sealed history of every successful mutation.
#[derive(Debug, Clone)]
pub struct EventJournal {
    envelopes: Vec<EventEnvelope>,
    head: [u8; 32],
}

impl EventJournal {
    #[must_use]
    pub fn new() -> Self {
        Self {
            envelopes: Vec::new(),
            head: EventEnvelope::GENESIS_DIGEST,
        }
    }

    /// Seal `event` at the next sequence number and append it.
    ///
    /// # Errors
    /// Returns `Serialization` if the event cannot be encoded for hashing.
    pub fn append(&mut self, event: LedgerEvent) -> Result<EventEnvelope> {
        let sequence = self.next_sequence();
        let envelope = EventEnvelope::seal(&self.head, sequence, event)?;
        self.head = envelope.digest;
        tracing::debug!(
            sequence,
            event = envelope.event.name(),
            digest = %envelope.digest_hex(),
            "Event journaled"
        );
        self.envelopes.push(envelope.clone());
        Ok(envelope)
    }

    /// Envelopes with `sequence >= from`, oldest first.
    #[must_use]
    pub fn since(&self, from: u64) -> &[EventEnvelope] {
        usize::try_from(from)
            .ok()
            .and_then(|start| self.envelopes.get(start..))
            .unwrap_or(&[])
    }

    /// Sequence number the next event will receive.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.envelopes.len() as u64
    }

    /// Digest of the newest envelope, or genesis when empty.
    #[must_use]
    pub fn head_digest(&self) -> [u8; 32] {
        self.head
    }

    /// Recompute the whole chain and compare its tip with the head.
    ///
    /// # Errors
    /// Returns `Internal` naming the first envelope whose sequence or digest
    /// doesn't match its position, or if the replayed tip isn't the head.
    pub fn verify_chain(&self) -> Result<()> {
        let mut prev = EventEnvelope::GENESIS_DIGEST;
        for (position, envelope) in (0u64..).zip(&self.envelopes) {
            if envelope.sequence != position || !envelope.verify(&prev)? {
                return Err(EscrowAgentError::Internal(format!(
                    "event chain broken at sequence {position}"
                )));
            }
            prev = envelope.digest;
        }
        if prev != self.head_digest() {
            return Err(EscrowAgentError::Internal(
                "event chain tip does not match journal head".into(),
            ));
        }
        Ok(())
    }
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use escrowagent_types::Address;

    fn applied() -> LedgerEvent {
        LedgerEvent::AgentApplied {
            address: Address::random(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn sequences_are_gap_free() {
        let mut journal = EventJournal::new();
        for expected in 0..5 {
            assert_eq!(journal.append(applied()).unwrap().sequence, expected);
        }
        assert_eq!(journal.next_sequence(), 5);
        assert!(journal.verify_chain().is_ok());
    }

    #[test]
    fn head_tracks_last_digest() {
        let mut journal = EventJournal::new();
        assert_eq!(journal.next_sequence(), 0);
        assert_eq!(journal.head_digest(), EventEnvelope::GENESIS_DIGEST);
        let env = journal.append(applied()).unwrap();
        assert_eq!(journal.head_digest(), env.digest);
    }

    #[test]
    fn since_slices_from_sequence() {
        let mut journal = EventJournal::new();
        for _ in 0..4 {
            journal.append(applied()).unwrap();
        }
        let tail = journal.since(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 2);
        assert!(journal.since(4).is_empty());
        assert!(journal.since(u64::MAX).is_empty());
        assert_eq!(journal.since(0).len(), 4);
    }

    #[test]
    fn tampering_breaks_the_chain() {
        let mut journal = EventJournal::new();
        for _ in 0..3 {
            journal.append(applied()).unwrap();
        }
        journal.envelopes[1].event = applied();
        let err = journal.verify_chain().unwrap_err();
        assert!(err.to_string().contains("sequence 1"));
    }

    #[test]
    fn dropped_tail_is_detected() {
        let mut journal = EventJournal::new();
        for _ in 0..3 {
            journal.append(applied()).unwrap();
        }
        journal.envelopes.pop();
        let err = journal.verify_chain().unwrap_err();
        assert!(err.to_string().contains("does not match journal head"));
    }
}
