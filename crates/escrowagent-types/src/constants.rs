//! System-wide constants for the EscrowAgent ledger.

/// Agent fee percentage used when a config does not name one.
pub const DEFAULT_AGENT_FEE_PERCENTAGE: u8 = 10;

/// Upper bound for any agent fee percentage.
pub const MAX_FEE_PERCENTAGE: u8 = 100;

/// Default capacity of the live event broadcast channel.
/// Slow subscribers that fall further behind than this observe a lag and
/// must catch up from the event journal.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Domain separator mixed into every event digest.
pub const EVENT_DIGEST_DOMAIN: &[u8] = b"escrowagent:event:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "EscrowAgent";
