//! Protocol-wide constants.

use crate::protocol::types::ProtocolVersion;

/// The protocol version this node speaks.
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion(1);

/// Maximum size of a protocol message body.
pub const MAX_PROTOCOL_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// The most blocks a single `Blocks` message may carry.
pub const MAX_BLOCKS_PER_MESSAGE: usize = 500;

/// The byte budget for a `Blocks` batch, leaving headroom in the frame.
pub const BLOCK_BATCH_BYTE_BUDGET: usize = 8 * 1024 * 1024;

/// The most addresses a single `Address` message may carry.
pub const MAX_ADDRS_PER_MESSAGE: usize = 1000;

/// Ban-score threshold: at or above this the peer is banned.
pub const BAN_THRESHOLD: u8 = 100;

/// How long a ban lasts, in seconds (24 hours).
pub const BAN_DURATION_SECS: i64 = 24 * 60 * 60;

/// Addresses not seen for this long are dropped from the pool (10 days).
pub const ADDR_RETENTION_SECS: i64 = 10 * 24 * 60 * 60;

/// Only addresses seen within this window are gossiped (3 hours).
pub const ADDR_ACTIVE_WINDOW_SECS: i64 = 3 * 60 * 60;

/// How long the syncer waits for a requested block batch before moving to
/// another peer.
pub const SYNC_BATCH_TIMEOUT_SECS: u64 = 60;
