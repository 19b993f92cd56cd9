//! Per-peer connection handling: handshake, heartbeats, and message
//! dispatch.

mod connection;
mod error;

pub use connection::{Connection, OutboundEvent};
pub use error::PeerError;

/// The handshake state of a peer connection.
///
/// Both sides send `Version` immediately after connecting; a peer reaches
/// `Ready` once it has both seen the remote `Version` and received a
/// `Verack` for its own. No other message type is accepted before `Ready`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PeerState {
    /// Socket established, nothing sent yet.
    Connected,
    /// Our `Version` is on the wire.
    VersionSent,
    /// The remote `Version` arrived and was acknowledged.
    VersionExchanged,
    /// Handshake complete; full protocol traffic flows.
    Ready,
    /// The connection is closing.
    Disconnected,
}
