use thiserror::Error;

use volt_chain::SerializationError;

/// Reasons a peer connection ends, each mapped to the ban score the
/// violation earns.
#[derive(Error, Debug)]
pub enum PeerError {
    /// The socket failed.
    #[error("connection io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent a frame that failed the codec: bad magic, bad
    /// checksum, unknown type, oversized body, or a malformed payload.
    #[error("protocol violation: {0}")]
    Protocol(#[from] SerializationError),

    /// The peer sent a message its handshake state does not allow.
    #[error("message not allowed before the handshake completed")]
    UnexpectedMessage,

    /// The peer's `Version` carried the nonce we sent: we dialled ourselves.
    #[error("connection to self detected")]
    SelfConnection,

    /// The peer's accumulated ban score crossed the threshold.
    #[error("peer banned for repeated violations")]
    Banned,

    /// Nothing arrived within the inactivity limit.
    #[error("peer idle past the inactivity limit")]
    IdleTimeout,

    /// Two heartbeats elapsed without a matching pong.
    #[error("peer failed to answer a heartbeat")]
    HeartbeatTimeout,

    /// The peer closed the connection.
    #[error("peer closed the connection")]
    ConnectionClosed,

    /// The node is shutting down.
    #[error("node is shutting down")]
    Shutdown,
}

impl PeerError {
    /// The ban score this failure earns the peer's address.
    pub fn ban_score(&self) -> u8 {
        match self {
            PeerError::Protocol(_) => 10,
            PeerError::UnexpectedMessage => 50,
            PeerError::Io(_)
            | PeerError::SelfConnection
            | PeerError::Banned
            | PeerError::IdleTimeout
            | PeerError::HeartbeatTimeout
            | PeerError::ConnectionClosed
            | PeerError::Shutdown => 0,
        }
    }
}
