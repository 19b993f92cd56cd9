use std::net::SocketAddr;

use chrono::{TimeZone, Utc};

use volt_chain::block::Height;
use volt_chain::{SerializationError, WireDeserialize, WireSerialize};
use volt_serde_derive::{WireDeserialize, WireSerialize};

use super::super::types::{Nonce, PeerServices, ProtocolVersion};

/// A `version` message.
///
/// Both sides of a fresh connection send one; the nonce detects connections
/// to self, and the advertised best height seeds initial block download.
#[derive(Clone, PartialEq, Eq, Debug, WireSerialize, WireDeserialize)]
pub struct Version {
    /// The network version number supported by the sender.
    pub version: ProtocolVersion,

    /// The network services advertised by the sender.
    pub services: PeerServices,

    /// The time when the version message was sent.
    pub timestamp: chrono::DateTime<Utc>,

    /// The network address of the node receiving this message, and its
    /// advertised network services.
    pub address_recv: (PeerServices, SocketAddr),

    /// The network address of the node sending this message, and its
    /// advertised network services.
    pub address_from: (PeerServices, SocketAddr),

    /// Node random nonce, randomly generated every time a version
    /// packet is sent. This nonce is used to detect connections
    /// to self.
    pub nonce: Nonce,

    /// The user agent advertised by the sender.
    pub user_agent: String,

    /// The height of the last block the sender has applied.
    pub best_height: Height,
}

impl Version {
    /// Build the `Version` we send to a peer.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: ProtocolVersion,
        their_ip: SocketAddr,
        their_services: PeerServices,
        our_services: PeerServices,
        our_ip: SocketAddr,
        nonce: Nonce,
        user_agent: String,
        best_height: Height,
    ) -> Version {
        // Truncate the timestamp to the nearest 5 minutes, so clock skew
        // between peers stays within the tolerated range.
        let now = Utc::now().timestamp();
        let timestamp = Utc
            .timestamp_opt(now - now.rem_euclid(5 * 60), 0)
            .single()
            .expect("truncating a valid timestamp keeps it valid");
        Version {
            version,
            services: our_services,
            timestamp,
            address_recv: (their_services, their_ip),
            address_from: (our_services, our_ip),
            nonce,
            user_agent,
            best_height,
        }
    }
}
