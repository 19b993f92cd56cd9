//! The volt peer-to-peer networking stack: wire codec, per-peer protocol
//! state machine, persistent address book, and initial block download.

pub mod address_book;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod meta_addr;
pub mod peer;
pub mod peer_set;
pub mod protocol;
pub mod sync;

pub use address_book::AddressBook;
pub use config::Config;
pub use dispatch::{BlockVerdict, ChainInfo, DispatchError, NodeClient, NodeRequest, TxVerdict};
pub use meta_addr::{AddressMetadata, MetaAddr};
pub use peer_set::{PeerSet, SyncEvent};
pub use sync::{SyncProgress, Syncer};

/// A boxed error at a subsystem boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
