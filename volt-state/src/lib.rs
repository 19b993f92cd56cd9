//! Durable chain state for volt: segmented append-only block and revert
//! stores, a sled-backed metadata index, and the in-memory UTXO set.

mod config;
mod index;
mod meta;
mod revert;
mod segment;
mod service;
mod utxo;

pub mod util;

use thiserror::Error;

pub use config::Config;
pub use index::BlockIndex;
pub use meta::{BlockMetadata, BlockStatus, TransactionMetadata};
pub use revert::RevertData;
pub use segment::{SegmentStore, StoragePointer, MAX_SEGMENT_BYTES};
pub use service::PersistenceService;
pub use utxo::{Utxo, UtxoSet};

/// A boxed error at a subsystem boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from the persistence layer.
///
/// `Io` and `Database` failures are not locally recoverable: callers log,
/// refuse further writes, and shut the node down rather than risk silent
/// divergence. `Corruption` means a stored record failed its magic or framing
/// check and must not be served.
#[derive(Error, Debug)]
pub enum StateError {
    /// An I/O failure in a segment store.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record failed its magic or framing check.
    #[error("storage corruption: {0}")]
    Corruption(&'static str),

    /// A persisted value failed to decode.
    #[error("storage decoding error: {0}")]
    Serialization(#[from] volt_chain::SerializationError),

    /// The metadata key-value store failed.
    #[error("metadata store error: {0}")]
    Database(#[from] sled::Error),

    /// A pointer or hash referenced data that is not present.
    #[error("referenced data is not present in the store")]
    NotFound,
}
