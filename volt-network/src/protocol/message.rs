//! Definitions of network messages.

use std::{fmt, sync::Arc};

use volt_chain::{
    block::{self, Block, CountedHeader},
    transaction::{self, Transaction},
    SerializationError,
};

use super::inv::InventoryHash;
use super::types::Nonce;
use crate::meta_addr::MetaAddr;

mod get_blocks;
pub use get_blocks::GetBlocks;

mod version;
pub use version::Version;

/// The wire identifier of each message kind.
///
/// Messages are identified by a little-endian u16 in the frame header; an
/// unknown value is a framing error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum MessageType {
    /// `Ping`
    Ping = 0,
    /// `Pong`
    Pong = 1,
    /// `Version`
    Version = 2,
    /// `Verack`
    Verack = 3,
    /// `Address`
    Address = 4,
    /// `GetAddress`
    GetAddress = 5,
    /// `GetBlocks`
    GetBlocks = 6,
    /// `Blocks`
    Blocks = 7,
    /// `GetHeader`
    GetHeader = 8,
    /// `Header`
    Header = 9,
    /// `GetUnconfirmedTransactions`
    GetUnconfirmedTransactions = 10,
    /// `KnownTransactions`
    KnownTransactions = 11,
    /// `GetTransactions`
    GetTransactions = 12,
    /// `Transactions`
    Transactions = 13,
}

impl MessageType {
    /// Decode a wire value.
    pub fn from_wire(value: u16) -> Result<MessageType, SerializationError> {
        use MessageType::*;
        Ok(match value {
            0 => Ping,
            1 => Pong,
            2 => Version,
            3 => Verack,
            4 => Address,
            5 => GetAddress,
            6 => GetBlocks,
            7 => Blocks,
            8 => GetHeader,
            9 => Header,
            10 => GetUnconfirmedTransactions,
            11 => KnownTransactions,
            12 => GetTransactions,
            13 => Transactions,
            _ => return Err(SerializationError::Parse("unknown message type")),
        })
    }
}

/// A volt network message.
///
/// This enum stores an internal representation, unlinked from the wire
/// format; the translation between the two happens only during serialization
/// and deserialization in the [`Codec`](super::codec::Codec). This gives a
/// clearly-defined validation boundary for network messages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    /// A liveness probe carrying a nonce the peer must echo.
    Ping(Nonce),

    /// The answer to a `Ping`, carrying the same nonce.
    Pong(Nonce),

    /// The first half of the handshake.
    ///
    /// Although this is called `version`, its role is really analogous to a
    /// `ClientHello` in TLS, used to begin a handshake, and is distinct from
    /// a simple version number.
    Version(Version),

    /// Acknowledges a `Version`, completing the handshake.
    Verack,

    /// A gossiped list of `(last seen, address)` pairs, at most 1000.
    Address(Vec<MetaAddr>),

    /// Asks a peer for a sample of its address pool.
    GetAddress,

    /// Asks for the blocks following the sender's best chain, located via a
    /// block locator.
    ///
    /// `block_header_hashes` is a series of known block hashes spaced out
    /// along the sender's best chain. The receiver uses them to find the
    /// intersection with its own chain and replies with the blocks after it.
    GetBlocks(GetBlocks),

    /// A batch of up to 500 blocks, guaranteed to connect in order from the
    /// first to the last.
    Blocks(Vec<Arc<Block>>),

    /// Asks for the header of the named block.
    GetHeader(block::Hash),

    /// A block header with its transaction count.
    Header(CountedHeader),

    /// Asks a peer for the inventory of its transaction pool.
    GetUnconfirmedTransactions,

    /// The inventory of a transaction pool.
    KnownTransactions(Vec<InventoryHash>),

    /// Asks for the full transactions named by hash.
    GetTransactions(Vec<transaction::Hash>),

    /// Full transactions, in reply to `GetTransactions` or as a relay.
    Transactions(Vec<Arc<Transaction>>),
}

impl Message {
    /// The wire identifier for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Ping(_) => MessageType::Ping,
            Message::Pong(_) => MessageType::Pong,
            Message::Version(_) => MessageType::Version,
            Message::Verack => MessageType::Verack,
            Message::Address(_) => MessageType::Address,
            Message::GetAddress => MessageType::GetAddress,
            Message::GetBlocks(_) => MessageType::GetBlocks,
            Message::Blocks(_) => MessageType::Blocks,
            Message::GetHeader(_) => MessageType::GetHeader,
            Message::Header(_) => MessageType::Header,
            Message::GetUnconfirmedTransactions => MessageType::GetUnconfirmedTransactions,
            Message::KnownTransactions(_) => MessageType::KnownTransactions,
            Message::GetTransactions(_) => MessageType::GetTransactions,
            Message::Transactions(_) => MessageType::Transactions,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Version { .. } => "version",
            Message::Verack => "verack",
            Message::Address(_) => "address",
            Message::GetAddress => "getaddress",
            Message::GetBlocks { .. } => "getblocks",
            Message::Blocks(_) => "blocks",
            Message::GetHeader(_) => "getheader",
            Message::Header(_) => "header",
            Message::GetUnconfirmedTransactions => "getunconfirmedtransactions",
            Message::KnownTransactions(_) => "knowntransactions",
            Message::GetTransactions(_) => "gettransactions",
            Message::Transactions(_) => "transactions",
        })
    }
}
