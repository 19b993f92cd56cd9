//! A Tokio codec mapping byte streams to volt message streams.

use std::fmt;
use std::io::{Cursor, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use volt_chain::{
    block::{self, CountedHeader},
    parameters::{Magic, Network},
    serialization::{sha256d, SerializationError as Error, WireDeserialize, WireSerialize},
    transaction::{self, Transaction},
};

use crate::constants;
use crate::meta_addr::MetaAddr;

use super::{
    inv::InventoryHash,
    message::{GetBlocks, Message, MessageType, Version},
    types::Nonce,
};

/// The length of a frame header:
/// `magic (4) | type (2) | payload length (4) | checksum (4)`.
const HEADER_LEN: usize = 14usize;

/// A codec which produces volt messages from byte streams and vice versa.
pub struct Codec {
    builder: Builder,
    state: DecodeState,
}

/// A builder for specifying [`Codec`] options.
pub struct Builder {
    /// The network magic to use in encoding.
    network: Network,
    /// The maximum allowable message length.
    max_len: usize,
}

impl Codec {
    /// Return a builder for constructing a [`Codec`].
    pub fn builder() -> Builder {
        Builder {
            network: Network::Mainnet,
            max_len: constants::MAX_PROTOCOL_MESSAGE_LEN,
        }
    }
}

impl Builder {
    /// Finalize the builder and return a [`Codec`].
    pub fn finish(self) -> Codec {
        Codec {
            builder: self,
            state: DecodeState::Head,
        }
    }

    /// Configure the codec for the given [`Network`].
    pub fn for_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Configure the codec's maximum accepted payload size, in bytes.
    pub fn with_max_body_len(mut self, len: usize) -> Self {
        self.max_len = len;
        self
    }
}

// ======== Encoding =========

impl Encoder<Message> for Codec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        use Error::Parse;
        // Write the body first so the header can carry its checksum.
        let mut body = Vec::new();
        self.write_body(&item, &mut body)?;

        if body.len() > self.builder.max_len {
            return Err(Parse("body length exceeded maximum size"));
        }

        let mut header = [0u8; HEADER_LEN];
        let mut header_writer = Cursor::new(&mut header[..]);
        header_writer.write_all(&Magic::from(self.builder.network).0[..])?;
        header_writer.write_u16::<LittleEndian>(item.message_type() as u16)?;
        header_writer.write_u32::<LittleEndian>(body.len() as u32)?;
        header_writer.write_all(&sha256d::Checksum::from(&body[..]).0)?;

        dst.reserve(HEADER_LEN + body.len());
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&body);

        Ok(())
    }
}

impl Codec {
    /// Write the body of the message into the given writer. This allows
    /// writing the message body prior to writing the header, so that the
    /// header can contain a checksum of the message body.
    fn write_body<W: Write>(&self, msg: &Message, mut writer: W) -> Result<(), Error> {
        match msg {
            Message::Ping(nonce) => nonce.wire_serialize(&mut writer)?,
            Message::Pong(nonce) => nonce.wire_serialize(&mut writer)?,
            Message::Version(inner) => inner.wire_serialize(&mut writer)?,
            Message::Verack => { /* Empty payload -- no-op */ }
            Message::Address(addrs) => addrs.wire_serialize(&mut writer)?,
            Message::GetAddress => { /* Empty payload -- no-op */ }
            Message::GetBlocks(inner) => inner.wire_serialize(&mut writer)?,
            Message::Blocks(blocks) => blocks.wire_serialize(&mut writer)?,
            Message::GetHeader(hash) => hash.wire_serialize(&mut writer)?,
            Message::Header(counted) => counted.wire_serialize(&mut writer)?,
            Message::GetUnconfirmedTransactions => { /* Empty payload -- no-op */ }
            Message::KnownTransactions(hashes) => hashes.wire_serialize(&mut writer)?,
            Message::GetTransactions(hashes) => hashes.wire_serialize(&mut writer)?,
            Message::Transactions(transactions) => transactions.wire_serialize(&mut writer)?,
        }
        Ok(())
    }
}

// ======== Decoding =========

enum DecodeState {
    Head,
    Body {
        body_len: usize,
        message_type: MessageType,
        checksum: sha256d::Checksum,
    },
}

impl fmt::Debug for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeState::Head => write!(f, "DecodeState::Head"),
            DecodeState::Body {
                body_len,
                message_type,
                checksum,
            } => f
                .debug_struct("DecodeState::Body")
                .field("body_len", &body_len)
                .field("message_type", &message_type)
                .field("checksum", &checksum)
                .finish(),
        }
    }
}

impl Decoder for Codec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        use Error::Parse;
        match self.state {
            DecodeState::Head => {
                // First check that the src buffer contains an entire header.
                if src.len() < HEADER_LEN {
                    return Ok(None);
                }

                let header = src.split_to(HEADER_LEN);
                let mut header_reader = Cursor::new(&header);
                let magic = Magic(<[u8; 4]>::wire_deserialize(&mut header_reader)?);
                let raw_type = header_reader.read_u16::<LittleEndian>()?;
                let body_len = header_reader.read_u32::<LittleEndian>()? as usize;
                let checksum =
                    sha256d::Checksum(<[u8; 4]>::wire_deserialize(&mut header_reader)?);

                if magic != Magic::from(self.builder.network) {
                    return Err(Parse("supplied magic did not meet expectations"));
                }
                let message_type = MessageType::from_wire(raw_type)?;
                if body_len > self.builder.max_len {
                    return Err(Parse("body length exceeded maximum size"));
                }

                // Reserve buffer space for the expected body and the
                // following header.
                src.reserve(body_len + HEADER_LEN);

                self.state = DecodeState::Body {
                    body_len,
                    message_type,
                    checksum,
                };

                // Now that the state is updated, recurse to attempt body decoding.
                self.decode(src)
            }
            DecodeState::Body {
                body_len,
                message_type,
                checksum,
            } => {
                if src.len() < body_len {
                    // Need to wait for the full body
                    return Ok(None);
                }

                // Now that we know we have the full body, split off the body,
                // and reset the decoder state for the next message. Otherwise
                // we will attempt to read the next header as the current body.
                let body = src.split_to(body_len);
                self.state = DecodeState::Head;

                if checksum != sha256d::Checksum::from(&body[..]) {
                    return Err(Parse(
                        "supplied message checksum does not match computed checksum",
                    ));
                }

                let mut body_reader = Cursor::new(&body);
                let msg = match message_type {
                    MessageType::Ping => Message::Ping(Nonce::wire_deserialize(&mut body_reader)?),
                    MessageType::Pong => Message::Pong(Nonce::wire_deserialize(&mut body_reader)?),
                    MessageType::Version => {
                        Message::Version(Version::wire_deserialize(&mut body_reader)?)
                    }
                    MessageType::Verack => Message::Verack,
                    MessageType::Address => {
                        let addrs = Vec::<MetaAddr>::wire_deserialize(&mut body_reader)?;
                        if addrs.len() > constants::MAX_ADDRS_PER_MESSAGE {
                            return Err(Parse("address message carries too many entries"));
                        }
                        Message::Address(addrs)
                    }
                    MessageType::GetAddress => Message::GetAddress,
                    MessageType::GetBlocks => {
                        Message::GetBlocks(GetBlocks::wire_deserialize(&mut body_reader)?)
                    }
                    MessageType::Blocks => {
                        let blocks =
                            Vec::<Arc<block::Block>>::wire_deserialize(&mut body_reader)?;
                        if blocks.len() > constants::MAX_BLOCKS_PER_MESSAGE {
                            return Err(Parse("blocks message carries too many blocks"));
                        }
                        Message::Blocks(blocks)
                    }
                    MessageType::GetHeader => {
                        Message::GetHeader(block::Hash::wire_deserialize(&mut body_reader)?)
                    }
                    MessageType::Header => {
                        Message::Header(CountedHeader::wire_deserialize(&mut body_reader)?)
                    }
                    MessageType::GetUnconfirmedTransactions => {
                        Message::GetUnconfirmedTransactions
                    }
                    MessageType::KnownTransactions => Message::KnownTransactions(
                        Vec::<InventoryHash>::wire_deserialize(&mut body_reader)?,
                    ),
                    MessageType::GetTransactions => Message::GetTransactions(
                        Vec::<transaction::Hash>::wire_deserialize(&mut body_reader)?,
                    ),
                    MessageType::Transactions => Message::Transactions(
                        Vec::<Arc<Transaction>>::wire_deserialize(&mut body_reader)?,
                    ),
                };
                Ok(Some(msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::prelude::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tokio::runtime::Runtime;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use crate::protocol::message::Version;
    use crate::protocol::types::PeerServices;
    use volt_chain::block::Height;

    fn round_trip(message: Message) -> Message {
        let rt = Runtime::new().unwrap();

        let bytes = rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(&mut bytes, Codec::builder().finish());
                fw.send(message.clone())
                    .await
                    .expect("message should be serialized");
            }
            bytes
        });

        rt.block_on(async {
            let mut fr = FramedRead::new(Cursor::new(&bytes), Codec::builder().finish());
            fr.next()
                .await
                .expect("a next message should be available")
                .expect("that message should deserialize")
        })
    }

    #[test]
    fn version_message_round_trip() {
        let services = PeerServices::NODE_NETWORK;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 6)), 9567);

        let version = Message::Version(Version::new(
            crate::constants::CURRENT_VERSION,
            addr,
            services,
            services,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), 9567),
            Nonce(0x9082_4908_8927_9238),
            "/volt:0.1.0/".to_owned(),
            Height(540_000),
        ));

        assert_eq!(round_trip(version.clone()), version);
    }

    #[test]
    fn empty_payload_messages_round_trip() {
        for message in [
            Message::Verack,
            Message::GetAddress,
            Message::GetUnconfirmedTransactions,
        ] {
            assert_eq!(round_trip(message.clone()), message);
        }
    }

    #[test]
    fn ping_pong_round_trip() {
        let ping = Message::Ping(Nonce(7));
        let pong = Message::Pong(Nonce(7));
        assert_eq!(round_trip(ping.clone()), ping);
        assert_eq!(round_trip(pong.clone()), pong);
    }

    #[test]
    fn inventory_round_trip() {
        let inv = Message::KnownTransactions(vec![
            InventoryHash::Error,
            InventoryHash::Tx(transaction::Hash([0xab; 32])),
            InventoryHash::Block(block::Hash([0xcd; 32])),
        ]);
        assert_eq!(round_trip(inv.clone()), inv);
    }

    #[test]
    fn get_blocks_round_trip() {
        let locator = Message::GetBlocks(GetBlocks {
            block_header_hashes: vec![block::Hash([1; 32]), block::Hash([2; 32])],
            stop_hash: None,
        });
        assert_eq!(round_trip(locator.clone()), locator);

        let capped = Message::GetBlocks(GetBlocks {
            block_header_hashes: vec![block::Hash([3; 32])],
            stop_hash: Some(block::Hash([4; 32])),
        });
        assert_eq!(round_trip(capped.clone()), capped);
    }

    #[test]
    fn wrong_network_magic_is_rejected() {
        let rt = Runtime::new().unwrap();

        let bytes = rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(
                    &mut bytes,
                    Codec::builder().for_network(Network::Testnet).finish(),
                );
                fw.send(Message::Verack).await.expect("encodes");
            }
            bytes
        });

        rt.block_on(async {
            let mut fr = FramedRead::new(
                Cursor::new(&bytes),
                Codec::builder().for_network(Network::Mainnet).finish(),
            );
            fr.next()
                .await
                .expect("a next message should be available")
                .expect_err("mainnet codec must reject testnet magic");
        });
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let rt = Runtime::new().unwrap();

        let mut bytes = rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(&mut bytes, Codec::builder().finish());
                fw.send(Message::Ping(Nonce(1))).await.expect("encodes");
            }
            bytes
        });
        // Flip a payload byte without updating the checksum.
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        rt.block_on(async {
            let mut fr = FramedRead::new(Cursor::new(&bytes), Codec::builder().finish());
            fr.next()
                .await
                .expect("a next message should be available")
                .expect_err("corrupted payload must fail the checksum");
        });
    }

    #[test]
    fn oversized_body_is_rejected() {
        let rt = Runtime::new().unwrap();

        let message = Message::GetTransactions(vec![transaction::Hash([9; 32]); 4]);
        let bytes = rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(&mut bytes, Codec::builder().finish());
                fw.send(message.clone()).await.expect("encodes");
            }
            bytes
        });
        let size = 1 + 4 * 32;

        rt.block_on(async {
            let mut fr = FramedRead::new(
                Cursor::new(&bytes),
                Codec::builder().with_max_body_len(size - 1).finish(),
            );
            fr.next()
                .await
                .expect("a next message should be available")
                .expect_err("body larger than the limit must be rejected");
        });
    }
}
