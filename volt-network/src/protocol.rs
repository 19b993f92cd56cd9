//! The wire protocol: framing, message catalogue, and payload types.

pub mod codec;
pub mod inv;
pub mod message;
pub mod types;

pub use codec::Codec;
pub use inv::InventoryHash;
pub use message::{GetBlocks, Message, MessageType, Version};
