//! Core chain data structures and consensus-critical serialization for volt.
#![allow(clippy::unit_arg)]

#[macro_use]
extern crate serde;

pub mod amount;
pub mod block;
pub mod cached;
pub mod compactint;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod transfer;
pub mod work;

pub use cached::Cached;
pub use serialization::{
    SerializationError, WireDeserialize, WireDeserializeInto, WireSerialize,
};
