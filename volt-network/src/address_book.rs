//! The persistent pool of known peer addresses.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use tracing::{debug, info};

use volt_chain::{WireDeserializeInto, WireSerialize};

use crate::constants::{
    ADDR_ACTIVE_WINDOW_SECS, ADDR_RETENTION_SECS, BAN_DURATION_SECS, BAN_THRESHOLD,
};
use crate::meta_addr::{AddressMetadata, MetaAddr};
use crate::BoxError;

/// The pool of every peer address this node has learnt, with per-address ban
/// state. Persisted in its own sled database and mirrored in memory.
pub struct AddressBook {
    tree: sled::Tree,
    by_addr: HashMap<SocketAddr, AddressMetadata>,
}

impl AddressBook {
    /// Open (or create) the pool at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<AddressBook, BoxError> {
        let db = sled::Config::new().path(path.as_ref()).open()?;
        let tree = db.open_tree(b"addresses")?;

        let mut by_addr = HashMap::new();
        for item in tree.iter() {
            let (_, value) = item?;
            let meta: AddressMetadata = value.as_ref().wire_deserialize_into()?;
            by_addr.insert(meta.addr, meta);
        }
        info!(count = by_addr.len(), "loaded address pool");
        Ok(AddressBook { tree, by_addr })
    }

    /// An in-memory pool for tests.
    pub fn open_temporary() -> Result<AddressBook, BoxError> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree(b"addresses")?;
        Ok(AddressBook {
            tree,
            by_addr: HashMap::new(),
        })
    }

    /// Record that `addr` was seen at `last_seen`. Returns true if the
    /// address was previously unknown.
    pub fn update(&mut self, addr: SocketAddr, last_seen: DateTime<Utc>) -> bool {
        let is_new = !self.by_addr.contains_key(&addr);
        let meta = self
            .by_addr
            .entry(addr)
            .or_insert_with(|| AddressMetadata::new(addr, last_seen));
        if last_seen > meta.last_seen {
            meta.last_seen = last_seen;
        }
        let meta = *meta;
        self.persist(&meta);
        is_new
    }

    /// Up to `amount` randomly sampled addresses that are not banned and
    /// were active within the gossip window.
    pub fn get_random(&self, amount: usize, now: DateTime<Utc>) -> Vec<MetaAddr> {
        let cutoff = now - Duration::seconds(ADDR_ACTIVE_WINDOW_SECS);
        let mut live: Vec<MetaAddr> = self
            .by_addr
            .values()
            .filter(|meta| !meta.banned && meta.last_seen >= cutoff)
            .map(AddressMetadata::meta_addr)
            .collect();
        live.shuffle(&mut rand::thread_rng());
        live.truncate(amount);
        live
    }

    /// Add `score` to an address's misbehaviour record. Crossing the ban
    /// threshold bans it for 24 hours. Returns true if the address is now
    /// banned.
    pub fn bump_ban_score(&mut self, addr: SocketAddr, score: u8, now: DateTime<Utc>) -> bool {
        let meta = self
            .by_addr
            .entry(addr)
            .or_insert_with(|| AddressMetadata::new(addr, now));
        meta.ban_score = meta.ban_score.saturating_add(score);
        if meta.ban_score >= BAN_THRESHOLD && !meta.banned {
            meta.banned = true;
            meta.ban_time = now;
            debug!(%addr, "address crossed the ban threshold");
        }
        let meta = *meta;
        self.persist(&meta);
        meta.banned
    }

    /// Whether the address is currently banned.
    pub fn is_banned(&self, addr: &SocketAddr) -> bool {
        self.by_addr
            .get(addr)
            .map(|meta| meta.banned)
            .unwrap_or(false)
    }

    /// Drop entries not seen within the retention window.
    pub fn cleanup(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(ADDR_RETENTION_SECS);
        let stale: Vec<SocketAddr> = self
            .by_addr
            .values()
            .filter(|meta| meta.last_seen < cutoff)
            .map(|meta| meta.addr)
            .collect();
        for addr in &stale {
            self.by_addr.remove(addr);
            let _ = self.tree.remove(addr_key(addr));
        }
        if !stale.is_empty() {
            debug!(dropped = stale.len(), "pruned stale addresses");
        }
    }

    /// Lift bans whose 24 hours have elapsed, and reset their scores.
    pub fn check_release_ban(&mut self, now: DateTime<Utc>) {
        let released: Vec<AddressMetadata> = self
            .by_addr
            .values_mut()
            .filter(|meta| {
                meta.banned && now - meta.ban_time >= Duration::seconds(BAN_DURATION_SECS)
            })
            .map(|meta| {
                meta.banned = false;
                meta.ban_score = 0;
                *meta
            })
            .collect();
        for meta in released {
            debug!(addr = %meta.addr, "ban expired");
            self.persist(&meta);
        }
    }

    /// The number of known addresses.
    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }

    fn persist(&self, meta: &AddressMetadata) {
        // A failed address write is not worth killing the node over; the
        // entry survives in memory and is retried on the next touch.
        match meta.wire_serialize_to_vec() {
            Ok(bytes) => {
                let _ = self.tree.insert(addr_key(&meta.addr), bytes);
            }
            Err(_) => debug!(addr = %meta.addr, "failed to serialize address entry"),
        }
    }
}

/// `16-byte address | port`, the persisted key of an address entry.
fn addr_key(addr: &SocketAddr) -> [u8; 18] {
    let mut key = [0u8; 18];
    let ip = match addr.ip() {
        std::net::IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        std::net::IpAddr::V6(v6) => v6,
    };
    key[0..16].copy_from_slice(&ip.octets());
    key[16..18].copy_from_slice(&addr.port().to_be_bytes());
    key
}
