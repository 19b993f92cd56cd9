//! Difficulty retargeting.
//!
//! Every retarget interval the target is rescaled by the ratio of the time
//! the last window actually took to the time it was supposed to take,
//! clamped to a quarter and four times, and capped at the network's
//! proof-of-work limit. Between retarget heights a block must carry its
//! parent's difficulty unchanged.

use volt_chain::block;
use volt_chain::parameters::{Network, NetworkParameters};
use volt_chain::work::difficulty::CompactDifficulty;
use volt_state::BlockMetadata;

use crate::error::{BlockError, ChainError};

/// The difficulty a child of `parent` must carry.
///
/// `parent_of` resolves a block hash to its metadata; it is consulted only
/// when the child height lands on a retarget boundary, to find the first
/// block of the closing window. The walk follows parent links, so the rule
/// works on side chains as well as the main chain.
pub fn expected_difficulty<F>(
    network: Network,
    parent: &BlockMetadata,
    mut parent_of: F,
) -> Result<CompactDifficulty, ChainError>
where
    F: FnMut(&block::Hash) -> Option<BlockMetadata>,
{
    let params = NetworkParameters::for_network(network);
    let child_height = parent.height.0 + 1;
    if child_height % params.retarget_interval != 0 {
        return Ok(parent.header.difficulty_threshold);
    }

    let window_start = child_height - params.retarget_interval;
    let mut cursor = parent.clone();
    while cursor.height.0 > window_start {
        cursor = parent_of(&cursor.header.previous_block_hash)
            .ok_or(volt_state::StateError::NotFound)?;
    }

    let expected_span = params.retarget_timespan();
    let actual_span = (parent.header.time - cursor.header.time)
        .num_seconds()
        .clamp(expected_span / 4, expected_span * 4);

    let parent_target = parent
        .header
        .difficulty_threshold
        .to_expanded()
        .ok_or_else(|| BlockError::InvalidDifficulty(parent.height, parent.hash()))?;
    let limit = params
        .pow_limit
        .to_expanded()
        .expect("hard-coded proof-of-work limit is valid");

    let next = parent_target.rescale(actual_span as u64, expected_span as u64, limit);
    Ok(next.to_compact())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashMap;
    use volt_chain::block::{merkle, Header, Height};
    use volt_state::{BlockStatus, StoragePointer};

    /// A synthetic chain of metadata nodes spaced `spacing` seconds apart.
    fn chain(length: u32, bits: CompactDifficulty, spacing: i64) -> Vec<BlockMetadata> {
        let start = Utc.timestamp_opt(1_704_067_200, 0).single().unwrap();
        let mut parent_hash = block::Hash([0u8; 32]);
        let mut metas = Vec::new();
        for height in 0..length {
            let header = Header::new(
                1,
                parent_hash,
                merkle::Root([0u8; 32]),
                start + Duration::seconds(spacing * i64::from(height)),
                bits,
                0,
            );
            let meta = BlockMetadata {
                header,
                height: Height(height),
                cumulative_work: 0,
                transaction_count: 1,
                status: BlockStatus::MainChain,
                block_ptr: StoragePointer::default(),
                revert_ptr: StoragePointer::default(),
            };
            parent_hash = meta.hash();
            metas.push(meta);
        }
        metas
    }

    fn lookup(metas: &[BlockMetadata]) -> HashMap<block::Hash, BlockMetadata> {
        metas.iter().map(|meta| (meta.hash(), meta.clone())).collect()
    }

    #[test]
    fn difficulty_is_inherited_between_retargets() {
        let bits = CompactDifficulty(0x2000_ffff);
        let metas = chain(10, bits, 600);
        let by_hash = lookup(&metas);

        let expected = expected_difficulty(Network::Testnet, metas.last().unwrap(), |hash| {
            by_hash.get(hash).cloned()
        })
        .unwrap();
        assert_eq!(expected, bits);
    }

    #[test]
    fn slow_window_eases_the_target() {
        let params = NetworkParameters::for_network(Network::Testnet);
        let bits = CompactDifficulty(0x1f00_ffff);
        // Blocks took twice as long as intended.
        let metas = chain(params.retarget_interval, bits, params.target_spacing * 2);
        let by_hash = lookup(&metas);

        let retargeted = expected_difficulty(Network::Testnet, metas.last().unwrap(), |hash| {
            by_hash.get(hash).cloned()
        })
        .unwrap();

        let old = bits.to_expanded().unwrap();
        let new = retargeted.to_expanded().unwrap();
        assert!(new > old, "a slow window must raise (ease) the target");
    }

    #[test]
    fn fast_window_tightens_the_target_within_clamp() {
        let params = NetworkParameters::for_network(Network::Testnet);
        let bits = CompactDifficulty(0x1f00_ffff);
        // Implausibly fast window: should clamp at one quarter.
        let metas = chain(params.retarget_interval, bits, 1);
        let by_hash = lookup(&metas);

        let retargeted = expected_difficulty(Network::Testnet, metas.last().unwrap(), |hash| {
            by_hash.get(hash).cloned()
        })
        .unwrap();

        let old = bits.to_expanded().unwrap().to_u256();
        let new = retargeted.to_expanded().unwrap().to_u256();
        // Clamped to a quarter of the previous target (up to packing error).
        assert!(new <= old / 4u64 + old / 1000u64);
        assert!(new >= old / 4u64 - old / 1000u64);
    }
}
