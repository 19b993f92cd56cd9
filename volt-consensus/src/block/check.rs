//! Consensus check functions

use chrono::{DateTime, Utc};

use volt_chain::{
    block::{Block, Hash, Header, Height},
    parameters::{Network, NetworkParameters},
    transaction,
    work::difficulty::{CompactDifficulty, ExpandedDifficulty},
};

use crate::error::*;

/// Returns `Ok(())` if the block carries at least one transaction.
pub fn has_transactions(block: &Block) -> Result<(), BlockError> {
    if block.transactions.is_empty() {
        Err(BlockError::NoTransactions)
    } else {
        Ok(())
    }
}

/// Returns `Ok(())` if there is exactly one coinbase transaction in `block`,
/// and that coinbase transaction is the first transaction in the block.
///
/// The first (and only the first) transaction in a block is a coinbase
/// transaction, which collects and spends the miner subsidy and the
/// transaction fees paid by transactions included in this block.
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block
        .transactions
        .get(0)
        .ok_or(BlockError::NoTransactions)?;
    let mut rest = block.transactions.iter().skip(1);
    if !first.is_coinbase() {
        return Err(TransactionError::CoinbasePosition.into());
    }
    if rest.any(|tx| tx.contains_coinbase_input()) {
        return Err(TransactionError::CoinbaseInputFound.into());
    }

    Ok(())
}

/// Returns `Ok(())` if `hash` passes:
///   - the target difficulty limit for `network`, and
///   - the difficulty filter,
/// based on the fields in `header`.
///
/// If the block is invalid, returns an error containing `height` and `hash`.
pub fn difficulty_is_valid(
    header: &Header,
    network: Network,
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    let difficulty_threshold = header
        .difficulty_threshold
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty(*height, *hash))?;

    // Note: the comparisons in this function are u256 integer comparisons.
    // Greater values represent *less* work.

    let limit: ExpandedDifficulty = NetworkParameters::for_network(network)
        .pow_limit
        .to_expanded()
        .expect("hard-coded proof-of-work limit is valid");
    if difficulty_threshold > limit {
        return Err(BlockError::TargetDifficultyLimit(*height, *hash));
    }

    if hash > &difficulty_threshold {
        return Err(BlockError::DifficultyFilter(*height, *hash));
    }

    Ok(())
}

/// Returns `Ok(())` if `header.difficulty_threshold` equals the difficulty
/// the retarget rule expects at this chain position.
pub fn expected_difficulty_matches(
    header: &Header,
    expected: CompactDifficulty,
) -> Result<(), BlockError> {
    if header.difficulty_threshold == expected {
        Ok(())
    } else {
        Err(BlockError::WrongDifficulty {
            expected,
            found: header.difficulty_threshold,
        })
    }
}

/// Returns `Ok(())` if `header.time` is less than or equal to
/// 2 hours in the future, according to the node's local clock (`now`).
///
/// This is a non-deterministic rule, as clocks vary over time, and
/// between different nodes. A block rejected by this rule at a given
/// point in time may later be accepted.
pub fn time_is_valid_at(
    header: &Header,
    now: DateTime<Utc>,
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    Ok(header.time_is_valid_at(now, height, hash)?)
}

/// Check Merkle root validity.
///
/// `transaction_hashes` is a precomputed list of transaction hashes.
pub fn merkle_root_validity(
    block: &Block,
    transaction_hashes: &[transaction::Hash],
) -> Result<(), BlockError> {
    let merkle_root = transaction_hashes.iter().cloned().collect();

    if block.header.merkle_root != merkle_root {
        return Err(BlockError::BadMerkleRoot {
            actual: merkle_root,
            expected: block.header.merkle_root,
        });
    }

    // Binary Merkle trees with duplicated-last-node padding are malleable:
    // repeating transactions can produce the same root as an honest block.
    // Duplicate transactions imply a double-spend, so as defense-in-depth we
    // also reject duplicate transaction hashes outright.
    use std::collections::HashSet;
    if transaction_hashes.len() != transaction_hashes.iter().collect::<HashSet<_>>().len() {
        return Err(BlockError::DuplicateTransaction);
    }

    Ok(())
}

/// Returns `Ok(())` if the height in the coinbase input matches the height
/// the block actually connects at.
pub fn coinbase_height_matches(block: &Block, expected: Height) -> Result<(), BlockError> {
    match block.coinbase_height() {
        Some(encoded) if encoded == expected => Ok(()),
        encoded => Err(BlockError::WrongCoinbaseHeight { encoded, expected }),
    }
}
