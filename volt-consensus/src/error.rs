//! Consensus error types.
//!
//! Validation errors never unwind past the block or transaction boundary:
//! the offending item is rejected, the peer that sent it is penalised, and
//! the node carries on. Storage errors are different — they escalate and
//! shut the node down rather than risk divergence.

use thiserror::Error;

use volt_chain::block::{self, BlockTimeError, Height};
use volt_chain::transfer::OutPoint;
use volt_chain::work::difficulty::CompactDifficulty;
use volt_chain::{amount, block::merkle};

/// Reasons a block subsidy check can fail.
#[derive(Error, Debug)]
pub enum SubsidyError {
    /// The block has no coinbase transaction.
    #[error("no coinbase transaction in block")]
    NoCoinbase,

    /// The coinbase pays out more than the subsidy plus the block's fees.
    #[error("coinbase pays {paid} but only {allowed} is available at this height")]
    OverSubsidy {
        /// What the coinbase outputs sum to.
        paid: amount::Amount,
        /// Subsidy plus fees.
        allowed: amount::Amount,
    },

    /// Summing amounts failed.
    #[error("amount arithmetic failed: {0}")]
    Amount(#[from] amount::Error),
}

/// Reasons a transaction is invalid.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// No inputs.
    #[error("transaction has no inputs")]
    NoInputs,

    /// No outputs.
    #[error("transaction has no outputs")]
    NoOutputs,

    /// A coinbase transaction somewhere other than the first slot of a block.
    #[error("coinbase transaction outside the first position in a block")]
    CoinbasePosition,

    /// A coinbase-style input in a non-coinbase transaction.
    #[error("coinbase input found in non-coinbase transaction")]
    CoinbaseInputFound,

    /// A coinbase transaction offered to the transaction pool.
    #[error("coinbase transactions cannot enter the transaction pool")]
    CoinbaseInPool,

    /// The transaction is already known.
    #[error("transaction is already known")]
    Duplicate,

    /// An input references an output that is not in the UTXO set.
    #[error("input references missing output {0:?}")]
    MissingOutput(OutPoint),

    /// An input references an output that something else already spends.
    #[error("input references already-spent output {0:?}")]
    DoubleSpend(OutPoint),

    /// The unlock script is not a well-formed single-signature unlock.
    #[error("unlock script is not a valid single-signature unlock")]
    MalformedUnlock,

    /// The public key in the unlock does not hash to the lock's key hash.
    #[error("public key does not match the lock it is spending")]
    WrongPubKey,

    /// The ECDSA signature does not verify.
    #[error("signature validation failed")]
    InvalidSignature,

    /// Outputs are worth more than inputs.
    #[error("inputs are worth less than outputs")]
    NegativeFee,

    /// Summing amounts failed.
    #[error("amount arithmetic failed: {0}")]
    Amount(#[from] amount::Error),
}

/// Reasons a block is invalid.
#[derive(Error, Debug)]
pub enum BlockError {
    /// No transactions at all (not even a coinbase).
    #[error("block has no transactions")]
    NoTransactions,

    /// A transaction inside the block failed validation.
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// The header's compact difficulty does not unpack to a valid target.
    #[error("invalid difficulty threshold in block {0:?} {1:?}")]
    InvalidDifficulty(Height, block::Hash),

    /// The target is easier than the proof-of-work limit allows.
    #[error("block {0:?} {1:?} has a difficulty threshold easier than the limit")]
    TargetDifficultyLimit(Height, block::Hash),

    /// The header hash is above the target: not enough work was done.
    #[error("block {0:?} failed the difficulty filter: hash {1:?} is above its target")]
    DifficultyFilter(Height, block::Hash),

    /// The header's difficulty is not what the retarget rule expects.
    #[error("wrong difficulty for height: expected {expected:?}, found {found:?}")]
    WrongDifficulty {
        /// What the retarget rule requires at this height.
        expected: CompactDifficulty,
        /// What the header carries.
        found: CompactDifficulty,
    },

    /// The header timestamp is too far in the future.
    #[error("{0}")]
    Time(#[from] BlockTimeError),

    /// The recomputed Merkle root differs from the header's.
    #[error("merkle root mismatch: computed {actual:?}, header says {expected:?}")]
    BadMerkleRoot {
        /// The root recomputed from the block's transactions.
        actual: merkle::Root,
        /// The root in the header.
        expected: merkle::Root,
    },

    /// Two identical transactions in one block.
    #[error("block contains duplicate transactions")]
    DuplicateTransaction,

    /// The coinbase height field disagrees with the block's chain position.
    #[error("coinbase encodes height {encoded:?} but the block connects at {expected:?}")]
    WrongCoinbaseHeight {
        /// The height the coinbase input carries.
        encoded: Option<Height>,
        /// Where the block actually connects.
        expected: Height,
    },

    /// The subsidy check failed.
    #[error("subsidy error: {0}")]
    Subsidy(#[from] SubsidyError),

    /// The block's parent chain is marked invalid.
    #[error("block extends a branch already marked invalid")]
    InvalidParent,
}

/// Errors from the chain engine.
#[derive(Error, Debug)]
pub enum ChainError {
    /// The submitted block is invalid; it has been rejected.
    #[error("invalid block: {0}")]
    InvalidBlock(#[from] BlockError),

    /// The current head is the genesis block, which cannot be reverted.
    #[error("cannot revert the genesis block")]
    CannotRevertGenesis,

    /// The persistence layer failed. Fatal: the node shuts down.
    #[error("storage failure: {0}")]
    Storage(#[from] volt_state::StateError),
}
