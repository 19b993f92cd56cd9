//! Candidate block assembly for miners.

use std::sync::Arc;

use chrono::Utc;

use volt_chain::amount::Amount;
use volt_chain::block::{merkle, Block, Header, Height, MAX_BLOCK_BYTES};
use volt_chain::transaction::Transaction;
use volt_chain::transfer::{CoinbaseData, Input, LockScript, Output};

use crate::chain::ChainEngine;
use crate::error::{BlockError, ChainError, SubsidyError};
use crate::mempool::Mempool;
use crate::subsidy;

/// Bytes held back from the transaction budget for the header, the
/// transaction count, and the coinbase itself.
const TEMPLATE_RESERVE_BYTES: usize = 1_000;

impl ChainEngine {
    /// Assemble a candidate block on top of the current head: the
    /// highest-fee-rate transactions that fit, a coinbase paying the subsidy
    /// plus collected fees to `pay_to`, and the difficulty the retarget rule
    /// expects next.
    ///
    /// The caller is responsible for finding a nonce; the solved block comes
    /// back through the same submission path network blocks take, so the
    /// engine never distinguishes local blocks from remote ones.
    pub fn block_template(
        &self,
        mempool: &Mempool,
        pay_to: [u8; 20],
        coinbase_data: Vec<u8>,
    ) -> Result<Block, ChainError> {
        let head = self.chain_head();
        let height = Height(head.height.0 + 1);
        let difficulty = self.next_difficulty()?;

        let entries = mempool.pick_entries(MAX_BLOCK_BYTES as usize - TEMPLATE_RESERVE_BYTES);
        let mut fees = Amount::zero();
        for entry in &entries {
            fees = fees
                .checked_add(entry.fee)
                .map_err(|error| BlockError::from(SubsidyError::from(error)))?;
        }
        let reward = subsidy::block_subsidy(height, self.network())
            .checked_add(fees)
            .map_err(|error| BlockError::from(SubsidyError::from(error)))?;

        let coinbase = Transaction::new(
            1,
            vec![Input::Coinbase {
                height,
                data: CoinbaseData::new(coinbase_data),
            }],
            vec![Output {
                value: reward,
                lock: LockScript::SingleSignature {
                    pub_key_hash: pay_to,
                },
            }],
        );

        let mut transactions = Vec::with_capacity(1 + entries.len());
        transactions.push(Arc::new(coinbase));
        transactions.extend(entries.into_iter().map(|entry| entry.transaction));

        let merkle_root: merkle::Root = transactions.iter().map(|tx| tx.hash()).collect();
        let header = Header::new(
            1,
            head.hash(),
            merkle_root,
            Utc::now(),
            difficulty,
            0,
        );

        Ok(Block {
            header,
            transactions,
        })
    }
}
