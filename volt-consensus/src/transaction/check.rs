//! Transaction checks.

use lazy_static::lazy_static;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, VerifyOnly};

use volt_chain::amount::Amount;
use volt_chain::transaction::Transaction;
use volt_chain::transfer::{pub_key_hash, Input, OutPoint};
use volt_state::Utxo;

use crate::error::TransactionError;

lazy_static! {
    static ref SECP: Secp256k1<VerifyOnly> = Secp256k1::verification_only();
}

/// Checks that the transaction has at least one input and one output.
pub fn has_inputs_and_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        Err(TransactionError::NoInputs)
    } else if tx.outputs.is_empty() {
        Err(TransactionError::NoOutputs)
    } else {
        Ok(())
    }
}

/// The outpoint spent by a non-coinbase input.
///
/// Coinbase inputs are only legal in the first transaction of a block, which
/// the block checks enforce; anywhere else they are an error.
pub fn spent_outpoint(input: &Input) -> Result<OutPoint, TransactionError> {
    input
        .outpoint()
        .ok_or(TransactionError::CoinbaseInputFound)
}

/// Checks that `input` is authorized to spend `utxo`:
/// the unlock script parses as `pub key | DER signature`, the key hashes to
/// the lock's key hash, and the signature verifies over the transaction's
/// sighash.
pub fn spend_is_authorized(
    tx: &Transaction,
    input: &Input,
    utxo: &Utxo,
) -> Result<(), TransactionError> {
    let unlock = match input {
        Input::PrevOut { unlock, .. } => unlock,
        Input::Coinbase { .. } => return Err(TransactionError::CoinbaseInputFound),
    };
    let (pub_key_bytes, der_signature) = unlock
        .as_single_signature()
        .ok_or(TransactionError::MalformedUnlock)?;

    if &pub_key_hash(pub_key_bytes) != utxo.output.lock.pub_key_hash() {
        return Err(TransactionError::WrongPubKey);
    }

    let pub_key =
        PublicKey::from_slice(pub_key_bytes).map_err(|_| TransactionError::MalformedUnlock)?;
    let signature =
        Signature::from_der(der_signature).map_err(|_| TransactionError::MalformedUnlock)?;
    let message = Message::from_slice(&tx.sighash())
        .expect("a sighash is always exactly 32 bytes");

    SECP.verify_ecdsa(&message, &signature, &pub_key)
        .map_err(|_| TransactionError::InvalidSignature)
}

/// The fee of a transaction given the values of the outputs it spends:
/// `Σ inputs − Σ outputs`. A fee of exactly zero is legal; a negative fee is
/// not.
pub fn transaction_fee(
    input_sum: Amount,
    tx: &Transaction,
) -> Result<Amount, TransactionError> {
    let output_sum = Amount::sum(tx.outputs.iter().map(|output| output.value))?;
    input_sum
        .checked_sub(output_sum)
        .map_err(|_| TransactionError::NegativeFee)
}
