//! Signature hash computation
//!
//! Digest that input signatures commit to. [`LegacySighash`] implements the
//! pre-segwit algorithm: blank every unlocking script, put the
//! script code in the signed input, trim inputs/outputs according to the
//! hash type, append the hash type and double SHA-256 the result.

use crate::core::script::{Script, ScriptError, SigHashType};
use crate::core::transaction::Transaction;
use crate::crypto::double_sha256;
use bytes::BufMut;
use thiserror::Error;

/// Digest returned for `SIGHASH_SINGLE` without a matching output
pub const SIGHASH_SINGLE_BUG: [u8; 32] = {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
};

/// Sighash computation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SighashError {
    #[error("Input index {index} out of range ({count} inputs)")]
    InputIndexOutOfRange { index: usize, count: usize },
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
}

/// Computes the digest a signature for `input_index` is made over
pub trait SighashComputer {
    fn digest(
        &self,
        tx: &Transaction,
        input_index: usize,
        script_code: &Script,
        sighash: SigHashType,
    ) -> Result<[u8; 32], SighashError>;
}

/// Pre-segwit signature hash
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacySighash;

impl SighashComputer for LegacySighash {
    fn digest(
        &self,
        tx: &Transaction,
        input_index: usize,
        script_code: &Script,
        sighash: SigHashType,
    ) -> Result<[u8; 32], SighashError> {
        if input_index >= tx.inputs.len() {
            return Err(SighashError::InputIndexOutOfRange {
                index: input_index,
                count: tx.inputs.len(),
            });
        }

        let base = sighash.base_type();
        if base == SigHashType::Single && input_index >= tx.outputs.len() {
            return Ok(SIGHASH_SINGLE_BUG);
        }

        let mut copy = tx.clone();
        for input in &mut copy.inputs {
            input.script_sig = Script::new();
        }
        copy.inputs[input_index].script_sig = script_code.without_codeseparators()?;

        match base {
            SigHashType::None => {
                copy.outputs.clear();
                zero_other_sequences(&mut copy, input_index);
            }
            SigHashType::Single => {
                copy.outputs.truncate(input_index + 1);
                for output in &mut copy.outputs[..input_index] {
                    output.value = u64::MAX;
                    output.script_pubkey = Script::new();
                }
                zero_other_sequences(&mut copy, input_index);
            }
            _ => {}
        }

        if sighash.is_anyone_can_pay() {
            let own = copy.inputs.swap_remove(input_index);
            copy.inputs = vec![own];
        }

        let mut data = copy.serialize();
        data.put_u32_le(sighash.to_byte() as u32);

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&double_sha256(&data));
        Ok(digest)
    }
}

fn zero_other_sequences(tx: &mut Transaction, input_index: usize) {
    for (i, input) in tx.inputs.iter_mut().enumerate() {
        if i != input_index {
            input.sequence = 0;
        }
    }
}
