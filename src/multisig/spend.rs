//! Transactions spending multisig outputs
//!
//! [`MultisigSpend`] keeps a transaction and one [`MultisigInput`] per
//! transaction input side by side. Inputs are signed against the
//! transaction and their unlocking scripts written back into it.

use crate::core::script::{Script, SigHashType};
use crate::core::transaction::{varint_len, Transaction, TransactionOutput};
use crate::crypto::{KeyPair, PublicKey};
use crate::multisig::input::{InputOptions, MultisigError, MultisigInput, SpentOutput};

/// A transaction whose inputs all spend multisig outputs
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultisigSpend {
    tx: Transaction,
    inputs: Vec<MultisigInput>,
}

impl MultisigSpend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair a transaction with its inputs; `inputs[i]` must spend
    /// `tx.inputs[i]`'s outpoint.
    pub fn from_parts(tx: Transaction, inputs: Vec<MultisigInput>) -> Result<Self, MultisigError> {
        if tx.inputs.len() != inputs.len() {
            return Err(MultisigError::InputCountMismatch {
                expected: tx.inputs.len(),
                got: inputs.len(),
            });
        }
        for (index, (tx_input, input)) in tx.inputs.iter().zip(&inputs).enumerate() {
            if tx_input.previous_output != input.spent_output().outpoint {
                return Err(MultisigError::OutpointMismatch(index));
            }
        }
        Ok(Self { tx, inputs })
    }

    /// Rehydrate every input of a received transaction from its unlocking
    /// script. `spends[i]` describes the output spent by input `i`.
    pub fn from_transaction(
        tx: Transaction,
        spends: Vec<(SpentOutput, Vec<PublicKey>, u8)>,
    ) -> Result<Self, MultisigError> {
        if tx.inputs.len() != spends.len() {
            return Err(MultisigError::InputCountMismatch {
                expected: tx.inputs.len(),
                got: spends.len(),
            });
        }
        let inputs = spends
            .into_iter()
            .enumerate()
            .map(|(index, (spent, public_keys, threshold))| {
                MultisigInput::from_unlocking_script(&tx, index, spent, public_keys, threshold)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tx, inputs })
    }

    /// Add an input spending a multisig output; returns its index
    pub fn spend(
        &mut self,
        spent_output: SpentOutput,
        public_keys: Vec<PublicKey>,
        threshold: u8,
    ) -> Result<usize, MultisigError> {
        self.spend_with_options(spent_output, public_keys, threshold, InputOptions::default())
    }

    pub fn spend_with_options(
        &mut self,
        spent_output: SpentOutput,
        public_keys: Vec<PublicKey>,
        threshold: u8,
        options: InputOptions,
    ) -> Result<usize, MultisigError> {
        let input = MultisigInput::with_options(spent_output, public_keys, threshold, options)?;
        // Existing signatures commit to the input list
        self.clear_signatures();
        self.tx.add_input(input.to_transaction_input());
        self.inputs.push(input);
        Ok(self.inputs.len() - 1)
    }

    /// Add an output. Collected signatures are dropped since they commit
    /// to the outputs.
    pub fn add_output(&mut self, value: u64, script_pubkey: Script) -> &mut Self {
        self.clear_signatures();
        self.tx.add_output(TransactionOutput::new(value, script_pubkey));
        self
    }

    /// Sign every input `key` is a signer of with the default hash type
    pub fn sign(&mut self, key: &KeyPair) -> Result<usize, MultisigError> {
        self.sign_with(key, None)
    }

    /// Sign every input `key` is a signer of.
    ///
    /// Returns the number of new signatures. Fails with `UnknownSigner` when
    /// the key belongs to none of the inputs. If an input fails to sign, the
    /// signatures made before it are kept and written into the transaction.
    pub fn sign_with(
        &mut self,
        key: &KeyPair,
        sighash: Option<SigHashType>,
    ) -> Result<usize, MultisigError> {
        let result = self.sign_controlled(key, sighash);
        self.sync_scripts();
        result
    }

    fn sign_controlled(
        &mut self,
        key: &KeyPair,
        sighash: Option<SigHashType>,
    ) -> Result<usize, MultisigError> {
        let mut controlled = false;
        let mut added = 0;

        for (index, input) in self.inputs.iter_mut().enumerate() {
            if !input.is_signer(&key.public_key) {
                continue;
            }
            controlled = true;
            if input.sign(&self.tx, index, key, sighash)?.is_some() {
                added += 1;
            }
        }

        if !controlled {
            log::warn!("Key {} signs none of the inputs", key.public_key_hex());
            return Err(MultisigError::UnknownSigner(key.public_key_hex()));
        }
        Ok(added)
    }

    pub fn clear_signatures(&mut self) {
        for input in &mut self.inputs {
            input.clear_signatures();
        }
        self.sync_scripts();
    }

    /// Write each input's unlocking script into the transaction
    fn sync_scripts(&mut self) {
        for (tx_input, input) in self.tx.inputs.iter_mut().zip(&self.inputs) {
            tx_input.script_sig = input.unlocking_script();
        }
    }

    pub fn is_fully_signed(&self) -> bool {
        self.inputs.iter().all(MultisigInput::is_fully_signed)
    }

    /// Every stored signature still verifies against the transaction
    pub fn verify_signatures(&self) -> bool {
        self.inputs.iter().all(|input| {
            input
                .signatures()
                .iter()
                .flatten()
                .all(|signature| input.is_valid_signature(&self.tx, signature))
        })
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn input(&self, index: usize) -> Option<&MultisigInput> {
        self.inputs.get(index)
    }

    pub fn inputs(&self) -> &[MultisigInput] {
        &self.inputs
    }

    /// Upper bound on the serialized transaction once every input is signed
    pub fn estimate_size(&self) -> usize {
        let inputs: usize = self.inputs.iter().map(MultisigInput::estimate_input_size).sum();
        let outputs: usize = self
            .tx
            .outputs
            .iter()
            .map(|o| 8 + varint_len(o.script_pubkey.len() as u64) + o.script_pubkey.len())
            .sum();
        4 + varint_len(self.inputs.len() as u64)
            + inputs
            + varint_len(self.tx.outputs.len() as u64)
            + outputs
            + 4
    }
}
