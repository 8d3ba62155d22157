//! Multi-signature transaction input
//!
//! [`MultisigInput`] owns the ordered keys, the threshold and one signature
//! slot per key. Slots are indexed by key position, never by arrival order,
//! so contributions from different signers can be combined in any order.

use crate::core::script::{push_len, Script, ScriptError, SigHashType, OP_0};
use crate::core::sighash::{LegacySighash, SighashComputer, SighashError};
use crate::core::transaction::{
    varint_len, OutPoint, Transaction, TransactionInput, OUTPOINT_SIZE, SEQUENCE_FINAL,
    SEQUENCE_SIZE,
};
use crate::crypto::{verify_der, KeyError, KeyPair, PublicKey};
use crate::multisig::matcher::SignatureMatcher;
use crate::multisig::redeem::RedeemCondition;
use crate::multisig::signature::TransactionSignature;
use thiserror::Error;

/// Largest DER encoding of a low-S secp256k1 signature
pub const MAX_DER_SIGNATURE_SIZE: usize = 71;

/// Push opcode + DER signature + hash type byte
pub const SIGNATURE_PUSH_SIZE: usize = 1 + MAX_DER_SIGNATURE_SIZE + 1;

/// The `OP_0` consumed by CHECKMULTISIG's extra stack pop
pub const DUMMY_ELEMENT_SIZE: usize = 1;

/// Errors related to multisig operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("Invalid threshold {threshold} for {keys} public keys")]
    InvalidThreshold { threshold: u8, keys: usize },
    #[error("No public keys given")]
    NoPublicKeys,
    #[error("Too many public keys: {0}")]
    TooManyPublicKeys(usize),
    #[error("Duplicate public key: {0}")]
    DuplicatePublicKey(String),
    #[error("Signer not among the input's public keys: {0}")]
    UnknownSigner(String),
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Slot {0} already holds a signature")]
    SlotOccupied(usize),
    #[error("Spent output script is not this multisig condition or its script hash")]
    OutputScriptMismatch,
    #[error("Input index {index} out of range ({count} inputs)")]
    InputIndexOutOfRange { index: usize, count: usize },
    #[error("Transaction input {0} does not spend this input's outpoint")]
    OutpointMismatch(usize),
    #[error("Transaction has {expected} inputs, got {got} multisig inputs")]
    InputCountMismatch { expected: usize, got: usize },
    #[error("Expected {expected} signature slots, got {got}")]
    SlotCountMismatch { expected: usize, got: usize },
    #[error("Signature in slot {0} belongs to a different key")]
    MisplacedSignature(usize),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
    #[error("Sighash error: {0}")]
    Sighash(#[from] SighashError),
}

/// The output being spent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentOutput {
    pub outpoint: OutPoint,
    /// Locking script of the output
    pub script: Script,
    pub value: u64,
}

impl SpentOutput {
    pub fn new(outpoint: OutPoint, script: Script, value: u64) -> Self {
        Self {
            outpoint,
            script,
            value,
        }
    }
}

/// How the spent output commits to the redeem condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendKind {
    /// The locking script is the condition itself
    Bare,
    /// The locking script is the condition's HASH160; the condition is
    /// revealed as the last push of the unlocking script
    ScriptHash,
}

/// Per-input signing options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputOptions {
    /// Hash type used when `sign` is not given one
    pub sighash: SigHashType,
    pub sequence: u32,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self {
            sighash: SigHashType::All,
            sequence: SEQUENCE_FINAL,
        }
    }
}

/// A threshold-signature input and its collected signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigInput {
    redeem: RedeemCondition,
    spent_output: SpentOutput,
    spend_kind: SpendKind,
    signatures: Vec<Option<TransactionSignature>>,
    options: InputOptions,
}

impl MultisigInput {
    /// Unsigned input with default options
    pub fn new(
        spent_output: SpentOutput,
        public_keys: Vec<PublicKey>,
        threshold: u8,
    ) -> Result<Self, MultisigError> {
        Self::with_options(spent_output, public_keys, threshold, InputOptions::default())
    }

    pub fn with_options(
        spent_output: SpentOutput,
        public_keys: Vec<PublicKey>,
        threshold: u8,
        options: InputOptions,
    ) -> Result<Self, MultisigError> {
        let redeem = RedeemCondition::new(public_keys, threshold)?;
        let spend_kind = Self::detect_spend_kind(&redeem, &spent_output.script)?;
        let signatures = vec![None; redeem.key_count()];
        Ok(Self {
            redeem,
            spent_output,
            spend_kind,
            signatures,
            options,
        })
    }

    /// Input with a pre-populated sparse signature set.
    ///
    /// `signatures` must have one slot per key and every populated slot must
    /// belong to the key at that position.
    pub fn with_signatures(
        spent_output: SpentOutput,
        public_keys: Vec<PublicKey>,
        threshold: u8,
        options: InputOptions,
        signatures: Vec<Option<TransactionSignature>>,
    ) -> Result<Self, MultisigError> {
        let mut input = Self::with_options(spent_output, public_keys, threshold, options)?;
        if signatures.len() != input.signatures.len() {
            return Err(MultisigError::SlotCountMismatch {
                expected: input.signatures.len(),
                got: signatures.len(),
            });
        }
        for (slot, signature) in signatures.iter().enumerate() {
            if let Some(signature) = signature {
                if signature.public_key != input.redeem.public_keys()[slot] {
                    return Err(MultisigError::MisplacedSignature(slot));
                }
            }
        }
        input.signatures = signatures;
        Ok(input)
    }

    /// Rehydrate from the pushes of an existing unlocking script.
    ///
    /// The first chunk is the `OP_0` dummy and is skipped; the rest are
    /// signature candidates in script order.
    pub fn from_script_chunks<B: AsRef<[u8]>>(
        tx: &Transaction,
        input_index: usize,
        chunks: &[B],
        spent_output: SpentOutput,
        public_keys: Vec<PublicKey>,
        threshold: u8,
    ) -> Result<Self, MultisigError> {
        let sequence = check_context(tx, input_index, &spent_output.outpoint)?.sequence;
        let options = InputOptions {
            sequence,
            ..InputOptions::default()
        };
        let mut input = Self::with_options(spent_output, public_keys, threshold, options)?;

        let candidates = chunks.get(1..).unwrap_or(&[]);
        let script_code = input.redeem.script();
        input.signatures = SignatureMatcher::new(tx, input_index, &script_code)
            .normalize(candidates, input.redeem.public_keys());

        log::debug!(
            "Rehydrated {} input {} with {} signature(s)",
            input.redeem.description(),
            input_index,
            input.count_signatures()
        );
        Ok(input)
    }

    /// Rehydrate from `tx.inputs[input_index].script_sig`
    pub fn from_unlocking_script(
        tx: &Transaction,
        input_index: usize,
        spent_output: SpentOutput,
        public_keys: Vec<PublicKey>,
        threshold: u8,
    ) -> Result<Self, MultisigError> {
        let tx_input = check_context(tx, input_index, &spent_output.outpoint)?;
        let mut chunks: Vec<Vec<u8>> = tx_input
            .script_sig
            .chunks()?
            .into_iter()
            .map(|chunk| chunk.data.unwrap_or_default())
            .collect();

        if spent_output.script.is_pay_to_script_hash() {
            let redeem = RedeemCondition::new(public_keys.clone(), threshold)?.script();
            if chunks.last().map(|c| c.as_slice()) == Some(redeem.as_bytes()) {
                chunks.pop();
            }
        }

        Self::from_script_chunks(tx, input_index, &chunks, spent_output, public_keys, threshold)
    }

    fn detect_spend_kind(
        redeem: &RedeemCondition,
        locking_script: &Script,
    ) -> Result<SpendKind, MultisigError> {
        if *locking_script == redeem.script() {
            Ok(SpendKind::Bare)
        } else if *locking_script == redeem.script_hash_locking_script() {
            Ok(SpendKind::ScriptHash)
        } else {
            Err(MultisigError::OutputScriptMismatch)
        }
    }

    // =========================================================================
    // Signing
    // =========================================================================

    /// Sign with `key` and store the signature in the key's slot.
    ///
    /// Returns `Ok(None)` when the slot is already filled.
    pub fn sign(
        &mut self,
        tx: &Transaction,
        input_index: usize,
        key: &KeyPair,
        sighash: Option<SigHashType>,
    ) -> Result<Option<TransactionSignature>, MultisigError> {
        let slot = self
            .redeem
            .position(&key.public_key)
            .ok_or_else(|| MultisigError::UnknownSigner(key.public_key_hex()))?;

        if self.signatures[slot].is_some() {
            log::debug!("Slot {} of input {} already signed", slot, input_index);
            return Ok(None);
        }

        let signature = self.create_signature(tx, input_index, key, sighash)?;
        self.signatures[slot] = Some(signature.clone());
        log::debug!(
            "Signed input {} slot {} ({}/{})",
            input_index,
            slot,
            self.count_signatures(),
            self.redeem.threshold()
        );
        Ok(Some(signature))
    }

    /// Signatures `key` would contribute, without storing them.
    ///
    /// Empty when `key` is not one of the input's keys.
    pub fn get_signatures(
        &self,
        tx: &Transaction,
        input_index: usize,
        key: &KeyPair,
        sighash: Option<SigHashType>,
    ) -> Result<Vec<TransactionSignature>, MultisigError> {
        if self.redeem.position(&key.public_key).is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![self.create_signature(tx, input_index, key, sighash)?])
    }

    /// Store a signature produced elsewhere after checking it
    pub fn add_signature(
        &mut self,
        tx: &Transaction,
        signature: TransactionSignature,
    ) -> Result<(), MultisigError> {
        let slot = self
            .redeem
            .position(&signature.public_key)
            .ok_or_else(|| MultisigError::UnknownSigner(signature.public_key.to_hex()))?;
        if self.signatures[slot].is_some() {
            return Err(MultisigError::SlotOccupied(slot));
        }
        if !self.is_valid_signature(tx, &signature) {
            return Err(MultisigError::InvalidSignature);
        }
        self.signatures[slot] = Some(signature);
        Ok(())
    }

    pub fn clear_signatures(&mut self) {
        self.signatures.iter_mut().for_each(|slot| *slot = None);
    }

    /// Check `signature` against the digest of `tx` for its hash type
    pub fn is_valid_signature(&self, tx: &Transaction, signature: &TransactionSignature) -> bool {
        let script_code = self.redeem.script();
        match LegacySighash.digest(tx, signature.input_index, &script_code, signature.sighash) {
            Ok(digest) => verify_der(&signature.public_key, &digest, &signature.signature),
            Err(_) => false,
        }
    }

    fn create_signature(
        &self,
        tx: &Transaction,
        input_index: usize,
        key: &KeyPair,
        sighash: Option<SigHashType>,
    ) -> Result<TransactionSignature, MultisigError> {
        check_context(tx, input_index, &self.spent_output.outpoint)?;
        let sighash = sighash.unwrap_or(self.options.sighash);
        let script_code = self.redeem.script();
        let digest = LegacySighash.digest(tx, input_index, &script_code, sighash)?;
        let der = key.sign(&digest)?;
        Ok(TransactionSignature::new(
            key.public_key,
            self.spent_output.outpoint,
            input_index,
            der,
            sighash,
        ))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn count_signatures(&self) -> usize {
        self.signatures.iter().filter(|s| s.is_some()).count()
    }

    pub fn count_missing_signatures(&self) -> usize {
        (self.redeem.threshold() as usize).saturating_sub(self.count_signatures())
    }

    pub fn is_fully_signed(&self) -> bool {
        self.count_missing_signatures() == 0
    }

    /// Keys whose slot is still empty, in key order
    pub fn public_keys_without_signature(&self) -> impl Iterator<Item = &PublicKey> + '_ {
        self.redeem
            .public_keys()
            .iter()
            .zip(&self.signatures)
            .filter(|(_, slot)| slot.is_none())
            .map(|(key, _)| key)
    }

    pub fn is_signer(&self, public_key: &PublicKey) -> bool {
        self.redeem.position(public_key).is_some()
    }

    /// One slot per key, `None` where no signature has been collected
    pub fn signatures(&self) -> &[Option<TransactionSignature>] {
        &self.signatures
    }

    pub fn public_keys(&self) -> &[PublicKey] {
        self.redeem.public_keys()
    }

    pub fn threshold(&self) -> u8 {
        self.redeem.threshold()
    }

    pub fn redeem_condition(&self) -> &RedeemCondition {
        &self.redeem
    }

    pub fn spent_output(&self) -> &SpentOutput {
        &self.spent_output
    }

    pub fn spend_kind(&self) -> SpendKind {
        self.spend_kind
    }

    pub fn options(&self) -> InputOptions {
        self.options
    }

    pub fn sequence(&self) -> u32 {
        self.options.sequence
    }

    // =========================================================================
    // Script building and size estimation
    // =========================================================================

    /// `OP_0 <sig>...` in key order, followed by the redeem condition for
    /// script-hash spends.
    ///
    /// CHECKMULTISIG consumes exactly M signatures, so at most the first M
    /// collected ones are emitted.
    pub fn unlocking_script(&self) -> Script {
        let mut script = Script::new();
        script.push_opcode(OP_0);
        let threshold = self.redeem.threshold() as usize;
        for signature in self.signatures.iter().flatten().take(threshold) {
            script.push_data(&signature.to_script_bytes());
        }
        if self.spend_kind == SpendKind::ScriptHash {
            script.push_data(self.redeem.script().as_bytes());
        }
        script
    }

    /// The transaction input carrying the current unlocking script
    pub fn to_transaction_input(&self) -> TransactionInput {
        TransactionInput {
            previous_output: self.spent_output.outpoint,
            script_sig: self.unlocking_script(),
            sequence: self.options.sequence,
        }
    }

    /// Upper bound on the unlocking script length once fully signed.
    ///
    /// Assumes low-S signatures of at most [`MAX_DER_SIGNATURE_SIZE`] bytes,
    /// which is what `sign` produces and what rehydration accepts. A high-S
    /// signature passed to `add_signature` or `with_signatures` still
    /// verifies and can make the real script a byte longer per signature.
    pub fn estimate_size(&self) -> usize {
        let signatures = DUMMY_ELEMENT_SIZE + self.redeem.threshold() as usize * SIGNATURE_PUSH_SIZE;
        match self.spend_kind {
            SpendKind::Bare => signatures,
            SpendKind::ScriptHash => signatures + push_len(self.redeem.serialized_len()),
        }
    }

    /// Upper bound on the serialized input (outpoint, script, sequence)
    pub fn estimate_input_size(&self) -> usize {
        let script = self.estimate_size();
        OUTPOINT_SIZE + varint_len(script as u64) + script + SEQUENCE_SIZE
    }
}

/// The transaction input at `input_index`, if it spends `outpoint`
fn check_context<'a>(
    tx: &'a Transaction,
    input_index: usize,
    outpoint: &OutPoint,
) -> Result<&'a TransactionInput, MultisigError> {
    let input = tx
        .inputs
        .get(input_index)
        .ok_or(MultisigError::InputIndexOutOfRange {
            index: input_index,
            count: tx.inputs.len(),
        })?;
    if input.previous_output != *outpoint {
        return Err(MultisigError::OutpointMismatch(input_index));
    }
    Ok(input)
}
