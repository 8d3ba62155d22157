//! Plain-record form of multisig inputs
//!
//! Records are what `multisig parse` writes to disk.
//! Empty signature slots are omitted: each stored signature names its key,
//! and the key's position decides the slot on the way back.

use crate::core::script::{Script, SigHashType};
use crate::core::transaction::{OutPoint, TransactionError};
use crate::crypto::PublicKey;
use crate::multisig::input::{InputOptions, MultisigError, MultisigInput, SpentOutput};
use crate::multisig::signature::TransactionSignature;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Record errors
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid record: {0}")]
    InvalidData(String),
    #[error("Multisig error: {0}")]
    Multisig(#[from] MultisigError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// The output an input spends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub script: Script,
    pub satoshis: u64,
}

/// One collected signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub public_key: PublicKey,
    pub prev_tx_id: String,
    pub output_index: u32,
    pub input_index: usize,
    /// DER signature, hex
    pub signature: String,
    /// Hash type byte
    pub sigtype: u8,
}

/// A multisig input and everything needed to rebuild it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigInputRecord {
    pub prev_tx_id: String,
    pub output_index: u32,
    pub sequence_number: u32,
    /// Unlocking script for the current signatures
    pub script: Script,
    pub output: OutputRecord,
    pub public_keys: Vec<PublicKey>,
    pub threshold: u8,
    pub signatures: Vec<SignatureRecord>,
    /// Default hash type byte
    #[serde(default = "default_sigtype")]
    pub sigtype: u8,
}

fn default_sigtype() -> u8 {
    SigHashType::All.to_byte()
}

fn parse_sigtype(byte: u8) -> Result<SigHashType, RecordError> {
    SigHashType::from_byte(byte)
        .ok_or_else(|| RecordError::InvalidData(format!("unknown sigtype 0x{:02x}", byte)))
}

impl From<&TransactionSignature> for SignatureRecord {
    fn from(signature: &TransactionSignature) -> Self {
        Self {
            public_key: signature.public_key,
            prev_tx_id: signature.prev_tx_id(),
            output_index: signature.previous_output.vout,
            input_index: signature.input_index,
            signature: hex::encode(&signature.signature),
            sigtype: signature.sighash.to_byte(),
        }
    }
}

impl TryFrom<&SignatureRecord> for TransactionSignature {
    type Error = RecordError;

    fn try_from(record: &SignatureRecord) -> Result<Self, Self::Error> {
        let signature = hex::decode(&record.signature)
            .map_err(|e| RecordError::InvalidData(format!("signature: {}", e)))?;
        Ok(TransactionSignature::new(
            record.public_key,
            OutPoint::from_txid_hex(&record.prev_tx_id, record.output_index)?,
            record.input_index,
            signature,
            parse_sigtype(record.sigtype)?,
        ))
    }
}

impl MultisigInput {
    /// Plain record of the current state
    pub fn to_record(&self) -> MultisigInputRecord {
        let spent = self.spent_output();
        MultisigInputRecord {
            prev_tx_id: spent.outpoint.txid_hex(),
            output_index: spent.outpoint.vout,
            sequence_number: self.sequence(),
            script: self.unlocking_script(),
            output: OutputRecord {
                script: spent.script.clone(),
                satoshis: spent.value,
            },
            public_keys: self.public_keys().to_vec(),
            threshold: self.threshold(),
            signatures: self
                .signatures()
                .iter()
                .flatten()
                .map(SignatureRecord::from)
                .collect(),
            sigtype: self.options().sighash.to_byte(),
        }
    }

    /// Rebuild from a record; each signature goes to its key's slot
    pub fn from_record(record: &MultisigInputRecord) -> Result<Self, RecordError> {
        let outpoint = OutPoint::from_txid_hex(&record.prev_tx_id, record.output_index)?;
        let spent = SpentOutput::new(outpoint, record.output.script.clone(), record.output.satoshis);
        let options = InputOptions {
            sighash: parse_sigtype(record.sigtype)?,
            sequence: record.sequence_number,
        };

        let mut slots: Vec<Option<TransactionSignature>> = vec![None; record.public_keys.len()];
        for signature_record in &record.signatures {
            let slot = record
                .public_keys
                .iter()
                .position(|k| *k == signature_record.public_key)
                .ok_or_else(|| {
                    RecordError::Multisig(MultisigError::UnknownSigner(
                        signature_record.public_key.to_hex(),
                    ))
                })?;
            if slots[slot].is_some() {
                return Err(RecordError::Multisig(MultisigError::SlotOccupied(slot)));
            }
            slots[slot] = Some(TransactionSignature::try_from(signature_record)?);
        }

        Ok(MultisigInput::with_signatures(
            spent,
            record.public_keys.clone(),
            record.threshold,
            options,
            slots,
        )?)
    }
}

impl From<&MultisigInput> for MultisigInputRecord {
    fn from(input: &MultisigInput) -> Self {
        input.to_record()
    }
}

impl TryFrom<&MultisigInputRecord> for MultisigInput {
    type Error = RecordError;

    fn try_from(record: &MultisigInputRecord) -> Result<Self, Self::Error> {
        MultisigInput::from_record(record)
    }
}

/// Write any record as pretty JSON
pub fn save_record<T: Serialize>(path: &Path, record: &T) -> Result<(), RecordError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, record)?;
    writer.flush()?;
    log::debug!("Saved record to {}", path.display());
    Ok(())
}

/// Read a JSON record
pub fn load_record<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, RecordError> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}
