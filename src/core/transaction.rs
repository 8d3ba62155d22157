//! Minimal transaction surface
//!
//! Ordered inputs and outputs with the legacy wire encoding. This is the
//! context signatures commit to; it carries no validation or fee logic.

use crate::core::script::Script;
use crate::crypto::double_sha256;
use bytes::{Buf, BufMut};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Transaction version written by [`Transaction::new`]
pub const TX_VERSION: u32 = 1;

/// Sequence number that disables locktime
pub const SEQUENCE_FINAL: u32 = 0xFFFFFFFF;

/// Serialized size of an outpoint (txid + output index)
pub const OUTPOINT_SIZE: usize = 36;

/// Serialized size of the sequence field
pub const SEQUENCE_SIZE: usize = 4;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Unexpected end of data while reading {0}")]
    UnexpectedEof(&'static str),
    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
    #[error("Invalid transaction id: {0}")]
    InvalidTxid(String),
    #[error("Input index {index} out of range ({count} inputs)")]
    InputIndexOutOfRange { index: usize, count: usize },
}

// =============================================================================
// Variable-length integers
// =============================================================================

/// Size of the CompactSize encoding of `n`
pub fn varint_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

fn put_varint(buf: &mut Vec<u8>, n: u64) {
    match varint_len(n) {
        1 => buf.put_u8(n as u8),
        3 => {
            buf.put_u8(0xfd);
            buf.put_u16_le(n as u16);
        }
        5 => {
            buf.put_u8(0xfe);
            buf.put_u32_le(n as u32);
        }
        _ => {
            buf.put_u8(0xff);
            buf.put_u64_le(n);
        }
    }
}

fn need(buf: &&[u8], len: usize, what: &'static str) -> Result<(), TransactionError> {
    if buf.remaining() < len {
        return Err(TransactionError::UnexpectedEof(what));
    }
    Ok(())
}

fn get_u32(buf: &mut &[u8], what: &'static str) -> Result<u32, TransactionError> {
    need(buf, 4, what)?;
    Ok(buf.get_u32_le())
}

fn get_u64(buf: &mut &[u8], what: &'static str) -> Result<u64, TransactionError> {
    need(buf, 8, what)?;
    Ok(buf.get_u64_le())
}

fn get_varint(buf: &mut &[u8], what: &'static str) -> Result<u64, TransactionError> {
    need(buf, 1, what)?;
    match buf.get_u8() {
        0xfd => {
            need(buf, 2, what)?;
            Ok(buf.get_u16_le() as u64)
        }
        0xfe => get_u32(buf, what).map(u64::from),
        0xff => get_u64(buf, what),
        n => Ok(n as u64),
    }
}

fn get_bytes(buf: &mut &[u8], len: usize, what: &'static str) -> Result<Vec<u8>, TransactionError> {
    need(buf, len, what)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

fn put_script(buf: &mut Vec<u8>, script: &Script) {
    put_varint(buf, script.len() as u64);
    buf.put_slice(script.as_bytes());
}

fn get_script(buf: &mut &[u8], what: &'static str) -> Result<Script, TransactionError> {
    let len = get_varint(buf, what)?;
    let len = usize::try_from(len).map_err(|_| TransactionError::UnexpectedEof(what))?;
    get_bytes(buf, len, what).map(Script::from_bytes)
}

// =============================================================================
// Outpoint
// =============================================================================

/// Reference to an output of a previous transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OutPoint {
    /// Previous transaction id in internal (wire) byte order
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        Self { txid, vout }
    }

    /// Build from a txid in display (reversed) hex
    pub fn from_txid_hex(txid_hex: &str, vout: u32) -> Result<Self, TransactionError> {
        Ok(Self {
            txid: txid_from_hex(txid_hex)?,
            vout,
        })
    }

    /// Txid in display (reversed) hex
    pub fn txid_hex(&self) -> String {
        txid_to_hex(&self.txid)
    }
}

/// Parse a display-order txid
pub fn txid_from_hex(txid_hex: &str) -> Result<[u8; 32], TransactionError> {
    let bytes = hex::decode(txid_hex).map_err(|e| TransactionError::InvalidHex(e.to_string()))?;
    let mut txid: [u8; 32] = bytes
        .try_into()
        .map_err(|_| TransactionError::InvalidTxid(txid_hex.to_string()))?;
    txid.reverse();
    Ok(txid)
}

/// Format a wire-order txid for display
pub fn txid_to_hex(txid: &[u8; 32]) -> String {
    let mut display = *txid;
    display.reverse();
    hex::encode(display)
}

// =============================================================================
// Inputs and outputs
// =============================================================================

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInput {
    pub previous_output: OutPoint,
    /// Unlocking script
    pub script_sig: Script,
    pub sequence: u32,
}

impl TransactionInput {
    /// Unsigned input spending `previous_output`
    pub fn new(previous_output: OutPoint) -> Self {
        Self {
            previous_output,
            script_sig: Script::new(),
            sequence: SEQUENCE_FINAL,
        }
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    /// Amount in the smallest unit
    pub value: u64,
    /// Locking script
    pub script_pubkey: Script,
}

impl TransactionOutput {
    pub fn new(value: u64, script_pubkey: Script) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub locktime: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    /// Empty transaction
    pub fn new() -> Self {
        Self {
            version: TX_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            locktime: 0,
        }
    }

    pub fn add_input(&mut self, input: TransactionInput) -> usize {
        self.inputs.push(input);
        self.inputs.len() - 1
    }

    pub fn add_output(&mut self, output: TransactionOutput) -> usize {
        self.outputs.push(output);
        self.outputs.len() - 1
    }

    /// Replace the unlocking script of input `index`
    pub fn set_input_script(&mut self, index: usize, script: Script) -> Result<(), TransactionError> {
        let count = self.inputs.len();
        let input = self
            .inputs
            .get_mut(index)
            .ok_or(TransactionError::InputIndexOutOfRange { index, count })?;
        input.script_sig = script;
        Ok(())
    }

    /// Legacy wire encoding
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.put_u32_le(self.version);

        put_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.put_slice(&input.previous_output.txid);
            buf.put_u32_le(input.previous_output.vout);
            put_script(&mut buf, &input.script_sig);
            buf.put_u32_le(input.sequence);
        }

        put_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.put_u64_le(output.value);
            put_script(&mut buf, &output.script_pubkey);
        }

        buf.put_u32_le(self.locktime);
        buf
    }

    /// Decode the legacy wire encoding; the whole slice must be consumed
    pub fn deserialize(data: &[u8]) -> Result<Self, TransactionError> {
        let mut buf = data;
        let version = get_u32(&mut buf, "version")?;

        let input_count = get_varint(&mut buf, "input count")?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            need(&buf, OUTPOINT_SIZE, "outpoint")?;
            let mut txid = [0u8; 32];
            buf.copy_to_slice(&mut txid);
            let vout = buf.get_u32_le();
            let script_sig = get_script(&mut buf, "input script")?;
            let sequence = get_u32(&mut buf, "sequence")?;
            inputs.push(TransactionInput {
                previous_output: OutPoint::new(txid, vout),
                script_sig,
                sequence,
            });
        }

        let output_count = get_varint(&mut buf, "output count")?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            let value = get_u64(&mut buf, "output value")?;
            let script_pubkey = get_script(&mut buf, "output script")?;
            outputs.push(TransactionOutput {
                value,
                script_pubkey,
            });
        }

        let locktime = get_u32(&mut buf, "locktime")?;
        if buf.has_remaining() {
            return Err(TransactionError::TrailingBytes(buf.remaining()));
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            locktime,
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, TransactionError> {
        let bytes =
            hex::decode(hex_str.trim()).map_err(|e| TransactionError::InvalidHex(e.to_string()))?;
        Self::deserialize(&bytes)
    }

    /// Serialized size in bytes
    pub fn size(&self) -> usize {
        let inputs: usize = self
            .inputs
            .iter()
            .map(|i| {
                OUTPOINT_SIZE
                    + varint_len(i.script_sig.len() as u64)
                    + i.script_sig.len()
                    + SEQUENCE_SIZE
            })
            .sum();
        let outputs: usize = self
            .outputs
            .iter()
            .map(|o| 8 + varint_len(o.script_pubkey.len() as u64) + o.script_pubkey.len())
            .sum();
        4 + varint_len(self.inputs.len() as u64)
            + inputs
            + varint_len(self.outputs.len() as u64)
            + outputs
            + 4
    }

    /// Transaction id in internal byte order
    pub fn txid(&self) -> [u8; 32] {
        let mut txid = [0u8; 32];
        txid.copy_from_slice(&double_sha256(&self.serialize()));
        txid
    }

    /// Transaction id in display (reversed) hex
    pub fn txid_hex(&self) -> String {
        txid_to_hex(&self.txid())
    }

    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::OP_0;

    // Legacy 2-of-3 spend with two signatures (one input, one P2SH output)
    const SIGNED_TX_HEX: &str = "010000000140c1ae9d6933e4a08594f814ba73a4e94d19c8a83f45784b1684b3a3f84ee666000000009200473044022012bd2f15e56ab1b63d5ee23e194ed995ad4b81a21bcb8e0d913e5e791c07f7280220278bdb6b54cdc608193c869affe28dc2f700902218122770faff25c56142102b01483045022100e74e9955e042aca36f4f3ad907a0926c5b85e5d9608b0678a78a9cbc0259c7a2022053ff761e5f9a80558db7023e45c4979ac3c19a423f0184fb0596d3da308cc4b501ffffffff0140420f000000000017a91419438da7d16709643be5abd8df62ca4034a489a78700000000";

    #[test]
    fn test_decode_known_transaction() {
        let tx = Transaction::from_hex(SIGNED_TX_HEX).unwrap();

        assert_eq!(tx.version, 1);
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.locktime, 0);
        assert_eq!(tx.outputs[0].value, 1_000_000);
        assert!(tx.outputs[0].script_pubkey.is_pay_to_script_hash());
        assert_eq!(tx.inputs[0].sequence, SEQUENCE_FINAL);
        assert_eq!(tx.inputs[0].previous_output.vout, 0);
        assert_eq!(
            tx.inputs[0].previous_output.txid_hex(),
            "66e64ef8a3b384164b78453fa8c8194de9a473ba14f89485a0e433699daec140"
        );

        let chunks = tx.inputs[0].script_sig.chunks().unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].opcode, OP_0);
        assert_eq!(chunks[1].push_data().unwrap().len(), 71);
        assert_eq!(chunks[2].push_data().unwrap().len(), 72);
    }

    #[test]
    fn test_reencode_is_identical() {
        let tx = Transaction::from_hex(SIGNED_TX_HEX).unwrap();
        assert_eq!(tx.to_hex(), SIGNED_TX_HEX);
        assert_eq!(tx.size(), SIGNED_TX_HEX.len() / 2);
    }

    #[test]
    fn test_truncated_and_trailing() {
        let bytes = hex::decode(SIGNED_TX_HEX).unwrap();
        assert!(matches!(
            Transaction::deserialize(&bytes[..bytes.len() - 2]),
            Err(TransactionError::UnexpectedEof("locktime"))
        ));

        let mut extra = bytes.clone();
        extra.push(0);
        assert_eq!(
            Transaction::deserialize(&extra),
            Err(TransactionError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_varint() {
        for n in [0u64, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, 0x1_0000_0000] {
            let mut buf = Vec::new();
            put_varint(&mut buf, n);
            assert_eq!(buf.len(), varint_len(n));
            let mut slice = buf.as_slice();
            assert_eq!(get_varint(&mut slice, "n").unwrap(), n);
        }
    }

    #[test]
    fn test_txid_hex_roundtrip() {
        let hex_id = "0fa147b287dacf753fd5f0e9aaf342464555b78960352ec043b9f7289e82e60f";
        let outpoint = OutPoint::from_txid_hex(hex_id, 3).unwrap();
        assert_eq!(outpoint.txid[0], 0x0f);
        assert_eq!(outpoint.txid[31], 0x0f);
        assert_eq!(outpoint.txid_hex(), hex_id);
        assert!(OutPoint::from_txid_hex("abcd", 0).is_err());
    }

    #[test]
    fn test_set_input_script() {
        let mut tx = Transaction::new();
        tx.add_input(TransactionInput::new(OutPoint::default()));
        tx.set_input_script(0, Script::from_bytes(vec![OP_0]))
            .unwrap();
        assert_eq!(tx.inputs[0].script_sig.as_bytes(), &[OP_0]);
        assert_eq!(
            tx.set_input_script(1, Script::new()),
            Err(TransactionError::InputIndexOutOfRange { index: 1, count: 1 })
        );
    }
}
