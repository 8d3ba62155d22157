//! Script byte format
//!
//! Byte-level Bitcoin-style scripts: opcodes, minimal push-data encoding,
//! a chunk parser for unlocking scripts and the signature hash types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Opcodes
// =============================================================================

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

// =============================================================================
// Script Errors
// =============================================================================

/// Script-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Truncated push at offset {0}")]
    TruncatedPush(usize),
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

// =============================================================================
// Signature Hash Types
// =============================================================================

/// Signature hash type determines what parts of the transaction are signed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum SigHashType {
    /// Sign all inputs and all outputs (default)
    #[default]
    All = 0x01,
    /// Sign all inputs but no outputs (blank check)
    None = 0x02,
    /// Sign all inputs and only the output with same index
    Single = 0x03,
    /// SIGHASH_ALL | SIGHASH_ANYONECANPAY
    AllAnyoneCanPay = 0x81,
    /// SIGHASH_NONE | SIGHASH_ANYONECANPAY
    NoneAnyoneCanPay = 0x82,
    /// SIGHASH_SINGLE | SIGHASH_ANYONECANPAY
    SingleAnyoneCanPay = 0x83,
}

impl SigHashType {
    /// Flag bit that restricts signing to the current input only
    pub const ANYONECANPAY_FLAG: u8 = 0x80;

    /// Parse sighash type from byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(SigHashType::All),
            0x02 => Some(SigHashType::None),
            0x03 => Some(SigHashType::Single),
            0x81 => Some(SigHashType::AllAnyoneCanPay),
            0x82 => Some(SigHashType::NoneAnyoneCanPay),
            0x83 => Some(SigHashType::SingleAnyoneCanPay),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Check if this sighash includes ANYONECANPAY flag
    pub fn is_anyone_can_pay(&self) -> bool {
        (*self as u8) & Self::ANYONECANPAY_FLAG != 0
    }

    /// Get the base type (without ANYONECANPAY flag)
    pub fn base_type(&self) -> SigHashType {
        match (*self as u8) & 0x1f {
            0x02 => SigHashType::None,
            0x03 => SigHashType::Single,
            _ => SigHashType::All,
        }
    }
}

// =============================================================================
// Chunks
// =============================================================================

/// One parsed script element: an opcode and, for pushes, the pushed bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptChunk {
    pub opcode: u8,
    pub data: Option<Vec<u8>>,
}

impl ScriptChunk {
    /// Pushed bytes; `OP_0` pushes the empty string, non-push opcodes yield `None`
    pub fn push_data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn is_push(&self) -> bool {
        self.data.is_some()
    }
}

/// Number of bytes the minimal push prefix takes for `len` bytes of data
pub fn push_prefix_len(len: usize) -> usize {
    if len < OP_PUSHDATA1 as usize {
        1
    } else if len <= 0xff {
        2
    } else if len <= 0xffff {
        3
    } else {
        5
    }
}

/// Total serialized length of a minimal push of `len` bytes
pub fn push_len(len: usize) -> usize {
    push_prefix_len(len) + len
}

/// Parse the element starting at `pos`; returns it and the offset after it
fn next_chunk(bytes: &[u8], pos: usize) -> Result<(ScriptChunk, usize), ScriptError> {
    let opcode = bytes[pos];
    let mut cursor = pos + 1;

    let data_len = match opcode {
        0x01..=0x4b => Some(opcode as usize),
        OP_PUSHDATA1 => Some(read_le(bytes, &mut cursor, 1, pos)?),
        OP_PUSHDATA2 => Some(read_le(bytes, &mut cursor, 2, pos)?),
        OP_PUSHDATA4 => Some(read_le(bytes, &mut cursor, 4, pos)?),
        OP_0 => Some(0),
        _ => None,
    };

    match data_len {
        Some(len) => {
            let end = cursor
                .checked_add(len)
                .filter(|end| *end <= bytes.len())
                .ok_or(ScriptError::TruncatedPush(pos))?;
            let data = bytes[cursor..end].to_vec();
            Ok((
                ScriptChunk {
                    opcode,
                    data: Some(data),
                },
                end,
            ))
        }
        None => Ok((ScriptChunk { opcode, data: None }, cursor)),
    }
}

fn read_le(bytes: &[u8], cursor: &mut usize, width: usize, pos: usize) -> Result<usize, ScriptError> {
    let end = *cursor + width;
    if end > bytes.len() {
        return Err(ScriptError::TruncatedPush(pos));
    }
    let value = bytes[*cursor..end]
        .iter()
        .rev()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize);
    *cursor = end;
    Ok(value)
}

// =============================================================================
// Script
// =============================================================================

/// Raw script bytes
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, ScriptError> {
        hex::decode(hex_str)
            .map(Self)
            .map_err(|e| ScriptError::InvalidHex(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a bare opcode
    pub fn push_opcode(&mut self, opcode: u8) -> &mut Self {
        self.0.push(opcode);
        self
    }

    /// Append a push of `data` using the smallest push encoding.
    ///
    /// Empty data is pushed as `OP_0`.
    pub fn push_data(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        match push_prefix_len(len) {
            1 => self.0.push(len as u8),
            2 => {
                self.0.push(OP_PUSHDATA1);
                self.0.push(len as u8);
            }
            3 => {
                self.0.push(OP_PUSHDATA2);
                self.0.extend_from_slice(&(len as u16).to_le_bytes());
            }
            _ => {
                self.0.push(OP_PUSHDATA4);
                self.0.extend_from_slice(&(len as u32).to_le_bytes());
            }
        }
        self.0.extend_from_slice(data);
        self
    }

    /// Parse the script into chunks
    pub fn chunks(&self) -> Result<Vec<ScriptChunk>, ScriptError> {
        let mut chunks = Vec::new();
        let mut pos = 0;
        while pos < self.0.len() {
            let (chunk, next) = next_chunk(&self.0, pos)?;
            chunks.push(chunk);
            pos = next;
        }
        Ok(chunks)
    }

    /// Copy of the script with every `OP_CODESEPARATOR` removed, keeping the
    /// existing encoding of all other elements.
    pub fn without_codeseparators(&self) -> Result<Script, ScriptError> {
        let mut out = Vec::with_capacity(self.0.len());
        let mut pos = 0;
        while pos < self.0.len() {
            let (chunk, next) = next_chunk(&self.0, pos)?;
            if chunk.opcode != OP_CODESEPARATOR || chunk.is_push() {
                out.extend_from_slice(&self.0[pos..next]);
            }
            pos = next;
        }
        Ok(Script(out))
    }

    /// `OP_HASH160 <20-byte hash> OP_EQUAL`
    pub fn pay_to_script_hash(script_hash: &[u8; 20]) -> Self {
        let mut script = Script::new();
        script
            .push_opcode(OP_HASH160)
            .push_data(script_hash)
            .push_opcode(OP_EQUAL);
        script
    }

    /// `<pubkey> OP_CHECKSIG`
    pub fn pay_to_public_key(public_key: &[u8]) -> Self {
        let mut script = Script::new();
        script.push_data(public_key).push_opcode(OP_CHECKSIG);
        script
    }

    pub fn is_pay_to_script_hash(&self) -> bool {
        self.0.len() == 23 && self.0[0] == OP_HASH160 && self.0[1] == 20 && self.0[22] == OP_EQUAL
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Script {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Script::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sighash_types() {
        assert_eq!(SigHashType::default(), SigHashType::All);
        assert!(!SigHashType::All.is_anyone_can_pay());
        assert!(SigHashType::AllAnyoneCanPay.is_anyone_can_pay());
        assert_eq!(SigHashType::AllAnyoneCanPay.base_type(), SigHashType::All);
        assert_eq!(SigHashType::SingleAnyoneCanPay.base_type(), SigHashType::Single);
        assert_eq!(SigHashType::from_byte(0x82), Some(SigHashType::NoneAnyoneCanPay));
        assert_eq!(SigHashType::from_byte(0x00), None);
        assert_eq!(SigHashType::from_byte(0x80), None);
    }

    #[test]
    fn test_push_data_encodings() {
        let mut script = Script::new();
        script.push_data(&[]);
        assert_eq!(script.as_bytes(), &[OP_0]);

        let mut script = Script::new();
        script.push_data(&[0xaa; 75]);
        assert_eq!(script.as_bytes()[0], 75);
        assert_eq!(script.len(), 76);

        let mut script = Script::new();
        script.push_data(&[0xaa; 76]);
        assert_eq!(&script.as_bytes()[..2], &[OP_PUSHDATA1, 76]);
        assert_eq!(script.len(), push_len(76));

        let mut script = Script::new();
        script.push_data(&[0xaa; 300]);
        assert_eq!(&script.as_bytes()[..3], &[OP_PUSHDATA2, 0x2c, 0x01]);
        assert_eq!(script.len(), push_len(300));
    }

    #[test]
    fn test_chunks() {
        let mut script = Script::new();
        script
            .push_opcode(OP_0)
            .push_data(&[1, 2, 3])
            .push_data(&[7; 100])
            .push_opcode(OP_CHECKMULTISIG);

        let chunks = script.chunks().unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].push_data(), Some(&[][..]));
        assert_eq!(chunks[1].push_data(), Some(&[1u8, 2, 3][..]));
        assert_eq!(chunks[2].push_data().unwrap().len(), 100);
        assert_eq!(chunks[2].opcode, OP_PUSHDATA1);
        assert!(!chunks[3].is_push());
    }

    #[test]
    fn test_truncated_push() {
        let script = Script::from_bytes(vec![0x05, 1, 2]);
        assert_eq!(script.chunks(), Err(ScriptError::TruncatedPush(0)));

        let script = Script::from_bytes(vec![OP_0, OP_PUSHDATA2, 0x01]);
        assert_eq!(script.chunks(), Err(ScriptError::TruncatedPush(1)));
    }

    #[test]
    fn test_without_codeseparators() {
        let mut script = Script::new();
        script
            .push_opcode(OP_CODESEPARATOR)
            .push_data(&[OP_CODESEPARATOR, 1])
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_CODESEPARATOR);

        let stripped = script.without_codeseparators().unwrap();
        assert_eq!(stripped.as_bytes(), &[0x02, OP_CODESEPARATOR, 1, OP_CHECKSIG]);
    }

    #[test]
    fn test_pay_to_script_hash() {
        let script = Script::pay_to_script_hash(&[0x11; 20]);
        assert_eq!(script.len(), 23);
        assert!(script.is_pay_to_script_hash());
        assert!(!Script::pay_to_public_key(&[0x02; 33]).is_pay_to_script_hash());
    }

    #[test]
    fn test_script_serde_as_hex() {
        let script = Script::from_bytes(vec![0x51, 0xae]);
        let json = serde_json::to_string(&script).unwrap();
        assert_eq!(json, "\"51ae\"");
        assert_eq!(serde_json::from_str::<Script>(&json).unwrap(), script);
    }
}
