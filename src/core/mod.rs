//! Core transaction components
//!
//! This module contains the pieces signatures are made against:
//! - Script bytes, push encoding and chunk parsing
//! - A minimal transaction with the legacy wire format
//! - The legacy signature hash

pub mod script;
pub mod sighash;
pub mod transaction;

pub use script::{push_len, push_prefix_len, Script, ScriptChunk, ScriptError, SigHashType};
pub use sighash::{LegacySighash, SighashComputer, SighashError, SIGHASH_SINGLE_BUG};
pub use transaction::{
    txid_from_hex, txid_to_hex, varint_len, OutPoint, Transaction, TransactionError,
    TransactionInput, TransactionOutput, OUTPOINT_SIZE, SEQUENCE_FINAL, SEQUENCE_SIZE,
    TX_VERSION,
};
