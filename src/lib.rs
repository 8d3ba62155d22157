//! Mini-Multisig: threshold multi-signature spending in Rust
//!
//! This crate builds and signs inputs that spend M-of-N multisig outputs:
//! - Redeem conditions, bare or wrapped in pay-to-script-hash
//! - Legacy signature hashing over a minimal transaction model
//! - Sparse per-key signature slots in CHECKMULTISIG order
//! - Rehydration of partially signed inputs from their unlocking scripts
//! - JSON records of a single input's state
//!
//! # Example
//!
//! ```rust
//! use mini_multisig::core::{OutPoint, Script};
//! use mini_multisig::crypto::KeyPair;
//! use mini_multisig::multisig::{MultisigSpend, RedeemCondition, SpentOutput};
//!
//! let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
//! let public_keys: Vec<_> = keys.iter().map(|k| k.public_key).collect();
//!
//! // A 2-of-3 output paid to the script hash
//! let redeem = RedeemCondition::new(public_keys.clone(), 2).unwrap();
//! let spent = SpentOutput::new(
//!     OutPoint::new([1u8; 32], 0),
//!     redeem.script_hash_locking_script(),
//!     100_000,
//! );
//!
//! let mut spend = MultisigSpend::new();
//! spend.spend(spent, public_keys, 2).unwrap();
//! spend.add_output(90_000, Script::pay_to_script_hash(&[0u8; 20]));
//!
//! spend.sign(&keys[0]).unwrap();
//! spend.sign(&keys[2]).unwrap();
//! assert!(spend.is_fully_signed());
//! println!("{}", spend.transaction().to_hex());
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod multisig;

// Re-export commonly used types
pub use core::{OutPoint, Script, SigHashType, Transaction};
pub use crypto::{KeyPair, PublicKey};
pub use multisig::{
    MultisigError, MultisigInput, MultisigSpend, RedeemCondition, SignatureMatcher, SpentOutput,
    TransactionSignature,
};
