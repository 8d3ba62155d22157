//! Threshold multi-signature inputs
//!
//! An M-of-N input spends an output locked by `OP_M <keys> OP_N
//! OP_CHECKMULTISIG`, either directly or through pay-to-script-hash.
//! Signatures are kept in one slot per key so the unlocking script can be
//! emitted in the order CHECKMULTISIG requires.
//!
//! # Example
//!
//! ```ignore
//! use mini_multisig::multisig::{MultisigSpend, SpentOutput};
//!
//! let mut spend = MultisigSpend::new();
//! spend.spend(spent_output, vec![key1.public_key, key2.public_key, key3.public_key], 2)?;
//! spend.add_output(90_000, recipient_script);
//!
//! spend.sign(&key1)?;
//! spend.sign(&key3)?;
//! assert!(spend.is_fully_signed());
//! ```

pub mod input;
pub mod matcher;
pub mod record;
pub mod redeem;
pub mod signature;
pub mod spend;

pub use input::{
    InputOptions, MultisigError, MultisigInput, SpendKind, SpentOutput, MAX_DER_SIGNATURE_SIZE,
};
pub use matcher::SignatureMatcher;
pub use record::{
    load_record, save_record, MultisigInputRecord, OutputRecord, RecordError, SignatureRecord,
};
pub use redeem::{sort_public_keys, RedeemCondition, MAX_PUBKEYS_PER_MULTISIG};
pub use signature::TransactionSignature;
pub use spend::MultisigSpend;
