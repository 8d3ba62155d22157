//! M-of-N redeem condition
//!
//! `OP_M <pubkey_1> ... <pubkey_N> OP_N OP_CHECKMULTISIG`. Key order is part
//! of the condition: signatures must appear in the same order when spending.

use crate::core::script::{push_len, Script, OP_1, OP_CHECKMULTISIG};
use crate::crypto::{base58check_encode, hash160, PublicKey};
use crate::multisig::input::MultisigError;
use std::collections::HashSet;

/// Consensus limit on keys in a single CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Validate an ordered key list and threshold
pub fn validate_config(public_keys: &[PublicKey], threshold: u8) -> Result<(), MultisigError> {
    if public_keys.is_empty() {
        return Err(MultisigError::NoPublicKeys);
    }
    if public_keys.len() > MAX_PUBKEYS_PER_MULTISIG {
        return Err(MultisigError::TooManyPublicKeys(public_keys.len()));
    }
    if threshold == 0 || threshold as usize > public_keys.len() {
        return Err(MultisigError::InvalidThreshold {
            threshold,
            keys: public_keys.len(),
        });
    }

    let mut seen = HashSet::with_capacity(public_keys.len());
    for key in public_keys {
        if !seen.insert(key.to_bytes()) {
            return Err(MultisigError::DuplicatePublicKey(key.to_hex()));
        }
    }
    Ok(())
}

/// Sort keys by their encoded bytes.
///
/// Callers that want a canonical condition independent of the order keys
/// were collected in sort before constructing; nothing sorts implicitly.
pub fn sort_public_keys(public_keys: &mut [PublicKey]) {
    public_keys.sort();
}

/// Length of the push for a small integer (`OP_1..OP_16` or a one-byte push)
fn small_int_len(n: usize) -> usize {
    if n <= 16 {
        1
    } else {
        2
    }
}

/// Push a key count: `OP_1..OP_16`, or a one-byte push above 16
fn push_count(script: &mut Script, n: usize) {
    if (1..=16).contains(&n) {
        script.push_opcode(OP_1 + (n as u8 - 1));
    } else {
        script.push_data(&[n as u8]);
    }
}

/// An ordered key list with its signature threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemCondition {
    public_keys: Vec<PublicKey>,
    threshold: u8,
}

impl RedeemCondition {
    pub fn new(public_keys: Vec<PublicKey>, threshold: u8) -> Result<Self, MultisigError> {
        validate_config(&public_keys, threshold)?;
        Ok(Self {
            public_keys,
            threshold,
        })
    }

    pub fn public_keys(&self) -> &[PublicKey] {
        &self.public_keys
    }

    /// Required signatures (M)
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Number of keys (N)
    pub fn key_count(&self) -> usize {
        self.public_keys.len()
    }

    /// Slot of `public_key` in the ordered list
    pub fn position(&self, public_key: &PublicKey) -> Option<usize> {
        self.public_keys.iter().position(|k| k == public_key)
    }

    /// Build the script bytes
    pub fn script(&self) -> Script {
        let mut script = Script::new();
        push_count(&mut script, self.threshold as usize);
        for key in &self.public_keys {
            script.push_data(&key.to_bytes());
        }
        push_count(&mut script, self.public_keys.len());
        script.push_opcode(OP_CHECKMULTISIG);
        script
    }

    /// Length of [`script`](Self::script) computed from key lengths alone
    pub fn serialized_len(&self) -> usize {
        let keys: usize = self
            .public_keys
            .iter()
            .map(|k| push_len(k.encoded_len()))
            .sum();
        small_int_len(self.threshold as usize) + keys + small_int_len(self.public_keys.len()) + 1
    }

    /// HASH160 of the script
    pub fn script_hash(&self) -> [u8; 20] {
        hash160(self.script().as_bytes())
    }

    /// `OP_HASH160 <script hash> OP_EQUAL`
    pub fn script_hash_locking_script(&self) -> Script {
        Script::pay_to_script_hash(&self.script_hash())
    }

    /// Base58Check address of the script hash under `version`
    pub fn script_hash_address(&self, version: u8) -> String {
        let mut payload = vec![version];
        payload.extend_from_slice(&self.script_hash());
        base58check_encode(&payload)
    }

    /// Description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.threshold, self.public_keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::OP_16;
    use crate::crypto::KeyPair;

    fn keys(n: usize) -> Vec<PublicKey> {
        (0..n).map(|_| KeyPair::generate().public_key).collect()
    }

    #[test]
    fn test_script_layout() {
        let pubkeys = keys(3);
        let redeem = RedeemCondition::new(pubkeys.clone(), 2).unwrap();
        let script = redeem.script();
        let bytes = script.as_bytes();

        assert_eq!(bytes[0], OP_1 + 1);
        assert_eq!(bytes[1], 33);
        assert_eq!(&bytes[2..35], pubkeys[0].to_bytes().as_slice());
        assert_eq!(&bytes[36..69], pubkeys[1].to_bytes().as_slice());
        assert_eq!(&bytes[70..103], pubkeys[2].to_bytes().as_slice());
        assert_eq!(bytes[103], OP_1 + 2);
        assert_eq!(bytes[104], OP_CHECKMULTISIG);
        assert_eq!(script.len(), 105);
        assert_eq!(redeem.description(), "2-of-3");
    }

    #[test]
    fn test_key_order_is_preserved() {
        let pubkeys = keys(3);
        let mut reversed = pubkeys.clone();
        reversed.reverse();

        let a = RedeemCondition::new(pubkeys, 2).unwrap();
        let b = RedeemCondition::new(reversed, 2).unwrap();
        assert_ne!(a.script(), b.script());
        assert_ne!(a.script_hash(), b.script_hash());
    }

    #[test]
    fn test_serialized_len_matches_script() {
        let kp = KeyPair::generate();
        let mut mixed = keys(2);
        mixed.push(PublicKey::new_uncompressed(*kp.public_key.inner()));

        for (pubkeys, threshold) in [
            (keys(1), 1),
            (keys(3), 2),
            (mixed, 3),
            (keys(16), 16),
            (keys(20), 17),
        ] {
            let redeem = RedeemCondition::new(pubkeys, threshold).unwrap();
            assert_eq!(redeem.serialized_len(), redeem.script().len());
        }
    }

    #[test]
    fn test_large_key_counts() {
        let redeem = RedeemCondition::new(keys(16), 16).unwrap();
        let bytes = redeem.script().into_bytes();
        assert_eq!(bytes[0], OP_16);

        let redeem = RedeemCondition::new(keys(20), 17).unwrap();
        let bytes = redeem.script().into_bytes();
        assert_eq!(&bytes[..2], &[0x01, 17]);
        let n = bytes.len();
        assert_eq!(&bytes[n - 3..], &[0x01, 20, OP_CHECKMULTISIG]);
    }

    #[test]
    fn test_push_count_matches_small_int_len() {
        for n in [1, 2, 16, 17, 20] {
            let mut script = Script::new();
            push_count(&mut script, n);
            assert_eq!(script.len(), small_int_len(n));
        }
        let mut script = Script::new();
        push_count(&mut script, 1);
        push_count(&mut script, 20);
        assert_eq!(script.as_bytes(), &[OP_1, 0x01, 20]);
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            RedeemCondition::new(keys(3), 0),
            Err(MultisigError::InvalidThreshold { threshold: 0, keys: 3 })
        ));
        assert!(matches!(
            RedeemCondition::new(keys(3), 4),
            Err(MultisigError::InvalidThreshold { threshold: 4, keys: 3 })
        ));
        assert!(matches!(
            RedeemCondition::new(vec![], 1),
            Err(MultisigError::NoPublicKeys)
        ));
        assert!(matches!(
            RedeemCondition::new(keys(21), 2),
            Err(MultisigError::TooManyPublicKeys(21))
        ));

        let pubkeys = keys(2);
        let duplicated = vec![pubkeys[0], pubkeys[1], pubkeys[0]];
        assert!(matches!(
            RedeemCondition::new(duplicated, 2),
            Err(MultisigError::DuplicatePublicKey(_))
        ));
    }

    #[test]
    fn test_script_hash_outputs() {
        let redeem = RedeemCondition::new(keys(3), 2).unwrap();
        let locking = redeem.script_hash_locking_script();
        assert!(locking.is_pay_to_script_hash());
        assert_eq!(&locking.as_bytes()[2..22], &redeem.script_hash());

        // Version 0x05 addresses start with '3'
        assert!(redeem.script_hash_address(0x05).starts_with('3'));
    }

    #[test]
    fn test_sort_public_keys() {
        let mut pubkeys = keys(5);
        sort_public_keys(&mut pubkeys);
        for pair in pubkeys.windows(2) {
            assert!(pair[0].to_bytes() < pair[1].to_bytes());
        }
    }
}
