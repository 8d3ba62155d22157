//! Signature-to-key matching
//!
//! Unlocking scripts carry signatures without saying which key made them.
//! CHECKMULTISIG resolves this with a single forward pass: each signature is
//! tried against the remaining keys in order and a key, once passed over, is
//! never revisited. [`SignatureMatcher`] runs the same pass so any placement
//! it produces is one the script check accepts.

use crate::core::script::Script;
use crate::core::sighash::{LegacySighash, SighashComputer};
use crate::core::transaction::Transaction;
use crate::crypto::{verify_der, PublicKey};
use crate::multisig::signature::{split_script_signature, TransactionSignature};

/// Places raw signature pushes into key-indexed slots
pub struct SignatureMatcher<'a, C = LegacySighash> {
    tx: &'a Transaction,
    input_index: usize,
    script_code: &'a Script,
    computer: C,
}

impl<'a> SignatureMatcher<'a, LegacySighash> {
    pub fn new(tx: &'a Transaction, input_index: usize, script_code: &'a Script) -> Self {
        Self::with_computer(tx, input_index, script_code, LegacySighash)
    }
}

impl<'a, C: SighashComputer> SignatureMatcher<'a, C> {
    pub fn with_computer(
        tx: &'a Transaction,
        input_index: usize,
        script_code: &'a Script,
        computer: C,
    ) -> Self {
        Self {
            tx,
            input_index,
            script_code,
            computer,
        }
    }

    /// Assign each candidate to the earliest remaining key it verifies against.
    ///
    /// Candidates are taken in script order. Empty pushes are placeholders and
    /// consume no key. Candidates that do not parse or verify against any
    /// remaining key are dropped. The result has one slot per key.
    pub fn normalize<B: AsRef<[u8]>>(
        &self,
        candidates: &[B],
        public_keys: &[PublicKey],
    ) -> Vec<Option<TransactionSignature>> {
        let mut slots: Vec<Option<TransactionSignature>> = vec![None; public_keys.len()];
        let mut next_key = 0;

        for (position, candidate) in candidates.iter().enumerate() {
            let candidate = candidate.as_ref();
            if candidate.is_empty() {
                continue;
            }

            let (der, sighash) = match split_script_signature(candidate) {
                Ok(parts) => parts,
                Err(e) => {
                    log::debug!("Dropping signature candidate {}: {}", position, e);
                    continue;
                }
            };

            let digest = match self.computer.digest(
                self.tx,
                self.input_index,
                self.script_code,
                sighash,
            ) {
                Ok(digest) => digest,
                Err(e) => {
                    log::debug!("Dropping signature candidate {}: {}", position, e);
                    continue;
                }
            };

            let matched = public_keys[next_key..]
                .iter()
                .position(|key| verify_der(key, &digest, &der))
                .map(|offset| next_key + offset);

            match matched {
                Some(key_index) => {
                    slots[key_index] = Some(TransactionSignature::new(
                        public_keys[key_index],
                        self.tx.inputs[self.input_index].previous_output,
                        self.input_index,
                        der,
                        sighash,
                    ));
                    next_key = key_index + 1;
                }
                None => {
                    log::debug!(
                        "Dropping signature candidate {}: no key from slot {} verifies it",
                        position,
                        next_key
                    );
                }
            }
        }

        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::SigHashType;
    use crate::core::transaction::{OutPoint, TransactionInput, TransactionOutput};
    use crate::crypto::KeyPair;
    use crate::multisig::redeem::RedeemCondition;

    struct Fixture {
        tx: Transaction,
        keys: Vec<KeyPair>,
        script_code: Script,
    }

    impl Fixture {
        fn new() -> Self {
            let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
            let pubkeys = keys.iter().map(|k| k.public_key).collect();
            let script_code = RedeemCondition::new(pubkeys, 2).unwrap().script();

            let mut tx = Transaction::new();
            tx.add_input(TransactionInput::new(OutPoint::new([7u8; 32], 1)));
            tx.add_output(TransactionOutput::new(
                90_000,
                Script::pay_to_script_hash(&[0x33; 20]),
            ));

            Self {
                tx,
                keys,
                script_code,
            }
        }

        fn pubkeys(&self) -> Vec<PublicKey> {
            self.keys.iter().map(|k| k.public_key).collect()
        }

        fn sign(&self, key: usize, sighash: SigHashType) -> Vec<u8> {
            let digest = LegacySighash
                .digest(&self.tx, 0, &self.script_code, sighash)
                .unwrap();
            let mut bytes = self.keys[key].sign(&digest).unwrap();
            bytes.push(sighash.to_byte());
            bytes
        }

        fn normalize(&self, candidates: &[Vec<u8>]) -> Vec<Option<TransactionSignature>> {
            SignatureMatcher::new(&self.tx, 0, &self.script_code)
                .normalize(candidates, &self.pubkeys())
        }
    }

    fn occupied(slots: &[Option<TransactionSignature>]) -> Vec<usize> {
        slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }

    #[test]
    fn test_matches_keys_one_and_two() {
        let f = Fixture::new();
        let slots = f.normalize(&[f.sign(0, SigHashType::All), f.sign(1, SigHashType::All)]);

        assert_eq!(slots.len(), 3);
        assert_eq!(occupied(&slots), vec![0, 1]);
        assert_eq!(slots[0].as_ref().unwrap().public_key, f.keys[0].public_key);
        assert_eq!(slots[1].as_ref().unwrap().public_key, f.keys[1].public_key);
    }

    #[test]
    fn test_matches_keys_one_and_three() {
        let f = Fixture::new();
        let slots = f.normalize(&[f.sign(0, SigHashType::All), f.sign(2, SigHashType::All)]);
        assert_eq!(occupied(&slots), vec![0, 2]);
        assert_eq!(slots[2].as_ref().unwrap().public_key, f.keys[2].public_key);
    }

    #[test]
    fn test_out_of_order_signature_is_dropped() {
        // Key 3 before key 1: the cursor is past key 1 when its signature arrives
        let f = Fixture::new();
        let slots = f.normalize(&[f.sign(2, SigHashType::All), f.sign(0, SigHashType::All)]);
        assert_eq!(occupied(&slots), vec![2]);
    }

    #[test]
    fn test_placeholders_and_garbage_are_skipped() {
        let f = Fixture::new();
        let foreign = KeyPair::generate();
        let digest = LegacySighash
            .digest(&f.tx, 0, &f.script_code, SigHashType::All)
            .unwrap();
        let mut foreign_sig = foreign.sign(&digest).unwrap();
        foreign_sig.push(0x01);

        let slots = f.normalize(&[
            vec![],
            vec![0xde, 0xad, 0xbe, 0xef],
            foreign_sig,
            vec![],
            f.sign(1, SigHashType::All),
        ]);
        assert_eq!(occupied(&slots), vec![1]);
    }

    #[test]
    fn test_keeps_declared_hash_type() {
        let f = Fixture::new();
        let slots = f.normalize(&[f.sign(1, SigHashType::Single), f.sign(2, SigHashType::None)]);
        assert_eq!(occupied(&slots), vec![1, 2]);
        assert_eq!(slots[1].as_ref().unwrap().sighash, SigHashType::Single);
        assert_eq!(slots[2].as_ref().unwrap().sighash, SigHashType::None);
    }

    #[test]
    fn test_wrong_hash_type_byte_fails_verification() {
        let f = Fixture::new();
        let mut sig = f.sign(0, SigHashType::All);
        *sig.last_mut().unwrap() = SigHashType::None.to_byte();
        assert!(occupied(&f.normalize(&[sig])).is_empty());
    }

    #[test]
    fn test_high_s_signature_is_dropped() {
        let f = Fixture::new();
        let low = f.sign(0, SigHashType::All);
        let mut high = crate::multisig::signature::high_s_variant(&low[..low.len() - 1]);
        high.push(SigHashType::All.to_byte());

        let slots = f.normalize(&[high, f.sign(1, SigHashType::All)]);
        assert_eq!(occupied(&slots), vec![1]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let f = Fixture::new();
        let first = f.normalize(&[f.sign(0, SigHashType::All), f.sign(2, SigHashType::All)]);

        let again: Vec<Vec<u8>> = first
            .iter()
            .flatten()
            .map(|s| s.to_script_bytes())
            .collect();
        assert_eq!(f.normalize(&again), first);
    }

    #[test]
    fn test_merge_of_independent_signers() {
        let f = Fixture::new();
        let from_a = f.sign(2, SigHashType::All);
        let from_b = f.sign(0, SigHashType::All);

        // Union ordered by key index, regardless of who signed first
        let merged = f.normalize(&[from_b.clone(), from_a.clone()]);
        assert_eq!(occupied(&merged), vec![0, 2]);
        assert_eq!(merged[0].as_ref().unwrap().to_script_bytes(), from_b);
        assert_eq!(merged[2].as_ref().unwrap().to_script_bytes(), from_a);
    }
}
