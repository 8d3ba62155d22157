//! Signatures collected for a multisig input

use crate::core::script::SigHashType;
use crate::core::transaction::{txid_to_hex, OutPoint};
use crate::crypto::{parse_der, PublicKey};
use crate::multisig::input::{MultisigError, MAX_DER_SIGNATURE_SIZE};

/// A DER signature bound to the key that produced it and the input it signs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSignature {
    pub public_key: PublicKey,
    /// Outpoint spent by the signed input
    pub previous_output: OutPoint,
    pub input_index: usize,
    /// DER-encoded signature, without the hash type byte
    pub signature: Vec<u8>,
    pub sighash: SigHashType,
}

impl TransactionSignature {
    pub fn new(
        public_key: PublicKey,
        previous_output: OutPoint,
        input_index: usize,
        signature: Vec<u8>,
        sighash: SigHashType,
    ) -> Self {
        Self {
            public_key,
            previous_output,
            input_index,
            signature,
            sighash,
        }
    }

    /// The form pushed in an unlocking script: `DER || hash type`
    pub fn to_script_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.signature.len() + 1);
        bytes.extend_from_slice(&self.signature);
        bytes.push(self.sighash.to_byte());
        bytes
    }

    pub fn prev_tx_id(&self) -> String {
        txid_to_hex(&self.previous_output.txid)
    }
}

/// Split a pushed signature into its DER bytes and hash type.
///
/// Fails when the trailing byte is not a known hash type, the remainder is
/// not a DER signature, or the signature is high-S or longer than
/// [`MAX_DER_SIGNATURE_SIZE`].
pub fn split_script_signature(bytes: &[u8]) -> Result<(Vec<u8>, SigHashType), MultisigError> {
    let (last, der) = bytes
        .split_last()
        .ok_or_else(|| MultisigError::MalformedSignature("empty push".to_string()))?;
    let sighash = SigHashType::from_byte(*last).ok_or_else(|| {
        MultisigError::MalformedSignature(format!("unknown hash type 0x{:02x}", last))
    })?;
    let parsed = parse_der(der).map_err(|e| MultisigError::MalformedSignature(e.to_string()))?;

    let mut normalized = parsed;
    normalized.normalize_s();
    if normalized != parsed {
        return Err(MultisigError::MalformedSignature("high S value".to_string()));
    }
    if der.len() > MAX_DER_SIGNATURE_SIZE {
        return Err(MultisigError::MalformedSignature(format!(
            "{} byte signature",
            der.len()
        )));
    }
    Ok((der.to_vec(), sighash))
}

/// The same signature with S replaced by `n - S`
#[cfg(test)]
pub(crate) fn high_s_variant(der: &[u8]) -> Vec<u8> {
    use secp256k1::ecdsa::Signature;

    // secp256k1 group order
    const ORDER: [u8; 32] = [
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xfe, 0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36,
        0x41, 0x41,
    ];

    let mut compact = Signature::from_der(der).unwrap().serialize_compact();
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut digit = ORDER[i] as i16 - compact[32 + i] as i16 - borrow;
        borrow = 0;
        if digit < 0 {
            digit += 256;
            borrow = 1;
        }
        compact[32 + i] = digit as u8;
    }
    Signature::from_compact(&compact).unwrap().serialize_der().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{sha256, KeyPair};

    #[test]
    fn test_script_bytes_roundtrip() {
        let kp = KeyPair::generate();
        let der = kp.sign(&sha256(b"digest")).unwrap();
        let sig = TransactionSignature::new(
            kp.public_key,
            OutPoint::default(),
            0,
            der.clone(),
            SigHashType::NoneAnyoneCanPay,
        );

        let bytes = sig.to_script_bytes();
        assert_eq!(bytes.len(), der.len() + 1);
        assert_eq!(*bytes.last().unwrap(), 0x82);

        let (parsed_der, sighash) = split_script_signature(&bytes).unwrap();
        assert_eq!(parsed_der, der);
        assert_eq!(sighash, SigHashType::NoneAnyoneCanPay);
    }

    #[test]
    fn test_malformed_candidates() {
        assert!(matches!(
            split_script_signature(&[]),
            Err(MultisigError::MalformedSignature(_))
        ));
        // Not DER
        assert!(matches!(
            split_script_signature(&[0x02; 33]),
            Err(MultisigError::MalformedSignature(_))
        ));

        let kp = KeyPair::generate();
        let mut bytes = kp.sign(&sha256(b"x")).unwrap();
        bytes.push(0x07);
        assert!(matches!(
            split_script_signature(&bytes),
            Err(MultisigError::MalformedSignature(_))
        ));
    }

    #[test]
    fn test_high_s_is_rejected() {
        let kp = KeyPair::generate();
        let digest = sha256(b"high s");
        let low = kp.sign(&digest).unwrap();
        let high = high_s_variant(&low);
        assert_ne!(high, low);
        // Still verifies once normalized
        assert!(kp.verify(&digest, &high));

        let mut bytes = high;
        bytes.push(SigHashType::All.to_byte());
        assert_eq!(
            split_script_signature(&bytes),
            Err(MultisigError::MalformedSignature("high S value".to_string()))
        );
    }
}
