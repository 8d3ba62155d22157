//! ECDSA key management
//!
//! Key pairs, public key encodings and DER signing/verification over
//! secp256k1. Signatures are produced over a 32-byte sighash digest.

use rand::rngs::OsRng;
use secp256k1::{ecdsa, Message, Secp256k1, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use super::hash::{base58check_decode, base58check_encode};

/// Length of a compressed SEC1 public key
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;

/// Length of an uncompressed SEC1 public key
pub const UNCOMPRESSED_PUBLIC_KEY_SIZE: usize = 65;

/// Errors that can occur during key operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid digest length: expected 32 bytes, got {0}")]
    InvalidDigest(usize),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A secp256k1 public key together with the encoding it appears in.
///
/// Two keys for the same point but different encodings are different
/// identities: scripts commit to the encoded bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PublicKey {
    inner: secp256k1::PublicKey,
    compressed: bool,
}

impl PublicKey {
    /// Wrap a point using the compressed encoding
    pub fn new(inner: secp256k1::PublicKey) -> Self {
        Self {
            inner,
            compressed: true,
        }
    }

    /// Wrap a point using the uncompressed encoding
    pub fn new_uncompressed(inner: secp256k1::PublicKey) -> Self {
        Self {
            inner,
            compressed: false,
        }
    }

    /// Parse a 33- or 65-byte SEC1 encoding
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let compressed = match bytes.len() {
            COMPRESSED_PUBLIC_KEY_SIZE => true,
            UNCOMPRESSED_PUBLIC_KEY_SIZE => false,
            _ => return Err(KeyError::InvalidPublicKey),
        };
        let inner =
            secp256k1::PublicKey::from_slice(bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { inner, compressed })
    }

    /// Parse from a hex string
    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::from_slice(&bytes)
    }

    /// The encoded bytes as they appear in scripts
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.compressed {
            self.inner.serialize().to_vec()
        } else {
            self.inner.serialize_uncompressed().to_vec()
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Length of the encoding in bytes (33 or 65)
    pub fn encoded_len(&self) -> usize {
        if self.compressed {
            COMPRESSED_PUBLIC_KEY_SIZE
        } else {
            UNCOMPRESSED_PUBLIC_KEY_SIZE
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// The underlying curve point
    pub fn inner(&self) -> &secp256k1::PublicKey {
        &self.inner
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair (compressed public key)
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key: PublicKey::new(public_key),
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = secp256k1::PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key: PublicKey::new(public_key),
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Import a Wallet Import Format key.
    ///
    /// Payload is `version || secret(32) [|| 0x01]`; the trailing flag selects
    /// the compressed public key encoding.
    pub fn from_wif(wif: &str) -> Result<Self, KeyError> {
        let payload = base58check_decode(wif).ok_or(KeyError::InvalidPrivateKey)?;
        let (secret, compressed) = match payload.len() {
            33 => (&payload[1..33], false),
            34 if payload[33] == 0x01 => (&payload[1..33], true),
            _ => return Err(KeyError::InvalidPrivateKey),
        };
        let secret_key =
            SecretKey::from_slice(secret).map_err(|_| KeyError::InvalidPrivateKey)?;
        let mut key_pair = Self::from_secret_key(secret_key);
        if !compressed {
            key_pair.public_key = PublicKey::new_uncompressed(*key_pair.public_key.inner());
        }
        Ok(key_pair)
    }

    /// Export as Wallet Import Format with the given version byte
    pub fn to_wif(&self, version: u8) -> String {
        let mut payload = vec![version];
        payload.extend_from_slice(&self.secret_key.secret_bytes());
        if self.public_key.is_compressed() {
            payload.push(0x01);
        }
        base58check_encode(&payload)
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the public key as a hex string
    pub fn public_key_hex(&self) -> String {
        self.public_key.to_hex()
    }

    /// DER-sign a 32-byte digest
    pub fn sign(&self, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
        sign_der(&self.secret_key, digest)
    }

    /// Verify a DER signature against this key pair's public key
    pub fn verify(&self, digest: &[u8], signature: &[u8]) -> bool {
        verify_der(&self.public_key, digest, signature)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

fn digest_message(digest: &[u8]) -> Result<Message, KeyError> {
    if digest.len() != 32 {
        return Err(KeyError::InvalidDigest(digest.len()));
    }
    Ok(Message::from_digest_slice(digest)?)
}

/// Sign a digest, returning the DER encoding (low-S, deterministic nonce)
pub fn sign_der(secret_key: &SecretKey, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
    let secp = Secp256k1::signing_only();
    let message = digest_message(digest)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_der().to_vec())
}

/// Parse a DER signature, tolerating the non-strict encodings found in old
/// scripts.
pub fn parse_der(signature: &[u8]) -> Result<ecdsa::Signature, KeyError> {
    ecdsa::Signature::from_der(signature)
        .or_else(|_| ecdsa::Signature::from_der_lax(signature))
        .map_err(|_| KeyError::InvalidSignature)
}

/// Verify a DER signature over a digest.
///
/// Malformed input yields `false`; high-S signatures are normalized first.
pub fn verify_der(public_key: &PublicKey, digest: &[u8], signature: &[u8]) -> bool {
    let secp = Secp256k1::verification_only();
    let Ok(message) = digest_message(digest) else {
        return false;
    };
    let Ok(mut sig) = parse_der(signature) else {
        return false;
    };
    sig.normalize_s();
    secp.verify_ecdsa(&message, &sig, public_key.inner()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256;

    #[test]
    fn test_key_pair_generation() {
        let kp = KeyPair::generate();
        assert_eq!(kp.private_key_hex().len(), 64);
        assert_eq!(kp.public_key_hex().len(), 66);
        assert!(kp.public_key.is_compressed());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let digest = sha256(b"Hello, multisig!");

        let signature = kp.sign(&digest).unwrap();
        assert!(signature.len() <= 71);
        assert_eq!(signature[0], 0x30);
        assert!(kp.verify(&digest, &signature));

        let other = KeyPair::generate();
        assert!(!verify_der(&other.public_key, &digest, &signature));
        assert!(!kp.verify(&sha256(b"other"), &signature));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let kp = KeyPair::generate();
        let digest = sha256(b"data");
        assert!(!kp.verify(&digest, &[0x30, 0x01, 0x02]));
        assert!(!kp.verify(&digest[..31], &kp.sign(&digest).unwrap()));
    }

    #[test]
    fn test_sign_rejects_short_digest() {
        let kp = KeyPair::generate();
        assert!(matches!(
            kp.sign(&[0u8; 20]),
            Err(KeyError::InvalidDigest(20))
        ));
    }

    #[test]
    fn test_key_pair_from_hex() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::from_private_key_hex(&kp1.private_key_hex()).unwrap();
        assert_eq!(kp1.public_key, kp2.public_key);
    }

    #[test]
    fn test_wif_roundtrip() {
        let kp = KeyPair::generate();
        let wif = kp.to_wif(0xef);
        let restored = KeyPair::from_wif(&wif).unwrap();
        assert_eq!(restored.public_key, kp.public_key);
        assert!(restored.public_key.is_compressed());
    }

    #[test]
    fn test_public_key_encodings() {
        let kp = KeyPair::generate();
        let compressed = kp.public_key;
        let uncompressed = PublicKey::new_uncompressed(*compressed.inner());

        assert_eq!(compressed.encoded_len(), 33);
        assert_eq!(uncompressed.encoded_len(), 65);
        assert_eq!(uncompressed.to_bytes().len(), 65);
        assert_ne!(compressed, uncompressed);
        assert_eq!(
            PublicKey::from_slice(&uncompressed.to_bytes()).unwrap(),
            uncompressed
        );
        assert!(PublicKey::from_slice(&[0x02; 20]).is_err());
    }

    #[test]
    fn test_public_key_serde_as_hex() {
        let kp = KeyPair::generate();
        let json = serde_json::to_string(&kp.public_key).unwrap();
        assert_eq!(json, format!("\"{}\"", kp.public_key_hex()));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kp.public_key);
    }
}
