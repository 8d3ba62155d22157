//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256, HASH160 and Base58Check
//! - secp256k1 keys and DER ECDSA signatures

pub mod hash;
pub mod keys;

pub use hash::{base58check_decode, base58check_encode, double_sha256, hash160, sha256};
pub use keys::{
    parse_der, sign_der, verify_der, KeyError, KeyPair, PublicKey, COMPRESSED_PUBLIC_KEY_SIZE,
    UNCOMPRESSED_PUBLIC_KEY_SIZE,
};
