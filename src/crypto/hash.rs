//! Hashing utilities
//!
//! SHA-256, double SHA-256 (sighash digests and txids), HASH160 for
//! pay-to-script-hash and Base58Check for addresses and WIF keys.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// RIPEMD160(SHA256(data)), the 20-byte hash used by script-hash outputs
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha256(data));
    ripemd.finalize().into()
}

/// Base58Check: payload followed by the first 4 bytes of its double SHA-256
pub fn base58check_encode(payload: &[u8]) -> String {
    let mut bytes = payload.to_vec();
    let checksum = double_sha256(payload);
    bytes.extend_from_slice(&checksum[..4]);
    bs58::encode(bytes).into_string()
}

/// Decode a Base58Check string, returning the payload without checksum.
///
/// Returns `None` when the string is not base58 or the checksum does not match.
pub fn base58check_decode(encoded: &str) -> Option<Vec<u8>> {
    let bytes = bs58::decode(encoded).into_vec().ok()?;
    if bytes.len() < 4 {
        return None;
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - 4);
    if double_sha256(payload)[..4] != *checksum {
        return None;
    }
    Some(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let hash = sha256(b"hello world");
        assert_eq!(hash.len(), 32);
        assert_eq!(
            hex::encode(hash),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_double_sha256() {
        // Well-known: double SHA-256 of the empty string
        assert_eq!(
            hex::encode(double_sha256(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_hash160() {
        assert_eq!(
            hex::encode(hash160(b"")),
            "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"
        );
    }

    #[test]
    fn test_base58check_roundtrip() {
        let payload = [0x05u8, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let encoded = base58check_encode(&payload);
        assert_eq!(base58check_decode(&encoded).unwrap(), payload.to_vec());

        // Corrupt one character
        let mut corrupted: Vec<char> = encoded.chars().collect();
        let last = corrupted.len() - 1;
        corrupted[last] = if corrupted[last] == '1' { '2' } else { '1' };
        let corrupted: String = corrupted.into_iter().collect();
        assert!(base58check_decode(&corrupted).is_none());
    }
}
