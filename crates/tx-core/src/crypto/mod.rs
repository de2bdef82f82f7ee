//! Cryptographic oracle
//!
//! Hash primitives and ECDSA operations consumed by the transaction engine.
//! Everything here wraps the RustCrypto / secp256k1 crates; the rest of the
//! crate calls these functions rather than the crates directly.

pub mod keys;
pub mod signing;

pub use keys::derive_public_key;
pub use signing::{sign_ecdsa, verify_signature, SigningError};

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// SHA-256 hash
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Double SHA-256 (txids, merkle nodes, sighash digests)
pub fn sha256d(data: &[u8]) -> Vec<u8> {
    let first = Sha256::digest(data);
    Sha256::digest(first).to_vec()
}

/// RIPEMD-160 hash
pub fn ripemd160(data: &[u8]) -> Vec<u8> {
    Ripemd160::digest(data).to_vec()
}

/// RIPEMD-160 of SHA-256 (address hashing)
pub fn hash160(data: &[u8]) -> Vec<u8> {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).to_vec()
}

/// SHA-1 hash (legacy script opcode support only)
pub fn sha1(data: &[u8]) -> Vec<u8> {
    use sha1::Sha1;
    Sha1::digest(data).to_vec()
}

/// HMAC-SHA256
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    use hmac::{Hmac, Mac};
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Constant-time HMAC-SHA256 verification
pub fn verify_hmac_sha256(key: &[u8], data: &[u8], expected: &[u8]) -> bool {
    let computed = hmac_sha256(key, data);
    if computed.len() != expected.len() {
        return false;
    }
    computed
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let hash = sha256(b"hello world");
        let expected =
            hex::decode("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
                .unwrap();
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_sha256d_differs_from_single() {
        let data = b"hello world";
        assert_ne!(sha256d(data), sha256(data));
        assert_eq!(sha256d(data), sha256(&sha256(data)));
    }

    #[test]
    fn test_hash160_length() {
        assert_eq!(hash160(b"test").len(), 20);
        assert_eq!(ripemd160(b"test").len(), 20);
    }

    #[test]
    fn test_hmac_round_trip() {
        let key = b"secret_key";
        let mac = hmac_sha256(key, b"message");
        assert_eq!(mac.len(), 32);
        assert!(verify_hmac_sha256(key, b"message", &mac));
        assert!(!verify_hmac_sha256(key, b"other", &mac));
        assert!(!verify_hmac_sha256(b"wrong", b"message", &mac));
    }
}
