//! ECDSA Signing
//!
//! Signature generation and verification over secp256k1. Signing produces
//! low-S DER; the sighash scope byte is appended by the caller's template,
//! not here, so these functions deal in pure DER.

use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};

/// Signing errors
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid message hash: {0}")]
    InvalidMessage(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Sign a 32-byte digest, returning the DER-encoded signature.
pub fn sign_ecdsa(digest: &[u8], private_key_bytes: &[u8]) -> Result<Vec<u8>, SigningError> {
    if digest.len() != 32 {
        return Err(SigningError::InvalidMessage(format!(
            "Digest must be 32 bytes, got {}",
            digest.len()
        )));
    }
    if private_key_bytes.len() != 32 {
        return Err(SigningError::InvalidPrivateKey(format!(
            "Private key must be 32 bytes, got {}",
            private_key_bytes.len()
        )));
    }

    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(private_key_bytes)
        .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))?;
    let message =
        Message::from_digest_slice(digest).map_err(|e| SigningError::InvalidMessage(e.to_string()))?;

    // rust-secp256k1 normalizes to low-S, as the network requires
    let signature = secp.sign_ecdsa(&message, &secret_key);

    Ok(signature.serialize_der().to_vec())
}

/// Verify a DER-encoded signature against a 32-byte digest and a
/// compressed public key.
pub fn verify_signature(
    digest: &[u8],
    der_signature: &[u8],
    public_key_bytes: &[u8],
) -> Result<bool, SigningError> {
    if digest.len() != 32 {
        return Err(SigningError::InvalidMessage(format!(
            "Digest must be 32 bytes, got {}",
            digest.len()
        )));
    }

    let secp = Secp256k1::verification_only();
    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
    let signature = Signature::from_der(der_signature)
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
    let message =
        Message::from_digest_slice(digest).map_err(|e| SigningError::InvalidMessage(e.to_string()))?;

    Ok(secp.verify_ecdsa(&message, &signature, &public_key).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::derive_public_key;

    #[test]
    fn test_sign_and_verify() {
        let private_key = [1u8; 32];
        let digest = [2u8; 32];

        let signature = sign_ecdsa(&digest, &private_key).unwrap();
        let public_key = derive_public_key(&private_key).unwrap();

        assert!(verify_signature(&digest, &signature, &public_key).unwrap());
    }

    #[test]
    fn test_verify_rejects_wrong_digest() {
        let private_key = [1u8; 32];
        let signature = sign_ecdsa(&[2u8; 32], &private_key).unwrap();
        let public_key = derive_public_key(&private_key).unwrap();

        assert!(!verify_signature(&[3u8; 32], &signature, &public_key).unwrap());
    }

    #[test]
    fn test_sign_invalid_lengths() {
        assert!(sign_ecdsa(&[2u8; 31], &[1u8; 32]).is_err());
        assert!(sign_ecdsa(&[2u8; 32], &[1u8; 31]).is_err());
    }

    #[test]
    fn test_verify_invalid_der() {
        let result = verify_signature(&[2u8; 32], &[0u8; 73], &[3u8; 33]);
        assert!(result.is_err());
    }

    #[test]
    fn test_signature_deterministic() {
        // RFC 6979 nonces: identical inputs produce identical signatures
        let private_key = [1u8; 32];
        let digest = [2u8; 32];
        assert_eq!(
            sign_ecdsa(&digest, &private_key).unwrap(),
            sign_ecdsa(&digest, &private_key).unwrap()
        );
    }
}
