//! Key Derivation
//!
//! Public key derivation from private keys using secp256k1.

use secp256k1::{PublicKey, Secp256k1, SecretKey};

/// Key derivation errors
#[derive(Debug, thiserror::Error)]
pub enum KeyDerivationError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
}

/// Derive the compressed public key for a private key.
///
/// Returns 33 bytes: 02/03 prefix plus the x coordinate.
pub fn derive_public_key(private_key_bytes: &[u8]) -> Result<Vec<u8>, KeyDerivationError> {
    if private_key_bytes.len() != 32 {
        return Err(KeyDerivationError::InvalidPrivateKey(format!(
            "Private key must be 32 bytes, got {}",
            private_key_bytes.len()
        )));
    }

    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(private_key_bytes)
        .map_err(|e| KeyDerivationError::InvalidPrivateKey(e.to_string()))?;
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);

    Ok(public_key.serialize().to_vec())
}
