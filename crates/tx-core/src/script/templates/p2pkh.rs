//! Pay-to-public-key-hash template
//!
//! The standard 25-byte locking script and its `<sig> <pubkey>`
//! unlocking counterpart.

use async_trait::async_trait;

use super::{TemplateError, UnlockingScriptTemplate};
use crate::crypto;
use crate::script::{op, Script};
use crate::transaction::sighash::{self, SighashScope, SighashType};
use crate::transaction::Transaction;

/// Worst case for `<sig> <pubkey>`: 1 + 72 (DER bound + scope byte) +
/// 1 + 34 covers every signature length the signer can produce.
const UNLOCK_ESTIMATE: usize = 108;

/// P2PKH lock/unlock builder.
pub struct P2pkh;

impl P2pkh {
    /// Locking script for a 20-byte public key hash:
    /// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`.
    pub fn lock(pub_key_hash: &[u8]) -> Result<Script, TemplateError> {
        if pub_key_hash.len() != 20 {
            return Err(TemplateError::InvalidKey(format!(
                "public key hash must be 20 bytes, got {}",
                pub_key_hash.len()
            )));
        }
        let mut script = Script::new();
        script
            .write_op(op::OP_DUP)
            .write_op(op::OP_HASH160)
            .write_push(pub_key_hash.to_vec())
            .write_op(op::OP_EQUALVERIFY)
            .write_op(op::OP_CHECKSIG);
        Ok(script)
    }

    /// Locking script for a compressed public key (hashed internally).
    pub fn lock_from_public_key(public_key: &[u8]) -> Result<Script, TemplateError> {
        Self::lock(&crypto::hash160(public_key))
    }

    /// Unlocker signing with SIGHASH ALL.
    pub fn unlock(private_key: [u8; 32]) -> P2pkhUnlocker {
        Self::unlock_with_scope(private_key, SighashScope::All, false)
    }

    /// Unlocker with an explicit scope and ANYONECANPAY flag.
    pub fn unlock_with_scope(
        private_key: [u8; 32],
        scope: SighashScope,
        anyone_can_pay: bool,
    ) -> P2pkhUnlocker {
        P2pkhUnlocker {
            private_key,
            sighash_type: SighashType::new(scope, anyone_can_pay),
        }
    }
}

/// Deferred P2PKH signer.
pub struct P2pkhUnlocker {
    private_key: [u8; 32],
    sighash_type: SighashType,
}

#[async_trait]
impl UnlockingScriptTemplate for P2pkhUnlocker {
    async fn sign(&self, tx: &Transaction, input_index: usize) -> Result<Script, TemplateError> {
        let input = tx
            .inputs
            .get(input_index)
            .ok_or(TemplateError::MissingSource(input_index))?;
        let source_output = input
            .source_output()
            .ok_or(TemplateError::MissingSource(input_index))?;
        let source_satoshis = source_output
            .satoshis
            .ok_or(TemplateError::MissingSource(input_index))?;

        let preimage = sighash::preimage(
            tx,
            input_index,
            &source_output.locking_script,
            source_satoshis,
            self.sighash_type,
        )
        .map_err(|e| TemplateError::Signing(e.to_string()))?;
        let digest = crypto::sha256d(&preimage);

        let mut signature = crypto::sign_ecdsa(&digest, &self.private_key)
            .map_err(|e| TemplateError::Signing(e.to_string()))?;
        signature.push(self.sighash_type.to_byte());

        let public_key = crypto::derive_public_key(&self.private_key)
            .map_err(|e| TemplateError::InvalidKey(e.to_string()))?;

        let mut script = Script::new();
        script.write_push(signature).write_push(public_key);
        Ok(script)
    }

    fn estimated_length(&self) -> usize {
        UNLOCK_ESTIMATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Interpreter, Limits, SpendContext};
    use crate::transaction::{TransactionInput, TransactionOutput};
    use std::sync::Arc;

    fn key() -> [u8; 32] {
        let mut k = [0u8; 32];
        k[31] = 1;
        k
    }

    #[test]
    fn test_lock_layout() {
        let script = P2pkh::lock(&[0x11; 20]).unwrap();
        let bytes = script.to_binary();
        assert_eq!(bytes.len(), 25);
        assert_eq!(bytes[0], op::OP_DUP);
        assert_eq!(bytes[1], op::OP_HASH160);
        assert_eq!(bytes[2], 20);
        assert_eq!(bytes[23], op::OP_EQUALVERIFY);
        assert_eq!(bytes[24], op::OP_CHECKSIG);
    }

    #[test]
    fn test_lock_rejects_bad_hash_length() {
        assert!(P2pkh::lock(&[0u8; 19]).is_err());
        assert!(P2pkh::lock(&[0u8; 21]).is_err());
    }

    #[test]
    fn test_estimated_length() {
        assert_eq!(P2pkh::unlock(key()).estimated_length(), 108);
    }

    #[tokio::test]
    async fn test_sign_produces_two_pushes_that_unlock() {
        let private_key = key();
        let public_key = crypto::derive_public_key(&private_key).unwrap();
        let locking = P2pkh::lock_from_public_key(&public_key).unwrap();

        let mut source = Transaction::new();
        source.add_output(TransactionOutput::new(5000, locking.clone()));
        let source = Arc::new(source);

        let mut tx = Transaction::new();
        tx.add_input(TransactionInput::from_source(
            source,
            0,
            Arc::new(P2pkh::unlock(private_key)),
        ));
        tx.add_output(TransactionOutput::new(4000, locking.clone()));

        let unlocking = P2pkh::unlock(private_key).sign(&tx, 0).await.unwrap();
        assert_eq!(unlocking.chunks.len(), 2);
        assert!(unlocking.is_push_only());

        let ctx = SpendContext {
            tx: &tx,
            input_index: 0,
            source_satoshis: 5000,
        };
        let result = Interpreter::new(Limits::default()).evaluate(&unlocking, &locking, Some(&ctx));
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn test_sign_rejects_unresolved_source() {
        let mut tx = Transaction::new();
        tx.add_input(TransactionInput::from_outpoint("00".repeat(32), 0));
        let err = P2pkh::unlock(key()).sign(&tx, 0).await.unwrap_err();
        assert!(matches!(err, TemplateError::MissingSource(0)));
    }
}
