//! Transaction Input
//!
//! An input spends a source output, named either by raw txid or through
//! a resolved ancestor transaction shared behind an `Arc`. The unlocking
//! script is either materialized or deferred behind a template that the
//! fee engine sizes and the sign loop invokes.

use std::sync::Arc;

use crate::codec::{var_int_size, Writer};
use crate::script::templates::UnlockingScriptTemplate;
use crate::script::Script;
use crate::transaction::{
    OutPoint, Transaction, TransactionError, TransactionOutput, TransactionResult,
};

/// Default sequence: finalized, no relative lock time.
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Transaction input
#[derive(Clone)]
pub struct TransactionInput {
    /// Source txid (hex, display order) when the ancestor is not held.
    pub source_txid: Option<String>,

    /// Resolved ancestor. Shared, not owned: several inputs (and BEEF
    /// entries) may reference the same transaction.
    pub source_transaction: Option<Arc<Transaction>>,

    /// Index into the source transaction's outputs.
    pub source_output_index: u32,

    /// Materialized unlocking script (scriptSig).
    pub unlocking_script: Option<Script>,

    /// Deferred signer and length estimator.
    pub unlocking_script_template: Option<Arc<dyn UnlockingScriptTemplate>>,

    /// Sequence number
    pub sequence: u32,
}

impl std::fmt::Debug for TransactionInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionInput")
            .field("source_txid", &self.source_txid)
            .field("source_output_index", &self.source_output_index)
            .field("unlocking_script", &self.unlocking_script)
            .field(
                "unlocking_script_template",
                &self.unlocking_script_template.as_ref().map(|_| ".."),
            )
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl TransactionInput {
    /// Input referencing an output by raw txid.
    pub fn from_outpoint(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            source_txid: Some(txid.into()),
            source_transaction: None,
            source_output_index: vout,
            unlocking_script: None,
            unlocking_script_template: None,
            sequence: SEQUENCE_FINAL,
        }
    }

    /// Input spending a resolved ancestor through a deferred template.
    pub fn from_source(
        source_transaction: Arc<Transaction>,
        vout: u32,
        template: Arc<dyn UnlockingScriptTemplate>,
    ) -> Self {
        Self {
            source_txid: None,
            source_transaction: Some(source_transaction),
            source_output_index: vout,
            unlocking_script: None,
            unlocking_script_template: Some(template),
            sequence: SEQUENCE_FINAL,
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// The source txid in display order, from either reference form.
    pub fn source_txid_hex(&self) -> TransactionResult<String> {
        if let Some(txid) = &self.source_txid {
            return Ok(txid.clone());
        }
        if let Some(source) = &self.source_transaction {
            return source.txid();
        }
        Err(TransactionError::InvalidTxid(
            "input has neither source txid nor source transaction".to_string(),
        ))
    }

    /// The outpoint this input spends.
    pub fn outpoint(&self) -> TransactionResult<OutPoint> {
        Ok(OutPoint::new(
            self.source_txid_hex()?,
            self.source_output_index,
        ))
    }

    /// The referenced source output, when the ancestor is resolved.
    pub fn source_output(&self) -> Option<&TransactionOutput> {
        self.source_transaction
            .as_ref()?
            .outputs
            .get(self.source_output_index as usize)
    }

    /// Satoshis of the referenced source output.
    pub fn source_satoshis(&self) -> Option<u64> {
        self.source_output().and_then(|o| o.satoshis)
    }

    /// Unlocking script length for fee estimation: the materialized
    /// script's size, or the template's worst-case estimate.
    pub fn estimated_unlocking_length(&self, index: usize) -> TransactionResult<usize> {
        if let Some(script) = &self.unlocking_script {
            return Ok(script.serialized_len());
        }
        if let Some(template) = &self.unlocking_script_template {
            return Ok(template.estimated_length());
        }
        Err(TransactionError::MissingUnlockingScript(index))
    }

    /// Wire form: outpoint, script length (varint), script, sequence.
    pub fn write(&self, writer: &mut Writer, index: usize) -> TransactionResult<()> {
        let script = self
            .unlocking_script
            .as_ref()
            .ok_or(TransactionError::MissingUnlockingScript(index))?
            .to_binary();
        self.outpoint()?.write(writer)?;
        writer.write_var_int(script.len() as u64);
        writer.write_bytes(&script);
        writer.write_u32_le(self.sequence);
        Ok(())
    }

    /// Serialized byte length, using the estimate for unsigned inputs.
    pub fn estimated_serialized_len(&self, index: usize) -> TransactionResult<usize> {
        let script_len = self.estimated_unlocking_length(index)?;
        Ok(36 + var_int_size(script_len as u64) + script_len + 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_defaults() {
        let input = TransactionInput::from_outpoint("ab".repeat(32), 1);
        assert_eq!(input.sequence, SEQUENCE_FINAL);
        assert!(input.unlocking_script.is_none());
        assert!(input.unlocking_script_template.is_none());
    }

    #[test]
    fn test_write_requires_script() {
        let input = TransactionInput::from_outpoint("ab".repeat(32), 0);
        let mut w = Writer::new();
        let err = input.write(&mut w, 2).unwrap_err();
        assert!(matches!(err, TransactionError::MissingUnlockingScript(2)));
    }

    #[test]
    fn test_write_wire_form() {
        let mut input = TransactionInput::from_outpoint("00".repeat(32), 0).with_sequence(0xFFFF_FFFE);
        input.unlocking_script = Some(Script::from_hex("51").unwrap());

        let mut w = Writer::new();
        input.write(&mut w, 0).unwrap();
        let bytes = w.into_bytes();

        assert_eq!(bytes.len(), 36 + 1 + 1 + 4);
        assert_eq!(bytes[36], 1); // script length
        assert_eq!(bytes[37], 0x51);
        assert_eq!(&bytes[38..], &[0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_estimated_len_uses_script_when_present() {
        let mut input = TransactionInput::from_outpoint("00".repeat(32), 0);
        input.unlocking_script = Some(Script::from_hex("5151").unwrap());
        assert_eq!(input.estimated_unlocking_length(0).unwrap(), 2);
        assert_eq!(input.estimated_serialized_len(0).unwrap(), 36 + 1 + 2 + 4);
    }
}
