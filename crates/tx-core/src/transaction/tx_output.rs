//! Transaction Output
//!
//! An output pairs a satoshi amount with a locking script. Change
//! placeholders carry no amount until the fee solver assigns one.

use crate::codec::{var_int_size, Writer};
use crate::script::Script;
use crate::transaction::{TransactionError, TransactionResult};
use serde::{Deserialize, Serialize};

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Value in satoshis. `None` marks a change placeholder the fee
    /// solver resolves; serialization requires every amount defined.
    pub satoshis: Option<u64>,

    /// Locking script (scriptPubKey)
    #[serde(rename = "lockingScript")]
    pub locking_script: Script,

    /// Marks outputs created as change destinations.
    pub change: bool,
}

impl TransactionOutput {
    pub fn new(satoshis: u64, locking_script: Script) -> Self {
        Self {
            satoshis: Some(satoshis),
            locking_script,
            change: false,
        }
    }

    /// A change placeholder: the amount stays undefined until `fee`.
    pub fn change(locking_script: Script) -> Self {
        Self {
            satoshis: None,
            locking_script,
            change: true,
        }
    }

    /// Wire form: value (8 bytes LE), script length (varint), script.
    pub fn write(&self, writer: &mut Writer, index: usize) -> TransactionResult<()> {
        let satoshis = self
            .satoshis
            .ok_or(TransactionError::SignBeforeFee(index))?;
        let script = self.locking_script.to_binary();
        writer.write_u64_le(satoshis);
        writer.write_var_int(script.len() as u64);
        writer.write_bytes(&script);
        Ok(())
    }

    /// Serialized byte length.
    pub fn serialized_len(&self) -> usize {
        let script_len = self.locking_script.serialized_len();
        8 + var_int_size(script_len as u64) + script_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_wire_form() {
        let script = Script::from_hex("76a9").unwrap();
        let output = TransactionOutput::new(50_000, script);

        let mut w = Writer::new();
        output.write(&mut w, 0).unwrap();
        let bytes = w.into_bytes();

        assert_eq!(bytes.len(), output.serialized_len());
        assert_eq!(u64::from_le_bytes(bytes[..8].try_into().unwrap()), 50_000);
        assert_eq!(bytes[8], 2); // script length varint
        assert_eq!(&bytes[9..], &[0x76, 0xa9]);
    }

    #[test]
    fn test_change_placeholder_refuses_serialization() {
        let output = TransactionOutput::change(Script::new());
        let mut w = Writer::new();
        let err = output.write(&mut w, 3).unwrap_err();
        assert!(matches!(err, TransactionError::SignBeforeFee(3)));
    }
}
