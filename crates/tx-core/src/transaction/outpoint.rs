//! Transaction OutPoint
//!
//! A reference to a specific output of a previous transaction: the txid
//! in display order plus the output index.

use crate::codec::Writer;
use crate::transaction::{TransactionError, TransactionResult};
use serde::{Deserialize, Serialize};

/// Transaction output point
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Transaction ID (32 bytes, hex, display order)
    pub txid: String,

    /// Output index (vout)
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
        }
    }

    /// The txid as wire-order bytes (reversed from display order).
    pub fn txid_bytes(&self) -> TransactionResult<Vec<u8>> {
        let bytes =
            hex::decode(&self.txid).map_err(|e| TransactionError::InvalidTxid(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TransactionError::InvalidTxid(format!(
                "txid must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(bytes.into_iter().rev().collect())
    }

    /// Wire form: txid (32 bytes, little-endian) then vout (4 bytes LE).
    pub fn write(&self, writer: &mut Writer) -> TransactionResult<()> {
        writer.write_bytes(&self.txid_bytes()?);
        writer.write_u32_le(self.vout);
        Ok(())
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}
