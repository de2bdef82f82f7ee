//! Transaction
//!
//! The transaction structure with legacy and Extended Format wire
//! codecs, txid computation, and the fee/sign lifecycle: a transaction
//! is built mutable, sealed by `fee` (which resolves change amounts) and
//! `sign` (which materializes unlocking scripts), then serialized or
//! broadcast.

use std::sync::Arc;

use crate::broadcaster::{BroadcastResult, Broadcaster};
use crate::codec::{var_int_size, Reader, Writer};
use crate::crypto;
use crate::script::Script;
use crate::transaction::fee::{self, ChangeDistribution, FeeModel};
use crate::transaction::merkle_path::MerklePath;
use crate::transaction::{
    TransactionError, TransactionInput, TransactionOutput, TransactionResult,
};

/// Marker bytes that follow the version field in Extended Format.
const EF_MARKER: [u8; 6] = [0x00, 0x00, 0x00, 0x00, 0x00, 0xEF];

/// Bitcoin transaction
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Transaction version (typically 1 or 2)
    pub version: u32,

    pub inputs: Vec<TransactionInput>,

    pub outputs: Vec<TransactionOutput>,

    /// Lock time (0 = no timelock)
    pub lock_time: u32,

    /// Inclusion proof, present once the transaction is mined.
    pub merkle_path: Option<MerklePath>,
}

/// Location of one script inside a serialized transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSlice {
    pub offset: usize,
    pub length: usize,
}

/// Script locations for every input and output, produced without
/// copying any script bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOffsets {
    pub inputs: Vec<ScriptSlice>,
    pub outputs: Vec<ScriptSlice>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            merkle_path: None,
        }
    }

    pub fn add_input(&mut self, input: TransactionInput) -> &mut Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output(&mut self, output: TransactionOutput) -> &mut Self {
        self.outputs.push(output);
        self
    }

    /// Legacy wire form. Requires every unlocking script materialized
    /// and every output amount resolved.
    pub fn to_binary(&self) -> TransactionResult<Vec<u8>> {
        let mut w = Writer::new();
        w.write_u32_le(self.version);
        w.write_var_int(self.inputs.len() as u64);
        for (i, input) in self.inputs.iter().enumerate() {
            input.write(&mut w, i)?;
        }
        w.write_var_int(self.outputs.len() as u64);
        for (i, output) in self.outputs.iter().enumerate() {
            output.write(&mut w, i)?;
        }
        w.write_u32_le(self.lock_time);
        Ok(w.into_bytes())
    }

    pub fn to_hex(&self) -> TransactionResult<String> {
        Ok(hex::encode(self.to_binary()?))
    }

    /// Extended Format: the legacy layout with the `0000000000EF` marker
    /// after the version and each input's source amount and locking
    /// script appended, sufficient for stateless validation.
    pub fn to_ef(&self) -> TransactionResult<Vec<u8>> {
        let mut w = Writer::new();
        w.write_u32_le(self.version);
        w.write_bytes(&EF_MARKER);
        w.write_var_int(self.inputs.len() as u64);
        for (i, input) in self.inputs.iter().enumerate() {
            let source_output = input
                .source_output()
                .ok_or(TransactionError::SigningMissingSource(i))?;
            let source_satoshis = source_output
                .satoshis
                .ok_or(TransactionError::SigningMissingSource(i))?;
            let locking = source_output.locking_script.to_binary();

            input.write(&mut w, i)?;
            w.write_u64_le(source_satoshis);
            w.write_var_int(locking.len() as u64);
            w.write_bytes(&locking);
        }
        w.write_var_int(self.outputs.len() as u64);
        for (i, output) in self.outputs.iter().enumerate() {
            output.write(&mut w, i)?;
        }
        w.write_u32_le(self.lock_time);
        Ok(w.into_bytes())
    }

    /// Parse either wire form; the EF marker after the version selects
    /// Extended Format, which also fills in per-input source data.
    pub fn from_binary(bytes: &[u8]) -> TransactionResult<Self> {
        let mut reader = Reader::new(bytes);
        let tx = Self::read(&mut reader)?;
        Ok(tx)
    }

    /// Parse one transaction from a reader (BEEF entries parse inline).
    pub fn read(reader: &mut Reader<'_>) -> TransactionResult<Self> {
        let version = reader.read_u32_le()?;

        let mut probe = reader.clone();
        let extended = probe.remaining() >= EF_MARKER.len()
            && probe.read_bytes(EF_MARKER.len())? == EF_MARKER;
        if extended {
            *reader = probe;
        }

        let n_inputs = reader.read_var_int()? as usize;
        let mut inputs = Vec::with_capacity(n_inputs);
        for _ in 0..n_inputs {
            let txid = hex::encode(reader.read_reverse(32)?);
            let vout = reader.read_u32_le()?;
            let script_len = reader.read_var_int()? as usize;
            let script = Script::from_binary(reader.read_bytes(script_len)?)?;
            let sequence = reader.read_u32_le()?;

            let mut input = TransactionInput::from_outpoint(txid, vout).with_sequence(sequence);
            input.unlocking_script = Some(script);

            if extended {
                let source_satoshis = reader.read_u64_le()?;
                let locking_len = reader.read_var_int()? as usize;
                let locking = Script::from_binary(reader.read_bytes(locking_len)?)?;
                input.source_transaction =
                    Some(Arc::new(stub_source(vout, source_satoshis, locking)));
            }
            inputs.push(input);
        }

        let n_outputs = reader.read_var_int()? as usize;
        let mut outputs = Vec::with_capacity(n_outputs);
        for _ in 0..n_outputs {
            let satoshis = reader.read_u64_le()?;
            let script_len = reader.read_var_int()? as usize;
            let script = Script::from_binary(reader.read_bytes(script_len)?)?;
            outputs.push(TransactionOutput::new(satoshis, script));
        }

        let lock_time = reader.read_u32_le()?;

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
            merkle_path: None,
        })
    }

    pub fn from_hex(hex_str: &str) -> TransactionResult<Self> {
        let bytes =
            hex::decode(hex_str).map_err(|e| TransactionError::InvalidTxid(e.to_string()))?;
        Self::from_binary(&bytes)
    }

    /// Double SHA-256 of the legacy serialization, wire order.
    pub fn hash(&self) -> TransactionResult<Vec<u8>> {
        Ok(crypto::sha256d(&self.to_binary()?))
    }

    /// Transaction ID: the hash reversed into display order, hex.
    pub fn txid(&self) -> TransactionResult<String> {
        let mut hash = self.hash()?;
        hash.reverse();
        Ok(hex::encode(hash))
    }

    /// Locate every script in a serialized transaction without copying.
    pub fn parse_script_offsets(bytes: &[u8]) -> TransactionResult<ScriptOffsets> {
        let mut reader = Reader::new(bytes);
        reader.read_u32_le()?; // version

        let n_inputs = reader.read_var_int()? as usize;
        let mut inputs = Vec::with_capacity(n_inputs);
        for _ in 0..n_inputs {
            reader.read_bytes(36)?;
            let length = reader.read_var_int()? as usize;
            inputs.push(ScriptSlice {
                offset: reader.position(),
                length,
            });
            reader.read_bytes(length)?;
            reader.read_u32_le()?; // sequence
        }

        let n_outputs = reader.read_var_int()? as usize;
        let mut outputs = Vec::with_capacity(n_outputs);
        for _ in 0..n_outputs {
            reader.read_u64_le()?;
            let length = reader.read_var_int()? as usize;
            outputs.push(ScriptSlice {
                offset: reader.position(),
                length,
            });
            reader.read_bytes(length)?;
        }

        Ok(ScriptOffsets { inputs, outputs })
    }

    /// Serialized size with worst-case estimates for unsigned inputs.
    pub fn estimated_size(&self) -> TransactionResult<usize> {
        let mut size = 4 + var_int_size(self.inputs.len() as u64);
        for (i, input) in self.inputs.iter().enumerate() {
            size += input.estimated_serialized_len(i)?;
        }
        size += var_int_size(self.outputs.len() as u64);
        for output in &self.outputs {
            size += output.serialized_len();
        }
        size += 4;
        Ok(size)
    }

    /// Sum of resolved source satoshis across inputs.
    pub fn total_input_satoshis(&self) -> Option<u64> {
        self.inputs.iter().map(|i| i.source_satoshis()).sum()
    }

    /// Sum of resolved output satoshis.
    pub fn total_output_satoshis(&self) -> Option<u64> {
        self.outputs.iter().map(|o| o.satoshis).sum()
    }

    /// The fee this transaction pays, once inputs and outputs resolve.
    pub fn get_fee(&self) -> TransactionResult<u64> {
        let total_in = self
            .total_input_satoshis()
            .ok_or(TransactionError::UnresolvedSource(0))?;
        let total_out = self.total_output_satoshis().unwrap_or(0);
        total_in
            .checked_sub(total_out)
            .ok_or(TransactionError::InsufficientFunds {
                needed: total_out,
                available: total_in,
            })
    }

    /// Resolve change outputs against `model`, distributing the
    /// remainder per `distribution`. Idempotent once solved.
    pub async fn fee(
        &mut self,
        model: &dyn FeeModel,
        distribution: ChangeDistribution,
    ) -> TransactionResult<()> {
        fee::solve(self, model, distribution).await
    }

    /// Materialize every deferred unlocking script, in input order.
    /// Requires output amounts resolved first.
    pub async fn sign(&mut self) -> TransactionResult<()> {
        if let Some(unresolved) = self.outputs.iter().position(|o| o.satoshis.is_none()) {
            return Err(TransactionError::SignBeforeFee(unresolved));
        }
        for (i, input) in self.inputs.iter().enumerate() {
            if input.unlocking_script.is_none() && input.unlocking_script_template.is_none() {
                return Err(TransactionError::MissingUnlockingScript(i));
            }
        }

        let mut signed: Vec<(usize, Script)> = Vec::new();
        for (i, input) in self.inputs.iter().enumerate() {
            if let Some(template) = &input.unlocking_script_template {
                let script = template.sign(self, i).await?;
                signed.push((i, script));
            }
        }
        for (i, script) in signed {
            let input = &mut self.inputs[i];
            input.unlocking_script = Some(script);
            input.unlocking_script_template = None;
        }
        Ok(())
    }

    /// Hand the signed transaction to a broadcaster.
    pub async fn broadcast(&self, broadcaster: &dyn Broadcaster) -> BroadcastResult {
        broadcaster.broadcast(self).await
    }
}

/// Minimal ancestor stub for Extended Format parsing: only the
/// referenced output slot is real. Its txid is not meaningful; EF
/// inputs keep the outpoint txid authoritative.
fn stub_source(vout: u32, satoshis: u64, locking_script: Script) -> Transaction {
    let mut source = Transaction::new();
    for _ in 0..vout {
        source.add_output(TransactionOutput::new(0, Script::new()));
    }
    source.add_output(TransactionOutput::new(satoshis, locking_script));
    source
}
