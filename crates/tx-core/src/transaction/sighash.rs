//! Signature hash
//!
//! The scope byte appended to every signature and the preimage it
//! commits to. The preimage layout follows the BIP-143 derivation with
//! the mandatory FORKID bit, hashing source amounts and outpoints so a
//! signer never needs the full ancestor chain.

use crate::codec::Writer;
use crate::crypto;
use crate::script::{Script, ScriptError, ScriptErrorKind, ScriptResult};
use crate::transaction::Transaction;
use thiserror::Error;

pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
pub const SIGHASH_FORKID: u8 = 0x40;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Which outputs a signature commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SighashScope {
    /// Commit to every output.
    All,
    /// Commit to no outputs.
    None,
    /// Commit to the output at the signing input's index only.
    Single,
}

/// A validated sighash scope byte: base scope, ANYONECANPAY flag, and
/// the always-required FORKID bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SighashType {
    pub scope: SighashScope,
    pub anyone_can_pay: bool,
}

impl Default for SighashType {
    fn default() -> Self {
        Self {
            scope: SighashScope::All,
            anyone_can_pay: false,
        }
    }
}

impl SighashType {
    pub fn new(scope: SighashScope, anyone_can_pay: bool) -> Self {
        Self {
            scope,
            anyone_can_pay,
        }
    }

    /// Parse a scope byte. FORKID must be set; any bit outside the
    /// recognized set fails.
    pub fn from_byte(byte: u8) -> ScriptResult<Self> {
        let invalid = |reason: String| {
            ScriptError::new(ScriptErrorKind::InvalidSighashFlag, None, reason)
        };

        if byte & SIGHASH_FORKID == 0 {
            return Err(invalid(format!("scope byte 0x{byte:02x} lacks FORKID")));
        }
        let anyone_can_pay = byte & SIGHASH_ANYONECANPAY != 0;
        let base = byte & !(SIGHASH_FORKID | SIGHASH_ANYONECANPAY);
        let scope = match base {
            SIGHASH_ALL => SighashScope::All,
            SIGHASH_NONE => SighashScope::None,
            SIGHASH_SINGLE => SighashScope::Single,
            _ => {
                return Err(invalid(format!(
                    "scope byte 0x{byte:02x} has unrecognized bits"
                )))
            }
        };
        Ok(Self {
            scope,
            anyone_can_pay,
        })
    }

    pub fn to_byte(self) -> u8 {
        let base = match self.scope {
            SighashScope::All => SIGHASH_ALL,
            SighashScope::None => SIGHASH_NONE,
            SighashScope::Single => SIGHASH_SINGLE,
        };
        let acp = if self.anyone_can_pay {
            SIGHASH_ANYONECANPAY
        } else {
            0
        };
        base | SIGHASH_FORKID | acp
    }
}

/// Sighash errors
#[derive(Debug, Error)]
pub enum SighashError {
    #[error("input index {index} out of range ({len} inputs)")]
    InputIndexOutOfRange { index: usize, len: usize },

    #[error("input {0} has no resolvable source outpoint")]
    MissingSourceOutpoint(usize),

    #[error("output {0} has undefined satoshis")]
    UnresolvedOutputSatoshis(usize),
}

const ZERO32: [u8; 32] = [0u8; 32];

/// Build the signature preimage for one input.
///
/// `subscript` is the locking-script tail chosen by the interpreter
/// (code-separator rule applied, signature pushes removed); callers
/// signing fresh inputs pass the source locking script unchanged.
pub fn preimage(
    tx: &Transaction,
    input_index: usize,
    subscript: &Script,
    source_satoshis: u64,
    sighash_type: SighashType,
) -> Result<Vec<u8>, SighashError> {
    let input = tx
        .inputs
        .get(input_index)
        .ok_or(SighashError::InputIndexOutOfRange {
            index: input_index,
            len: tx.inputs.len(),
        })?;

    let hash_prevouts = if sighash_type.anyone_can_pay {
        ZERO32.to_vec()
    } else {
        let mut w = Writer::new();
        for (i, inp) in tx.inputs.iter().enumerate() {
            let outpoint = inp
                .outpoint()
                .map_err(|_| SighashError::MissingSourceOutpoint(i))?;
            outpoint
                .write(&mut w)
                .map_err(|_| SighashError::MissingSourceOutpoint(i))?;
        }
        crypto::sha256d(w.as_bytes())
    };

    let hash_sequence =
        if sighash_type.anyone_can_pay || sighash_type.scope != SighashScope::All {
            ZERO32.to_vec()
        } else {
            let mut w = Writer::new();
            for inp in &tx.inputs {
                w.write_u32_le(inp.sequence);
            }
            crypto::sha256d(w.as_bytes())
        };

    let hash_outputs = match sighash_type.scope {
        SighashScope::All => {
            let mut w = Writer::new();
            for (i, out) in tx.outputs.iter().enumerate() {
                out.write(&mut w, i)
                    .map_err(|_| SighashError::UnresolvedOutputSatoshis(i))?;
            }
            crypto::sha256d(w.as_bytes())
        }
        SighashScope::Single if input_index < tx.outputs.len() => {
            let mut w = Writer::new();
            tx.outputs[input_index]
                .write(&mut w, input_index)
                .map_err(|_| SighashError::UnresolvedOutputSatoshis(input_index))?;
            crypto::sha256d(w.as_bytes())
        }
        // SINGLE past the last output commits to nothing
        _ => ZERO32.to_vec(),
    };

    let subscript_bytes = subscript.to_binary();

    let mut w = Writer::new();
    w.write_u32_le(tx.version);
    w.write_bytes(&hash_prevouts);
    w.write_bytes(&hash_sequence);
    input
        .outpoint()
        .map_err(|_| SighashError::MissingSourceOutpoint(input_index))?
        .write(&mut w)
        .map_err(|_| SighashError::MissingSourceOutpoint(input_index))?;
    w.write_var_int(subscript_bytes.len() as u64);
    w.write_bytes(&subscript_bytes);
    w.write_u64_le(source_satoshis);
    w.write_u32_le(input.sequence);
    w.write_bytes(&hash_outputs);
    w.write_u32_le(tx.lock_time);
    w.write_u32_le(sighash_type.to_byte() as u32);

    Ok(w.into_bytes())
}
