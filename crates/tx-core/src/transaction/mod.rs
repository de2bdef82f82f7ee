//! Transaction engine
//!
//! The transaction data model with legacy and Extended Format wire
//! codecs, the BIP-143 signature-hash preimage, BRC-74 Merkle paths, the
//! BEEF container, the fee/change solver, and SPV verification.

pub mod beef;
pub mod fee;
pub mod merkle_path;
pub mod outpoint;
pub mod sighash;
pub mod spv;
#[allow(clippy::module_inception)]
pub mod transaction;
pub mod tx_input;
pub mod tx_output;

pub use fee::{ChangeDistribution, FeeModel, FixedFee, SatoshisPerKilobyte};
pub use merkle_path::{MerklePath, PathLeaf};
pub use outpoint::OutPoint;
pub use sighash::{SighashScope, SighashType};
pub use transaction::{ScriptOffsets, ScriptSlice, Transaction};
pub use tx_input::TransactionInput;
pub use tx_output::TransactionOutput;

use crate::codec::CodecError;
use crate::script::templates::TemplateError;
use crate::script::ScriptError;
use sighash::SighashError;

/// Transaction error types
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    #[error("sighash error: {0}")]
    Sighash(#[from] SighashError),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// An input references a source output this transaction cannot see
    /// (no resolved source transaction, or the index is out of range).
    #[error("unresolved source for input {0}")]
    UnresolvedSource(usize),

    #[error("insufficient funds: {needed} satoshis needed, {available} available")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("fee solver did not converge after dropping empty change outputs")]
    FeeSolverDidNotConverge,

    /// `sign` was called while an output still has undefined satoshis.
    #[error("sign before fee: output {0} has no satoshi value")]
    SignBeforeFee(usize),

    #[error("input {0} has no source transaction to sign against")]
    SigningMissingSource(usize),

    #[error("input {0} has no unlocking script or template")]
    MissingUnlockingScript(usize),

    #[error("input {0} carries both an unlocking script and a template")]
    AmbiguousUnlocking(usize),

    #[error("invalid txid: {0}")]
    InvalidTxid(String),
}

pub type TransactionResult<T> = Result<T, TransactionError>;
