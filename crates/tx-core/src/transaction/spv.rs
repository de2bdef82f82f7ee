//! SPV verification
//!
//! Walks a transaction's ancestry. Mined ancestors are anchored by
//! checking their merkle path against the chain oracle; unmined
//! ancestors are verified recursively and every unmined transaction's
//! input scripts run through the interpreter under the configured
//! memory ceiling. Full mode additionally enforces the fee model on the
//! subject transaction.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use crate::chain::{ChainTracker, ChainTrackerError};
use crate::script::{Interpreter, Limits, ScriptError, SpendContext};
use crate::transaction::fee::{FeeModel, SatoshisPerKilobyte};
use crate::transaction::merkle_path::MerklePathError;
use crate::transaction::{Transaction, TransactionError};

/// How much to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Scripts and merkle anchoring.
    ScriptsOnly,
    /// Scripts, anchoring, and the fee model.
    Full,
}

/// SPV errors
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The walk reached an ancestor with neither merkle proof nor
    /// resolved parents.
    #[error("ancestry is unanchored at {0}")]
    UnanchoredChain(String),

    #[error("input {input_index} failed script validation: {error}")]
    BadScript {
        input_index: usize,
        error: ScriptError,
    },

    /// The oracle rejected a computed merkle root.
    #[error("merkle root rejected for height {height}")]
    BadMerkleRoot { height: u32 },

    #[error("fee {fee} below required {required}")]
    InsufficientFee { fee: u64, required: u64 },

    /// Transient oracle failure; the caller may retry.
    #[error("oracle unavailable: {0}")]
    Oracle(#[from] ChainTrackerError),

    #[error("{txid} has no output {vout}")]
    UnresolvedSource { txid: String, vout: u32 },

    #[error("merkle path error: {0}")]
    MerklePath(#[from] MerklePathError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

pub type VerifyResult<T> = Result<T, VerifyError>;

impl Transaction {
    /// Verify with the default memory ceiling and, in full mode, the
    /// default fee model.
    pub async fn verify(
        &self,
        chain_tracker: &dyn ChainTracker,
        mode: VerifyMode,
    ) -> VerifyResult<()> {
        self.verify_with(
            chain_tracker,
            mode,
            &SatoshisPerKilobyte::default(),
            Limits::default(),
        )
        .await
    }

    /// Verify with an explicit fee model and interpreter limits. The
    /// memory ceiling in `limits` is the guard against hostile scripts;
    /// keep it small for transactions received over the wire.
    pub async fn verify_with(
        &self,
        chain_tracker: &dyn ChainTracker,
        mode: VerifyMode,
        fee_model: &dyn FeeModel,
        limits: Limits,
    ) -> VerifyResult<()> {
        if mode == VerifyMode::Full && self.merkle_path.is_none() {
            let fee = self.get_fee()?;
            let required = fee_model.compute_fee(self).await?;
            if fee < required {
                return Err(VerifyError::InsufficientFee { fee, required });
            }
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: Vec<Arc<Transaction>> = Vec::new();

        self.verify_node(chain_tracker, &limits, &mut queue, &mut visited)
            .await?;
        while let Some(tx) = queue.pop() {
            tx.verify_node(chain_tracker, &limits, &mut queue, &mut visited)
                .await?;
        }
        Ok(())
    }

    /// Verify one transaction of the walk, queueing unmined ancestors.
    async fn verify_node(
        &self,
        chain_tracker: &dyn ChainTracker,
        limits: &Limits,
        queue: &mut Vec<Arc<Transaction>>,
        visited: &mut HashSet<String>,
    ) -> VerifyResult<()> {
        let txid = self.txid()?;
        if !visited.insert(txid.clone()) {
            return Ok(());
        }

        // a valid merkle path anchors this branch; nothing below it
        // needs to be examined
        if let Some(path) = &self.merkle_path {
            let root = path.compute_root(&txid)?;
            let valid = chain_tracker
                .is_valid_root_for_height(&root, path.block_height)
                .await?;
            if !valid {
                return Err(VerifyError::BadMerkleRoot {
                    height: path.block_height,
                });
            }
            return Ok(());
        }

        if self.inputs.is_empty() {
            return Err(VerifyError::UnanchoredChain(txid));
        }

        let interpreter = Interpreter::new(limits.clone());
        for (input_index, input) in self.inputs.iter().enumerate() {
            let source = input
                .source_transaction
                .as_ref()
                .ok_or_else(|| VerifyError::UnanchoredChain(txid.clone()))?;

            let source_output = input.source_output().ok_or_else(|| {
                VerifyError::UnresolvedSource {
                    txid: input.source_txid_hex().unwrap_or_default(),
                    vout: input.source_output_index,
                }
            })?;
            let source_satoshis =
                source_output
                    .satoshis
                    .ok_or_else(|| VerifyError::UnresolvedSource {
                        txid: input.source_txid_hex().unwrap_or_default(),
                        vout: input.source_output_index,
                    })?;

            let unlocking = input.unlocking_script.as_ref().ok_or(
                TransactionError::MissingUnlockingScript(input_index),
            )?;

            let ctx = SpendContext {
                tx: self,
                input_index,
                source_satoshis,
            };
            interpreter
                .evaluate(unlocking, &source_output.locking_script, Some(&ctx))
                .map_err(|error| VerifyError::BadScript { input_index, error })?;

            queue.push(source.clone());
        }
        Ok(())
    }
}
