//! Script templates
//!
//! A template pairs a locking-script builder with a deferred unlocking
//! capability. The unlocker is handed to an input as a boxed object with
//! two methods: a worst-case length estimate the fee engine uses before
//! signatures exist, and the signer the sign loop invokes.

pub mod p2pkh;

pub use p2pkh::P2pkh;

use crate::script::Script;
use crate::transaction::Transaction;
use async_trait::async_trait;
use thiserror::Error;

/// Template errors
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("input {0} is missing its source output")]
    MissingSource(usize),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Deferred unlocking-script builder attached to an input.
#[async_trait]
pub trait UnlockingScriptTemplate: Send + Sync {
    /// Produce the unlocking script for `input_index` of `tx`.
    async fn sign(&self, tx: &Transaction, input_index: usize) -> Result<Script, TemplateError>;

    /// Worst-case byte length of the script `sign` will produce, used
    /// for fee estimation before the signature exists.
    fn estimated_length(&self) -> usize;
}
