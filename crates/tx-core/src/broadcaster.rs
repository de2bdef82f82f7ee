//! Broadcaster capability
//!
//! Transport for signed transactions. Implementations live outside the
//! engine; the default HTTP broadcaster ships in the services crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

/// Deterministic rejection categories a broadcaster maps service
/// responses onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastFailureCode {
    RejectedByNetwork,
    DoubleSpend,
    InvalidTransaction,
    ServiceUnavailable,
    Unknown,
}

/// Accepted broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub txid: String,
    pub message: String,
}

/// Rejected broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("broadcast failed ({code:?}): {description}")]
pub struct BroadcastFailure {
    pub code: BroadcastFailureCode,
    pub description: String,
}

pub type BroadcastResult = Result<BroadcastResponse, BroadcastFailure>;

/// Pluggable transaction transport.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, tx: &Transaction) -> BroadcastResult;
}
