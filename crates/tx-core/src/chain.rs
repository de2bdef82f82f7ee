//! Chain tracker capability
//!
//! The minimal oracle the engine trusts about the chain: the present
//! height, and whether a merkle root is the one a given block commits
//! to. A `true` answer is a trust assertion; failures are transient and
//! retryable by the caller, never by the engine.

use async_trait::async_trait;
use thiserror::Error;

/// Chain tracker errors
#[derive(Debug, Clone, Error)]
pub enum ChainTrackerError {
    /// Transient: the oracle could not be reached or did not answer.
    #[error("chain tracker unavailable: {0}")]
    Unavailable(String),

    #[error("invalid chain tracker response: {0}")]
    InvalidResponse(String),
}

pub type ChainTrackerResult<T> = Result<T, ChainTrackerError>;

/// Block-header oracle.
#[async_trait]
pub trait ChainTracker: Send + Sync {
    /// Current chain height.
    async fn current_height(&self) -> ChainTrackerResult<u32>;

    /// Whether `root` (hex, display order) is the merkle root of the
    /// block at `height`.
    async fn is_valid_root_for_height(&self, root: &str, height: u32) -> ChainTrackerResult<bool>;
}
