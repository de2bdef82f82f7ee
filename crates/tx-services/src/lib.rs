//! Default service implementations
//!
//! HTTP-backed implementations of the engine's capability traits: an
//! ARC broadcaster and a Chaintracks chain tracker. All network I/O in
//! the workspace lives here.

pub mod broadcaster;
pub mod chaintracker;
pub mod error;

pub use broadcaster::{ArcBroadcaster, ArcConfig};
pub use chaintracker::ChaintracksClient;
pub use error::{ServiceError, ServiceResult};

/// Well-known public ARC endpoint used when the caller does not supply
/// a broadcaster of their own.
pub const DEFAULT_ARC_URL: &str = "https://arc.taal.com";

/// Broadcaster pointed at the default service.
pub fn default_broadcaster() -> ArcBroadcaster {
    ArcBroadcaster::new(DEFAULT_ARC_URL.to_string(), None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_broadcaster_builds() {
        let _ = default_broadcaster();
        assert!(DEFAULT_ARC_URL.starts_with("https://"));
    }
}
