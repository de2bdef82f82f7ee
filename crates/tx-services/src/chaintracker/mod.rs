//! Chain tracker implementations

pub mod chaintracks;
pub mod types;

pub use chaintracks::ChaintracksClient;
pub use types::{BlockHeader, FetchStatus};
