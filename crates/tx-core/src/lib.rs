//! BSV transaction engine
//!
//! The client-side protocol core: transaction building and signing, a
//! bounded script interpreter, BRC-74 merkle paths, the BEEF/Atomic-BEEF
//! container, fee and change solving, and SPV verification against a
//! pluggable chain oracle. Network transports implement the
//! [`broadcaster::Broadcaster`] and [`chain::ChainTracker`] capabilities;
//! default HTTP implementations live in the `tx-services` crate.

pub fn version() -> &'static str {
    "0.1.0"
}

// Binary reader/writer shared by every wire format
pub mod codec;

// Script model, interpreter, and templates
pub mod script;

// Transactions, merkle paths, BEEF, fees, SPV
pub mod transaction;

// Hash and ECDSA primitives
pub mod crypto;

// Chain oracle capability
pub mod chain;

// Transaction transport capability
pub mod broadcaster;
