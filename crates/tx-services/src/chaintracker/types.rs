//! Chaintracks service types

use serde::{Deserialize, Serialize};

/// Block header as reported by a Chaintracks service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u32,

    pub hash: String,

    pub version: u32,

    #[serde(rename = "previousHash")]
    pub previous_hash: String,

    #[serde(rename = "merkleRoot")]
    pub merkle_root: String,

    pub time: u32,

    pub bits: u32,

    pub nonce: u32,
}

/// Response envelope every Chaintracks endpoint wraps its value in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchStatus<T> {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
}

impl<T> FetchStatus<T> {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
