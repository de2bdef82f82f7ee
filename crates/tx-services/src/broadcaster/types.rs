//! ARC broadcaster types

use serde::{Deserialize, Serialize};
use tx_core::broadcaster::BroadcastFailureCode;

/// ARC configuration
#[derive(Debug, Clone)]
pub struct ArcConfig {
    /// Authentication token for the ARC API
    pub api_key: Option<String>,

    /// Deployment ID sent with every request
    pub deployment_id: Option<String>,

    /// Callback URL for status notifications
    pub callback_url: Option<String>,

    /// Callback authentication token
    pub callback_token: Option<String>,

    /// Additional headers
    pub headers: Option<std::collections::HashMap<String, String>>,
}

impl Default for ArcConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            deployment_id: Some(Self::generate_deployment_id()),
            callback_url: None,
            callback_token: None,
            headers: None,
        }
    }
}

impl ArcConfig {
    fn generate_deployment_id() -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let random_bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
        format!("tx-services-{}", hex::encode(random_bytes))
    }
}

/// ARC API response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcResponse {
    /// Block hash, when mined
    #[serde(rename = "blockHash", skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,

    /// Block height, when mined
    #[serde(rename = "blockHeight", skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u32>,

    #[serde(rename = "extraInfo", skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<String>,

    /// HTTP-style status carried in the body
    pub status: i32,

    /// Status description
    pub title: String,

    #[serde(default)]
    pub txid: String,

    /// Competing transactions, reported on double spends
    #[serde(rename = "competingTxs", skip_serializing_if = "Option::is_none")]
    pub competing_txs: Option<Vec<String>>,
}

impl ArcResponse {
    /// 200 accepted; 409 means the transaction is already known, which
    /// broadcasting treats as success.
    pub fn is_success(&self) -> bool {
        self.status == 200 || self.status == 409
    }

    pub fn is_double_spend(&self) -> bool {
        self.competing_txs
            .as_ref()
            .map(|txs| !txs.is_empty())
            .unwrap_or(false)
    }

    /// Map the response onto the engine's failure table.
    pub fn failure_code(&self) -> BroadcastFailureCode {
        if self.is_double_spend() {
            return BroadcastFailureCode::DoubleSpend;
        }
        match self.status {
            400 | 422 | 460..=469 => BroadcastFailureCode::InvalidTransaction,
            470..=499 => BroadcastFailureCode::RejectedByNetwork,
            500..=599 => BroadcastFailureCode::ServiceUnavailable,
            _ => BroadcastFailureCode::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: i32) -> ArcResponse {
        ArcResponse {
            block_hash: None,
            block_height: None,
            extra_info: None,
            status,
            title: "t".to_string(),
            txid: "abc".to_string(),
            competing_txs: None,
        }
    }

    #[test]
    fn test_arc_config_default_deployment_id() {
        let config = ArcConfig::default();
        assert!(config.deployment_id.unwrap().starts_with("tx-services-"));
    }

    #[test]
    fn test_success_statuses() {
        assert!(response(200).is_success());
        assert!(response(409).is_success()); // already in mempool
        assert!(!response(465).is_success());
    }

    #[test]
    fn test_failure_code_mapping() {
        assert_eq!(
            response(465).failure_code(),
            BroadcastFailureCode::InvalidTransaction
        );
        assert_eq!(
            response(473).failure_code(),
            BroadcastFailureCode::RejectedByNetwork
        );
        assert_eq!(
            response(503).failure_code(),
            BroadcastFailureCode::ServiceUnavailable
        );
        assert_eq!(response(300).failure_code(), BroadcastFailureCode::Unknown);

        let mut double_spend = response(409);
        double_spend.competing_txs = Some(vec!["def".to_string()]);
        assert_eq!(
            double_spend.failure_code(),
            BroadcastFailureCode::DoubleSpend
        );
    }

    #[test]
    fn test_response_parses_service_json() {
        let json = r#"{
            "blockHash": "",
            "status": 200,
            "title": "OK",
            "txid": "aa",
            "extraInfo": null
        }"#;
        let response: ArcResponse = serde_json::from_str(json).unwrap();
        assert!(response.is_success());
    }
}
