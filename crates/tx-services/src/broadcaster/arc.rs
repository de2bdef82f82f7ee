//! ARC broadcaster
//!
//! Default transaction transport: posts hex to an ARC endpoint and maps
//! the service's JSON status onto the engine's failure taxonomy.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use tx_core::broadcaster::{
    BroadcastFailure, BroadcastFailureCode, BroadcastResponse, BroadcastResult, Broadcaster,
};
use tx_core::transaction::Transaction;

use super::types::{ArcConfig, ArcResponse};
use crate::error::{ServiceError, ServiceResult};

/// ARC broadcaster client
pub struct ArcBroadcaster {
    /// Service name used in error reporting
    name: String,

    /// ARC base URL
    url: String,

    config: ArcConfig,

    client: Client,
}

impl ArcBroadcaster {
    /// # Arguments
    /// * `url` - Base URL of the ARC service
    /// * `config` - Optional configuration
    /// * `name` - Optional service name
    pub fn new(url: String, config: Option<ArcConfig>, name: Option<String>) -> Self {
        Self {
            name: name.unwrap_or_else(|| "ARC".to_string()),
            url,
            config: config.unwrap_or_default(),
            client: Client::new(),
        }
    }

    fn headers(&self) -> ServiceResult<reqwest::header::HeaderMap> {
        use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(deployment_id) = &self.config.deployment_id {
            headers.insert(
                HeaderName::from_static("x-deployment-id"),
                HeaderValue::from_str(deployment_id)
                    .map_err(|_| ServiceError::InvalidParams("invalid deployment id".to_string()))?,
            );
        }
        if let Some(api_key) = &self.config.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {api_key}"))
                    .map_err(|_| ServiceError::InvalidParams("invalid API key".to_string()))?,
            );
        }
        if let Some(custom) = &self.config.headers {
            for (key, value) in custom {
                headers.insert(
                    HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                        ServiceError::InvalidParams(format!("invalid header key: {key}"))
                    })?,
                    HeaderValue::from_str(value).map_err(|_| {
                        ServiceError::InvalidParams(format!("invalid header value: {value}"))
                    })?,
                );
            }
        }
        Ok(headers)
    }

    async fn post_tx(&self, raw_tx_hex: &str) -> ServiceResult<ArcResponse> {
        let url = format!("{}/v1/tx", self.url);

        let mut body = serde_json::json!({ "rawTx": raw_tx_hex });
        if let Some(callback_url) = &self.config.callback_url {
            body["callbackUrl"] = serde_json::json!(callback_url);
            if let Some(callback_token) = &self.config.callback_token {
                body["callbackToken"] = serde_json::json!(callback_token);
            }
        }

        debug!(service = %self.name, %url, bytes = raw_tx_hex.len() / 2, "posting transaction");
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let arc_response: ArcResponse = response.json().await?;
        Ok(arc_response)
    }
}

#[async_trait]
impl Broadcaster for ArcBroadcaster {
    /// Broadcast in Extended Format when the ancestry is resolved,
    /// falling back to the legacy serialization.
    async fn broadcast(&self, tx: &Transaction) -> BroadcastResult {
        let bytes = match tx.to_ef().or_else(|_| tx.to_binary()) {
            Ok(bytes) => bytes,
            Err(e) => {
                return Err(BroadcastFailure {
                    code: BroadcastFailureCode::InvalidTransaction,
                    description: e.to_string(),
                })
            }
        };
        let txid = tx.txid().unwrap_or_default();

        match self.post_tx(&hex::encode(bytes)).await {
            Ok(response) if response.is_success() => Ok(BroadcastResponse {
                txid: if response.txid.is_empty() {
                    txid
                } else {
                    response.txid
                },
                message: response.title,
            }),
            Ok(response) => {
                warn!(
                    service = %self.name,
                    status = response.status,
                    title = %response.title,
                    "broadcast rejected"
                );
                Err(BroadcastFailure {
                    code: response.failure_code(),
                    description: format!("{}: {}", response.status, response.title),
                })
            }
            Err(e) => {
                warn!(service = %self.name, error = %e, "broadcast transport failure");
                let code = if e.is_transient() {
                    BroadcastFailureCode::ServiceUnavailable
                } else {
                    BroadcastFailureCode::Unknown
                };
                Err(BroadcastFailure {
                    code,
                    description: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcaster_creation() {
        let broadcaster = ArcBroadcaster::new(
            "https://arc.example.com".to_string(),
            None,
            Some("TestARC".to_string()),
        );
        assert_eq!(broadcaster.name, "TestARC");
        assert_eq!(broadcaster.url, "https://arc.example.com");
    }

    #[test]
    fn test_headers_include_auth_and_deployment() {
        let mut config = ArcConfig::default();
        config.api_key = Some("test-key".to_string());
        let broadcaster =
            ArcBroadcaster::new("https://arc.example.com".to_string(), Some(config), None);

        let headers = broadcaster.headers().unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer test-key");
        assert!(headers.get("x-deployment-id").is_some());
    }

    #[test]
    fn test_headers_reject_invalid_values() {
        let mut config = ArcConfig::default();
        config.api_key = Some("bad\nkey".to_string());
        let broadcaster =
            ArcBroadcaster::new("https://arc.example.com".to_string(), Some(config), None);
        assert!(broadcaster.headers().is_err());
    }
}
