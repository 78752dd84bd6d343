use crate::error::{MeterError, Result};
use serde_json::{json, Value};
use std::time::Duration;

/// Forwards JSON-RPC bodies to the node the payee is selling access to.
#[derive(Debug, Clone)]
pub struct UpstreamRpc {
    url: String,
    client: reqwest::Client,
}

impl UpstreamRpc {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeterError::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends the request body unchanged and returns the node's JSON answer unchanged.
    pub async fn forward(&self, body: &Value) -> Result<Value> {
        let method = body
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let failed = |reason: String| MeterError::UnderlyingCallFailed {
            method: method.clone(),
            reason,
        };

        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("upstream answered {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| failed(format!("malformed upstream response: {}", e)))
    }

    pub async fn ping(&self) -> bool {
        let probe = json!({"jsonrpc": "2.0", "id": 1, "method": "eth_chainId", "params": []});
        match self.forward(&probe).await {
            Ok(answer) => answer.get("result").is_some(),
            Err(e) => {
                tracing::warn!("Upstream RPC check failed: {}", e);
                false
            }
        }
    }
}
