use crate::{
    error::{MeterError, Result},
    models::{Channel, PaymentConfirmation, PaymentHistoryEntry},
};
use async_trait::async_trait;
use ethers::{
    types::{Address, U256},
    utils::to_checksum,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Operations the metering core needs from a payment channel node.
///
/// Transport and protocol failures are both plain errors here; retrying is the caller's call.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn open_channel(
        &self,
        partner: Address,
        token: Address,
        deposit: U256,
        settle_timeout: u64,
    ) -> Result<Channel>;

    /// Raises the channel's total deposit to `total_deposit`.
    async fn deposit_token(
        &self,
        token: Address,
        partner: Address,
        total_deposit: U256,
    ) -> Result<()>;

    async fn pay_token(
        &self,
        token: Address,
        partner: Address,
        amount: U256,
    ) -> Result<PaymentConfirmation>;

    async fn query_channel(&self, token: Address, partner: Address) -> Result<Channel>;

    async fn payment_history(
        &self,
        token: Address,
        partner: Address,
    ) -> Result<Vec<PaymentHistoryEntry>>;

    async fn join_network(&self, token: Address, funds: U256) -> Result<()>;

    async fn token_list(&self) -> Result<Vec<Address>>;
}

#[async_trait]
impl<G: PaymentGateway + ?Sized> PaymentGateway for Arc<G> {
    async fn open_channel(
        &self,
        partner: Address,
        token: Address,
        deposit: U256,
        settle_timeout: u64,
    ) -> Result<Channel> {
        (**self).open_channel(partner, token, deposit, settle_timeout).await
    }

    async fn deposit_token(
        &self,
        token: Address,
        partner: Address,
        total_deposit: U256,
    ) -> Result<()> {
        (**self).deposit_token(token, partner, total_deposit).await
    }

    async fn pay_token(
        &self,
        token: Address,
        partner: Address,
        amount: U256,
    ) -> Result<PaymentConfirmation> {
        (**self).pay_token(token, partner, amount).await
    }

    async fn query_channel(&self, token: Address, partner: Address) -> Result<Channel> {
        (**self).query_channel(token, partner).await
    }

    async fn payment_history(
        &self,
        token: Address,
        partner: Address,
    ) -> Result<Vec<PaymentHistoryEntry>> {
        (**self).payment_history(token, partner).await
    }

    async fn join_network(&self, token: Address, funds: U256) -> Result<()> {
        (**self).join_network(token, funds).await
    }

    async fn token_list(&self) -> Result<Vec<Address>> {
        (**self).token_list().await
    }
}

/// HTTP client for the Raiden REST API (`/api/v1`).
#[derive(Debug, Clone)]
pub struct RaidenGateway {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OpenChannelRequest {
    partner_address: String,
    token_address: String,
    total_deposit: String,
    settle_timeout: String,
}

#[derive(Serialize)]
struct DepositRequest {
    total_deposit: String,
}

#[derive(Serialize)]
struct PaymentRequest {
    amount: String,
}

#[derive(Serialize)]
struct ConnectRequest {
    funds: String,
}

impl RaidenGateway {
    /// `base_url` includes the API prefix, e.g. `http://localhost:5001/api/v1`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeterError::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(segment);
        }
        url
    }

    fn pair_url(&self, resource: &str, token: Address, partner: Address) -> String {
        self.url(&[resource, &to_checksum(&token, None), &to_checksum(&partner, None)])
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| MeterError::GatewayTransport(e.to_string()))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        ensure_success(self.send(request).await?).await
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        decode(self.execute(request).await?).await
    }
}

/// Turns a non-2xx answer into a protocol error carrying the gateway's message.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(MeterError::GatewayProtocol(format!(
        "{}: {}",
        status,
        error_message(&body)
    )))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| MeterError::GatewayTransport(e.to_string()))?;
    serde_json::from_slice(&body)
        .map_err(|e| MeterError::GatewayProtocol(format!("malformed response: {}", e)))
}

/// Pulls the `errors` field out of a gateway error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| match value.get("errors") {
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl PaymentGateway for RaidenGateway {
    async fn open_channel(
        &self,
        partner: Address,
        token: Address,
        deposit: U256,
        settle_timeout: u64,
    ) -> Result<Channel> {
        let request = OpenChannelRequest {
            partner_address: to_checksum(&partner, None),
            token_address: to_checksum(&token, None),
            total_deposit: deposit.to_string(),
            settle_timeout: settle_timeout.to_string(),
        };

        let channel: Channel = self
            .fetch(self.client.put(self.url(&["channels"])).json(&request))
            .await?;

        tracing::info!(
            "Opened channel {} with {:?} for token {:?}",
            channel.channel_identifier,
            partner,
            token
        );
        Ok(channel)
    }

    async fn deposit_token(
        &self,
        token: Address,
        partner: Address,
        total_deposit: U256,
    ) -> Result<()> {
        let request = DepositRequest {
            total_deposit: total_deposit.to_string(),
        };
        self.execute(
            self.client
                .patch(self.pair_url("channels", token, partner))
                .json(&request),
        )
        .await?;

        tracing::info!("Total deposit towards {:?} raised to {}", partner, total_deposit);
        Ok(())
    }

    async fn pay_token(
        &self,
        token: Address,
        partner: Address,
        amount: U256,
    ) -> Result<PaymentConfirmation> {
        let request = PaymentRequest {
            amount: amount.to_string(),
        };
        let confirmation: PaymentConfirmation = self
            .fetch(
                self.client
                    .post(self.pair_url("payments", token, partner))
                    .json(&request),
            )
            .await?;

        tracing::debug!(
            "Paid {} to {:?} (payment id {:?})",
            amount,
            partner,
            confirmation.identifier
        );
        Ok(confirmation)
    }

    async fn query_channel(&self, token: Address, partner: Address) -> Result<Channel> {
        let response = self
            .send(self.client.get(self.pair_url("channels", token, partner)))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(MeterError::ChannelNotFound { token, partner });
        }
        decode(ensure_success(response).await?).await
    }

    async fn payment_history(
        &self,
        token: Address,
        partner: Address,
    ) -> Result<Vec<PaymentHistoryEntry>> {
        self.fetch(self.client.get(self.pair_url("payments", token, partner)))
            .await
    }

    async fn join_network(&self, token: Address, funds: U256) -> Result<()> {
        let request = ConnectRequest {
            funds: funds.to_string(),
        };
        self.execute(
            self.client
                .put(self.url(&["connections", &to_checksum(&token, None)]))
                .json(&request),
        )
        .await?;

        tracing::info!("Joined token network {:?} with {} funds", token, funds);
        Ok(())
    }

    async fn token_list(&self) -> Result<Vec<Address>> {
        self.fetch(self.client.get(self.url(&["tokens"]))).await
    }
}
