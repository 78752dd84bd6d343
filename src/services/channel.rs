use crate::{
    error::{MeterError, Result},
    models::{Channel, ChannelState},
    services::gateway::PaymentGateway,
};
use ethers::types::{Address, U256};
use moka::future::Cache;
use std::time::Duration;

/// Keeps a payer's channel usable: opens it, tops it up, and checks state changes.
///
/// Channels are cached for at most one confirmation window; the gateway stays the source of truth.
pub struct ChannelManager<G> {
    gateway: G,
    cache: Cache<(Address, Address), Channel>,
}

impl<G: PaymentGateway> ChannelManager<G> {
    pub fn new(gateway: G, window: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(256)
            .time_to_live(window)
            .build();
        Self { gateway, cache }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub async fn channel(&self, token: Address, partner: Address) -> Result<Channel> {
        if let Some(cached) = self.cache.get(&(token, partner)).await {
            tracing::debug!("Channel cache hit for {:?}", partner);
            return Ok(cached);
        }
        self.refresh(token, partner).await
    }

    /// Queries the gateway and rejects answers that move the channel backwards.
    pub async fn refresh(&self, token: Address, partner: Address) -> Result<Channel> {
        let fetched = self.gateway.query_channel(token, partner).await?;
        self.observe(token, partner, fetched).await
    }

    async fn observe(&self, token: Address, partner: Address, next: Channel) -> Result<Channel> {
        let key = (token, partner);
        if let Some(previous) = self.cache.get(&key).await {
            if !previous.state.can_transition_to(next.state) {
                tracing::warn!(
                    "Channel with {:?} reported {:?} after {:?}, ignoring",
                    partner,
                    next.state,
                    previous.state
                );
                return Err(MeterError::GatewayProtocol(format!(
                    "channel state regressed from {:?} to {:?}",
                    previous.state, next.state
                )));
            }
        }
        self.cache.insert(key, next.clone()).await;
        Ok(next)
    }

    /// Makes sure an opened channel with at least `deposit` total deposit exists.
    pub async fn ensure_open(
        &self,
        token: Address,
        partner: Address,
        deposit: U256,
        settle_timeout: u64,
    ) -> Result<Channel> {
        let existing = match self.refresh(token, partner).await {
            Ok(channel) => Some(channel),
            Err(MeterError::ChannelNotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        match existing {
            Some(channel) if channel.state == ChannelState::Opened => {
                if channel.total_deposit >= deposit {
                    return Ok(channel);
                }
                tracing::info!(
                    "Topping up channel {} from {} to {}",
                    channel.channel_identifier,
                    channel.total_deposit,
                    deposit
                );
                self.gateway.deposit_token(token, partner, deposit).await?;
                self.refresh(token, partner).await
            }
            Some(channel) if channel.state == ChannelState::Settling => {
                Err(MeterError::ChannelUnavailable(format!(
                    "channel {} with {:?} is settling",
                    channel.channel_identifier, partner
                )))
            }
            _ => {
                let channel = self
                    .gateway
                    .open_channel(partner, token, deposit, settle_timeout)
                    .await?;
                if !channel.state.accepts_payments() {
                    return Err(MeterError::ChannelUnavailable(format!(
                        "new channel with {:?} is {:?}",
                        partner, channel.state
                    )));
                }
                self.observe(token, partner, channel).await
            }
        }
    }

    /// Whether the channel is open with at least `amount` spendable, as far as the cache knows.
    pub async fn can_pay(&self, token: Address, partner: Address, amount: U256) -> Result<bool> {
        Ok(self.channel(token, partner).await?.can_pay(amount))
    }

    pub async fn join_network(&self, token: Address, funds: U256) -> Result<()> {
        self.gateway.join_network(token, funds).await
    }

    pub async fn is_token_registered(&self, token: Address) -> Result<bool> {
        Ok(self.gateway.token_list().await?.contains(&token))
    }

    pub async fn forget(&self, token: Address, partner: Address) {
        self.cache.invalidate(&(token, partner)).await;
    }
}
