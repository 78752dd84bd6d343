use crate::services::tariff::Tariff;
use anyhow::{bail, Context, Result};
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Endpoint the payer calls, and the node the payee forwards to
    pub eth_rpc_url: String,
    pub upstream_rpc_url: String,

    // Payment channel network
    pub gateway_url: String,
    pub gateway_timeout: Duration,
    pub token_address: Address,
    pub partner_address: Address,
    pub channel_deposit: U256,
    pub settle_timeout: u64,

    // Metering
    pub tariff: Tariff,
    pub poll_pause: Duration,
    pub max_wait: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let environment = Self::parse_environment(&var("ENVIRONMENT", "development"))?;

        let eth_rpc_url = lookup("ETH_RPC_URL").context("ETH_RPC_URL required")?;
        let upstream_rpc_url = lookup("UPSTREAM_RPC_URL").unwrap_or_else(|| eth_rpc_url.clone());

        let tariff = Tariff::new(
            Self::parse_number(&var("COST_GENERAL", "4"), "COST_GENERAL")?,
            Self::parse_number(&var("COST_STATE_ACCESS", "4"), "COST_STATE_ACCESS")?,
            Self::parse_number(&var("COST_FILTER", "8"), "COST_FILTER")?,
            Self::parse_number(&var("COST_CONTRACT_CALL", "3"), "COST_CONTRACT_CALL")?,
            Self::parse_number(&var("COST_GAS_ESTIMATION", "1"), "COST_GAS_ESTIMATION")?,
            Self::parse_number(&var("COST_SEND_TRANSACTION", "1"), "COST_SEND_TRANSACTION")?,
        )?;

        let channel_deposit = var("CHANNEL_DEPOSIT", "10");
        let config = Self {
            environment,
            host: var("HOST", "0.0.0.0"),
            port: var("PORT", "8080").parse().context("Invalid PORT")?,

            eth_rpc_url,
            upstream_rpc_url,

            gateway_url: var("GATEWAY_URL", "http://localhost:5001/api/v1"),
            gateway_timeout: Duration::from_secs(Self::parse_number(
                &var("GATEWAY_TIMEOUT_SECS", "10"),
                "GATEWAY_TIMEOUT_SECS",
            )?),
            token_address: Self::parse_address(lookup("TOKEN_ADDRESS"), "TOKEN_ADDRESS")?,
            partner_address: Self::parse_address(lookup("PARTNER_ADDRESS"), "PARTNER_ADDRESS")?,
            channel_deposit: U256::from_dec_str(&channel_deposit)
                .with_context(|| format!("Invalid CHANNEL_DEPOSIT: {}", channel_deposit))?,
            settle_timeout: Self::parse_number(&var("SETTLE_TIMEOUT", "500"), "SETTLE_TIMEOUT")?,

            tariff,
            poll_pause: Duration::from_millis(Self::parse_number(
                &var("POLL_PAUSE_MS", "100"),
                "POLL_PAUSE_MS",
            )?),
            max_wait: Duration::from_millis(Self::parse_number(
                &var("PAYMENT_MAX_WAIT_MS", "5000"),
                "PAYMENT_MAX_WAIT_MS",
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| map.get(key).cloned())
    }

    fn parse_environment(env: &str) -> Result<Environment> {
        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_number(value: &str, var: &str) -> Result<u64> {
        value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {}", var, value))
    }

    fn parse_address(value: Option<String>, var: &str) -> Result<Address> {
        let addr_str = value.with_context(|| format!("{} required", var))?;
        Address::from_str(&addr_str).with_context(|| format!("Invalid address for {}", var))
    }

    fn validate(&self) -> Result<()> {
        if !self.eth_rpc_url.starts_with("http") {
            bail!("ETH_RPC_URL must be HTTP(S) URL");
        }
        if !self.upstream_rpc_url.starts_with("http") {
            bail!("UPSTREAM_RPC_URL must be HTTP(S) URL");
        }
        if !self.gateway_url.starts_with("http") {
            bail!("GATEWAY_URL must be HTTP(S) URL");
        }
        if self.poll_pause.is_zero() {
            bail!("POLL_PAUSE_MS must be positive");
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}
