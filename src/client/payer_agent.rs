use anyhow::{Context, Result};
use ethers::{
    providers::{Http, Provider},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, U256},
};
use rpc_meter::{
    client::MeteredClient,
    config::Config,
    context::CallContext,
    services::{CallCategory, ChannelManager, RaidenGateway},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    println!("Metered RPC Payer Agent");
    println!("=======================");
    println!("RPC endpoint: {}", config.eth_rpc_url);
    println!("Payment gateway: {}", config.gateway_url);
    println!("Paying {:?} in token {:?}", config.partner_address, config.token_address);
    println!();

    let gateway = Arc::new(RaidenGateway::new(
        config.gateway_url.clone(),
        config.gateway_timeout,
    )?);

    let channels = ChannelManager::new(gateway.clone(), config.max_wait);
    let channel = channels
        .ensure_open(
            config.token_address,
            config.partner_address,
            config.channel_deposit,
            config.settle_timeout,
        )
        .await
        .context("Could not open a payment channel")?;
    println!(
        "Channel {} is {:?}, balance {}",
        channel.channel_identifier, channel.state, channel.balance
    );

    let dearest = CallCategory::ALL
        .iter()
        .map(|category| config.tariff.cost_of(*category))
        .max()
        .unwrap_or_default();
    if !channels
        .can_pay(config.token_address, config.partner_address, U256::from(dearest))
        .await?
    {
        println!("   [WARN] Balance does not cover the dearest call ({} units)", dearest);
    }
    println!();

    let provider = Provider::<Http>::try_from(config.eth_rpc_url.as_str())
        .context("Invalid ETH_RPC_URL")?;
    let client = MeteredClient::new(
        provider,
        gateway,
        config.tariff,
        config.token_address,
        config.partner_address,
    );
    let ctx = CallContext::background().with_timeout(config.max_wait * 4);

    println!("Query current block number");
    match client.block_number(&ctx).await {
        Ok(number) => println!("   [OK] Highest block is {}", number),
        Err(e) => println!("   [FAILED] {}", e),
    }

    println!("Query suggested gas price");
    match client.gas_price(&ctx).await {
        Ok(price) => println!("   [OK] Gas price is {} wei", price),
        Err(e) => println!("   [FAILED] {}", e),
    }

    let from: Address = "0x0000000000000000000000000000000000012345".parse()?;
    let to: Address = "0x0000000000000000000000000000000000054321".parse()?;
    let tx: TypedTransaction = TransactionRequest::new()
        .from(from)
        .to(to)
        .value(U256::zero())
        .data(Bytes::from(vec![1, 2, 3, 4, 5, 6]))
        .into();

    println!("Estimating gas for a call from {:?} to {:?}", from, to);
    match client.estimate_gas(&ctx, &tx, None).await {
        Ok(gas) => println!("   [OK] Estimated gas as {}", gas),
        Err(e) if e.money_moved() => println!("   [FAILED after payment] {}", e),
        Err(e) => println!("   [FAILED] {}", e),
    }

    println!("Retrieve the pending nonce for {:?}", from);
    match client.pending_nonce(&ctx, from).await {
        Ok(nonce) => println!("   [OK] Pending nonce: {}", nonce),
        Err(e) => println!("   [FAILED] {}", e),
    }

    let stats = client.ledger().stats().await;
    println!();
    println!(
        "Charges: {} paid ({} units), {} failed",
        stats.charges_paid, stats.units_paid, stats.charges_failed
    );

    Ok(())
}
