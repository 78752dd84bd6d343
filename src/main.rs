use anyhow::{Context, Result};
use rpc_meter::{
    config::Config,
    handlers::{router, AppState},
    middleware::PaymentGate,
    services::*,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting rpc-meter v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let gateway: Arc<dyn PaymentGateway> = Arc::new(RaidenGateway::new(
        config.gateway_url.clone(),
        config.gateway_timeout,
    )?);
    let upstream = UpstreamRpc::new(config.upstream_rpc_url.clone(), config.gateway_timeout)?;
    let ledger = Arc::new(ChargeLedger::new());

    let poller = ReceiptPoller::new(
        gateway.clone(),
        config.token_address,
        config.partner_address,
        config.poll_pause,
    )
    .await
    .context("Could not establish a payment history baseline")?;

    let gate = Arc::new(PaymentGate::new(
        poller,
        config.tariff,
        config.max_wait,
        ledger.clone(),
    ));

    let app = router(AppState {
        gate,
        gateway,
        upstream,
        ledger,
    });

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Metered JSON-RPC: http://{}/rpc", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
