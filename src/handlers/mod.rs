pub mod health;
pub mod rpc;
pub mod stats;

pub use health::*;
pub use rpc::*;
pub use stats::*;

use crate::{
    middleware::{confirm_payment_layer, PaymentGate},
    services::{ChargeLedger, PaymentGateway, UpstreamRpc},
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<PaymentGate>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub upstream: UpstreamRpc,
    pub ledger: Arc<ChargeLedger>,
}

pub fn router(state: AppState) -> Router {
    let gate = state.gate.clone();

    Router::new()
        // Public endpoints (no payment required)
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        // Metered endpoint (payment confirmed before forwarding)
        .route(
            "/rpc",
            post(forward_rpc).layer(axum_middleware::from_fn_with_state(
                gate,
                confirm_payment_layer,
            )),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::default().include_headers(true)),
                )
                .layer(CorsLayer::permissive()),
        )
}
