use super::AppState;
use crate::models::HealthStatus;
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let gateway_ok = match state.gateway.token_list().await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Payment gateway check failed: {}", e);
            false
        }
    };
    let upstream_ok = state.upstream.ping().await;

    let status = if gateway_ok && upstream_ok {
        "healthy"
    } else if upstream_ok {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        gateway: gateway_ok,
        upstream_rpc: upstream_ok,
        uptime_seconds: state.ledger.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
