use super::AppState;
use crate::error::MeterError;
use axum::{extract::State, Json};
use serde_json::Value;

/// Forwards a paid JSON-RPC request to the upstream node.
pub async fn forward_rpc(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, MeterError> {
    let answer = state.upstream.forward(&body).await?;
    Ok(Json(answer))
}
