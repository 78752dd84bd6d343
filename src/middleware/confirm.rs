use crate::{
    context::CancelSignal,
    error::{MeterError, PaymentInstructions, Result},
    models::{ChargeRecord, PaymentHistoryEntry},
    services::{
        gateway::PaymentGateway,
        ledger::ChargeLedger,
        poller::ReceiptPoller,
        tariff::{CallCategory, Tariff},
    },
};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use ethers::types::{Address, U256};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Payee side of the meter: holds requests until the matching payment shows up in the history.
pub struct PaymentGate {
    poller: Mutex<ReceiptPoller<Arc<dyn PaymentGateway>>>,
    token: Address,
    payer: Address,
    tariff: Tariff,
    max_wait: Duration,
    ledger: Arc<ChargeLedger>,
}

impl PaymentGate {
    pub fn new(
        poller: ReceiptPoller<Arc<dyn PaymentGateway>>,
        tariff: Tariff,
        max_wait: Duration,
        ledger: Arc<ChargeLedger>,
    ) -> Self {
        Self {
            token: poller.token(),
            payer: poller.partner(),
            poller: Mutex::new(poller),
            tariff,
            max_wait,
            ledger,
        }
    }

    /// Only payments received from the payer count; our own sends show up in the same history.
    fn admits(&self, entry: &PaymentHistoryEntry) -> bool {
        entry.is_received() && entry.counterparty().map_or(true, |from| from == self.payer)
    }

    /// Waits for a new payment worth at least the tariff of `category`.
    ///
    /// The whole wait, including queueing behind other requests, is bounded by `max_wait`.
    pub async fn confirm(&self, category: CallCategory) -> Result<PaymentHistoryEntry> {
        let cost = self.tariff.cost_of(category);
        let deadline = Instant::now() + self.max_wait;

        // One watcher at a time owns the baseline.
        let receipt = match timeout_at(deadline, self.poller.lock()).await {
            Ok(mut poller) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                poller
                    .next_receipt(remaining, &CancelSignal::never(), |entry| self.admits(entry))
                    .await
            }
            Err(_) => Err(MeterError::Timeout),
        };

        match receipt {
            Ok(entry) if entry.amount < U256::from(cost) => {
                self.ledger.record(ChargeRecord::failed(category, cost)).await;
                Err(MeterError::PaymentVerificationFailed(format!(
                    "received {} but {} call costs {}",
                    entry.amount, category, cost
                )))
            }
            Ok(entry) => {
                self.ledger
                    .record(ChargeRecord::paid(category, cost, entry.identifier.clone()))
                    .await;
                Ok(entry)
            }
            Err(MeterError::Timeout) => {
                self.ledger.record(ChargeRecord::failed(category, cost)).await;
                Err(MeterError::PaymentRequired(PaymentInstructions::new(
                    self.token, category, cost,
                )))
            }
            Err(e) => Err(e),
        }
    }
}

// Axum middleware function
pub async fn confirm_payment_layer(
    State(gate): State<Arc<PaymentGate>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| MeterError::InvalidRequest(format!("unreadable body: {}", e)))?;

    let method = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|v| v.get("method").and_then(Value::as_str).map(str::to_string))
        .ok_or_else(|| MeterError::InvalidRequest("expected a JSON-RPC request".to_string()))?;

    let category =
        CallCategory::for_method(&method).ok_or_else(|| MeterError::UnmeteredMethod(method.clone()))?;

    let receipt = gate.confirm(category).await?;
    tracing::debug!(
        "Payment {:?} confirmed for {} ({})",
        receipt.identifier,
        method,
        category
    );

    // Payment confirmed, continue to handler
    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}
