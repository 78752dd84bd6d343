mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::{partner, received, token, FakeGateway};
use ethers::types::Address;
use mockito::{Matcher, Server, ServerGuard};
use rpc_meter::{
    error::ErrorResponse,
    handlers::{router, AppState},
    middleware::PaymentGate,
    models::{HealthStatus, PaymentEvent, Stats},
    services::{CallCategory, ChargeLedger, PaymentGateway, ReceiptPoller, Tariff, UpstreamRpc},
    MeterError,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const POLL_PAUSE: Duration = Duration::from_millis(10);
const MAX_WAIT: Duration = Duration::from_millis(200);

struct Payee {
    app: Router,
    gate: Arc<PaymentGate>,
    fake: Arc<FakeGateway>,
    ledger: Arc<ChargeLedger>,
    // keeps the upstream node alive for the test's duration
    _upstream: ServerGuard,
}

async fn payee() -> Payee {
    let mut upstream = Server::new_async().await;
    upstream
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"jsonrpc": "2.0"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
        .create_async()
        .await;

    let fake = Arc::new(FakeGateway::default());
    let gateway: Arc<dyn PaymentGateway> = fake.clone();
    let ledger = Arc::new(ChargeLedger::new());
    let gate = gate_over(gateway.clone(), ledger.clone()).await;

    let app = router(AppState {
        gate: gate.clone(),
        gateway,
        upstream: UpstreamRpc::new(upstream.url(), Duration::from_secs(5)).unwrap(),
        ledger: ledger.clone(),
    });

    Payee {
        app,
        gate,
        fake,
        ledger,
        _upstream: upstream,
    }
}

async fn gate_over(
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<ChargeLedger>,
) -> Arc<PaymentGate> {
    let poller = ReceiptPoller::new(gateway, token(), partner(), POLL_PAUSE)
        .await
        .unwrap();
    Arc::new(PaymentGate::new(poller, Tariff::default(), MAX_WAIT, ledger))
}

fn rpc(method: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/rpc")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": []}).to_string(),
        ))
        .unwrap()
}

async fn read<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn paid_request_is_forwarded_upstream() {
    let payee = payee().await;
    payee.fake.append(received(4));

    let response = payee.app.clone().oneshot(rpc("eth_blockNumber")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read(response).await;
    assert_eq!(body["result"], "0x10");
    assert_eq!(payee.ledger.paid(), 1);
    assert_eq!(payee.ledger.units_paid(), 4);
}

#[tokio::test]
async fn missing_payment_answers_402_with_instructions() {
    let payee = payee().await;

    let response = payee.app.clone().oneshot(rpc("eth_getLogs")).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body: ErrorResponse = read(response).await;
    assert_eq!(body.error_code, "PAYMENT_REQUIRED");
    let instructions = body.payment_instructions.unwrap();
    assert_eq!(instructions.payment.amount, "8");
    assert_eq!(instructions.payment.category, CallCategory::Filter);
    assert_eq!(instructions.payment.token, token());
    assert_eq!(payee.ledger.failed(), 1);
}

#[tokio::test]
async fn underpayment_is_rejected() {
    let payee = payee().await;
    payee.fake.append(received(2));

    let response = payee.app.clone().oneshot(rpc("eth_call")).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body: ErrorResponse = read(response).await;
    assert_eq!(body.error_code, "PAYMENT_VERIFICATION_FAILED");
    assert!(body.payment_instructions.is_none());
}

#[tokio::test]
async fn each_payment_admits_one_request() {
    let payee = payee().await;
    payee.fake.append(received(1));

    let first = payee.app.clone().oneshot(rpc("eth_gasPrice")).await.unwrap();
    let second = payee.app.clone().oneshot(rpc("eth_gasPrice")).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn unmetered_method_is_a_bad_request() {
    let payee = payee().await;

    let response = payee.app.clone().oneshot(rpc("admin_peers")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = read(response).await;
    assert_eq!(body.error_code, "UNMETERED_METHOD");
    assert_eq!(payee.fake.history_fetches(), 1);
}

#[tokio::test]
async fn non_json_body_is_a_bad_request() {
    let payee = payee().await;
    let request = Request::builder()
        .method("POST")
        .uri("/rpc")
        .body(Body::from("not json"))
        .unwrap();

    let response = payee.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn gate_confirms_directly() {
    let payee = payee().await;
    payee.fake.append(received(3));

    let entry = payee.gate.confirm(CallCategory::ContractCall).await.unwrap();
    assert_eq!(entry.identifier.as_deref(), Some("3007"));

    let err = payee.gate.confirm(CallCategory::General).await.unwrap_err();
    assert!(matches!(err, MeterError::PaymentRequired(_)));
}

#[tokio::test]
async fn stats_report_the_ledger() {
    let payee = payee().await;
    payee.fake.append(received(4));
    payee.app.clone().oneshot(rpc("eth_chainId")).await.unwrap();

    let response = payee
        .app
        .clone()
        .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let stats: Stats = read(response).await;
    assert_eq!(stats.charges_paid, 1);
    assert_eq!(stats.units_paid, 4);
    assert_eq!(stats.recent.len(), 1);
}

#[tokio::test]
async fn health_checks_gateway_and_upstream() {
    let payee = payee().await;

    let response = payee
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthStatus = read(response).await;
    assert_eq!(health.status, "healthy");
    assert!(health.gateway);
    assert!(health.upstream_rpc);
}

#[tokio::test]
async fn outgoing_payment_does_not_admit_a_request() {
    let payee = payee().await;
    let mut sent = received(4);
    sent.event = PaymentEvent::Sent;
    sent.target = Some(partner());
    payee.fake.append(sent);

    let response = payee.app.clone().oneshot(rpc("eth_blockNumber")).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body: ErrorResponse = read(response).await;
    assert_eq!(body.error_code, "PAYMENT_REQUIRED");
    assert_eq!(payee.ledger.paid(), 0);
}

#[tokio::test]
async fn payment_from_another_sender_does_not_admit_a_request() {
    let payee = payee().await;
    let stranger: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
    let mut foreign = received(4);
    foreign.initiator = Some(stranger);
    payee.fake.append(foreign);

    let response = payee.app.clone().oneshot(rpc("eth_blockNumber")).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    // a later payment from the payer is still honoured
    payee.fake.append(received(4));
    let response = payee.app.clone().oneshot(rpc("eth_blockNumber")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn payments_landing_together_admit_one_request_each() {
    let payee = payee().await;
    payee.fake.append(received(4));
    payee.fake.append(received(4));

    let first = payee.app.clone().oneshot(rpc("eth_blockNumber")).await.unwrap();
    let second = payee.app.clone().oneshot(rpc("eth_blockNumber")).await.unwrap();
    let third = payee.app.clone().oneshot(rpc("eth_blockNumber")).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(third.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(payee.ledger.paid(), 2);
}

#[tokio::test(start_paused = true)]
async fn queued_request_waits_at_most_max_wait() {
    let fake = Arc::new(FakeGateway::default());
    let ledger = Arc::new(ChargeLedger::new());
    let gate = gate_over(fake.clone(), ledger.clone()).await;

    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(
        gate.confirm(CallCategory::General),
        gate.confirm(CallCategory::General)
    );

    assert!(matches!(first, Err(MeterError::PaymentRequired(_))));
    assert!(matches!(second, Err(MeterError::PaymentRequired(_))));
    assert!(started.elapsed() <= MAX_WAIT + POLL_PAUSE);
    assert_eq!(ledger.failed(), 2);
}
