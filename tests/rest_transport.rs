//! REST transport tests against a local mock OKX server.

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use okx_connector::core::errors::ExchangeError;
use okx_connector::core::kernel::{ReqwestRest, RestClient};
use okx_connector::exchanges::okx::{OkxBuilder, OkxOrderRequest, OkxRest};
use serde_json::json;
use sha2::Sha256;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SECRET: &str = "test-secret";

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path_and_query: String,
    headers: HeaderMap,
    body: String,
    at: Instant,
}

#[derive(Clone, Default)]
struct MockState {
    script: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockState {
    fn scripted(responses: &[(StatusCode, &str)]) -> Self {
        let state = Self::default();
        state.script.lock().unwrap().extend(
            responses
                .iter()
                .map(|(status, body)| (*status, (*body).to_string())),
        );
        state
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    state.requests.lock().unwrap().push(Recorded {
        method,
        path_and_query: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
        headers,
        body,
        at: Instant::now(),
    });

    state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| (StatusCode::OK, success_body()))
}

fn success_body() -> String {
    json!({"code": "0", "msg": "", "data": [{"instId": "BTC-USDT", "last": "43000.1"}]}).to_string()
}

async fn start_mock_server(state: MockState) -> SocketAddr {
    let app = Router::new().fallback(record).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn builder(addr: SocketAddr) -> OkxBuilder {
    OkxBuilder::new()
        .with_base_url(format!("http://{}", addr))
        .with_credentials("test-key", SECRET, "test-phrase")
        .with_retry(3, Duration::from_millis(50), 2.0)
        .with_rest_timeout(5)
}

fn rest(addr: SocketAddr) -> OkxRest<ReqwestRest> {
    builder(addr).build_rest().unwrap()
}

fn expected_signature(timestamp: &str, method: &str, request_path: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(format!("{}{}{}{}", timestamp, method, request_path, body).as_bytes());
    general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

fn header<'a>(request: &'a Recorded, name: &str) -> &'a str {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_rate_limited_twice_then_success() {
    let rate_limited = r#"{"code":"50011","msg":"Too Many Requests","data":[]}"#;
    let state = MockState::scripted(&[
        (StatusCode::OK, rate_limited),
        (StatusCode::OK, rate_limited),
    ]);
    let addr = start_mock_server(state.clone()).await;

    let response = rest(addr).get_ticker("BTC-USDT").await.unwrap();
    assert!(response.is_success());
    assert_eq!(response.data[0]["last"], "43000.1");

    let requests = state.requests();
    assert_eq!(requests.len(), 3);
    let first_gap = requests[1].at - requests[0].at;
    let second_gap = requests[2].at - requests[1].at;
    assert!(first_gap >= Duration::from_millis(50), "first gap {:?}", first_gap);
    assert!(second_gap >= Duration::from_millis(100), "second gap {:?}", second_gap);

    // Every attempt carries a fresh signature over its own timestamp
    for request in &requests {
        let timestamp = header(request, "OK-ACCESS-TIMESTAMP");
        assert_eq!(
            header(request, "OK-ACCESS-SIGN"),
            expected_signature(timestamp, "GET", &request.path_and_query, "")
        );
    }
}

#[tokio::test]
async fn test_signed_get_headers() {
    let state = MockState::default();
    let addr = start_mock_server(state.clone()).await;

    rest(addr).get_balance(Some("BTC")).await.unwrap();

    let requests = state.requests();
    let request = &requests[0];
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.path_and_query, "/api/v5/account/balance?ccy=BTC");
    assert_eq!(header(request, "OK-ACCESS-KEY"), "test-key");
    assert_eq!(header(request, "OK-ACCESS-PASSPHRASE"), "test-phrase");
    assert_eq!(header(request, "Content-Type"), "application/json");

    let timestamp = header(request, "OK-ACCESS-TIMESTAMP");
    assert_eq!(timestamp.len(), "2020-12-08T09:08:57.715Z".len());
    assert!(timestamp.ends_with('Z'));
    assert_eq!(
        header(request, "OK-ACCESS-SIGN"),
        expected_signature(timestamp, "GET", "/api/v5/account/balance?ccy=BTC", "")
    );
    assert!(request.headers.get("x-simulated-trading").is_none());
}

#[tokio::test]
async fn test_signed_post_covers_body() {
    let state = MockState::default();
    let addr = start_mock_server(state.clone()).await;

    let order = OkxOrderRequest::market("BTC-USDT", "buy", "100").td_mode("cash");
    builder(addr)
        .with_simulated(true)
        .build_rest()
        .unwrap()
        .place_order(&order)
        .await
        .unwrap();

    let requests = state.requests();
    let request = &requests[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path_and_query, "/api/v5/trade/order");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&request.body).unwrap(),
        json!({"instId":"BTC-USDT","tdMode":"cash","side":"buy","ordType":"market","sz":"100"})
    );
    assert_eq!(
        header(request, "OK-ACCESS-SIGN"),
        expected_signature(
            header(request, "OK-ACCESS-TIMESTAMP"),
            "POST",
            "/api/v5/trade/order",
            &request.body
        )
    );
    assert_eq!(header(request, "x-simulated-trading"), "1");
}

#[tokio::test]
async fn test_business_error_is_not_retried() {
    let state = MockState::scripted(&[(
        StatusCode::OK,
        r#"{"code":"51008","msg":"Order failed. Insufficient USDT balance in account.","data":[]}"#,
    )]);
    let addr = start_mock_server(state.clone()).await;

    let order = OkxOrderRequest::limit("BTC-USDT", "buy", "1", "43000");
    let result = rest(addr).place_order(&order).await;

    assert!(
        matches!(&result, Err(ExchangeError::ApiError { code: 51008, message }) if message.contains("Insufficient"))
    );
    assert_eq!(state.requests().len(), 1);
}

#[tokio::test]
async fn test_auth_rejection_is_not_retried() {
    let state = MockState::scripted(&[(
        StatusCode::UNAUTHORIZED,
        r#"{"code":"50113","msg":"Invalid Sign","data":[]}"#,
    )]);
    let addr = start_mock_server(state.clone()).await;

    let result = rest(addr).get_positions("SWAP", None).await;
    assert!(matches!(result, Err(ExchangeError::AuthError(_))));
    assert_eq!(state.requests().len(), 1);
}

#[tokio::test]
async fn test_http_429_exhausts_retries() {
    let state = MockState::scripted(&[
        (StatusCode::TOO_MANY_REQUESTS, ""),
        (StatusCode::TOO_MANY_REQUESTS, ""),
        (StatusCode::TOO_MANY_REQUESTS, ""),
    ]);
    let addr = start_mock_server(state.clone()).await;

    let result = rest(addr).get_tickers("SWAP").await;
    assert!(matches!(result, Err(ExchangeError::RateLimitExceeded(_))));
    assert_eq!(state.requests().len(), 3);
}

#[tokio::test]
async fn test_server_error_then_recovery() {
    let state = MockState::scripted(&[(StatusCode::SERVICE_UNAVAILABLE, "maintenance")]);
    let addr = start_mock_server(state.clone()).await;

    assert!(rest(addr).get_funding_rate("BTC-USDT-SWAP").await.is_ok());
    assert_eq!(state.requests().len(), 2);
}

#[tokio::test]
async fn test_public_client_sends_no_credentials() {
    let state = MockState::default();
    let addr = start_mock_server(state.clone()).await;

    let rest = OkxBuilder::new()
        .with_base_url(format!("http://{}", addr))
        .build_rest()
        .unwrap();
    assert!(!rest.client().has_signer());
    rest.get_instruments("SWAP").await.unwrap();

    let requests = state.requests();
    assert_eq!(requests[0].path_and_query, "/api/v5/public/instruments?instType=SWAP");
    assert!(requests[0].headers.get("OK-ACCESS-SIGN").is_none());
    assert!(requests[0].headers.get("OK-ACCESS-KEY").is_none());
}

#[tokio::test]
async fn test_rate_limiter_spaces_bursts() {
    let state = MockState::default();
    let addr = start_mock_server(state.clone()).await;

    let rest = builder(addr)
        .with_rate_limit(3, Duration::from_millis(300))
        .build_rest()
        .unwrap();

    let calls = (0..4)
        .map(|_| rest.client().get("/api/v5/market/ticker", &[("instId", "BTC-USDT")]));
    for result in futures::future::join_all(calls).await {
        result.unwrap();
    }

    let requests = state.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[3].at - requests[0].at >= Duration::from_millis(290));
}

#[tokio::test]
async fn test_shutdown_stops_new_requests() {
    let state = MockState::default();
    let addr = start_mock_server(state.clone()).await;

    let rest = rest(addr);
    rest.client().shutdown();
    let result = rest.get_ticker("BTC-USDT").await;

    assert!(matches!(result, Err(ExchangeError::Shutdown)));
    assert!(state.requests().is_empty());
}

#[tokio::test]
async fn test_refused_connection_is_retried_as_network_error() {
    // Grab a free port, then close it so every attempt is refused
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let started = Instant::now();
    let result = rest(addr).get_ticker("BTC-USDT").await;

    let Err(error) = result else {
        panic!("expected a transport failure");
    };
    assert!(matches!(error, ExchangeError::NetworkError(_)), "{:?}", error);
    assert!(error.is_retryable());
    // Two backoffs of 50ms and 100ms separate the three attempts
    assert!(started.elapsed() >= Duration::from_millis(150));
}
