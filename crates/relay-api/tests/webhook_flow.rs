//! 웹훅 수신부터 조회까지 전체 흐름 통합 테스트.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use relay_api::{create_api_router, AppState};
use relay_core::{FetchError, IndicatorStore, PositionFetcher, RawPosition};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn router(state: AppState) -> Router {
    create_api_router().with_state(Arc::new(state))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

struct FixedFetcher;

#[async_trait]
impl PositionFetcher for FixedFetcher {
    async fn fetch_positions(&self) -> Result<Vec<RawPosition>, FetchError> {
        Ok(vec![
            RawPosition::new("BTCUSDT", 0.25, 60000.0, 250.0),
            RawPosition::new("ETHUSDT", 0.0, 0.0, 0.0),
        ])
    }

    fn exchange_name(&self) -> &str {
        "fixed"
    }
}

#[tokio::test]
async fn rsi_alert_is_stored_and_listed() {
    let app = router(AppState::new(Arc::new(IndicatorStore::new()), None));

    let (status, ack) = send(
        &app,
        Method::POST,
        "/webhook/tradingview",
        Some(json!({"symbol":"btcusd","indicator":"RSI","value":"65.4","timeframe":"1D"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["symbol"], "BTCUSD");
    assert_eq!(ack["key"], "rsi_1d");
    assert_eq!(ack["value"], 65.4);

    let (status, listed) = send(&app, Method::GET, "/api/indicators/BTCUSD", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["indicators"]["rsi_1d"]["value"], 65.4);

    let (status, single) = send(&app, Method::GET, "/api/indicators/BTCUSD/rsi_1d", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(single["value"], 65.4);
}

#[tokio::test]
async fn wrong_secret_leaves_store_unchanged() {
    let store = Arc::new(IndicatorStore::new());
    let app = router(AppState::new(
        Arc::clone(&store),
        Some(SecretString::from("abc123".to_string())),
    ));

    let (status, body) = send(
        &app,
        Method::POST,
        "/webhook/tradingview",
        Some(json!({"secret":"wrong","symbol":"BTCUSD","indicator":"rsi","value":65.4})),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "unauthorized");
    assert!(store.is_empty());

    let (status, _) = send(
        &app,
        Method::POST,
        "/webhook/tradingview",
        Some(json!({"secret":"abc123","symbol":"BTCUSD","indicator":"rsi","value":65.4})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn summary_without_data_is_well_formed() {
    let app = router(AppState::new(Arc::new(IndicatorStore::new()), None));

    let (status, summary) = send(&app, Method::GET, "/api/summary", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["positions_configured"], false);
    for entry in summary["symbols"].as_array().unwrap() {
        assert!(entry["indicators"].as_object().unwrap().is_empty());
        assert!(entry["positions"].as_array().unwrap().is_empty());
    }
}

#[tokio::test]
async fn rejected_payloads_never_mutate_or_fail_with_5xx() {
    let store = Arc::new(IndicatorStore::new());
    let app = router(AppState::new(Arc::clone(&store), None));

    let cases = [
        (json!({"indicator":"rsi","value":1}), StatusCode::BAD_REQUEST, "malformed_payload"),
        (json!({"symbol":"BTCUSD","value":1}), StatusCode::BAD_REQUEST, "malformed_payload"),
        (json!({"symbol":"BTCUSD","indicator":"rsi"}), StatusCode::BAD_REQUEST, "malformed_payload"),
        (json!([1, 2, 3]), StatusCode::BAD_REQUEST, "malformed_payload"),
        (
            json!({"symbol":"BTCUSD","indicator":"rsi","value":"n/a"}),
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_value",
        ),
        (
            json!({"symbol":"BTCUSD","indicator":"macd","value":1.0,"value2":"x"}),
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_value",
        ),
    ];

    for (payload, expected_status, expected_reason) in cases {
        let (status, body) =
            send(&app, Method::POST, "/webhook/tradingview", Some(payload.clone())).await;
        assert_eq!(status, expected_status, "{}", payload);
        assert_eq!(body["reason"], expected_reason, "{}", payload);
    }

    assert!(store.is_empty());
}

#[tokio::test]
async fn concurrent_alerts_all_land() {
    let store = Arc::new(IndicatorStore::new());
    let app = router(AppState::new(Arc::clone(&store), None));

    let requests = (0..32).map(|i| {
        let app = app.clone();
        async move {
            send(
                &app,
                Method::POST,
                "/webhook/tradingview",
                Some(json!({"symbol": format!("SYM{}", i % 4), "indicator":"rsi","value": i})),
            )
            .await
        }
    });
    let results = futures::future::join_all(requests).await;

    assert!(results.iter().all(|(status, _)| *status == StatusCode::OK));
    assert_eq!(store.symbols(), vec!["SYM0", "SYM1", "SYM2", "SYM3"]);
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn summary_combines_indicators_and_positions() {
    let state = AppState::new(Arc::new(IndicatorStore::new()), None)
        .with_position_fetcher(Arc::new(FixedFetcher))
        .with_default_symbols(vec!["BTCUSD".to_string()]);
    let app = router(state);

    send(
        &app,
        Method::POST,
        "/webhook/tradingview",
        Some(json!({"symbol":"BTCUSD","indicator":"price","value":62000})),
    )
    .await;
    send(
        &app,
        Method::POST,
        "/webhook/tradingview",
        Some(json!({"symbol":"BTCUSD","indicator":"200ma","value":58000})),
    )
    .await;

    let (status, outcome) = send(&app, Method::POST, "/api/exchanges/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["count"], 1);

    let (_, positions) = send(&app, Method::GET, "/api/positions", None).await;
    assert_eq!(positions["is_configured"], true);
    assert_eq!(positions["positions"].as_array().unwrap().len(), 1);

    let (status, summary) = send(&app, Method::GET, "/api/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["positions_configured"], true);
    assert_eq!(summary["total_unrealized_pnl"], 250.0);

    let btc = &summary["symbols"][0];
    assert_eq!(btc["symbol"], "BTCUSD");
    assert_eq!(btc["trend"], "bullish");
    assert_eq!(btc["positions"][0]["symbol"], "BTCUSDT");
    assert!(btc["indicators"].get("ma200_1d").is_some());
}

#[tokio::test]
async fn liveness_check_is_constant() {
    let app = router(AppState::new(Arc::new(IndicatorStore::new()), None));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
