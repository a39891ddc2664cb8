//! 차트 플랫폼 웹훅 수신 endpoint.
//!
//! 본문은 원시 바이트로 받아 `WebhookIngestor`에 그대로 전달합니다.
//! content-type이나 JSON extractor 에러가 거부 사유 코드를 우회하지 않도록 하기 위함입니다.
//!
//! 시크릿은 다음 순서로 찾습니다:
//! 1. `X-Webhook-Secret` 헤더
//! 2. `?secret=` 쿼리 파라미터
//! 3. 본문의 `secret` 필드

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Query, State},
    http::{HeaderMap, Uri},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use relay_core::{CompanionWrite, IngestAck, Rejection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{rejection_response, ApiResult};
use crate::metrics::{record_webhook_alert, set_indicator_keys};
use crate::state::AppState;

/// 시크릿 헤더 이름.
pub const SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Default, Deserialize)]
struct WebhookQuery {
    secret: Option<String>,
}

/// 웹훅 처리 성공 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// 항상 "ok"
    pub status: String,
    /// 정규화된 심볼
    pub symbol: String,
    /// 저장된 하위 키 (예: "rsi_1d")
    pub key: String,
    /// 저장된 값
    pub value: f64,
    /// 타임프레임
    pub timeframe: String,
    /// 수신 시각
    pub received_at: DateTime<Utc>,
    /// 출처
    pub source: String,
    /// 함께 기록된 보조 키
    pub companions: Vec<CompanionWrite>,
}

impl From<IngestAck> for WebhookResponse {
    fn from(ack: IngestAck) -> Self {
        Self {
            status: "ok".to_string(),
            symbol: ack.symbol,
            key: ack.key,
            value: ack.record.value,
            timeframe: ack.record.timeframe.clone(),
            received_at: ack.record.received_at,
            source: ack.record.source.clone(),
            companions: ack.companions,
        }
    }
}

/// TradingView 알림 수신.
///
/// POST /webhook/tradingview
pub async fn receive_tradingview(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<WebhookResponse>> {
    // 본문 크기 제한 초과 등 버퍼링 실패도 사유 코드로 응답
    let body = body.map_err(|e| {
        let rejection = Rejection::malformed(e.body_text());
        record_webhook_alert(rejection.reason.as_str());
        info!(status = %e.status(), "Webhook body rejected");
        rejection_response(&rejection)
    })?;

    let header_secret = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    // 파싱할 수 없는 쿼리는 무시
    let query_secret = Query::<WebhookQuery>::try_from_uri(&uri)
        .ok()
        .and_then(|Query(q)| q.secret);
    let provided = header_secret.or(query_secret);

    debug!(bytes = body.len(), "Webhook received");

    match state.ingestor.handle(&body, provided.as_deref()) {
        Ok(ack) => {
            record_webhook_alert("ok");
            set_indicator_keys(state.store.len());
            info!(
                symbol = %ack.symbol,
                key = %ack.key,
                value = ack.record.value,
                companions = ack.companions.len(),
                "Indicator stored"
            );
            Ok(Json(WebhookResponse::from(ack)))
        }
        Err(rejection) => {
            record_webhook_alert(rejection.reason.as_str());
            info!(
                reason = rejection.reason.as_str(),
                message = %rejection.message,
                "Webhook rejected"
            );
            Err(rejection_response(&rejection))
        }
    }
}

/// 웹훅 라우터 생성.
pub fn webhook_router() -> Router<Arc<AppState>> {
    Router::new().route("/tradingview", post(receive_tradingview))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorResponse;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use relay_core::IndicatorStore;
    use secrecy::SecretString;
    use tower::ServiceExt;

    fn app(state: AppState) -> Router {
        Router::new()
            .nest("/webhook", webhook_router())
            .with_state(Arc::new(state))
    }

    fn secured_state() -> AppState {
        AppState::new(
            Arc::new(IndicatorStore::new()),
            Some(SecretString::from("s3cret".to_string())),
        )
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn error_body(response: axum::response::Response) -> ApiErrorResponse {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_accepts_alert_without_secret_when_unsecured() {
        let state = crate::state::create_test_state();
        let store = Arc::clone(&state.store);

        let response = app(state)
            .oneshot(post_json(
                "/webhook/tradingview",
                r#"{"symbol":"BTCUSD","indicator":"rsi","value":42.5,"timeframe":"1D"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let ack: WebhookResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(ack.status, "ok");
        assert_eq!(ack.key, "rsi_1d");
        assert_eq!(ack.value, 42.5);
        assert_eq!(store.get_by_name("BTCUSD", "rsi_1d").unwrap().value, 42.5);
    }

    #[tokio::test]
    async fn test_secret_from_header_and_query() {
        let state = secured_state();
        let store = Arc::clone(&state.store);
        let router = app(state);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/webhook/tradingview")
            .header(SECRET_HEADER, "s3cret")
            .body(Body::from(r#"{"symbol":"ETHUSD","indicator":"rsi","value":55}"#))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(post_json(
                "/webhook/tradingview?secret=s3cret",
                r#"{"symbol":"SOLUSD","indicator":"rsi","value":61}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_unauthorized() {
        let state = secured_state();
        let store = Arc::clone(&state.store);

        let response = app(state)
            .oneshot(post_json(
                "/webhook/tradingview",
                r#"{"secret":"nope","symbol":"BTCUSD","indicator":"rsi","value":42.5}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_body(response).await.reason, "unauthorized");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed_not_unsupported_media_type() {
        let response = app(crate::state::create_test_state())
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/webhook/tradingview")
                    .header("content-type", "text/plain")
                    .body(Body::from("BTCUSD rsi 42"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(response).await.reason, "malformed_payload");
    }

    #[tokio::test]
    async fn test_oversized_body_gets_reason_code() {
        let state = crate::state::create_test_state();
        let store = Arc::clone(&state.store);
        let padding = "x".repeat(3 * 1024 * 1024);
        let body = format!(
            r#"{{"symbol":"BTCUSD","indicator":"rsi","value":42.5,"note":"{}"}}"#,
            padding
        );

        let response = app(state)
            .oneshot(post_json("/webhook/tradingview", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(response).await.reason, "malformed_payload");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_non_numeric_value_is_unprocessable() {
        let response = app(crate::state::create_test_state())
            .oneshot(post_json(
                "/webhook/tradingview",
                r#"{"symbol":"BTCUSD","indicator":"rsi","value":"abc"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_body(response).await.reason, "invalid_value");
    }
}
