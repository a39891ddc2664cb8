//! 지표 + 포지션 요약 endpoint.
//!
//! 자동화 클라이언트가 한 번의 호출로 판단에 필요한 상태를 가져가는 용도입니다.

use axum::{
    extract::{Query, State},
    http::{StatusCode, Uri},
    routing::get,
    Json, Router,
};
use relay_core::Summary;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{api_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct SummaryQuery {
    /// 쉼표 구분 심볼 목록
    symbols: Option<String>,
    /// 단일 심볼
    symbol: Option<String>,
}

impl SummaryQuery {
    fn requested_symbols(&self) -> Vec<String> {
        self.symbols
            .iter()
            .chain(self.symbol.iter())
            .flat_map(|s| s.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// 요약 조회.
///
/// 심볼을 지정하지 않으면 설정된 기본 심볼을 사용합니다.
/// 저장된 데이터가 없어도 형식에 맞는 빈 요약을 반환합니다.
/// GET /api/summary?symbols=BTCUSD,ETHUSD
pub async fn get_summary(State(state): State<Arc<AppState>>, uri: Uri) -> ApiResult<Json<Summary>> {
    let Query(query) = Query::<SummaryQuery>::try_from_uri(&uri)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, "invalid_query", e.body_text()))?;

    let mut symbols = query.requested_symbols();
    if symbols.is_empty() {
        symbols = state.default_symbols.clone();
    }

    Ok(Json(state.aggregator.build(&symbols)))
}

/// 요약 라우터 생성.
pub fn summary_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use axum::{body::Body, http::Request};
    use relay_core::IndicatorKey;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn fetch(state: AppState, uri: &str) -> Value {
        let app = Router::new()
            .nest("/api/summary", summary_router())
            .with_state(Arc::new(state));
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_requested_symbols_parsing() {
        let query = SummaryQuery {
            symbols: Some("BTCUSD, ethusd,,".to_string()),
            symbol: Some("SOLUSD".to_string()),
        };
        assert_eq!(query.requested_symbols(), vec!["BTCUSD", "ethusd", "SOLUSD"]);
        assert!(SummaryQuery::default().requested_symbols().is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_returns_well_formed_summary() {
        let body = fetch(create_test_state(), "/api/summary").await;

        assert_eq!(body["positions_configured"], false);
        assert_eq!(body["total_unrealized_pnl"], 0.0);
        let symbols = body["symbols"].as_array().unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0]["symbol"], "BTCUSD");
        assert!(symbols[0]["indicators"].as_object().unwrap().is_empty());
        assert_eq!(symbols[0]["trend"], "neutral");
    }

    #[tokio::test]
    async fn test_summary_for_requested_symbols() {
        let state = create_test_state();
        state.store.put(&IndicatorKey::new("ETHUSD", "price", "1D"), 3500.0);
        state.store.put(&IndicatorKey::new("ETHUSD", "ma200", "1D"), 3000.0);

        let body = fetch(state, "/api/summary?symbols=ethusd").await;

        let symbols = body["symbols"].as_array().unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0]["symbol"], "ETHUSD");
        assert_eq!(symbols[0]["trend"], "bullish");
        assert_eq!(symbols[0]["indicators"]["price_1d"]["value"], 3500.0);
        assert_eq!(symbols[0]["indicators"]["price_1d"]["freshness"], "fresh");
    }
}
