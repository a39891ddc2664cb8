//! 지표 조회 endpoint.
//!
//! 모든 응답은 저장소 스냅샷 복사본이며 이후 쓰기의 영향을 받지 않습니다.

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use relay_core::{normalize_symbol, HistoryPoint, IndicatorRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{api_error, ApiErrorResponse, ApiResult};
use crate::state::AppState;

/// 히스토리 조회 기본 시간 범위.
pub const DEFAULT_HISTORY_HOURS: i64 = 24;
/// 히스토리 조회 최대 시간 범위 (7일).
pub const MAX_HISTORY_HOURS: i64 = 168;

/// 심볼별 지표 목록 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct SymbolIndicatorsResponse {
    pub symbol: String,
    pub indicators: BTreeMap<String, IndicatorRecord>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// 단일 지표 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndicatorResponse {
    pub symbol: String,
    pub key: String,
    #[serde(flatten)]
    pub record: IndicatorRecord,
}

/// 지표 히스토리 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndicatorHistoryResponse {
    pub symbol: String,
    pub key: String,
    pub hours: i64,
    pub points: Vec<HistoryPoint>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    hours: Option<i64>,
}

/// 심볼의 모든 지표 조회.
///
/// 저장된 지표가 없으면 빈 목록을 반환합니다.
/// GET /api/indicators/{symbol}
pub async fn list_indicators(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Json<SymbolIndicatorsResponse> {
    let indicators = state.store.list_by_symbol(&symbol);
    let last_updated = indicators.values().map(|r| r.received_at).max();

    Json(SymbolIndicatorsResponse {
        symbol: normalize_symbol(&symbol),
        indicators,
        last_updated,
    })
}

/// 단일 지표 조회.
///
/// GET /api/indicators/{symbol}/{key}
pub async fn get_indicator(
    State(state): State<Arc<AppState>>,
    Path((symbol, key)): Path<(String, String)>,
) -> ApiResult<Json<IndicatorResponse>> {
    let record = state
        .store
        .get_by_name(&symbol, &key)
        .ok_or_else(|| not_found(&symbol, &key))?;

    Ok(Json(IndicatorResponse {
        symbol: normalize_symbol(&symbol),
        key: key.trim().to_lowercase(),
        record: IndicatorRecord::clone(&record),
    }))
}

/// 지표 히스토리 조회.
///
/// GET /api/indicators/{symbol}/{key}/history?hours=24
pub async fn get_indicator_history(
    State(state): State<Arc<AppState>>,
    Path((symbol, key)): Path<(String, String)>,
    uri: Uri,
) -> ApiResult<Json<IndicatorHistoryResponse>> {
    let Query(query) = Query::<HistoryQuery>::try_from_uri(&uri).map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, "invalid_query", e.body_text())
    })?;

    let hours = query.hours.unwrap_or(DEFAULT_HISTORY_HOURS);
    if !(1..=MAX_HISTORY_HOURS).contains(&hours) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiErrorResponse::with_details(
                "invalid_query",
                format!("hours must be between 1 and {}", MAX_HISTORY_HOURS),
                serde_json::json!({ "field": "hours", "value": hours }),
            )),
        ));
    }

    let since = Utc::now() - Duration::hours(hours);
    let points = state
        .store
        .history(&symbol, &key, since)
        .ok_or_else(|| not_found(&symbol, &key))?;

    Ok(Json(IndicatorHistoryResponse {
        symbol: normalize_symbol(&symbol),
        key: key.trim().to_lowercase(),
        hours,
        points,
    }))
}

fn not_found(symbol: &str, key: &str) -> (StatusCode, Json<ApiErrorResponse>) {
    api_error(
        StatusCode::NOT_FOUND,
        "not_found",
        format!(
            "no value for '{}' on {}",
            key.trim().to_lowercase(),
            normalize_symbol(symbol)
        ),
    )
}

/// 지표 라우터 생성.
pub fn indicators_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{symbol}", get(list_indicators))
        .route("/{symbol}/{key}", get(get_indicator))
        .route("/{symbol}/{key}/history", get(get_indicator_history))
}
