//! 저장소 정리 endpoint.

use axum::{
    extract::{Query, State},
    http::{StatusCode, Uri},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::{api_error, ApiResult};
use crate::metrics::set_indicator_keys;
use crate::state::AppState;

const DEFAULT_RETENTION_DAYS: i64 = 30;
const MAX_RETENTION_DAYS: i64 = 365;

#[derive(Debug, Default, Deserialize)]
struct CleanupQuery {
    days: Option<i64>,
}

/// 정리 결과.
#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub days: i64,
    pub cutoff: DateTime<Utc>,
    pub removed_points: usize,
}

/// `days`일보다 오래된 히스토리 항목을 제거합니다.
///
/// 최신 값은 유지됩니다.
/// POST /api/maintenance/cleanup?days=30
pub async fn cleanup_history(
    State(state): State<Arc<AppState>>,
    uri: Uri,
) -> ApiResult<Json<CleanupResponse>> {
    let Query(query) = Query::<CleanupQuery>::try_from_uri(&uri)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, "invalid_query", e.body_text()))?;

    let days = query.days.unwrap_or(DEFAULT_RETENTION_DAYS);
    if !(1..=MAX_RETENTION_DAYS).contains(&days) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_query",
            format!("days must be between 1 and {}", MAX_RETENTION_DAYS),
        ));
    }

    let cutoff = Utc::now() - Duration::days(days);
    let removed_points = state.store.prune_history(cutoff);
    set_indicator_keys(state.store.len());

    info!(days, removed_points, "History cleanup completed");

    Ok(Json(CleanupResponse {
        days,
        cutoff,
        removed_points,
    }))
}

/// 유지보수 라우터 생성.
pub fn maintenance_router() -> Router<Arc<AppState>> {
    Router::new().route("/cleanup", post(cleanup_history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use axum::{
        body::Body,
        http::{Method, Request},
    };
    use relay_core::IndicatorKey;
    use tower::ServiceExt;

    async fn post(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let app = Router::new()
            .nest("/api/maintenance", maintenance_router())
            .with_state(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_values() {
        let state = Arc::new(create_test_state());
        state.store.put(&IndicatorKey::new("BTCUSD", "rsi", "1D"), 40.0);

        let (status, body) = post(Arc::clone(&state), "/api/maintenance/cleanup?days=7").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["days"], 7);
        assert_eq!(body["removed_points"], 0);
        assert!(state.store.get_by_name("BTCUSD", "rsi_1d").is_some());
    }

    #[tokio::test]
    async fn test_cleanup_rejects_out_of_range_days() {
        let state = Arc::new(create_test_state());
        for uri in [
            "/api/maintenance/cleanup?days=0",
            "/api/maintenance/cleanup?days=366",
        ] {
            let (status, body) = post(Arc::clone(&state), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["reason"], "invalid_query");
        }
    }
}
