//! 거래소 연동 상태 및 수동 동기화 endpoint.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use relay_core::{FetchError, RefreshOutcome, RefreshStatus};
use std::sync::Arc;
use tracing::warn;

use crate::error::{ApiErrorResponse, ApiResult};
use crate::metrics::{record_position_refresh, set_open_positions};
use crate::state::AppState;

/// 거래소 연동 상태 조회.
///
/// GET /api/exchanges/status
pub async fn exchange_status(State(state): State<Arc<AppState>>) -> Json<RefreshStatus> {
    Json(state.positions.status())
}

/// 포지션 즉시 동기화.
///
/// 실패 시 502를 반환하며 이전 스냅샷은 유지됩니다.
/// POST /api/exchanges/sync
pub async fn sync_positions(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<RefreshOutcome>> {
    match state.positions.refresh().await {
        Ok(outcome) => {
            if let RefreshOutcome::Refreshed { count, .. } = &outcome {
                record_position_refresh("ok");
                set_open_positions(*count);
            }
            Ok(Json(outcome))
        }
        Err(e) => {
            record_position_refresh(fetch_error_kind(&e));
            warn!(error = %e, "Manual position sync failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ApiErrorResponse::with_details(
                    "exchange_unavailable",
                    e.to_string(),
                    serde_json::json!({ "kind": fetch_error_kind(&e) }),
                )),
            ))
        }
    }
}

/// 메트릭/응답용 에러 분류.
pub fn fetch_error_kind(error: &FetchError) -> &'static str {
    match error {
        FetchError::Network(_) => "network",
        FetchError::Authentication(_) => "authentication",
        FetchError::Api(_) => "api",
        FetchError::Malformed(_) => "malformed",
    }
}

/// 거래소 라우터 생성.
pub fn exchanges_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(exchange_status))
        .route("/sync", post(sync_positions))
}
