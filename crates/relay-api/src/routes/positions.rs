//! 포지션 조회 endpoint.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use relay_core::Position;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// 포지션 목록 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct PositionsResponse {
    /// 열린 포지션 (심볼 순)
    pub positions: Vec<Position>,
    /// 스냅샷 시각 (한 번도 refresh되지 않았으면 null)
    pub as_of: Option<DateTime<Utc>>,
    /// 거래소 자격 증명 설정 여부
    pub is_configured: bool,
    /// 총 미실현 손익
    pub total_unrealized_pnl: f64,
}

/// 현재 포지션 스냅샷 조회.
///
/// 거래소를 호출하지 않고 캐시된 스냅샷만 반환합니다.
/// GET /api/positions
pub async fn list_positions(State(state): State<Arc<AppState>>) -> Json<PositionsResponse> {
    let view = state.positions.current();
    let total_unrealized_pnl = view.total_unrealized_pnl();

    Json(PositionsResponse {
        positions: view.positions,
        as_of: view.as_of,
        is_configured: view.is_configured,
        total_unrealized_pnl,
    })
}

/// 포지션 라우터 생성.
pub fn positions_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_positions))
}
