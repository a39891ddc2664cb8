//! API 라우트 모듈.
//!
//! 각 하위 모듈은 `xxx_router()`를 노출하며 `create_api_router()`에서 조합됩니다.
//!
//! - `/health`: liveness / readiness
//! - `/webhook`: 차트 플랫폼 웹훅 수신
//! - `/api/indicators`: 지표 조회
//! - `/api/positions`: 포지션 조회
//! - `/api/summary`: 지표 + 포지션 요약
//! - `/api/exchanges`: 거래소 연동 상태 / 수동 동기화
//! - `/api/maintenance`: 히스토리 정리

pub mod exchanges;
pub mod health;
pub mod indicators;
pub mod maintenance;
pub mod positions;
pub mod summary;
pub mod webhook;

pub use exchanges::exchanges_router;
pub use health::{health_router, ComponentHealth, ComponentStatus, HealthResponse};
pub use indicators::{
    indicators_router, IndicatorHistoryResponse, IndicatorResponse, SymbolIndicatorsResponse,
};
pub use maintenance::{maintenance_router, CleanupResponse};
pub use positions::{positions_router, PositionsResponse};
pub use summary::summary_router;
pub use webhook::{webhook_router, WebhookResponse};

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터 생성.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health_router())
        .nest("/webhook", webhook_router())
        .nest("/api/indicators", indicators_router())
        .nest("/api/positions", positions_router())
        .nest("/api/summary", summary_router())
        .nest("/api/exchanges", exchanges_router())
        .nest("/api/maintenance", maintenance_router())
}
