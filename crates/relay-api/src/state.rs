//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! AppState는 Arc로 래핑되어 여러 요청 간에 안전하게 공유됩니다.
//! 저장소는 프로세스가 소유하며 테스트마다 독립된 인스턴스를 주입할 수 있습니다.

use chrono::{DateTime, Utc};
use relay_core::{
    IndicatorStore, PositionCache, PositionFetcher, StalenessPolicy, SummaryAggregator,
    WebhookIngestor,
};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::services::{start_position_sync_service, start_store_maintenance_service};

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 지표 저장소
    pub store: Arc<IndicatorStore>,

    /// 웹훅 수집기 (시크릿 검증 포함)
    pub ingestor: Arc<WebhookIngestor>,

    /// 거래소 포지션 캐시
    pub positions: Arc<PositionCache>,

    /// 요약 생성기
    pub aggregator: Arc<SummaryAggregator>,

    /// 요약 요청에 심볼이 없을 때 사용할 심볼
    pub default_symbols: Vec<String>,

    /// 서버 시작 시간 (업타임 계산용)
    pub started_at: DateTime<Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 새로운 AppState 생성.
    ///
    /// 포지션 수집기 없이 시작하며, 신선도 정책은 기본값(24시간)을 사용합니다.
    pub fn new(store: Arc<IndicatorStore>, webhook_secret: Option<SecretString>) -> Self {
        let ingestor = Arc::new(WebhookIngestor::new(Arc::clone(&store), webhook_secret));
        let positions = Arc::new(PositionCache::unconfigured());
        let aggregator = Arc::new(SummaryAggregator::new(
            Arc::clone(&store),
            Arc::clone(&positions),
            StalenessPolicy::default(),
        ));

        Self {
            store,
            ingestor,
            positions,
            aggregator,
            default_symbols: vec!["BTCUSD".to_string()],
            started_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// 포지션 수집기 설정.
    pub fn with_position_fetcher(mut self, fetcher: Arc<dyn PositionFetcher>) -> Self {
        self.positions = Arc::new(PositionCache::new(Some(fetcher)));
        let policy = self.aggregator.policy().clone();
        self.aggregator = Arc::new(SummaryAggregator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.positions),
            policy,
        ));
        self
    }

    /// 신선도 정책 설정.
    pub fn with_staleness_policy(mut self, policy: StalenessPolicy) -> Self {
        self.aggregator = Arc::new(SummaryAggregator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.positions),
            policy,
        ));
        self
    }

    /// 요약 기본 심볼 설정. 빈 목록은 무시합니다.
    pub fn with_default_symbols(mut self, symbols: Vec<String>) -> Self {
        if !symbols.is_empty() {
            self.default_symbols = symbols;
        }
        self
    }

    /// 포지션 수집기 설정 여부.
    pub fn has_position_fetcher(&self) -> bool {
        self.positions.is_configured()
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// 포지션 동기화 서비스를 시작합니다.
    ///
    /// 수집기가 설정되지 않았으면 `None`을 반환합니다.
    pub fn start_position_sync(
        &self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if !self.has_position_fetcher() {
            return None;
        }
        Some(start_position_sync_service(
            Arc::clone(&self.positions),
            interval,
            shutdown,
        ))
    }

    /// 저장소 유지보수 서비스를 시작합니다.
    pub fn start_store_maintenance(
        &self,
        evict_after: Option<chrono::Duration>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        start_store_maintenance_service(Arc::clone(&self.store), evict_after, interval, shutdown)
    }
}

/// 테스트용 AppState 생성 헬퍼.
///
/// 빈 저장소, 시크릿 없음, 포지션 수집기 없음.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state() -> AppState {
    AppState::new(Arc::new(IndicatorStore::new()), None)
}
