//! 포지션 동기화 서비스.
//!
//! 주기적으로 `PositionCache::refresh`를 호출합니다.
//! 실패 시 캐시는 이전 스냅샷을 유지하므로 서비스는 다음 주기에 다시 시도할 뿐입니다.

use relay_core::{PositionCache, RefreshOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::metrics::{record_position_refresh, set_open_positions};
use crate::routes::exchanges::fetch_error_kind;

/// 포지션 동기화 서비스.
pub struct PositionSyncService {
    cache: Arc<PositionCache>,
    interval: Duration,
}

impl PositionSyncService {
    /// 새 서비스 인스턴스 생성.
    pub fn new(cache: Arc<PositionCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// 서비스 시작 (메인 루프).
    ///
    /// 진행 중인 refresh도 shutdown 시 중단됩니다.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.sync_once() => {}
                        _ = shutdown.cancelled() => {
                            tracing::info!("PositionSyncService stopped during refresh");
                            break;
                        }
                    }
                }

                _ = shutdown.cancelled() => {
                    tracing::info!("PositionSyncService stopped");
                    break;
                }
            }
        }
    }

    async fn sync_once(&self) {
        match self.cache.refresh().await {
            Ok(RefreshOutcome::Refreshed { count, .. }) => {
                record_position_refresh("ok");
                set_open_positions(count);
            }
            Ok(RefreshOutcome::NotConfigured) => {}
            Err(e) => {
                // 캐시가 이미 warn 로그를 남김
                record_position_refresh(fetch_error_kind(&e));
            }
        }
    }
}

/// PositionSyncService를 백그라운드 task로 시작.
///
/// # Returns
///
/// 백그라운드 task의 JoinHandle
pub fn start_position_sync_service(
    cache: Arc<PositionCache>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let service = PositionSyncService::new(cache, interval);

    tokio::spawn(async move {
        service.run(shutdown).await;
    })
}
