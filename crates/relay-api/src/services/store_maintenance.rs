//! 지표 저장소 유지보수 서비스.
//!
//! `indicator_keys` 게이지를 갱신하고, 보존 기간이 설정된 경우
//! 그보다 오래 갱신되지 않은 키를 제거합니다.

use chrono::Utc;
use relay_core::IndicatorStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::metrics::set_indicator_keys;

/// 저장소 유지보수 서비스.
pub struct StoreMaintenanceService {
    store: Arc<IndicatorStore>,
    evict_after: Option<chrono::Duration>,
    interval: Duration,
}

impl StoreMaintenanceService {
    /// 새 서비스 인스턴스 생성.
    ///
    /// `evict_after`가 `None`이면 제거 없이 게이지만 갱신합니다.
    pub fn new(
        store: Arc<IndicatorStore>,
        evict_after: Option<chrono::Duration>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            evict_after,
            interval,
        }
    }

    /// 서비스 시작 (메인 루프).
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once();
                }

                _ = shutdown.cancelled() => {
                    tracing::info!("StoreMaintenanceService stopped");
                    break;
                }
            }
        }
    }

    /// 한 번의 유지보수를 수행하고 제거된 키 수를 반환합니다.
    pub fn run_once(&self) -> usize {
        let evicted = match self.evict_after {
            Some(age) => {
                let evicted = self.store.evict_older_than(Utc::now() - age);
                if evicted > 0 {
                    tracing::info!(evicted, "Evicted stale indicator keys");
                }
                evicted
            }
            None => 0,
        };

        set_indicator_keys(self.store.len());
        evicted
    }
}

/// StoreMaintenanceService를 백그라운드 task로 시작.
pub fn start_store_maintenance_service(
    store: Arc<IndicatorStore>,
    evict_after: Option<chrono::Duration>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let service = StoreMaintenanceService::new(store, evict_after, interval);

    tokio::spawn(async move {
        service.run(shutdown).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::IndicatorKey;

    #[test]
    fn test_run_once_without_eviction_keeps_keys() {
        let store = Arc::new(IndicatorStore::new());
        store.put(&IndicatorKey::new("BTCUSD", "rsi", "1D"), 40.0);

        let service = StoreMaintenanceService::new(Arc::clone(&store), None, Duration::from_secs(60));
        assert_eq!(service.run_once(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_run_once_keeps_recent_keys() {
        let store = Arc::new(IndicatorStore::new());
        store.put(&IndicatorKey::new("BTCUSD", "rsi", "1D"), 40.0);

        let service = StoreMaintenanceService::new(
            Arc::clone(&store),
            Some(chrono::Duration::hours(1)),
            Duration::from_secs(60),
        );
        assert_eq!(service.run_once(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_zero_age_evicts_everything_written_before_now() {
        let store = Arc::new(IndicatorStore::new());
        store.put(&IndicatorKey::new("BTCUSD", "rsi", "1D"), 40.0);
        std::thread::sleep(std::time::Duration::from_millis(5));

        let service = StoreMaintenanceService::new(
            Arc::clone(&store),
            Some(chrono::Duration::zero()),
            Duration::from_secs(60),
        );
        assert_eq!(service.run_once(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_running_service_evicts_on_first_tick() {
        let store = Arc::new(IndicatorStore::new());
        store.put(&IndicatorKey::new("BTCUSD", "rsi", "1D"), 40.0);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let shutdown = CancellationToken::new();
        let handle = start_store_maintenance_service(
            Arc::clone(&store),
            Some(chrono::Duration::zero()),
            Duration::from_secs(60),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_service_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let handle = start_store_maintenance_service(
            Arc::new(IndicatorStore::new()),
            None,
            Duration::from_secs(60),
            shutdown.clone(),
        );
        shutdown.cancel();
        handle.await.unwrap();
    }
}
