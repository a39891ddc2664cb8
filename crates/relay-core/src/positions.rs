//! 거래소 포지션 캐시.
//!
//! 외부 수집기(`PositionFetcher`)에서 받은 포지션을 스냅샷 단위로 보관합니다.
//!
//! - 스냅샷은 `Arc` 교체로만 갱신되므로 readers는 두 refresh가 섞인 상태를 보지 않습니다.
//! - 네트워크 호출 중에는 스냅샷 lock을 잡지 않습니다.
//! - refresh는 async mutex로 직렬화되어 오래된 조회가 새 결과를 덮어쓰지 않습니다.
//! - 실패하거나 중간에 취소된 refresh는 이전 스냅샷을 그대로 남깁니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::{Position, PositionSnapshot, RawPosition};

// =============================================================================
// 에러 타입
// =============================================================================

/// 포지션 수집 에러.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 인증 실패
    #[error("인증 실패: {0}")]
    Authentication(String),

    /// API 에러
    #[error("API 에러: {0}")]
    Api(String),

    /// 잘못된 응답
    #[error("잘못된 응답: {0}")]
    Malformed(String),
}

// =============================================================================
// PositionFetcher Trait
// =============================================================================

/// 거래소 포지션 수집기.
///
/// 테스트에서는 mock 구현으로 대체합니다.
#[async_trait]
pub trait PositionFetcher: Send + Sync {
    /// 현재 보유 포지션 조회.
    ///
    /// # Errors
    ///
    /// - `FetchError::Network`: 네트워크 연결 실패
    /// - `FetchError::Authentication`: 인증 실패 (API 키 오류 등)
    /// - `FetchError::Api`: 거래소 API 에러
    /// - `FetchError::Malformed`: 응답 파싱 실패
    async fn fetch_positions(&self) -> Result<Vec<RawPosition>, FetchError>;

    /// 거래소 이름 (로깅/상태 조회용).
    fn exchange_name(&self) -> &str;
}

// =============================================================================
// 조회 타입
// =============================================================================

/// refresh 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// 스냅샷 교체 완료
    Refreshed {
        /// 정규화 후 포지션 수
        count: usize,
        /// 새 스냅샷 시각
        as_of: DateTime<Utc>,
    },
    /// 수집기가 설정되지 않음
    NotConfigured,
}

/// `current()` 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionView {
    /// 포지션 목록 (설정되지 않았으면 빈 목록)
    pub positions: Vec<Position>,
    /// 스냅샷 시각
    pub as_of: Option<DateTime<Utc>>,
    /// 수집기 설정 여부
    pub is_configured: bool,
}

impl PositionView {
    /// 총 미실현 손익.
    pub fn total_unrealized_pnl(&self) -> f64 {
        self.positions.iter().map(|p| p.unrealized_pnl).sum()
    }
}

/// 거래소 연동 상태.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshStatus {
    /// 거래소 이름
    pub exchange: Option<String>,
    /// 수집기 설정 여부
    pub configured: bool,
    /// 마지막 시도 시각
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// 마지막 성공 시각
    pub last_success_at: Option<DateTime<Utc>>,
    /// 마지막 에러 (성공 시 초기화)
    pub last_error: Option<String>,
    /// 연속 실패 횟수
    pub consecutive_failures: u32,
    /// 현재 스냅샷의 포지션 수
    pub position_count: usize,
}

// =============================================================================
// PositionCache
// =============================================================================

/// 포지션 스냅샷 캐시.
pub struct PositionCache {
    fetcher: Option<Arc<dyn PositionFetcher>>,
    snapshot: RwLock<Arc<PositionSnapshot>>,
    status: RwLock<RefreshStatus>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for PositionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionCache")
            .field("exchange", &self.fetcher.as_ref().map(|f| f.exchange_name()))
            .finish_non_exhaustive()
    }
}

impl PositionCache {
    /// 새 캐시를 생성합니다. 수집기가 없으면 항상 빈 목록을 반환합니다.
    pub fn new(fetcher: Option<Arc<dyn PositionFetcher>>) -> Self {
        let status = RefreshStatus {
            exchange: fetcher.as_ref().map(|f| f.exchange_name().to_string()),
            configured: fetcher.is_some(),
            ..Default::default()
        };

        Self {
            fetcher,
            snapshot: RwLock::new(Arc::new(PositionSnapshot::default())),
            status: RwLock::new(status),
            refresh_lock: Mutex::new(()),
        }
    }

    /// 수집기 없이 생성합니다.
    pub fn unconfigured() -> Self {
        Self::new(None)
    }

    /// 수집기 설정 여부.
    pub fn is_configured(&self) -> bool {
        self.fetcher.is_some()
    }

    /// 설정된 수집기로 refresh합니다.
    pub async fn refresh(&self) -> Result<RefreshOutcome, FetchError> {
        match &self.fetcher {
            Some(fetcher) => self.refresh_with(fetcher.as_ref()).await,
            None => Ok(RefreshOutcome::NotConfigured),
        }
    }

    /// 주어진 수집기로 refresh합니다.
    ///
    /// 수집기 없이 생성된 캐시는 항상 비어 있어야 하므로 `NotConfigured`를 반환하고
    /// 수집기를 호출하지 않습니다.
    ///
    /// # Errors
    /// 수집 실패 또는 정규화 실패 시 에러를 반환하며, 이전 스냅샷은 유지됩니다.
    pub async fn refresh_with(
        &self,
        fetcher: &dyn PositionFetcher,
    ) -> Result<RefreshOutcome, FetchError> {
        if !self.is_configured() {
            return Ok(RefreshOutcome::NotConfigured);
        }

        let _guard = self.refresh_lock.lock().await;
        self.write_status().last_attempt_at = Some(Utc::now());

        let result = match fetcher.fetch_positions().await {
            Ok(raw) => normalize_all(raw, Utc::now()),
            Err(e) => Err(e),
        };

        match result {
            Ok(snapshot) => {
                let count = snapshot.positions.len();
                let as_of = snapshot.as_of.unwrap_or_else(Utc::now);
                *self.write_snapshot() = Arc::new(snapshot);

                let mut status = self.write_status();
                status.last_success_at = Some(as_of);
                status.last_error = None;
                status.consecutive_failures = 0;
                status.position_count = count;
                drop(status);

                info!(
                    exchange = fetcher.exchange_name(),
                    count, "Position snapshot refreshed"
                );
                Ok(RefreshOutcome::Refreshed { count, as_of })
            }
            Err(e) => {
                let mut status = self.write_status();
                status.last_error = Some(e.to_string());
                status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                let failures = status.consecutive_failures;
                drop(status);

                warn!(
                    exchange = fetcher.exchange_name(),
                    error = %e,
                    consecutive_failures = failures,
                    "Position refresh failed, keeping previous snapshot"
                );
                Err(e)
            }
        }
    }

    /// 현재 스냅샷 (Arc 공유).
    pub fn snapshot(&self) -> Arc<PositionSnapshot> {
        Arc::clone(&self.read_snapshot())
    }

    /// 현재 포지션 조회.
    ///
    /// 수집기가 설정되지 않았으면 빈 목록과 `is_configured=false`를 반환합니다.
    pub fn current(&self) -> PositionView {
        let snapshot = self.snapshot();
        PositionView {
            positions: snapshot.positions.clone(),
            as_of: snapshot.as_of,
            is_configured: self.is_configured(),
        }
    }

    /// 거래소 연동 상태.
    pub fn status(&self) -> RefreshStatus {
        match self.status.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                error!("PositionCache status RwLock poisoned (read), recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    fn read_snapshot(&self) -> RwLockReadGuard<'_, Arc<PositionSnapshot>> {
        match self.snapshot.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("PositionCache snapshot RwLock poisoned (read), recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_snapshot(&self) -> RwLockWriteGuard<'_, Arc<PositionSnapshot>> {
        match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("PositionCache snapshot RwLock poisoned (write), recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_status(&self) -> RwLockWriteGuard<'_, RefreshStatus> {
        match self.status.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("PositionCache status RwLock poisoned (write), recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// 수집 결과 전체를 정규화합니다. 항목 하나라도 잘못되면 전체를 거부합니다.
fn normalize_all(
    raw: Vec<RawPosition>,
    as_of: DateTime<Utc>,
) -> Result<PositionSnapshot, FetchError> {
    let mut positions = Vec::with_capacity(raw.len());
    for entry in raw {
        if let Some(position) = entry.normalize(as_of).map_err(FetchError::Malformed)? {
            positions.push(position);
        }
    }
    positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    Ok(PositionSnapshot {
        positions,
        as_of: Some(as_of),
    })
}

// =============================================================================
// 테스트
// =============================================================================
