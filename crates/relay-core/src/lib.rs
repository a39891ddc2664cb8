//! # Relay Core
//!
//! 차트 플랫폼 웹훅으로 들어오는 지표 값을 보관하고 조회하기 위한 핵심 모듈입니다.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 지표 키/레코드 및 포지션 도메인 타입
//! - 동시성 안전한 last-writer-wins 지표 저장소 (`IndicatorStore`)
//! - 웹훅 페이로드 검증 및 정규화 (`WebhookIngestor`)
//! - 거래소 포지션 스냅샷 캐시 (`PositionCache`)
//! - 지표 + 포지션 요약 생성 (`SummaryAggregator`)
//! - 설정 관리 및 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod positions;
pub mod staleness;
pub mod store;
pub mod summary;

pub use crate::config::*;
pub use domain::*;
pub use error::*;
pub use ingest::{CompanionWrite, IngestAck, WebhookIngestor};
pub use logging::*;
pub use positions::{
    FetchError, PositionCache, PositionFetcher, PositionView, RefreshOutcome, RefreshStatus,
};
pub use staleness::{timeframe_interval, Freshness, StalenessPolicy};
pub use store::{HistoryPoint, IndicatorStore};
pub use summary::{Summary, SummaryAggregator, SymbolSummary, TaggedIndicator, Trend};
