//! 지표 + 포지션 요약.
//!
//! 요약은 조회 시점마다 새로 계산되며 저장되지 않습니다.
//! 저장소 스냅샷과 캐시된 포지션 스냅샷만 읽으므로 I/O가 발생하지 않습니다.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{normalize_symbol, IndicatorRecord, Position};
use crate::positions::PositionCache;
use crate::staleness::{Freshness, StalenessPolicy};
use crate::store::IndicatorStore;

/// 스테이블코인 견적 통화. 포지션 심볼 매칭 시 `USD`와 같게 취급합니다.
const STABLE_QUOTES: &[&str] = &["USDT", "USDC", "BUSD"];

/// 추세 판단에 사용하는 하위 키.
const PRICE_KEY: &str = "price_1d";
const MA200_KEY: &str = "ma200_1d";

/// 가격과 200일 이동평균으로 판단한 추세.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// 가격 > MA200
    Bullish,
    /// 가격 < MA200
    Bearish,
    /// 판단 불가 또는 동일
    Neutral,
}

/// 신선도가 표시된 지표 레코드.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedIndicator {
    /// 원본 레코드
    #[serde(flatten)]
    pub record: IndicatorRecord,
    /// 신선도
    pub freshness: Freshness,
    /// 나이 (초)
    pub age_secs: i64,
}

/// 심볼별 요약.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolSummary {
    /// 심볼
    pub symbol: String,
    /// 하위 키 → 지표
    pub indicators: BTreeMap<String, TaggedIndicator>,
    /// 해당 심볼의 포지션
    pub positions: Vec<Position>,
    /// 추세
    pub trend: Trend,
    /// stale 지표 개수
    pub stale_count: usize,
    /// 가장 최근 수신 시각
    pub last_updated: Option<DateTime<Utc>>,
}

/// 전체 요약.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// 생성 시각
    pub generated_at: DateTime<Utc>,
    /// 포지션 수집기 설정 여부
    pub positions_configured: bool,
    /// 포지션 스냅샷 시각
    pub positions_as_of: Option<DateTime<Utc>>,
    /// 요약에 포함된 포지션의 총 미실현 손익
    pub total_unrealized_pnl: f64,
    /// 심볼별 요약 (요청 순서)
    pub symbols: Vec<SymbolSummary>,
}

/// 요약 생성기.
#[derive(Debug, Clone)]
pub struct SummaryAggregator {
    store: Arc<IndicatorStore>,
    positions: Arc<PositionCache>,
    policy: StalenessPolicy,
}

impl SummaryAggregator {
    /// 새 생성기를 생성합니다.
    pub fn new(
        store: Arc<IndicatorStore>,
        positions: Arc<PositionCache>,
        policy: StalenessPolicy,
    ) -> Self {
        Self {
            store,
            positions,
            policy,
        }
    }

    /// 적용 중인 신선도 정책.
    pub fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    /// 현재 시각 기준으로 요약을 생성합니다.
    pub fn build<I, S>(&self, symbols: I) -> Summary
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.build_at(symbols, Utc::now())
    }

    /// 주어진 시각 기준으로 요약을 생성합니다.
    ///
    /// 데이터가 없는 심볼은 빈 항목으로 포함되며 실패하지 않습니다.
    pub fn build_at<I, S>(&self, symbols: I, now: DateTime<Utc>) -> Summary
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut requested: Vec<String> = Vec::new();
        for symbol in symbols {
            let symbol = normalize_symbol(symbol.as_ref());
            if !symbol.is_empty() && !requested.contains(&symbol) {
                requested.push(symbol);
            }
        }

        let view = self.positions.current();

        let summaries: Vec<SymbolSummary> = requested
            .into_iter()
            .map(|symbol| {
                let positions = view
                    .positions
                    .iter()
                    .filter(|p| symbols_match(&symbol, &p.symbol))
                    .cloned()
                    .collect();
                self.summarize_symbol(symbol, positions, now)
            })
            .collect();

        let total_unrealized_pnl = summaries
            .iter()
            .flat_map(|s| s.positions.iter())
            .map(|p| p.unrealized_pnl)
            .sum();

        Summary {
            generated_at: now,
            positions_configured: view.is_configured,
            positions_as_of: view.as_of,
            total_unrealized_pnl,
            symbols: summaries,
        }
    }

    fn summarize_symbol(
        &self,
        symbol: String,
        positions: Vec<Position>,
        now: DateTime<Utc>,
    ) -> SymbolSummary {
        let indicators: BTreeMap<String, TaggedIndicator> = self
            .store
            .list_by_symbol(&symbol)
            .into_iter()
            .map(|(name, record)| {
                let tagged = TaggedIndicator {
                    freshness: self.policy.classify(&record, now),
                    age_secs: record.age_at(now).num_seconds().max(0),
                    record,
                };
                (name, tagged)
            })
            .collect();

        let stale_count = indicators
            .values()
            .filter(|t| t.freshness == Freshness::Stale)
            .count();
        let last_updated = indicators.values().map(|t| t.record.received_at).max();
        let trend = trend_of(
            indicators.get(PRICE_KEY).map(|t| t.record.value),
            indicators.get(MA200_KEY).map(|t| t.record.value),
        );

        SymbolSummary {
            symbol,
            indicators,
            positions,
            trend,
            stale_count,
            last_updated,
        }
    }
}

fn trend_of(price: Option<f64>, ma200: Option<f64>) -> Trend {
    match (price, ma200) {
        (Some(price), Some(ma)) if price > ma => Trend::Bullish,
        (Some(price), Some(ma)) if price < ma => Trend::Bearish,
        _ => Trend::Neutral,
    }
}

/// 견적 통화가 스테이블코인이면 `USD`로 바꿉니다.
fn canonical_quote(symbol: &str) -> String {
    for quote in STABLE_QUOTES {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{}USD", base);
            }
        }
    }
    symbol.to_string()
}

fn symbols_match(requested: &str, position_symbol: &str) -> bool {
    requested == position_symbol || canonical_quote(requested) == canonical_quote(position_symbol)
}
